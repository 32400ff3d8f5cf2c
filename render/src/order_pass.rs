use order::WORKGROUP_SIZE;

use crate::error::Result;
use crate::frame::FrameResources;
use crate::layout::{BindGroupLayouts, workgroup_grid};
use crate::shader::{self, ORDER_SOURCE, ShaderKind};
use crate::splats::GpuSplats;

/// GPU visibility & ordering pass.
///
/// `reset` restores the frame's command block and fills its keys with the
/// sentinel, then `main` runs one invocation per splat and appends each visible
/// one through `atomicAdd` on the command block's instance count.
pub struct OrderPass {
    reset_pipeline: wgpu::ComputePipeline,
    pipeline: wgpu::ComputePipeline,
}

impl OrderPass {
    pub fn new(device: &wgpu::Device, layouts: &BindGroupLayouts) -> Result<Self> {
        let shader = shader::compile(device, "Order Shader", ORDER_SOURCE, ShaderKind::Compute)?;
        let pipeline_layout = layouts.order_pipeline_layout(device);

        let reset_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Order Reset Pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("reset"),
            compilation_options: Default::default(),
            cache: None,
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Order Pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some(shader::ENTRY_POINT),
            compilation_options: Default::default(),
            cache: None,
        });

        Ok(Self {
            reset_pipeline,
            pipeline,
        })
    }

    pub fn encode(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        frame: &FrameResources,
        splats: &GpuSplats,
    ) {
        let draw = frame.draw_buffers();

        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Order Reset"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.reset_pipeline);
            bind_groups(&mut pass, frame, splats);
            let (x, y) = workgroup_grid(draw.capacity(), WORKGROUP_SIZE);
            pass.dispatch_workgroups(x, y, 1);
        }

        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Order"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.pipeline);
        bind_groups(&mut pass, frame, splats);
        let (x, y) = workgroup_grid(splats.point_count(), WORKGROUP_SIZE);
        pass.dispatch_workgroups(x, y, 1);
    }
}

fn bind_groups(pass: &mut wgpu::ComputePass<'_>, frame: &FrameResources, splats: &GpuSplats) {
    pass.set_bind_group(0, frame.camera_bind_group(), &[]);
    pass.set_bind_group(1, splats.bind_group(), &[]);
    pass.set_bind_group(2, frame.draw_buffers().draw_bind_group(), &[]);
}
