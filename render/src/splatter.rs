use order::{CameraUniform, OrderConfig, SplatStore};
use wgpu::StoreOp;

use crate::config::RenderConfig;
use crate::context::Context;
use crate::error::{RenderError, Result};
use crate::frame::{FrameResources, frame_index};
use crate::indirect::padded_capacity;
use crate::layout::BindGroupLayouts;
use crate::order_pass::OrderPass;
use crate::pipeline::SplatPipeline;
use crate::quad::Quad;
use crate::shader::{SPLAT_FRAGMENT_SOURCE, SPLAT_VERTEX_SOURCE};
use crate::sorter::Sorter;
use crate::splats::GpuSplats;
use crate::target::PresentTarget;

struct Scene {
    splats: GpuSplats,
    sorter: Sorter,
    frames: Vec<FrameResources>,
}

/// Owns the frame loop: per frame, writes the camera, runs the ordering pass,
/// sorts, and draws indirect into the acquired target image, all in one
/// command buffer.
pub struct Splatter {
    config: RenderConfig,
    layouts: BindGroupLayouts,
    order_pass: OrderPass,
    pipeline: SplatPipeline,
    quad: Quad,
    scene: Option<Scene>,
    frame_counter: u64,
}

impl Splatter {
    pub fn new(ctx: &Context, config: RenderConfig) -> Result<Self> {
        config.validate()?;
        let layouts = BindGroupLayouts::new(&ctx.device);
        let order_pass = OrderPass::new(&ctx.device, &layouts)?;
        let pipeline = SplatPipeline::new(
            &ctx.device,
            SPLAT_VERTEX_SOURCE,
            SPLAT_FRAGMENT_SOURCE,
            &layouts.splat_pipeline_layout(&ctx.device),
        )?;
        let quad = Quad::new(&ctx.device);

        Ok(Self {
            config,
            layouts,
            order_pass,
            pipeline,
            quad,
            scene: None,
            frame_counter: 0,
        })
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Uploads a new scene and rebuilds the per-frame buffers for its size.
    pub fn set_splats(
        &mut self,
        ctx: &Context,
        store: &SplatStore,
        order_config: &OrderConfig,
    ) -> Result<()> {
        let splats = GpuSplats::upload(&ctx.device, &self.layouts, store, order_config)?;
        let capacity = padded_capacity(splats.point_count());
        let sorter = Sorter::new(&ctx.device, capacity)?;
        let frames = (0..self.config.frames_in_flight)
            .map(|_| FrameResources::new(&ctx.device, &self.layouts, &sorter, splats.point_count()))
            .collect();

        tracing::debug!(
            point_count = splats.point_count(),
            capacity,
            frames = self.config.frames_in_flight,
            "scene ready"
        );

        self.scene = Some(Scene {
            splats,
            sorter,
            frames,
        });
        Ok(())
    }

    /// Changes the size threshold of the current scene.
    pub fn set_size_threshold(&self, ctx: &Context, size_threshold: f32) -> Result<()> {
        let scene = self.scene.as_ref().ok_or(RenderError::EmptyScene)?;
        scene.splats.set_size_threshold(&ctx.queue, size_threshold);
        Ok(())
    }

    pub fn frame(&self, index: usize) -> Option<&FrameResources> {
        self.scene.as_ref()?.frames.get(index)
    }

    /// Records and submits one frame. Returns the index of the
    /// [`FrameResources`] it used, whose draw buffers can be read back for
    /// diagnostics.
    pub fn render(
        &mut self,
        ctx: &Context,
        camera: &CameraUniform,
        target: &mut impl PresentTarget,
    ) -> Result<usize> {
        let scene = self.scene.as_ref().ok_or(RenderError::EmptyScene)?;
        let index = frame_index(self.frame_counter, scene.frames.len());
        let frame = &scene.frames[index];

        let _span = tracing::trace_span!("Splatter::render", frame = self.frame_counter).entered();

        frame.write_camera(&ctx.queue, camera);
        let image = target.acquire()?;

        let mut encoder = ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Splat Frame"),
        });

        self.order_pass.encode(&mut encoder, frame, &scene.splats);
        if self.config.sort {
            scene.sorter.encode(&mut encoder, frame.sort_bind_group());
        }

        {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Splat Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target.view(image),
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.config.clear_color()),
                        store: StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            self.pipeline.draw(
                &mut rpass,
                frame.camera_bind_group(),
                scene.splats.bind_group(),
                &self.quad,
                frame.draw_buffers(),
            );
        }

        ctx.queue.submit(Some(encoder.finish()));
        target.present(image);
        self.frame_counter += 1;

        Ok(index)
    }
}
