use bytemuck::Zeroable;
use order::CameraUniform;
use wgpu::util::DeviceExt;

use crate::indirect::DrawBuffers;
use crate::layout::BindGroupLayouts;
use crate::sorter::Sorter;

/// Frames recorded before the oldest one must have retired.
pub const FRAMES_IN_FLIGHT: usize = 2;

/// Per-frame camera uniform and ordering output, so a frame can be recorded
/// while the previous one is still being drawn.
pub struct FrameResources {
    camera: wgpu::Buffer,
    camera_bind_group: wgpu::BindGroup,
    draw: DrawBuffers,
    sort_bind_group: wgpu::BindGroup,
}

impl FrameResources {
    pub fn new(
        device: &wgpu::Device,
        layouts: &BindGroupLayouts,
        sorter: &Sorter,
        point_count: u32,
    ) -> Self {
        let camera = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Camera Buffer"),
            contents: bytemuck::bytes_of(&CameraUniform::zeroed()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let camera_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Camera BG"),
            layout: &layouts.camera,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: camera.as_entire_binding(),
            }],
        });

        let draw = DrawBuffers::new(device, layouts, point_count);
        let sort_bind_group = sorter.bind(device, &draw);

        Self {
            camera,
            camera_bind_group,
            draw,
            sort_bind_group,
        }
    }

    pub fn write_camera(&self, queue: &wgpu::Queue, camera: &CameraUniform) {
        queue.write_buffer(&self.camera, 0, bytemuck::bytes_of(camera));
    }

    pub fn camera_bind_group(&self) -> &wgpu::BindGroup {
        &self.camera_bind_group
    }

    pub fn draw_buffers(&self) -> &DrawBuffers {
        &self.draw
    }

    pub(crate) fn sort_bind_group(&self) -> &wgpu::BindGroup {
        &self.sort_bind_group
    }
}

/// Slot used by frame number `counter`.
pub fn frame_index(counter: u64, frames_in_flight: usize) -> usize {
    (counter % frames_in_flight as u64) as usize
}
