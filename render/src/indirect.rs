use std::sync::mpsc::channel;

use order::indirect::SENTINEL_KEY;
use order::{DrawIndirectCommand, VisibleInstance};
use wgpu::util::DeviceExt;

use crate::context::Context;
use crate::error::Result;
use crate::layout::BindGroupLayouts;

/// Key/index capacity for a scene: the next power of two, as the bitonic sort
/// needs.
pub fn padded_capacity(point_count: u32) -> u32 {
    point_count.max(1).next_power_of_two()
}

/// One frame's output of the ordering pass.
///
/// `command` is written by the pass through `instance_count` and consumed in
/// place by `draw_indexed_indirect`; nothing is copied back on the draw path.
pub struct DrawBuffers {
    command: wgpu::Buffer,
    keys: wgpu::Buffer,
    indices: wgpu::Buffer,
    capacity: u32,
    draw_bind_group: wgpu::BindGroup,
    instance_bind_group: wgpu::BindGroup,
}

impl DrawBuffers {
    pub fn new(device: &wgpu::Device, layouts: &BindGroupLayouts, point_count: u32) -> Self {
        let capacity = padded_capacity(point_count);

        let command = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Draw Indirect Command"),
            contents: bytemuck::bytes_of(&DrawIndirectCommand::RESET),
            usage: wgpu::BufferUsages::INDIRECT
                | wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
        });
        let keys = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Instance Keys"),
            contents: bytemuck::cast_slice(&vec![SENTINEL_KEY; capacity as usize]),
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        });
        let indices = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Instance Indices"),
            size: capacity as u64 * 4,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });

        let draw_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Draw BG"),
            layout: &layouts.draw,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: command.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: keys.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 3, resource: indices.as_entire_binding() },
            ],
        });
        let instance_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Instances BG"),
            layout: &layouts.instances,
            entries: &[wgpu::BindGroupEntry { binding: 3, resource: indices.as_entire_binding() }],
        });

        Self {
            command,
            keys,
            indices,
            capacity,
            draw_bind_group,
            instance_bind_group,
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn command_buffer(&self) -> &wgpu::Buffer {
        &self.command
    }

    pub fn keys(&self) -> &wgpu::Buffer {
        &self.keys
    }

    pub fn indices(&self) -> &wgpu::Buffer {
        &self.indices
    }

    pub(crate) fn draw_bind_group(&self) -> &wgpu::BindGroup {
        &self.draw_bind_group
    }

    pub(crate) fn instance_bind_group(&self) -> &wgpu::BindGroup {
        &self.instance_bind_group
    }

    /// Reads the command block back. Blocks on the device; diagnostics only.
    pub fn read_command(&self, ctx: &Context) -> Result<DrawIndirectCommand> {
        let bytes = readback(ctx, &self.command, size_of::<DrawIndirectCommand>() as u64)?;
        Ok(bytemuck::pod_read_unaligned(&bytes))
    }

    /// Reads slots `[0, instance_count)` back, in buffer order. Blocks on the
    /// device; diagnostics only.
    pub fn read_visible(&self, ctx: &Context) -> Result<Vec<VisibleInstance>> {
        let count = self.read_command(ctx)?.instance_count.min(self.capacity);
        if count == 0 {
            return Ok(Vec::new());
        }
        let size = count as u64 * 4;
        let keys = readback(ctx, &self.keys, size)?;
        let indices = readback(ctx, &self.indices, size)?;
        Ok(words(&keys)
            .into_iter()
            .zip(words(&indices))
            .map(|(sort_key, splat_index)| VisibleInstance {
                sort_key,
                splat_index,
            })
            .collect())
    }
}

/// Copies the first `size` bytes of `source` into a staging buffer and maps it.
pub(crate) fn readback(ctx: &Context, source: &wgpu::Buffer, size: u64) -> Result<Vec<u8>> {
    let staging = ctx.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Readback"),
        size,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let mut encoder = ctx
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("Readback") });
    encoder.copy_buffer_to_buffer(source, 0, &staging, 0, size);
    ctx.queue.submit([encoder.finish()]);

    map_read(ctx, &staging)
}

pub(crate) fn words(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks_exact(4)
        .map(bytemuck::pod_read_unaligned::<u32>)
        .collect()
}

pub(crate) fn map_read(ctx: &Context, staging: &wgpu::Buffer) -> Result<Vec<u8>> {
    let slice = staging.slice(..);
    let (tx, rx) = channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    ctx.device.poll(wgpu::PollType::Wait)?;
    rx.recv().unwrap_or(Err(wgpu::BufferAsyncError))?;

    let bytes = slice.get_mapped_range().to_vec();
    staging.unmap();
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_is_a_power_of_two() {
        assert_eq!(padded_capacity(0), 1);
        assert_eq!(padded_capacity(1), 1);
        assert_eq!(padded_capacity(3), 4);
        assert_eq!(padded_capacity(1024), 1024);
        assert_eq!(padded_capacity(1025), 2048);
    }
}
