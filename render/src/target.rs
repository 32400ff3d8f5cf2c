use crate::context::Context;
use crate::error::{RenderError, Result};
use crate::indirect::map_read;
use crate::pipeline::COLOR_FORMAT;

/// Ring of color images frames are drawn into, such as a swapchain.
pub trait PresentTarget {
    fn image_count(&self) -> usize;
    fn width(&self) -> u32;
    fn height(&self) -> u32;

    /// View of image `index`, created in [`COLOR_FORMAT`].
    fn view(&self, index: usize) -> &wgpu::TextureView;

    /// Index of the next image to draw into.
    fn acquire(&mut self) -> Result<usize>;

    /// Called once the frame drawing into `index` has been submitted.
    fn present(&mut self, _index: usize) {}
}

/// Textures that are never shown, cycled round-robin.
pub struct OffscreenTarget {
    textures: Vec<wgpu::Texture>,
    views: Vec<wgpu::TextureView>,
    width: u32,
    height: u32,
    next: usize,
}

impl OffscreenTarget {
    pub fn new(
        device: &wgpu::Device,
        width: u32,
        height: u32,
        image_count: usize,
    ) -> Result<Self> {
        check_extent(width, height)?;
        let textures: Vec<wgpu::Texture> = (0..image_count.max(1))
            .map(|_| {
                device.create_texture(&wgpu::TextureDescriptor {
                    label: Some("Offscreen Target"),
                    size: wgpu::Extent3d {
                        width,
                        height,
                        depth_or_array_layers: 1,
                    },
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: COLOR_FORMAT,
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
                    view_formats: &[],
                })
            })
            .collect();
        let views = textures
            .iter()
            .map(|texture| texture.create_view(&wgpu::TextureViewDescriptor::default()))
            .collect();

        Ok(Self {
            textures,
            views,
            width,
            height,
            next: 0,
        })
    }

    /// Copies image `index` back as tightly packed BGRA rows. Blocks on the
    /// device.
    pub fn read_pixels(&self, ctx: &Context, index: usize) -> Result<Vec<u8>> {
        let row_bytes = self.width * 4;
        let padded_row = row_bytes.next_multiple_of(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);

        let staging = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Offscreen Readback"),
            size: padded_row as u64 * self.height as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Offscreen Readback"),
        });
        encoder.copy_texture_to_buffer(
            self.textures[index].as_image_copy(),
            wgpu::TexelCopyBufferInfo {
                buffer: &staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row),
                    rows_per_image: Some(self.height),
                },
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
        ctx.queue.submit([encoder.finish()]);

        let padded = map_read(ctx, &staging)?;
        Ok(padded
            .chunks_exact(padded_row as usize)
            .flat_map(|row| &row[..row_bytes as usize])
            .copied()
            .collect())
    }
}

impl PresentTarget for OffscreenTarget {
    fn image_count(&self) -> usize {
        self.views.len()
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn view(&self, index: usize) -> &wgpu::TextureView {
        &self.views[index]
    }

    fn acquire(&mut self) -> Result<usize> {
        let index = self.next;
        self.next = (self.next + 1) % self.views.len();
        Ok(index)
    }
}

fn check_extent(width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(RenderError::InvalidConfig(format!(
            "target extent must be non-zero, got {width}x{height}"
        )));
    }
    Ok(())
}
