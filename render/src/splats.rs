use bytemuck::{Pod, Zeroable};
use order::{OrderConfig, SplatStore};
use wgpu::util::DeviceExt;

use crate::error::{RenderError, Result};
use crate::layout::BindGroupLayouts;

/// Uniform at group 1 binding 0. Padded to 16 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SplatInfo {
    pub point_count: u32,
    pub size_threshold: f32,
    _pad: [u32; 2],
}

impl SplatInfo {
    pub fn new(point_count: u32, size_threshold: f32) -> Self {
        Self {
            point_count,
            size_threshold,
            _pad: [0; 2],
        }
    }
}

/// Device copy of a [`SplatStore`]. Read-only after upload and shared by every
/// frame in flight.
pub struct GpuSplats {
    info: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    point_count: u32,
}

impl GpuSplats {
    pub fn upload(
        device: &wgpu::Device,
        layouts: &BindGroupLayouts,
        store: &SplatStore,
        config: &OrderConfig,
    ) -> Result<Self> {
        config.validate()?;
        if store.is_empty() {
            return Err(RenderError::EmptyScene);
        }
        let point_count = u32::try_from(store.point_count())
            .map_err(|_| RenderError::TooManySplats(store.point_count()))?;

        let limits = device.limits();
        check_binding_size("Splat Positions", store.positions(), &limits)?;
        check_binding_size("Splat Cov3d", store.cov3d(), &limits)?;
        check_binding_size("Splat Colors", store.colors(), &limits)?;

        let info = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Splat Info"),
            contents: bytemuck::bytes_of(&SplatInfo::new(point_count, config.size_threshold)),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let storage = |label: &'static str, data: &[f32]| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::cast_slice(data),
                usage: wgpu::BufferUsages::STORAGE,
            })
        };
        let positions = storage("Splat Positions", store.positions());
        let cov3d = storage("Splat Cov3d", store.cov3d());
        let colors = storage("Splat Colors", store.colors());

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Splats BG"),
            layout: &layouts.splats,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: info.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: positions.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: cov3d.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 3, resource: colors.as_entire_binding() },
            ],
        });

        tracing::debug!(point_count, "uploaded splats");

        Ok(Self {
            info,
            bind_group,
            point_count,
        })
    }

    pub fn point_count(&self) -> u32 {
        self.point_count
    }

    pub fn bind_group(&self) -> &wgpu::BindGroup {
        &self.bind_group
    }

    /// Changes the size threshold without re-uploading the attribute arrays.
    pub fn set_size_threshold(&self, queue: &wgpu::Queue, size_threshold: f32) {
        let info = SplatInfo::new(self.point_count, size_threshold);
        queue.write_buffer(&self.info, 0, bytemuck::bytes_of(&info));
    }
}

/// Fails with [`RenderError::BufferTooLarge`] when `data` cannot be bound whole
/// as a storage buffer on a device with `limits`.
pub(crate) fn check_binding_size<T>(
    name: &'static str,
    data: &[T],
    limits: &wgpu::Limits,
) -> Result<()> {
    let size = size_of_val(data) as u64;
    let limit = u64::from(limits.max_storage_buffer_binding_size).min(limits.max_buffer_size);
    if size > limit {
        return Err(RenderError::BufferTooLarge { name, size, limit });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn info_is_one_uniform_slot() {
        assert_eq!(size_of::<SplatInfo>(), 16);
        let words: [u32; 4] = bytemuck::cast(SplatInfo::new(7, 1.0));
        assert_eq!(words, [7, 1.0f32.to_bits(), 0, 0]);
    }

    #[test]
    fn oversized_attribute_is_rejected() {
        let limits = wgpu::Limits::downlevel_defaults();
        // Six floats per splat: 6M splats is 144,000,000 bytes.
        let cov3d = vec![0.0f32; 6 * 6_000_000];
        let err = check_binding_size("Splat Cov3d", &cov3d, &limits).unwrap_err();
        let RenderError::BufferTooLarge { name, size, limit } = err else {
            panic!("expected BufferTooLarge, got {err:?}");
        };
        assert_eq!((name, size, limit), ("Splat Cov3d", 144_000_000, 134_217_728));

        let positions = vec![0.0f32; 3 * 1000];
        check_binding_size("Splat Positions", &positions, &limits).unwrap();
    }

    #[test]
    fn limit_is_the_smaller_of_binding_and_buffer_size() {
        let limits = wgpu::Limits {
            max_storage_buffer_binding_size: 1024,
            max_buffer_size: 512,
            ..wgpu::Limits::downlevel_defaults()
        };
        check_binding_size("Splat Colors", &[0u32; 128], &limits).unwrap();
        assert!(matches!(
            check_binding_size("Splat Colors", &[0u32; 129], &limits),
            Err(RenderError::BufferTooLarge { size: 516, limit: 512, .. })
        ));
    }
}
