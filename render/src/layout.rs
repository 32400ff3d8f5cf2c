use std::num::NonZeroU64;

use order::CameraUniform;

use crate::splats::SplatInfo;

/// Largest workgroup count per dispatch dimension guaranteed by WebGPU.
pub const MAX_WORKGROUPS_PER_DIMENSION: u32 = 65535;

/// Workgroup grid covering `invocations` threads at `workgroup_size` threads
/// per group. Counts above the per-dimension limit fold into `y`; shaders
/// rebuild the linear id as `y * num_workgroups.x * size + x`.
pub fn workgroup_grid(invocations: u32, workgroup_size: u32) -> (u32, u32) {
    let groups = invocations.div_ceil(workgroup_size).max(1);
    if groups <= MAX_WORKGROUPS_PER_DIMENSION {
        (groups, 1)
    } else {
        (
            MAX_WORKGROUPS_PER_DIMENSION,
            groups.div_ceil(MAX_WORKGROUPS_PER_DIMENSION),
        )
    }
}

/// Bind group layouts shared by the ordering pass and the splat pipeline.
///
/// - group 0: camera uniform
/// - group 1: splat count, positions, covariances, colors
/// - group 2: command block, keys and indices (`draw`, written by compute) or
///   the sorted indices alone (`instances`, read by the vertex stage)
pub struct BindGroupLayouts {
    pub camera: wgpu::BindGroupLayout,
    pub splats: wgpu::BindGroupLayout,
    pub draw: wgpu::BindGroupLayout,
    pub instances: wgpu::BindGroupLayout,
}

impl BindGroupLayouts {
    pub fn new(device: &wgpu::Device) -> Self {
        let shared = wgpu::ShaderStages::COMPUTE | wgpu::ShaderStages::VERTEX;

        let camera = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Camera BGL"),
            entries: &[uniform_entry(0, shared, size_of::<CameraUniform>())],
        });

        let splats = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Splats BGL"),
            entries: &[
                uniform_entry(0, shared, size_of::<SplatInfo>()),
                storage_entry(1, shared, true),
                storage_entry(2, shared, true),
                storage_entry(3, shared, true),
            ],
        });

        let draw = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Draw BGL"),
            entries: &[
                storage_entry(0, wgpu::ShaderStages::COMPUTE, false),
                storage_entry(2, wgpu::ShaderStages::COMPUTE, false),
                storage_entry(3, wgpu::ShaderStages::COMPUTE, false),
            ],
        });

        // Vertex stages may not write storage, and the command block is bound
        // as the indirect buffer while drawing.
        let instances = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Instances BGL"),
            entries: &[storage_entry(3, wgpu::ShaderStages::VERTEX, true)],
        });

        Self {
            camera,
            splats,
            draw,
            instances,
        }
    }

    pub fn order_pipeline_layout(&self, device: &wgpu::Device) -> wgpu::PipelineLayout {
        device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Order Pipeline Layout"),
            bind_group_layouts: &[&self.camera, &self.splats, &self.draw],
            push_constant_ranges: &[],
        })
    }

    pub fn splat_pipeline_layout(&self, device: &wgpu::Device) -> wgpu::PipelineLayout {
        device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Splat Pipeline Layout"),
            bind_group_layouts: &[&self.camera, &self.splats, &self.instances],
            push_constant_ranges: &[],
        })
    }
}

pub(crate) fn uniform_entry(
    binding: u32,
    visibility: wgpu::ShaderStages,
    size: usize,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: NonZeroU64::new(size as u64),
        },
        count: None,
    }
}

pub(crate) fn storage_entry(
    binding: u32,
    visibility: wgpu::ShaderStages,
    read_only: bool,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_dispatch_is_one_row() {
        assert_eq!(workgroup_grid(0, 256), (1, 1));
        assert_eq!(workgroup_grid(1, 256), (1, 1));
        assert_eq!(workgroup_grid(256, 256), (1, 1));
        assert_eq!(workgroup_grid(257, 256), (2, 1));
    }

    #[test]
    fn large_dispatch_folds_into_y() {
        let invocations = 20_000_000;
        let (x, y) = workgroup_grid(invocations, 256);
        assert_eq!(x, MAX_WORKGROUPS_PER_DIMENSION);
        assert!(y > 1);
        // Every id is covered, and the last row is not entirely idle.
        let threads = x as u64 * y as u64 * 256;
        assert!(threads >= invocations as u64);
        assert!(threads - (invocations as u64) < x as u64 * 256);
    }
}
