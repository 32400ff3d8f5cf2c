use std::num::NonZeroU64;

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::error::Result;
use crate::indirect::DrawBuffers;
use crate::layout::{storage_entry, workgroup_grid};
use crate::shader::{self, SORT_SOURCE, ShaderKind};

const SORT_WORKGROUP_SIZE: u32 = 256;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
struct SortParams {
    merge_size: u32,
    stride: u32,
    _pad: [u32; 2],
}

/// `(merge_size, stride)` for every compare-exchange step of a bitonic sort over
/// `len` elements, in execution order. `len` must be a power of two.
pub fn bitonic_steps(len: u32) -> Vec<(u32, u32)> {
    let mut steps = Vec::new();
    let mut merge_size = 2;
    while merge_size <= len {
        let mut stride = merge_size / 2;
        while stride > 0 {
            steps.push((merge_size, stride));
            stride /= 2;
        }
        merge_size *= 2;
    }
    steps
}

/// Length of the prefix the sort works on for `count` visible instances: the
/// next power of two, or `count` itself below two. Mirrors `sorted_len` in
/// `sort.wgsl`.
pub fn sorted_len(count: u32) -> u32 {
    if count <= 1 { count } else { count.next_power_of_two() }
}

/// Bitonic key/value sort of one frame's key and index arrays, ascending by
/// key. The shader reads `instance_count` from the frame's draw command and
/// only touches the prefix of [`sorted_len`] slots, so culled splats cost
/// nothing but an early return. Slots past the visible count hold the
/// sentinel key and end up behind every valid one.
///
/// All step parameters live in one uniform buffer and are selected with a
/// dynamic offset, so the whole sort records into a single compute pass.
pub struct Sorter {
    pipeline: wgpu::ComputePipeline,
    layout: wgpu::BindGroupLayout,
    params: wgpu::Buffer,
    params_stride: u32,
    steps: u32,
    capacity: u32,
}

impl Sorter {
    pub fn new(device: &wgpu::Device, capacity: u32) -> Result<Self> {
        let shader = shader::compile(device, "Sort Shader", SORT_SOURCE, ShaderKind::Compute)?;

        let param_size = NonZeroU64::new(size_of::<SortParams>() as u64);
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Sort BGL"),
            entries: &[
                storage_entry(0, wgpu::ShaderStages::COMPUTE, false),
                storage_entry(1, wgpu::ShaderStages::COMPUTE, false),
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: true,
                        min_binding_size: param_size,
                    },
                    count: None,
                },
                storage_entry(3, wgpu::ShaderStages::COMPUTE, true),
            ],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Sort Pipeline"),
            layout: Some(&device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Sort Layout"),
                bind_group_layouts: &[&layout],
                push_constant_ranges: &[],
            })),
            module: &shader,
            entry_point: Some(shader::ENTRY_POINT),
            compilation_options: Default::default(),
            cache: None,
        });

        let params_stride = device
            .limits()
            .min_uniform_buffer_offset_alignment
            .max(size_of::<SortParams>() as u32);
        let steps = bitonic_steps(capacity);
        // A capacity of one needs no steps, keep the buffer bindable anyway.
        let mut contents = vec![0u8; params_stride as usize * steps.len().max(1)];
        for (i, &(merge_size, stride)) in steps.iter().enumerate() {
            let offset = i * params_stride as usize;
            let params = SortParams {
                merge_size,
                stride,
                _pad: [0; 2],
            };
            contents[offset..offset + size_of::<SortParams>()]
                .copy_from_slice(bytemuck::bytes_of(&params));
        }
        let params = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Sort Params"),
            contents: &contents,
            usage: wgpu::BufferUsages::UNIFORM,
        });

        Ok(Self {
            pipeline,
            layout,
            params,
            params_stride,
            steps: steps.len() as u32,
            capacity,
        })
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn bind(&self, device: &wgpu::Device, buffers: &DrawBuffers) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Sort BG"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: buffers.keys().as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: buffers.indices().as_entire_binding() },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: &self.params,
                        offset: 0,
                        size: NonZeroU64::new(size_of::<SortParams>() as u64),
                    }),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: buffers.command_buffer().as_entire_binding(),
                },
            ],
        })
    }

    pub fn encode(&self, encoder: &mut wgpu::CommandEncoder, bind_group: &wgpu::BindGroup) {
        if self.steps == 0 {
            return;
        }
        let (x, y) = workgroup_grid(self.capacity, SORT_WORKGROUP_SIZE);

        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Bitonic Sort"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.pipeline);
        for step in 0..self.steps {
            pass.set_bind_group(0, bind_group, &[step * self.params_stride]);
            pass.dispatch_workgroups(x, y, 1);
        }
    }
}
