use crate::error::Result;
use crate::indirect::DrawBuffers;
use crate::quad::Quad;
use crate::shader::{self, ShaderKind};

/// Color format every splat target must use.
pub const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Bgra8UnormSrgb;

/// Back-to-front "over" compositing of non-premultiplied color.
pub const SPLAT_BLEND: wgpu::BlendState = wgpu::BlendState {
    color: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::SrcAlpha,
        dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
        operation: wgpu::BlendOperation::Add,
    },
    alpha: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
        operation: wgpu::BlendOperation::Add,
    },
};

/// Render pipeline drawing one quad per visible splat, with the instance count
/// taken from the command block the ordering pass wrote.
pub struct SplatPipeline {
    pipeline: wgpu::RenderPipeline,
}

impl SplatPipeline {
    /// Builds the pipeline from WGSL vertex and fragment sources, each with a
    /// `main` entry point. A stage that fails to compile is logged and returned
    /// as an error, and no pipeline is created.
    pub fn new(
        device: &wgpu::Device,
        vertex_src: &str,
        fragment_src: &str,
        layout: &wgpu::PipelineLayout,
    ) -> Result<Self> {
        let vertex = shader::compile(device, "Splat Vertex", vertex_src, ShaderKind::Vertex)?;
        let fragment = shader::compile(device, "Splat Fragment", fragment_src, ShaderKind::Fragment)?;

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Splat Pipeline"),
            layout: Some(layout),
            vertex: wgpu::VertexState {
                module: &vertex,
                entry_point: Some(shader::ENTRY_POINT),
                compilation_options: Default::default(),
                buffers: &[Quad::vertex_layout()],
            },
            fragment: Some(wgpu::FragmentState {
                module: &fragment,
                entry_point: Some(shader::ENTRY_POINT),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: COLOR_FORMAT,
                    blend: Some(SPLAT_BLEND),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        Ok(Self { pipeline })
    }

    /// Records the indirect draw. Bind groups 0 and 1 are the camera and splat
    /// store, group 2 comes from `draw`.
    pub fn draw(
        &self,
        pass: &mut wgpu::RenderPass<'_>,
        camera: &wgpu::BindGroup,
        splats: &wgpu::BindGroup,
        quad: &Quad,
        draw: &DrawBuffers,
    ) {
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, camera, &[]);
        pass.set_bind_group(1, splats, &[]);
        pass.set_bind_group(2, draw.instance_bind_group(), &[]);
        pass.set_vertex_buffer(0, quad.vertices.slice(..));
        pass.set_index_buffer(quad.indices.slice(..), wgpu::IndexFormat::Uint16);
        pass.draw_indexed_indirect(draw.command_buffer(), 0);
    }
}
