//! WGSL sources and their validation.
//!
//! Every source is parsed and validated with naga before a module is created on
//! the device, so a broken shader surfaces as [`RenderError::Compilation`] with
//! the rendered diagnostic instead of a device validation panic.

use std::borrow::Cow;
use std::fmt;

use naga::valid::{Capabilities, ValidationFlags, Validator};

use crate::error::{RenderError, Result};

/// Name every stage's entry point must have.
pub const ENTRY_POINT: &str = "main";

/// Visibility & ordering pass. Also holds the `reset` entry.
pub const ORDER_SOURCE: &str = concat!(
    include_str!("shaders/splat_common.wgsl"),
    include_str!("shaders/order.wgsl")
);

pub const SORT_SOURCE: &str = include_str!("shaders/sort.wgsl");

pub const SPLAT_VERTEX_SOURCE: &str = concat!(
    include_str!("shaders/splat_common.wgsl"),
    include_str!("shaders/splat_vert.wgsl")
);

pub const SPLAT_FRAGMENT_SOURCE: &str = include_str!("shaders/splat_frag.wgsl");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderKind {
    Vertex,
    Fragment,
    Compute,
}

impl ShaderKind {
    pub fn stage(self) -> naga::ShaderStage {
        match self {
            ShaderKind::Vertex => naga::ShaderStage::Vertex,
            ShaderKind::Fragment => naga::ShaderStage::Fragment,
            ShaderKind::Compute => naga::ShaderStage::Compute,
        }
    }
}

impl fmt::Display for ShaderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ShaderKind::Vertex => "vertex",
            ShaderKind::Fragment => "fragment",
            ShaderKind::Compute => "compute",
        })
    }
}

/// Parses and validates `source`, and checks it has a `main` entry point of
/// the requested stage.
pub fn validate(source: &str, kind: ShaderKind) -> Result<naga::Module> {
    let module = naga::front::wgsl::parse_str(source)
        .map_err(|err| compilation_failed(kind, err.emit_to_string(source)))?;

    Validator::new(ValidationFlags::all(), Capabilities::all())
        .validate(&module)
        .map_err(|err| compilation_failed(kind, err.emit_to_string(source)))?;

    let has_entry = module
        .entry_points
        .iter()
        .any(|ep| ep.name == ENTRY_POINT && ep.stage == kind.stage());
    if !has_entry {
        tracing::error!(%kind, "shader has no `{ENTRY_POINT}` entry point");
        return Err(RenderError::MissingEntryPoint { kind });
    }

    Ok(module)
}

/// Validates `source` and creates a shader module from it.
pub fn compile(
    device: &wgpu::Device,
    label: &str,
    source: &str,
    kind: ShaderKind,
) -> Result<wgpu::ShaderModule> {
    validate(source, kind)?;
    Ok(device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(source)),
    }))
}

fn compilation_failed(kind: ShaderKind, diagnostic: String) -> RenderError {
    tracing::error!(%kind, "shader compilation failed:\n{diagnostic}");
    RenderError::Compilation { kind, diagnostic }
}
