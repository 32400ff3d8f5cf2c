use thiserror::Error;

use crate::shader::ShaderKind;

pub(crate) type Result<T> = std::result::Result<T, RenderError>;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("No suitable adapter: {0}")]
    NoAdapter(#[from] wgpu::RequestAdapterError),

    #[error("Failed to request device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),

    #[error("{kind} shader failed to compile:\n{diagnostic}")]
    Compilation { kind: ShaderKind, diagnostic: String },

    #[error("{kind} shader has no `main` entry point")]
    MissingEntryPoint { kind: ShaderKind },

    #[error("Device poll failed: {0}")]
    Poll(#[from] wgpu::PollError),

    #[error("Buffer map failed: {0}")]
    BufferMap(#[from] wgpu::BufferAsyncError),

    #[error(transparent)]
    Order(#[from] order::OrderError),

    #[error("No splats uploaded")]
    EmptyScene,

    #[error("Scene has {0} splats, more than a u32 index can address")]
    TooManySplats(usize),

    #[error("{name} needs {size} bytes, the device allows {limit}")]
    BufferTooLarge { name: &'static str, size: u64, limit: u64 },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Failed to parse config: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
}
