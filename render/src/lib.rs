//! wgpu implementation of the splat visibility & ordering pass, plus the
//! pipeline that draws its output with a single indirect draw.

mod error;

pub mod config;
pub mod context;
pub mod frame;
pub mod indirect;
pub mod layout;
pub mod order_pass;
pub mod pipeline;
pub mod quad;
pub mod shader;
pub mod sorter;
pub mod splats;
pub mod splatter;
pub mod target;

pub use config::RenderConfig;
pub use context::Context;
pub use error::RenderError;
pub use frame::{FRAMES_IN_FLIGHT, FrameResources};
pub use indirect::DrawBuffers;
pub use order_pass::OrderPass;
pub use pipeline::{COLOR_FORMAT, SplatPipeline};
pub use shader::ShaderKind;
pub use sorter::Sorter;
pub use splats::GpuSplats;
pub use splatter::Splatter;
pub use target::{OffscreenTarget, PresentTarget};
