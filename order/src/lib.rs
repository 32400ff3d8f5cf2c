//! Visibility culling and depth ordering for Gaussian splats.
//!
//! Host-side data model shared with the GPU pass in the `render` crate, plus a
//! rayon implementation of the same pass that follows the GPU contract: one task
//! per splat, an atomic bump allocator for output slots, and an instance counter
//! that is also the indirect draw's instance count.

mod error;

pub mod camera;
pub mod config;
pub mod indirect;
pub mod pass;
pub mod project;
pub mod splat;

pub use camera::{Camera, CameraUniform};
pub use config::{OrderConfig, WORKGROUP_SIZE};
pub use error::OrderError;
pub use indirect::{DrawIndirectCommand, IndirectDrawBuffers, VisibleInstance};
pub use pass::{OrderPass, OrderStats};
pub use project::{Projector, Visibility, classify, sort_key};
pub use splat::{Splat, SplatStore, SymMat3};
