use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{OrderError, Result};

/// Number of splats handled by one task group. Fixed by the ordering shader.
pub const WORKGROUP_SIZE: u32 = 256;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderConfig {
    /// Minimum eigen-radius of the projected 2D covariance. Splats with a smaller
    /// radius along either axis are dropped as sub-pixel.
    pub size_threshold: f32,

    /// Task group width. Only 256 is supported, this exists so a config file
    /// written against another value fails loudly.
    pub workgroup_size: u32,
}

impl Default for OrderConfig {
    fn default() -> Self {
        Self {
            size_threshold: 1e-4,
            workgroup_size: WORKGROUP_SIZE,
        }
    }
}

impl OrderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_size_threshold(mut self, size_threshold: f32) -> Self {
        self.size_threshold = size_threshold;
        self
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.workgroup_size != WORKGROUP_SIZE {
            return Err(OrderError::InvalidConfig(format!(
                "workgroup_size must be {WORKGROUP_SIZE}, got {}",
                self.workgroup_size
            )));
        }
        if !(self.size_threshold.is_finite() && self.size_threshold >= 0.0) {
            return Err(OrderError::InvalidConfig(format!(
                "size_threshold must be a non-negative number, got {}",
                self.size_threshold
            )));
        }
        Ok(())
    }
}
