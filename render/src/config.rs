use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{RenderError, Result};
use crate::frame::FRAMES_IN_FLIGHT;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Linear rgba the target is cleared to before splats are composited.
    pub clear_color: [f64; 4],

    pub frames_in_flight: usize,

    /// Run the back-to-front sort between the ordering pass and the draw.
    /// Without it splats blend in the pass's arbitrary slot order.
    pub sort: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            clear_color: [0.0, 0.0, 0.0, 1.0],
            frames_in_flight: FRAMES_IN_FLIGHT,
            sort: true,
        }
    }
}

impl RenderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clear_color(mut self, clear_color: [f64; 4]) -> Self {
        self.clear_color = clear_color;
        self
    }

    pub fn with_frames_in_flight(mut self, frames_in_flight: usize) -> Self {
        self.frames_in_flight = frames_in_flight;
        self
    }

    pub fn with_sort(mut self, sort: bool) -> Self {
        self.sort = sort;
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
        if self.frames_in_flight == 0 {
            return Err(RenderError::InvalidConfig(
                "frames_in_flight must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub(crate) fn clear_color(&self) -> wgpu::Color {
        let [r, g, b, a] = self.clear_color;
        wgpu::Color { r, g, b, a }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_two_sorted_frames() {
        let config = RenderConfig::from_json("{}").unwrap();
        assert_eq!(config.frames_in_flight, 2);
        assert!(config.sort);
    }

    #[test]
    fn partial_override() {
        let config = RenderConfig::from_json(r#"{ "sort": false, "clear_color": [1, 1, 1, 1] }"#).unwrap();
        assert!(!config.sort);
        assert_eq!(config.clear_color, [1.0; 4]);
        assert_eq!(config.frames_in_flight, FRAMES_IN_FLIGHT);
    }

    #[test]
    fn rejects_zero_frames() {
        assert!(RenderConfig::new().with_frames_in_flight(0).validate().is_err());
    }
}
