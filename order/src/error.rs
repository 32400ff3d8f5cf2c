use thiserror::Error;

pub(crate) type Result<T> = std::result::Result<T, OrderError>;

#[derive(Debug, Error)]
pub enum OrderError {
    #[error("Attribute array `{name}` has {actual} floats, expected {expected}")]
    AttributeLength {
        name: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Output arrays hold {capacity} instances but the store has {point_count} splats")]
    OutputTooSmall { capacity: usize, point_count: usize },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Failed to parse config: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
}
