//! Error types for flowviz

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for flowviz operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for flowviz
#[derive(Error, Debug)]
pub enum Error {
    /// An array had the wrong rank, trailing axis, or did not match a sibling array.
    #[error("Invalid shape: {0}")]
    InvalidShape(String),

    /// Color wheel segments do not fit in the lookup table.
    #[error("Color wheel segments need {total} entries, capacity is {capacity}")]
    WheelCapacity { total: usize, capacity: usize },

    /// A flow file did not carry the expected extension.
    #[error("Expected a {expected} file, got {}", .path.display())]
    InvalidExtension { path: PathBuf, expected: &'static str },

    /// The sanity tag at the head of a .flo file was wrong.
    #[error("Invalid .flo tag {0}, expected 202021.25")]
    InvalidTag(f32),

    /// Not enough data for the declared dimensions.
    #[error("Truncated flow data: need {expected} bytes, have {actual}")]
    Truncated { expected: usize, actual: usize },

    /// A directory held no usable frames.
    #[error("No frames found in {}", .0.display())]
    EmptyCollection(PathBuf),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image encode/decode error
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A frame export worker failed or went away.
    #[error("Export error: {0}")]
    Export(String),
}

impl Error {
    /// Create an invalid shape error
    pub fn shape<S: Into<String>>(msg: S) -> Self {
        Error::InvalidShape(msg.into())
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    /// Create an export error
    pub fn export<S: Into<String>>(msg: S) -> Self {
        Error::Export(msg.into())
    }
}
