//! Error types for the motion detection engine.

use thiserror::Error;

/// Result type alias used across the crate.
pub type Result<T> = std::result::Result<T, VisionError>;

/// Everything that can go wrong inside the core. I/O, decoding and display
/// failures belong to the frame source and the sink, not here.
#[derive(Error, Debug)]
pub enum VisionError {
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Frame dimensions changed: expected {expected:?}, got {actual:?}")]
    DimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("Configuration error: {0}")]
    InvalidConfig(String),

    #[error("Failed to spawn pipeline thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Pipeline thread panicked: {0}")]
    ThreadPanicked(String),

    #[error("Image conversion failed: {0}")]
    ImageConversion(String),
}

impl VisionError {
    pub fn invalid_frame<S: Into<String>>(msg: S) -> Self {
        Self::InvalidFrame(msg.into())
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }
}
