use std::time::Duration;
use thiserror::Error;

/// Failures that reach the caller instead of degrading to a low-confidence
/// result. Everything inside the pipeline itself degrades; only input that
/// cannot be turned into pixels ends up here.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Image load timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid data URL: {0}")]
    InvalidDataUrl(String),

    #[error("RGBA buffer holds {actual} bytes, expected {expected} for {width}x{height}")]
    InvalidBuffer {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("Template load cancelled: {0}")]
    Cancelled(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
