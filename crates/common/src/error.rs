//! Error kinds shared across the detection pipeline
//!
//! Only conditions that invalidate the pipeline surface as errors; bad
//! pixels, empty windows and the like are handled locally by the stage that
//! encounters them.

use std::path::PathBuf;
use thiserror::Error;

/// Pipeline-level errors
#[derive(Debug, Error)]
pub enum DetectError {
    #[error("Missing input: {0}")]
    InputMissing(PathBuf),

    #[error("Invariant violated: {0}")]
    InvariantViolated(String),

    #[error("Renderer failure: {0}")]
    RendererFailure(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(String),
}

impl From<image::ImageError> for DetectError {
    fn from(err: image::ImageError) -> Self {
        DetectError::Image(err.to_string())
    }
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, DetectError>;
