use thiserror::Error;

/// Errors returned by the nearest-pattern classifier.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ClassifyError {
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("gallery is empty: nothing to compare against")]
    EmptyGallery,

    #[error("invalid threshold {0}: must be finite and non-negative")]
    InvalidThreshold(f32),
}
