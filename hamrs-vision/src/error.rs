use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while turning an image into a feature vector.
#[derive(Debug, Error)]
pub enum VisionError {
    #[error("image not found: {}", .0.display())]
    ImageNotFound(PathBuf),

    #[error("could not decode image {origin}: {source}")]
    ImageDecode {
        origin: String,
        source: image::ImageError,
    },

    #[error("reading image {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid target size {width}x{height}")]
    InvalidSize { width: u32, height: u32 },

    #[error("feature vector is not binary: component {index} is {value}")]
    NotBinary { index: usize, value: f32 },

    #[error("saving stage image {}: {source}", path.display())]
    SaveStage {
        path: PathBuf,
        source: image::ImageError,
    },
}

pub type Result<T> = std::result::Result<T, VisionError>;
