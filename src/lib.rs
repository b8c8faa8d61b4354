pub mod classifier;
pub mod config;
pub mod error;
pub mod evaluate;
pub mod gallery;
pub mod store;

pub use classifier::{
    ClassificationResult, Classifier, DistanceMode, Nearest, Prediction, UNKNOWN_LABEL,
};
pub use error::ClassifyError;
pub use gallery::{Gallery, GalleryEntry};

// Re-export vision types for convenience
pub use hamrs_vision::{vectorize, FeatureVector, Stages, VisionError, Vectorizer};
