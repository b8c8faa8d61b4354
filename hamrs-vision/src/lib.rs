pub mod error;
pub mod feature;
pub mod vectorize;

// Re-export commonly used types
pub use error::VisionError;
pub use feature::FeatureVector;
pub use vectorize::{vectorize, Stages, Vectorizer};
