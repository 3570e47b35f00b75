pub mod classifier;
pub mod config;
pub mod detectors;
pub mod error;
pub mod features;
pub mod io;
pub mod pipeline;
pub mod plot;
pub mod signal;
pub mod trainer;

pub use classifier::{Classifier, EcgClassifier};
pub use detectors::*;
pub use error::{EcgError, EcgResult};
pub use features::{extract_features, extract_window_features, FeatureVector, FEATURE_LEN};
pub use pipeline::{analyze, Analysis};
pub use signal::*;
