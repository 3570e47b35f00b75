pub mod onset;

pub use onset::{detect_onset, DetectionResult, OnsetDetector, WindowProfile};
