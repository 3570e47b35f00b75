use crate::{
    classifier::Classifier,
    detectors::OnsetDetector,
    error::EcgResult,
    features::extract_features,
    signal::Waveform,
};
use serde::{Deserialize, Serialize};

/// Classification and onset estimate for one recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub predicted_label: String,
    /// Highest class probability.
    pub confidence: f64,
    pub onset_sample_index: usize,
    pub onset_time_offset_seconds: f64,
}

/// Validate raw channels, then classify the recording and locate its onset.
pub fn analyze(
    channel1: Vec<f64>,
    channel2: Vec<f64>,
    sampling_rate: u32,
    classifier: &dyn Classifier,
    detector: &OnsetDetector,
) -> EcgResult<Analysis> {
    let waveform = Waveform::new(channel1, channel2, sampling_rate)?;
    analyze_waveform(&waveform, classifier, detector)
}

pub fn analyze_waveform(
    waveform: &Waveform,
    classifier: &dyn Classifier,
    detector: &OnsetDetector,
) -> EcgResult<Analysis> {
    let features = extract_features(waveform);
    let predicted_label = classifier.predict_one(&features)?;
    let probabilities = classifier.predict_proba_one(&features)?;
    let confidence = probabilities.iter().copied().fold(0.0, f64::max);
    let onset = detector.detect(waveform);
    Ok(Analysis {
        predicted_label,
        confidence,
        onset_sample_index: onset.sample_index,
        onset_time_offset_seconds: onset.time_offset_seconds,
    })
}
