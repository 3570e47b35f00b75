use crate::{features::stats, signal::Waveform};
use log::debug;
use serde::{Deserialize, Serialize};

/// Windowed amplitude/variability onset detector.
///
/// The combined (channel-averaged) signal is cut into non-overlapping windows;
/// the median window std and median window mean |amplitude| form the baseline,
/// and the first window exceeding `threshold_factor` times either baseline
/// marks the onset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OnsetDetector {
    /// Samples per analysis window.
    pub window_size: usize,
    /// Multiple of the baseline a window must exceed to count as anomalous.
    pub threshold_factor: f64,
}

impl Default for OnsetDetector {
    fn default() -> Self {
        Self {
            window_size: 200,
            threshold_factor: 2.0,
        }
    }
}

/// Estimated onset of the event within a waveform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub sample_index: usize,
    pub time_offset_seconds: f64,
}

/// Per-window statistics used by the detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowProfile {
    pub std: f64,
    pub mean_amplitude: f64,
}

impl OnsetDetector {
    pub fn new(window_size: usize, threshold_factor: f64) -> Self {
        Self {
            window_size,
            threshold_factor,
        }
    }

    pub fn detect(&self, waveform: &Waveform) -> DetectionResult {
        let combined = waveform.combined().data;
        let len = combined.len();
        let fs = waveform.sampling_rate() as f64;

        let profiles = self.window_profiles(&combined);
        if profiles.len() < 2 {
            // Not enough windows to establish a baseline.
            return result(len / 2, len, fs);
        }

        let stds: Vec<f64> = profiles.iter().map(|p| p.std).collect();
        let means: Vec<f64> = profiles.iter().map(|p| p.mean_amplitude).collect();
        let threshold_std = stats::median(&stds) * self.threshold_factor;
        let threshold_mean = stats::median(&means) * self.threshold_factor;

        let first_anomaly = profiles.iter().position(|p| {
            let score = (p.std > threshold_std) as u8 + (p.mean_amplitude > threshold_mean) as u8;
            score > 0
        });

        let sample_index = match first_anomaly {
            Some(window) => {
                debug!(
                    "first anomalous window {} of {} (std threshold {:.4}, mean threshold {:.4})",
                    window,
                    profiles.len(),
                    threshold_std,
                    threshold_mean
                );
                window * self.window_size
            }
            None => {
                let mid_window = profiles.len() / 2;
                debug!("no anomalous window; using midpoint of window {}", mid_window);
                mid_window * self.window_size + self.window_size / 2
            }
        };
        result(sample_index, len, fs)
    }

    /// Std and mean |amplitude| for every full window; empty for a zero window size.
    pub fn window_profiles(&self, combined: &[f64]) -> Vec<WindowProfile> {
        if self.window_size == 0 {
            return Vec::new();
        }
        combined
            .chunks_exact(self.window_size)
            .map(|window| WindowProfile {
                std: stats::std_dev(window),
                mean_amplitude: stats::mean_abs(window),
            })
            .collect()
    }
}

/// Detect with the default window size and threshold.
pub fn detect_onset(waveform: &Waveform) -> DetectionResult {
    OnsetDetector::default().detect(waveform)
}

fn result(sample_index: usize, len: usize, fs: f64) -> DetectionResult {
    let sample_index = sample_index.min(len.saturating_sub(1));
    DetectionResult {
        sample_index,
        time_offset_seconds: sample_index as f64 / fs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alternating(n: usize, amplitude: f64) -> impl Iterator<Item = f64> {
        (0..n).map(move |i| if i % 2 == 0 { amplitude } else { -amplitude })
    }

    fn waveform(samples: Vec<f64>) -> Waveform {
        Waveform::new(samples.clone(), samples, 200).unwrap()
    }

    #[test]
    fn flags_burst_in_last_window() {
        let samples: Vec<f64> = alternating(400, 0.01).chain(alternating(200, 5.0)).collect();
        let result = detect_onset(&waveform(samples));
        assert_eq!(result.sample_index, 400);
        assert!((result.time_offset_seconds - 2.0).abs() < 1e-12);
    }

    #[test]
    fn earliest_anomalous_window_wins() {
        let samples: Vec<f64> = alternating(400, 0.01)
            .chain(alternating(200, 3.0))
            .chain(alternating(400, 0.01))
            .chain(alternating(200, 9.0))
            .collect();
        let result = detect_onset(&waveform(samples));
        assert_eq!(result.sample_index, 400);
    }

    #[test]
    fn single_window_returns_midpoint() {
        let samples: Vec<f64> = alternating(200, 1.0).collect();
        let result = detect_onset(&waveform(samples));
        assert_eq!(result.sample_index, 100);
        assert!((result.time_offset_seconds - 0.5).abs() < 1e-12);
    }

    #[test]
    fn flat_signal_returns_middle_window_midpoint() {
        let result = detect_onset(&waveform(vec![0.7; 1000]));
        // five windows: middle is window 2
        assert_eq!(result.sample_index, 2 * 200 + 100);
        let result = detect_onset(&waveform(vec![0.0; 600]));
        assert_eq!(result.sample_index, 300);
    }

    #[test]
    fn channels_are_averaged_before_windowing() {
        // opposite-sign bursts cancel in the combined signal
        let burst: Vec<f64> = alternating(400, 0.01).chain(alternating(200, 5.0)).collect();
        let negated: Vec<f64> = burst.iter().map(|v| -v).collect();
        let w = Waveform::new(burst, negated, 200).unwrap();
        assert_eq!(detect_onset(&w).sample_index, 300);
    }

    #[test]
    fn index_never_exceeds_length() {
        let detector = OnsetDetector::new(200, 2.0);
        for n in [1, 2, 199, 200, 201, 399, 400, 401, 1234] {
            let samples: Vec<f64> = (0..n).map(|i| ((i * 7919) % 13) as f64).collect();
            let result = detector.detect(&waveform(samples));
            assert!(result.sample_index < n, "n={} got {}", n, result.sample_index);
        }
    }

    #[test]
    fn zero_window_size_falls_back_to_midpoint() {
        let detector = OnsetDetector::new(0, 2.0);
        let result = detector.detect(&waveform(vec![1.0; 10]));
        assert_eq!(result.sample_index, 5);
    }

    #[test]
    fn threshold_factor_controls_sensitivity() {
        let samples: Vec<f64> = alternating(400, 1.0).chain(alternating(200, 3.0)).collect();
        let w = waveform(samples);
        assert_eq!(OnsetDetector::new(200, 2.0).detect(&w).sample_index, 400);
        // 3.0 is not strictly greater than 3 * 1.0
        assert_eq!(OnsetDetector::new(200, 3.0).detect(&w).sample_index, 300);
    }
}
