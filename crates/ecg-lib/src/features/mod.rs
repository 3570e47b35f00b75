//! Reduction of a two-lead waveform to a fixed-order numeric feature vector.
//!
//! Layout per channel (channel 1 first, then channel 2):
//!
//! | idx | feature                         |
//! |-----|---------------------------------|
//! | 0   | mean                            |
//! | 1   | standard deviation (population) |
//! | 2   | median                          |
//! | 3   | 25th percentile                 |
//! | 4   | 75th percentile                 |
//! | 5   | max                             |
//! | 6   | min                             |
//! | 7   | peak-to-peak                    |
//! | 8   | mean \|first difference\|       |
//! | 9   | std of first difference         |
//! | 10  | power in bins `[0, n/4)`        |
//! | 11  | power in bins `[n/4, n/2)`      |
//!
//! Persisted models are keyed to these positions; never reorder them.

pub mod spectral;
pub mod stats;

use crate::signal::Waveform;

pub type FeatureVector = Vec<f64>;

pub const FEATURES_PER_CHANNEL: usize = 12;
pub const FEATURE_LEN: usize = 2 * FEATURES_PER_CHANNEL;

/// Whole-waveform feature vector of length [`FEATURE_LEN`].
pub fn extract_features(waveform: &Waveform) -> FeatureVector {
    let mut features = Vec::with_capacity(FEATURE_LEN);
    for channel in waveform.channels() {
        features.extend_from_slice(&channel_features(channel));
    }
    features
}

/// One feature vector per non-overlapping window of `window_size` samples.
///
/// The trailing partial window is dropped. A waveform shorter than one window
/// (or a zero window size) yields the single whole-waveform vector.
pub fn extract_window_features(waveform: &Waveform, window_size: usize) -> Vec<FeatureVector> {
    let num_windows = if window_size == 0 {
        0
    } else {
        waveform.len() / window_size
    };
    if num_windows == 0 {
        return vec![extract_features(waveform)];
    }
    (0..num_windows)
        .map(|i| {
            let start = i * window_size;
            extract_features(&waveform.slice(start, start + window_size))
        })
        .collect()
}

fn channel_features(channel: &[f64]) -> [f64; FEATURES_PER_CHANNEL] {
    let sorted = stats::sorted(channel);
    let max = stats::max(channel);
    let min = stats::min(channel);
    // a single sample has no differences; both statistics read as 0
    let diff = stats::diff(channel);
    let [low_band, mid_band] = spectral::band_energies(channel);
    [
        stats::mean(channel),
        stats::std_dev(channel),
        stats::percentile_sorted(&sorted, 50.0),
        stats::percentile_sorted(&sorted, 25.0),
        stats::percentile_sorted(&sorted, 75.0),
        max,
        min,
        max - min,
        stats::mean_abs(&diff),
        stats::std_dev(&diff),
        low_band,
        mid_band,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_waveform(n: usize) -> Waveform {
        let ch1: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let ch2: Vec<f64> = (0..n).map(|i| -(i as f64) * 2.0).collect();
        Waveform::new(ch1, ch2, 200).unwrap()
    }

    #[test]
    fn length_is_fixed() {
        for n in [2, 3, 17, 200, 1001] {
            assert_eq!(extract_features(&ramp_waveform(n)).len(), FEATURE_LEN);
        }
    }

    #[test]
    fn extraction_is_deterministic() {
        let w = ramp_waveform(333);
        let a = extract_features(&w);
        let b = extract_features(&w);
        let bits_a: Vec<u64> = a.iter().map(|v| v.to_bits()).collect();
        let bits_b: Vec<u64> = b.iter().map(|v| v.to_bits()).collect();
        assert_eq!(bits_a, bits_b);
    }

    #[test]
    fn summary_statistics_follow_layout() {
        let w = Waveform::new(vec![1.0, 2.0, 3.0, 4.0], vec![0.0, 0.0, 0.0, 8.0], 200).unwrap();
        let f = extract_features(&w);
        // channel 1
        assert!((f[0] - 2.5).abs() < 1e-12);
        assert!((f[1] - 1.25f64.sqrt()).abs() < 1e-12);
        assert!((f[2] - 2.5).abs() < 1e-12);
        assert!((f[3] - 1.75).abs() < 1e-12);
        assert!((f[4] - 3.25).abs() < 1e-12);
        assert_eq!(f[5], 4.0);
        assert_eq!(f[6], 1.0);
        assert_eq!(f[7], 3.0);
        assert!((f[8] - 1.0).abs() < 1e-12);
        assert!(f[9].abs() < 1e-12);
        // n = 4: low band is the DC bin only, (1+2+3+4)^2
        assert!((f[10] - 100.0).abs() < 1e-9);
        // second quarter is bin 1: |-2 + 2i|^2
        assert!((f[11] - 8.0).abs() < 1e-9);
        // channel 2 starts at FEATURES_PER_CHANNEL
        assert!((f[FEATURES_PER_CHANNEL] - 2.0).abs() < 1e-12);
        assert_eq!(f[FEATURES_PER_CHANNEL + 5], 8.0);
        assert_eq!(f[FEATURES_PER_CHANNEL + 7], 8.0);
    }

    #[test]
    fn single_sample_difference_stats_are_zero() {
        let w = Waveform::new(vec![5.0], vec![-1.0], 200).unwrap();
        let f = extract_features(&w);
        assert_eq!(f.len(), FEATURE_LEN);
        assert_eq!(f[8], 0.0);
        assert_eq!(f[9], 0.0);
        assert!(f.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn windowed_drops_partial_tail() {
        let w = ramp_waveform(450);
        let rows = extract_window_features(&w, 200);
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.len() == FEATURE_LEN));
        // second window of the ramp starts at 200
        assert_eq!(rows[1][6], 200.0);
    }

    #[test]
    fn windowed_short_waveform_falls_back_to_whole() {
        let w = ramp_waveform(150);
        let rows = extract_window_features(&w, 200);
        assert_eq!(rows, vec![extract_features(&w)]);
    }
}
