use crate::error::{EcgError, EcgResult};
use serde::{Deserialize, Serialize};

/// Basic typed time series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSeries {
    /// Uniform sampling frequency in Hz
    pub fs: f64,
    /// Samples
    pub data: Vec<f64>,
}

impl TimeSeries {
    pub fn len(&self) -> usize {
        self.data.len()
    }
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
    pub fn duration(&self) -> f64 {
        self.data.len() as f64 / self.fs
    }
}

/// Two-lead ECG recording sampled at a fixed rate.
///
/// Both channels always have the same, non-zero length. The struct has no
/// mutating API; build a new one to change samples.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Waveform {
    channel1: Vec<f64>,
    channel2: Vec<f64>,
    sampling_rate: u32,
}

impl Waveform {
    pub fn new(channel1: Vec<f64>, channel2: Vec<f64>, sampling_rate: u32) -> EcgResult<Self> {
        if channel1.len() != channel2.len() {
            return Err(EcgError::InvalidWaveform(format!(
                "channel lengths differ ({} vs {})",
                channel1.len(),
                channel2.len()
            )));
        }
        if channel1.is_empty() {
            return Err(EcgError::InvalidWaveform("channels are empty".into()));
        }
        if sampling_rate == 0 {
            return Err(EcgError::InvalidWaveform(
                "sampling rate must be positive".into(),
            ));
        }
        for (name, channel) in [("channel 1", &channel1), ("channel 2", &channel2)] {
            if let Some(idx) = channel.iter().position(|v| !v.is_finite()) {
                return Err(EcgError::InvalidWaveform(format!(
                    "{} sample {} is not finite ({})",
                    name, idx, channel[idx]
                )));
            }
        }
        Ok(Self {
            channel1,
            channel2,
            sampling_rate,
        })
    }

    pub fn channel1(&self) -> &[f64] {
        &self.channel1
    }

    pub fn channel2(&self) -> &[f64] {
        &self.channel2
    }

    pub fn channels(&self) -> [&[f64]; 2] {
        [&self.channel1, &self.channel2]
    }

    pub fn sampling_rate(&self) -> u32 {
        self.sampling_rate
    }

    /// Samples per channel.
    pub fn len(&self) -> usize {
        self.channel1.len()
    }

    /// Always false for a constructed waveform; provided for API symmetry.
    pub fn is_empty(&self) -> bool {
        self.channel1.is_empty()
    }

    pub fn duration(&self) -> f64 {
        self.len() as f64 / self.sampling_rate as f64
    }

    /// Copy of the samples in `start..end` as a new waveform.
    ///
    /// Callers pass a non-empty in-bounds range.
    pub fn slice(&self, start: usize, end: usize) -> Waveform {
        Waveform {
            channel1: self.channel1[start..end].to_vec(),
            channel2: self.channel2[start..end].to_vec(),
            sampling_rate: self.sampling_rate,
        }
    }

    /// Element-wise mean of both channels.
    pub fn combined(&self) -> TimeSeries {
        let data = self
            .channel1
            .iter()
            .zip(&self.channel2)
            .map(|(a, b)| (a + b) / 2.0)
            .collect();
        TimeSeries {
            fs: self.sampling_rate as f64,
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unequal_channels() {
        let err = Waveform::new(vec![0.0; 3], vec![0.0; 2], 200).unwrap_err();
        assert!(matches!(err, EcgError::InvalidWaveform(_)));
    }

    #[test]
    fn rejects_empty_channels() {
        let err = Waveform::new(Vec::new(), Vec::new(), 200).unwrap_err();
        assert!(matches!(err, EcgError::InvalidWaveform(_)));
    }

    #[test]
    fn rejects_zero_sampling_rate() {
        assert!(Waveform::new(vec![1.0], vec![1.0], 0).is_err());
    }

    #[test]
    fn rejects_non_finite_samples() {
        let err = Waveform::new(vec![f64::NAN, 1.0, 2.0], vec![0.0, 0.0, 1.0], 200).unwrap_err();
        assert!(matches!(err, EcgError::InvalidWaveform(_)));
        let err = Waveform::new(vec![0.0, 1.0], vec![0.0, f64::INFINITY], 200).unwrap_err();
        assert!(err.to_string().contains("channel 2 sample 1"));
        assert!(Waveform::new(vec![f64::NEG_INFINITY], vec![0.0], 200).is_err());
    }

    #[test]
    fn combined_is_channel_average() {
        let w = Waveform::new(vec![1.0, 3.0], vec![3.0, -1.0], 100).unwrap();
        let combined = w.combined();
        assert_eq!(combined.data, vec![2.0, 1.0]);
        assert_eq!(combined.fs, 100.0);
        assert!((w.duration() - 0.02).abs() < 1e-12);
    }
}
