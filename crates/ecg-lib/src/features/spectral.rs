use realfft::RealFftPlanner;

/// Power summed over the lowest quarter of DFT bins (`[0, n/4)`) and over the
/// next quarter (`[n/4, n/2)`), with power = squared magnitude.
///
/// Only bins below `n/2` are needed, so the real-input transform (which
/// yields bins `0..=n/2`) covers both bands.
pub fn band_energies(data: &[f64]) -> [f64; 2] {
    let n = data.len();
    let quarter = n / 4;
    let half = n / 2;
    if half == 0 {
        return [0.0, 0.0];
    }
    let mut planner = RealFftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(n);
    let mut buffer = data.to_vec();
    let mut spectrum = fft.make_output_vec();
    fft.process(&mut buffer, &mut spectrum)
        .expect("buffers sized by the planner");
    let low = spectrum[..quarter].iter().map(|c| c.norm_sqr()).sum();
    let mid = spectrum[quarter..half].iter().map(|c| c.norm_sqr()).sum();
    [low, mid]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dc_signal_lands_in_low_band() {
        // DC bin of a constant signal holds (n * c)^2, every other bin is zero.
        let data = vec![2.0; 16];
        let [low, mid] = band_energies(&data);
        assert!((low - 1024.0).abs() < 1e-6);
        assert!(mid.abs() < 1e-6);
    }

    #[test]
    fn tone_in_second_quarter() {
        use std::f64::consts::PI;
        let n = 64;
        // bin 20 lies in [16, 32)
        let data: Vec<f64> = (0..n)
            .map(|i| (2.0 * PI * 20.0 * i as f64 / n as f64).cos())
            .collect();
        let [low, mid] = band_energies(&data);
        assert!(low < 1e-6);
        assert!((mid - (n as f64 / 2.0).powi(2)).abs() < 1e-6);
    }

    #[test]
    fn tiny_inputs_have_no_bands() {
        assert_eq!(band_energies(&[3.0]), [0.0, 0.0]);
        // n = 3: empty low band, the mid band is just the DC bin.
        let [low, mid] = band_energies(&[1.0, 2.0, 3.0]);
        assert_eq!(low, 0.0);
        assert!((mid - 36.0).abs() < 1e-9);
    }
}
