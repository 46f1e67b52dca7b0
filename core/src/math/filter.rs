use crate::math::window;
use std::f64::consts::PI;

/// Windowed-sinc lowpass with unity DC gain.
///
/// `cutoff` is relative to Nyquist, so `1.0 / factor` places the edge at the
/// output Nyquist of a decimate-by-`factor` stage.
pub fn design_lowpass(num_taps: usize, cutoff: f64) -> Vec<f32> {
    let num_taps = num_taps.max(1);
    let center = (num_taps - 1) as f64 / 2.0;
    let weights = window::hamming(num_taps);

    let taps: Vec<f64> = weights
        .iter()
        .enumerate()
        .map(|(i, weight)| {
            let x = i as f64 - center;
            let sinc = if x.abs() < 1e-10 {
                cutoff
            } else {
                (PI * cutoff * x).sin() / (PI * x)
            };
            sinc * weight
        })
        .collect();

    let sum: f64 = taps.iter().sum();
    taps.iter().map(|&tap| (tap / sum) as f32).collect()
}

/// Anti-alias taps used for an integer decimation factor.
pub fn decimation_taps(factor: usize) -> Vec<f32> {
    let factor = factor.max(1);
    design_lowpass(8 * factor + 1, 1.0 / factor as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowpass_has_unity_dc_gain() {
        let taps = design_lowpass(33, 0.25);
        let sum: f32 = taps.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
    }

    #[test]
    fn unit_factor_is_identity() {
        let taps = decimation_taps(1);
        assert_eq!(taps.len(), 9);
        assert!((taps[4] - 1.0).abs() < 1e-6);
        for (i, tap) in taps.iter().enumerate() {
            if i != 4 {
                assert!(tap.abs() < 1e-6);
            }
        }
    }
}
