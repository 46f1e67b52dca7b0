use num_complex::Complex32;

pub struct StatsHelper;

impl StatsHelper {
    pub fn rms(samples: &[Complex32]) -> f32 {
        if samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f32 = samples.iter().map(|v| v.norm_sqr()).sum();
        (sum_sq / samples.len() as f32).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rms_zero_sequence_yields_zero() {
        assert_eq!(StatsHelper::rms(&[]), 0.0);
        assert_eq!(StatsHelper::rms(&[Complex32::new(0.0, 0.0); 2]), 0.0);
    }

    #[test]
    fn rms_of_unit_phasors_is_one() {
        let samples = [Complex32::new(0.0, 1.0), Complex32::new(-1.0, 0.0)];
        assert!((StatsHelper::rms(&samples) - 1.0).abs() < 1e-6);
    }
}
