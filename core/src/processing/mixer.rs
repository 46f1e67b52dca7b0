use crate::params::ParamSnapshot;
use crate::prelude::{check_aligned, Frame, ProcessingStage, Sample, StageResult};

/// `signal[i] * conj(reference[i])` for two equally long slices.
pub fn conjugate_multiply(signal: &[Sample], reference: &[Sample]) -> Vec<Sample> {
    signal
        .iter()
        .zip(reference)
        .map(|(s, r)| s * r.conj())
        .collect()
}

/// Point-wise conjugate multiply of two rate-locked streams.
///
/// Used twice as a self-mixer (echo against each transmitted tone) and once
/// as the cross-channel correlator (spectrum A against spectrum B).
pub struct ConjugateMixer {
    name: &'static str,
}

impl ConjugateMixer {
    pub fn new(name: &'static str) -> Self {
        Self { name }
    }

    pub fn correlator() -> Self {
        Self::new("correlator")
    }
}

impl ProcessingStage for ConjugateMixer {
    /// `(signal, reference)`
    type Input = (Frame, Frame);
    type Output = Frame;

    fn name(&self) -> &'static str {
        self.name
    }

    fn initialize(&mut self, _params: &ParamSnapshot) -> StageResult<()> {
        Ok(())
    }

    fn execute(&mut self, (mut signal, reference): (Frame, Frame)) -> StageResult<Frame> {
        check_aligned(self.name, &signal, &reference)?;
        signal.samples = conjugate_multiply(&signal.samples, &reference.samples);
        Ok(signal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::RadarConfig;
    use crate::prelude::StageError;
    use std::sync::Arc;

    fn snapshot() -> Arc<ParamSnapshot> {
        let config = RadarConfig {
            samp_rate: 1000.0,
            packet_len: 4,
            freq: [-100.0, 100.0],
            decim_fac: 1,
            ..RadarConfig::default()
        };
        Arc::new(ParamSnapshot::new(config).unwrap())
    }

    fn frame(samples: &[Sample]) -> Frame {
        Frame::new(0, samples.to_vec(), snapshot())
    }

    #[test]
    fn swapping_channels_conjugates_output() {
        let a = [
            Sample::new(1.0, 2.0),
            Sample::new(-0.5, 0.25),
            Sample::new(3.0, -1.0),
        ];
        let b = [
            Sample::new(0.0, 1.0),
            Sample::new(2.0, 2.0),
            Sample::new(-1.0, -4.0),
        ];
        let mut correlator = ConjugateMixer::correlator();
        let ab = correlator.execute((frame(&a), frame(&b))).unwrap();
        let ba = correlator.execute((frame(&b), frame(&a))).unwrap();
        assert_eq!(ab.len(), 3);
        for (x, y) in ab.samples.iter().zip(&ba.samples) {
            assert_eq!(*x, y.conj());
        }
    }

    #[test]
    fn mixing_against_carrier_removes_it() {
        let carrier: Vec<Sample> = (0..4)
            .map(|n| Sample::from_polar(0.5, 0.7 * n as f32))
            .collect();
        let mut mixer = ConjugateMixer::new("mixer_a");
        let out = mixer
            .execute((frame(&carrier), frame(&carrier)))
            .unwrap();
        for sample in out.samples {
            assert!((sample - Sample::new(0.25, 0.0)).norm() < 1e-6);
        }
    }

    #[test]
    fn length_mismatch_is_fatal() {
        let mut mixer = ConjugateMixer::correlator();
        let short = frame(&[Sample::new(1.0, 0.0); 3]);
        let long = frame(&[Sample::new(1.0, 0.0); 4]);
        let err = mixer.execute((short, long)).unwrap_err();
        assert!(matches!(err, StageError::Protocol(_)));
    }
}
