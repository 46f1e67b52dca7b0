use crate::math::filter::decimation_taps;
use crate::params::{ConfigError, ParamSnapshot};
use crate::prelude::{Frame, ProcessingStage, RateChange, Sample, StageError, StageResult};
use crate::telemetry::log::LogManager;

/// Filters and decimates one frame by `factor`.
///
/// The filter is centred on each kept sample and the frame is zero padded at
/// both edges, so frames never borrow samples from their neighbours. The
/// output holds exactly `input.len() / factor` samples.
pub fn decimate(input: &[Sample], taps: &[f32], factor: usize) -> Vec<Sample> {
    let factor = factor.max(1);
    let half = taps.len() / 2;
    (0..input.len() / factor)
        .map(|m| {
            let center = m * factor;
            let first = center.saturating_sub(half);
            let last = (center + half).min(input.len() - 1);
            (first..=last).fold(Sample::new(0.0, 0.0), |acc, idx| {
                acc + input[idx] * taps[idx + half - center]
            })
        })
        .collect()
}

/// Anti-alias filter plus integer decimation.
///
/// The length tag passes through untouched; [`LengthScaler`] rewrites it.
pub struct Decimator {
    name: &'static str,
    factor: usize,
    taps: Vec<f32>,
    logger: LogManager,
}

impl Decimator {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            factor: 1,
            taps: decimation_taps(1),
            logger: LogManager::for_stage(name),
        }
    }

    pub fn factor(&self) -> usize {
        self.factor
    }

    fn refresh(&mut self, factor: usize) -> StageResult<()> {
        if factor == 0 {
            return Err(StageError::Config(ConfigError::InvalidDecimation(0.0)));
        }
        if factor != self.factor {
            self.factor = factor;
            self.taps = decimation_taps(factor);
            self.logger.record(&format!(
                "decimating by {} with {} taps",
                factor,
                self.taps.len()
            ));
        }
        Ok(())
    }
}

impl ProcessingStage for Decimator {
    type Input = Frame;
    type Output = Frame;

    fn name(&self) -> &'static str {
        self.name
    }

    fn rate(&self) -> RateChange {
        RateChange::decimate(self.factor)
    }

    fn initialize(&mut self, params: &ParamSnapshot) -> StageResult<()> {
        self.refresh(params.config.decim_fac)
    }

    fn execute(&mut self, frame: Frame) -> StageResult<Frame> {
        frame.check_tag(self.name)?;
        self.refresh(frame.params.config.decim_fac)?;
        let samples = decimate(&frame.samples, &self.taps, self.factor);
        debug_assert_eq!(samples.len(), self.rate().apply(frame.len()));
        Ok(Frame { samples, ..frame })
    }
}

/// Rescales the packet-length tag after a decimator.
pub struct LengthScaler {
    name: &'static str,
}

impl LengthScaler {
    pub fn new(name: &'static str) -> Self {
        Self { name }
    }
}

impl ProcessingStage for LengthScaler {
    type Input = Frame;
    type Output = Frame;

    fn name(&self) -> &'static str {
        self.name
    }

    fn initialize(&mut self, _params: &ParamSnapshot) -> StageResult<()> {
        Ok(())
    }

    fn execute(&mut self, mut frame: Frame) -> StageResult<Frame> {
        let rate = RateChange::decimate(frame.params.config.decim_fac);
        frame.len_tag = rate.apply(frame.len_tag);
        frame.check_tag(self.name)?;
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::RadarConfig;
    use std::sync::Arc;

    fn snapshot(packet_len: usize, decim_fac: usize) -> Arc<ParamSnapshot> {
        let config = RadarConfig {
            samp_rate: 1000.0,
            packet_len,
            freq: [-100.0, 100.0],
            decim_fac,
            ..RadarConfig::default()
        };
        Arc::new(ParamSnapshot::new(config).unwrap())
    }

    #[test]
    fn output_length_and_tag_follow_floor_division() {
        for factor in [1usize, 2, 3, 4, 7, 16] {
            for len in [16usize, 17, 63, 100, 129] {
                let params = snapshot(len, factor);
                let frame = Frame::new(0, vec![Sample::new(1.0, 0.0); len], params.clone());
                let mut decimator = Decimator::new("decim_a");
                decimator.initialize(&params).unwrap();
                let decimated = decimator.execute(frame).unwrap();
                assert_eq!(decimated.len(), len / factor);
                assert_eq!(decimated.len_tag, len);

                let mut scaler = LengthScaler::new("scale_a");
                let scaled = scaler.execute(decimated).unwrap();
                assert_eq!(scaled.len_tag, len / factor);
                assert_eq!(scaled.len_tag, scaled.len());
            }
        }
    }

    #[test]
    fn dc_passes_with_unity_gain() {
        let input = vec![Sample::new(0.25, -0.5); 256];
        let taps = decimation_taps(8);
        let output = decimate(&input, &taps, 8);
        // Away from the zero-padded edges the filter sees only the constant.
        for sample in &output[5..27] {
            assert!((sample - Sample::new(0.25, -0.5)).norm() < 1e-4);
        }
    }

    #[test]
    fn out_of_band_tone_is_attenuated() {
        let factor = 8;
        let input: Vec<Sample> = (0..1024)
            .map(|n| Sample::from_polar(1.0, 2.0 * std::f32::consts::PI * 0.3 * n as f32))
            .collect();
        let output = decimate(&input, &decimation_taps(factor), factor);
        let interior = &output[10..output.len() - 10];
        let peak = interior.iter().map(|s| s.norm()).fold(0.0, f32::max);
        assert!(peak < 0.01, "leakage {peak}");
    }

    #[test]
    fn scaler_rejects_inconsistent_tag() {
        let params = snapshot(64, 4);
        let frame = Frame {
            seq: 3,
            elapsed: 0.0,
            len_tag: 64,
            samples: vec![Sample::new(0.0, 0.0); 15],
            params,
        };
        let err = LengthScaler::new("scale_b").execute(frame).unwrap_err();
        assert!(matches!(err, StageError::Protocol(_)));
    }
}
