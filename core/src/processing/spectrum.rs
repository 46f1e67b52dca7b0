use crate::math::fft::FftHelper;
use crate::params::ParamSnapshot;
use crate::prelude::{Frame, ProcessingStage, StageError, StageResult};
use crate::telemetry::log::LogManager;

/// Frame-synchronous Hann-windowed forward FFT.
pub struct SpectrumStage {
    name: &'static str,
    fft: Option<FftHelper>,
    logger: LogManager,
}

impl SpectrumStage {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            fft: None,
            logger: LogManager::for_stage(name),
        }
    }

    fn plan(&mut self, size: usize) -> &mut FftHelper {
        if self.fft.as_ref().map_or(true, |fft| fft.len() != size) {
            self.logger.record(&format!("planning {size}-point FFT"));
            self.fft = Some(FftHelper::new(size));
        }
        self.fft.get_or_insert_with(|| FftHelper::new(size))
    }
}

impl ProcessingStage for SpectrumStage {
    type Input = Frame;
    type Output = Frame;

    fn name(&self) -> &'static str {
        self.name
    }

    fn initialize(&mut self, params: &ParamSnapshot) -> StageResult<()> {
        self.plan(params.derived.fft_len);
        Ok(())
    }

    fn execute(&mut self, mut frame: Frame) -> StageResult<Frame> {
        frame.check_tag(self.name)?;
        let size = frame.params.derived.fft_len;
        if frame.len() != size {
            return Err(StageError::Protocol(format!(
                "{}: frame {} holds {} samples, FFT expects {}",
                self.name,
                frame.seq,
                frame.len(),
                size
            )));
        }
        self.plan(size).forward_in_place(&mut frame.samples);
        Ok(frame)
    }

    fn cleanup(&mut self) {
        self.fft = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::RadarConfig;
    use crate::prelude::Sample;
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
    fn spectrum_preserves_length_and_tag() {
        let params = snapshot(256, 4);
        let mut stage = SpectrumStage::new("fft_a");
        stage.initialize(&params).unwrap();
        let frame = Frame::new(2, vec![Sample::new(1.0, 0.0); 64], params);
        let out = stage.execute(frame).unwrap();
        assert_eq!(out.len(), 64);
        assert_eq!(out.len_tag, 64);
        assert_eq!(out.seq, 2);
        // A constant lands in DC with the window's coherent gain.
        assert!((out.samples[0].norm() - 32.0).abs() < 1e-3);
    }

    #[test]
    fn replans_when_decimation_changes() {
        let mut stage = SpectrumStage::new("fft_b");
        stage.initialize(&snapshot(256, 4)).unwrap();
        let params = snapshot(256, 8);
        let frame = Frame::new(0, vec![Sample::new(0.0, 0.0); 32], params);
        assert_eq!(stage.execute(frame).unwrap().len(), 32);
    }

    #[test]
    fn wrong_frame_size_is_fatal() {
        let params = snapshot(256, 4);
        let mut stage = SpectrumStage::new("fft_a");
        stage.initialize(&params).unwrap();
        let frame = Frame::new(0, vec![Sample::new(0.0, 0.0); 63], params);
        assert!(matches!(
            stage.execute(frame),
            Err(StageError::Protocol(_))
        ));
    }
}
