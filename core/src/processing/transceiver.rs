use crate::math::stats::StatsHelper;
use crate::params::ParamSnapshot;
use crate::prelude::{check_aligned, Frame, ProcessingStage, StageResult};
use crate::radio::{HardwareError, RadioFrontEnd, RadioSettings};
use crate::telemetry::log::LogManager;

/// Echo timer: transmits both tones, captures the echo, and trims the
/// configured number of leading samples.
///
/// This is the only stage that owns the radio. It stops the transmitter on
/// cleanup and again on drop, so no path out of the pipeline leaves it keyed.
pub struct TransceiverAdapter<R: RadioFrontEnd> {
    radio: R,
    applied: Option<RadioSettings>,
    transmitting: bool,
    logger: LogManager,
}

impl<R: RadioFrontEnd> TransceiverAdapter<R> {
    pub fn new(radio: R) -> Self {
        Self {
            radio,
            applied: None,
            transmitting: false,
            logger: LogManager::for_stage("transceiver"),
        }
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    fn apply_settings(&mut self, params: &ParamSnapshot) -> Result<(), HardwareError> {
        let settings = params.config.radio_settings();
        if self.applied.as_ref() != Some(&settings) {
            self.radio.configure(&settings)?;
            self.logger.record(&format!(
                "radio tuned to {:.3} MHz, tx gain {:.1}, rx gain {:.1}",
                settings.center_freq / 1e6,
                settings.gain_tx,
                settings.gain_rx
            ));
            self.applied = Some(settings);
        }
        Ok(())
    }

    fn silence(&mut self) {
        if !self.transmitting {
            return;
        }
        self.transmitting = false;
        match self.radio.stop_transmission() {
            Ok(()) => self.logger.record("transmission stopped"),
            Err(err) => self
                .logger
                .warn(&format!("failed to stop transmission: {err}")),
        }
    }

    fn cycle(&mut self, tone_a: &Frame, tone_b: &Frame) -> StageResult<Frame> {
        check_aligned("transceiver", tone_a, tone_b)?;
        tone_a.check_tag("transceiver")?;
        let params = &tone_a.params;
        self.apply_settings(params)?;

        self.transmitting = true;
        self.radio.transmit(&tone_a.samples, &tone_b.samples)?;

        let packet_len = tone_a.len();
        let delay = params.config.delay_samp;
        let expected = packet_len + delay;
        let mut captured = self.radio.receive(expected)?;
        if captured.len() < expected {
            return Err(HardwareError::Underrun {
                expected,
                received: captured.len(),
            }
            .into());
        }
        if captured.len() > expected {
            return Err(HardwareError::Overrun(format!(
                "asked for {expected} samples, device returned {}",
                captured.len()
            ))
            .into());
        }
        captured.drain(..delay);

        self.logger.debug(&format!(
            "cycle {} captured, rx rms {:.4}",
            tone_a.seq,
            StatsHelper::rms(&captured)
        ));
        Ok(Frame::new(tone_a.seq, captured, params.clone()).with_elapsed(tone_a.elapsed))
    }
}

impl<R: RadioFrontEnd> ProcessingStage for TransceiverAdapter<R> {
    type Input = (Frame, Frame);
    type Output = Frame;

    fn name(&self) -> &'static str {
        "transceiver"
    }

    fn initialize(&mut self, params: &ParamSnapshot) -> StageResult<()> {
        self.apply_settings(params)?;
        Ok(())
    }

    fn execute(&mut self, (tone_a, tone_b): (Frame, Frame)) -> StageResult<Frame> {
        let result = self.cycle(&tone_a, &tone_b);
        if result.is_err() {
            self.silence();
        }
        result
    }

    fn cleanup(&mut self) {
        self.silence();
        self.applied = None;
    }
}

impl<R: RadioFrontEnd> Drop for TransceiverAdapter<R> {
    fn drop(&mut self) {
        self.silence();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::RadarConfig;
    use crate::prelude::{Sample, StageError};
    use crate::radio::{LoopbackFault, LoopbackRadio};
    use std::sync::Arc;

    fn params(delay_samp: usize) -> Arc<ParamSnapshot> {
        let config = RadarConfig {
            samp_rate: 1000.0,
            packet_len: 8,
            freq: [-100.0, 100.0],
            decim_fac: 2,
            delay_samp,
            ..RadarConfig::default()
        };
        Arc::new(ParamSnapshot::new(config).unwrap())
    }

    fn ramp(seq: u64, params: &Arc<ParamSnapshot>) -> Frame {
        let samples = (0..8).map(|i| Sample::new(i as f32, 0.0)).collect();
        Frame::new(seq, samples, Arc::clone(params))
    }

    #[test]
    fn delay_compensation_realigns_echo() {
        let params = params(3);
        let mut adapter = TransceiverAdapter::new(LoopbackRadio::new(3));
        adapter.initialize(&params).unwrap();
        let silent = Frame::new(0, vec![Sample::new(0.0, 0.0); 8], Arc::clone(&params));

        let rx = adapter.execute((ramp(0, &params), silent)).unwrap();
        assert_eq!(rx.len(), 8);
        assert_eq!(rx.len_tag, 8);
        for (i, sample) in rx.samples.iter().enumerate() {
            assert_eq!(*sample, Sample::new(i as f32, 0.0));
        }
    }

    #[test]
    fn hardware_failure_is_fatal_and_silences_transmitter() {
        let params = params(0);
        let radio = LoopbackRadio::new(0).fail_at(1, LoopbackFault::Underrun);
        let monitor = radio.monitor();
        let mut adapter = TransceiverAdapter::new(radio);
        adapter.initialize(&params).unwrap();

        adapter
            .execute((ramp(0, &params), ramp(0, &params)))
            .unwrap();
        assert!(monitor.is_transmitting());

        let err = adapter
            .execute((ramp(1, &params), ramp(1, &params)))
            .unwrap_err();
        assert!(matches!(err, StageError::Hardware(HardwareError::Underrun { .. })));
        assert!(!monitor.is_transmitting());
        assert_eq!(monitor.stop_count(), 1);
    }

    #[test]
    fn misaligned_tones_are_a_protocol_error() {
        let params = params(0);
        let mut adapter = TransceiverAdapter::new(LoopbackRadio::new(0));
        adapter.initialize(&params).unwrap();
        let err = adapter
            .execute((ramp(0, &params), ramp(1, &params)))
            .unwrap_err();
        assert!(matches!(err, StageError::Protocol(_)));
    }

    #[test]
    fn gain_change_reconfigures_radio_at_cycle_boundary() {
        let shared = crate::params::SharedParams::new(params(0).config.clone()).unwrap();
        let radio = LoopbackRadio::new(0);
        let monitor = radio.monitor();
        let mut adapter = TransceiverAdapter::new(radio);
        adapter.initialize(&shared.snapshot()).unwrap();

        let first = shared.snapshot();
        adapter.execute((ramp(0, &first), ramp(0, &first))).unwrap();
        assert_eq!(monitor.configure_count(), 1);

        let second = shared.set_gain_tx(55.0).unwrap();
        adapter
            .execute((ramp(1, &second), ramp(1, &second)))
            .unwrap();
        assert_eq!(monitor.configure_count(), 2);
        assert_eq!(adapter.radio().settings().unwrap().gain_tx, 55.0);
    }

    #[test]
    fn dropping_adapter_stops_transmission() {
        let params = params(0);
        let radio = LoopbackRadio::new(0);
        let monitor = radio.monitor();
        {
            let mut adapter = TransceiverAdapter::new(radio);
            adapter.initialize(&params).unwrap();
            adapter
                .execute((ramp(0, &params), ramp(0, &params)))
                .unwrap();
        }
        assert!(!monitor.is_transmitting());
        assert_eq!(monitor.stop_count(), 1);
    }
}
