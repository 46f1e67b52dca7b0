use super::{HardwareError, RadioFrontEnd, RadioSettings};
use crate::prelude::Sample;
use std::f64::consts::PI;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Fault a [`LoopbackRadio`] can be told to raise on a given cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopbackFault {
    Disconnect,
    Underrun,
}

/// Observer for the transmitter state, usable after the radio moved into a
/// pipeline thread.
#[derive(Debug, Clone, Default)]
pub struct TransmitMonitor {
    active: Arc<AtomicBool>,
    stops: Arc<AtomicUsize>,
    configures: Arc<AtomicUsize>,
}

impl TransmitMonitor {
    pub fn is_transmitting(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn configure_count(&self) -> usize {
        self.configures.load(Ordering::SeqCst)
    }
}

/// Deterministic front end that returns its own transmission as an echo.
///
/// The echo is the summed transmit burst delayed by `echo_delay` samples,
/// shifted by `doppler_hz` and scaled by `attenuation`. Samples before the
/// echo arrives are zero.
pub struct LoopbackRadio {
    echo_delay: usize,
    doppler_hz: f64,
    attenuation: f32,
    settings: Option<RadioSettings>,
    last_tx: Vec<Sample>,
    cycles: u64,
    fault: Option<(u64, LoopbackFault)>,
    pending_underrun: bool,
    monitor: TransmitMonitor,
}

impl LoopbackRadio {
    pub fn new(echo_delay: usize) -> Self {
        Self {
            echo_delay,
            doppler_hz: 0.0,
            attenuation: 1.0,
            settings: None,
            last_tx: Vec::new(),
            cycles: 0,
            fault: None,
            pending_underrun: false,
            monitor: TransmitMonitor::default(),
        }
    }

    pub fn with_doppler(mut self, doppler_hz: f64) -> Self {
        self.doppler_hz = doppler_hz;
        self
    }

    pub fn with_attenuation(mut self, attenuation: f32) -> Self {
        self.attenuation = attenuation;
        self
    }

    /// Raises `fault` on the transmit of cycle `cycle` (zero based).
    pub fn fail_at(mut self, cycle: u64, fault: LoopbackFault) -> Self {
        self.fault = Some((cycle, fault));
        self
    }

    pub fn set_echo_delay(&mut self, echo_delay: usize) {
        self.echo_delay = echo_delay;
    }

    pub fn set_doppler(&mut self, doppler_hz: f64) {
        self.doppler_hz = doppler_hz;
    }

    pub fn settings(&self) -> Option<&RadioSettings> {
        self.settings.as_ref()
    }

    pub fn monitor(&self) -> TransmitMonitor {
        self.monitor.clone()
    }
}

impl RadioFrontEnd for LoopbackRadio {
    fn configure(&mut self, settings: &RadioSettings) -> Result<(), HardwareError> {
        self.settings = Some(settings.clone());
        self.monitor.configures.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn transmit(&mut self, tone_a: &[Sample], tone_b: &[Sample]) -> Result<(), HardwareError> {
        if self.settings.is_none() {
            return Err(HardwareError::NotConfigured);
        }
        let cycle = self.cycles;
        self.cycles += 1;
        match self.fault {
            Some((at, LoopbackFault::Disconnect)) if at == cycle => {
                self.monitor.active.store(false, Ordering::SeqCst);
                return Err(HardwareError::Disconnected(format!(
                    "loopback link dropped on cycle {cycle}"
                )));
            }
            Some((at, LoopbackFault::Underrun)) if at == cycle => self.pending_underrun = true,
            _ => {}
        }

        self.last_tx.clear();
        self.last_tx
            .extend(tone_a.iter().zip(tone_b).map(|(&a, &b)| a + b));
        self.monitor.active.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn receive(&mut self, len: usize) -> Result<Vec<Sample>, HardwareError> {
        let samp_rate = self
            .settings
            .as_ref()
            .map(|settings| settings.samp_rate)
            .ok_or(HardwareError::NotConfigured)?;
        if self.pending_underrun {
            self.pending_underrun = false;
            return Err(HardwareError::Underrun {
                expected: len,
                received: len / 2,
            });
        }

        let step = 2.0 * PI * self.doppler_hz / samp_rate;
        let echo = (0..len)
            .map(|n| {
                let Some(&sent) = n
                    .checked_sub(self.echo_delay)
                    .and_then(|idx| self.last_tx.get(idx))
                else {
                    return Sample::new(0.0, 0.0);
                };
                let phase = (step * n as f64).rem_euclid(2.0 * PI);
                let shift = Sample::new(phase.cos() as f32, phase.sin() as f32);
                sent * shift * self.attenuation
            })
            .collect();
        Ok(echo)
    }

    fn stop_transmission(&mut self) -> Result<(), HardwareError> {
        self.monitor.active.store(false, Ordering::SeqCst);
        self.monitor.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::RadarConfig;

    fn configured(echo_delay: usize) -> LoopbackRadio {
        let mut radio = LoopbackRadio::new(echo_delay);
        let config = RadarConfig {
            samp_rate: 1000.0,
            ..RadarConfig::default()
        };
        radio.configure(&config.radio_settings()).unwrap();
        radio
    }

    #[test]
    fn echo_is_delayed_sum_of_tones() {
        let mut radio = configured(2);
        let a = vec![Sample::new(1.0, 0.0); 4];
        let b = vec![Sample::new(0.0, 1.0); 4];
        radio.transmit(&a, &b).unwrap();
        let echo = radio.receive(6).unwrap();
        assert_eq!(echo.len(), 6);
        assert_eq!(echo[0], Sample::new(0.0, 0.0));
        assert_eq!(echo[1], Sample::new(0.0, 0.0));
        assert_eq!(echo[2], Sample::new(1.0, 1.0));
        assert_eq!(echo[5], Sample::new(1.0, 1.0));
    }

    #[test]
    fn unconfigured_radio_refuses_to_transmit() {
        let mut radio = LoopbackRadio::new(0);
        let tone = vec![Sample::new(1.0, 0.0); 2];
        assert_eq!(
            radio.transmit(&tone, &tone),
            Err(HardwareError::NotConfigured)
        );
    }

    #[test]
    fn injected_faults_fire_on_their_cycle() {
        let mut radio = configured(0).fail_at(1, LoopbackFault::Underrun);
        let tone = vec![Sample::new(1.0, 0.0); 8];
        radio.transmit(&tone, &tone).unwrap();
        assert!(radio.receive(8).is_ok());
        radio.transmit(&tone, &tone).unwrap();
        assert!(matches!(
            radio.receive(8),
            Err(HardwareError::Underrun { expected: 8, .. })
        ));

        let mut radio = configured(0).fail_at(0, LoopbackFault::Disconnect);
        assert!(matches!(
            radio.transmit(&tone, &tone),
            Err(HardwareError::Disconnected(_))
        ));
    }

    #[test]
    fn monitor_tracks_transmitter_state() {
        let mut radio = configured(0);
        let monitor = radio.monitor();
        let tone = vec![Sample::new(1.0, 0.0); 2];
        radio.transmit(&tone, &tone).unwrap();
        assert!(monitor.is_transmitting());
        radio.stop_transmission().unwrap();
        assert!(!monitor.is_transmitting());
        assert_eq!(monitor.stop_count(), 1);
        assert_eq!(monitor.configure_count(), 1);
    }
}
