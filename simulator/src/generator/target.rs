use echocore::params::SPEED_OF_LIGHT;
use echocore::prelude::Sample;
use echocore::radio::{HardwareError, LoopbackRadio, RadioFrontEnd, RadioSettings};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Point target seen by the simulated radio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Initial one-way range in metres.
    pub range: f64,
    /// Radial velocity in m/s, positive when closing.
    pub velocity: f64,
    pub attenuation: f32,
    /// Peak amplitude of the uniform I/Q noise added to every sample.
    pub noise: f32,
    pub seed: u64,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            range: 12.0,
            velocity: 1.5,
            attenuation: 0.5,
            noise: 0.01,
            seed: 0,
        }
    }
}

/// Loopback front end with a moving target and a noisy receiver.
///
/// `latency` is the hardware round trip the transceiver trims via
/// `delay_samp`; propagation delay is added on top and rounded to whole
/// samples.
pub struct SimulatedRadio {
    loopback: LoopbackRadio,
    target: TargetConfig,
    latency: usize,
    range: f64,
    rng: StdRng,
    settings: Option<(f64, f64)>,
}

impl SimulatedRadio {
    pub fn new(target: TargetConfig, latency: usize) -> Self {
        let loopback = LoopbackRadio::new(latency).with_attenuation(target.attenuation);
        Self {
            loopback,
            range: target.range,
            rng: StdRng::seed_from_u64(target.seed),
            target,
            latency,
            settings: None,
        }
    }

    /// Current true range of the target.
    pub fn range(&self) -> f64 {
        self.range
    }

    pub fn echo_delay(&self, samp_rate: f64) -> usize {
        let propagation = 2.0 * self.range / SPEED_OF_LIGHT * samp_rate;
        self.latency + propagation.round() as usize
    }

    pub fn doppler(&self, center_freq: f64) -> f64 {
        2.0 * self.target.velocity * center_freq / SPEED_OF_LIGHT
    }
}

impl RadioFrontEnd for SimulatedRadio {
    fn configure(&mut self, settings: &RadioSettings) -> Result<(), HardwareError> {
        self.loopback.configure(settings)?;
        self.settings = Some((settings.samp_rate, settings.center_freq));
        Ok(())
    }

    fn transmit(&mut self, tone_a: &[Sample], tone_b: &[Sample]) -> Result<(), HardwareError> {
        let (samp_rate, center_freq) = self.settings.ok_or(HardwareError::NotConfigured)?;
        self.loopback.set_echo_delay(self.echo_delay(samp_rate));
        self.loopback.set_doppler(self.doppler(center_freq));
        self.loopback.transmit(tone_a, tone_b)
    }

    fn receive(&mut self, len: usize) -> Result<Vec<Sample>, HardwareError> {
        let (samp_rate, _) = self.settings.ok_or(HardwareError::NotConfigured)?;
        let mut samples = self.loopback.receive(len)?;
        let noise = self.target.noise;
        if noise > 0.0 {
            for sample in samples.iter_mut() {
                sample.re += self.rng.gen_range(-noise..noise);
                sample.im += self.rng.gen_range(-noise..noise);
            }
        }
        let elapsed = len as f64 / samp_rate;
        self.range = (self.range - self.target.velocity * elapsed).max(0.0);
        Ok(samples)
    }

    fn stop_transmission(&mut self) -> Result<(), HardwareError> {
        self.loopback.stop_transmission()
    }
}
