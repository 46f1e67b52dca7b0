//! Radar parameters, their derived resolutions, and the shared handle the
//! control surface mutates while the pipeline runs.
//!
//! Every change goes through [`SharedParams::update`], which validates a full
//! candidate configuration, recomputes all derived quantities, and publishes
//! the result as a new immutable [`ParamSnapshot`]. Readers hold an `Arc` to
//! whichever snapshot was current when they looked, so a frame captured under
//! one snapshot is processed against it end to end.

use crate::radio::{RadioDevice, RadioSettings};
use crate::telemetry::log::LogManager;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

pub const SPEED_OF_LIGHT: f64 = 3e8;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("sample rate must be positive, got {0}")]
    InvalidSampleRate(f64),
    #[error("packet length must be non-zero")]
    EmptyPacket,
    #[error("decimation factor must be a positive integer, got {0}")]
    InvalidDecimation(f64),
    #[error("decimation factor {factor} leaves no samples from a {packet_len}-sample packet")]
    DecimationTooLarge { factor: usize, packet_len: usize },
    #[error("tone frequency {freq} Hz exceeds Nyquist ({nyquist} Hz)")]
    AboveNyquist { freq: f64, nyquist: f64 },
    #[error("tone frequencies must differ, both are {0} Hz")]
    IdenticalTones(f64),
    #[error("center frequency must be positive, got {0}")]
    InvalidCenterFrequency(f64),
    #[error("amplitude must be non-negative, got {0}")]
    NegativeAmplitude(f32),
    #[error("peak threshold must be non-negative, got {0}")]
    NegativeThreshold(f32),
    #[error("gain must be a finite non-negative value, got {0}")]
    InvalidGain(f64),
    #[error("search band [{0}, {1}] Hz is empty")]
    EmptySearchBand(f64, f64),
    #[error("{0} capacity must be at least one")]
    ZeroCapacity(&'static str),
}

/// Operator-facing radar configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadarConfig {
    pub samp_rate: f64,
    pub packet_len: usize,
    /// Baseband offsets of the two transmitted tones, in Hz.
    pub freq: [f64; 2],
    pub center_freq: f64,
    pub amplitude: f32,
    pub gain_tx: f64,
    pub gain_rx: f64,
    pub delay_samp: usize,
    pub decim_fac: usize,
    /// Linear magnitude a correlation peak must exceed.
    pub threshold: f32,
    /// Bins around DC excluded from the peak search.
    pub guard_bins: usize,
    /// Inclusive peak search band in Hz after decimation.
    pub search_band: [f64; 2],
    pub velocity_mode: bool,
    /// Stream edge capacity, in frames.
    pub min_output_buffer: usize,
    /// Detection/result channel capacity, in messages.
    pub message_capacity: usize,
    pub radio: RadioDevice,
}

impl Default for RadarConfig {
    fn default() -> Self {
        Self {
            samp_rate: 14_250_000.0,
            packet_len: 1 << 21,
            freq: [-3_000_000.0, 3_000_000.0],
            center_freq: 2.4e9,
            amplitude: 0.5,
            gain_tx: 40.0,
            gain_rx: 10.0,
            delay_samp: 33,
            decim_fac: 1 << 7,
            threshold: 0.0,
            guard_bins: 1,
            search_band: [-300.0, 300.0],
            velocity_mode: true,
            min_output_buffer: 2,
            message_capacity: 64,
            radio: RadioDevice::default(),
        }
    }
}

impl RadarConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.samp_rate.is_finite() && self.samp_rate > 0.0) {
            return Err(ConfigError::InvalidSampleRate(self.samp_rate));
        }
        if self.packet_len == 0 {
            return Err(ConfigError::EmptyPacket);
        }
        if self.decim_fac == 0 {
            return Err(ConfigError::InvalidDecimation(0.0));
        }
        if self.packet_len / self.decim_fac == 0 {
            return Err(ConfigError::DecimationTooLarge {
                factor: self.decim_fac,
                packet_len: self.packet_len,
            });
        }
        let nyquist = self.samp_rate / 2.0;
        for &freq in &self.freq {
            if !freq.is_finite() || freq.abs() > nyquist {
                return Err(ConfigError::AboveNyquist { freq, nyquist });
            }
        }
        if self.freq[0] == self.freq[1] {
            return Err(ConfigError::IdenticalTones(self.freq[0]));
        }
        if !(self.center_freq.is_finite() && self.center_freq > 0.0) {
            return Err(ConfigError::InvalidCenterFrequency(self.center_freq));
        }
        if !(self.amplitude.is_finite() && self.amplitude >= 0.0) {
            return Err(ConfigError::NegativeAmplitude(self.amplitude));
        }
        if !(self.threshold.is_finite() && self.threshold >= 0.0) {
            return Err(ConfigError::NegativeThreshold(self.threshold));
        }
        for gain in [self.gain_tx, self.gain_rx] {
            if !(gain.is_finite() && gain >= 0.0) {
                return Err(ConfigError::InvalidGain(gain));
            }
        }
        let [lo, hi] = self.search_band;
        if !(lo < hi) {
            return Err(ConfigError::EmptySearchBand(lo, hi));
        }
        if self.min_output_buffer == 0 {
            return Err(ConfigError::ZeroCapacity("stream edge"));
        }
        if self.message_capacity == 0 {
            return Err(ConfigError::ZeroCapacity("message channel"));
        }
        Ok(())
    }

    pub fn tone_separation(&self) -> f64 {
        self.freq[1] - self.freq[0]
    }

    pub fn radio_settings(&self) -> RadioSettings {
        RadioSettings {
            samp_rate: self.samp_rate,
            center_freq: self.center_freq,
            gain_tx: self.gain_tx,
            gain_rx: self.gain_rx,
            device: self.radio.clone(),
        }
    }
}

/// Quantities computed from a [`RadarConfig`]; never set directly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Derived {
    pub freq_res: f64,
    pub time_res: f64,
    pub range_res: f64,
    pub v_res: f64,
    pub decimated_rate: f64,
    pub fft_len: usize,
}

impl Derived {
    pub fn compute(config: &RadarConfig) -> Self {
        let freq_res = config.samp_rate / config.packet_len as f64;
        Self {
            freq_res,
            time_res: config.packet_len as f64 / config.samp_rate,
            range_res: SPEED_OF_LIGHT / 2.0 / config.tone_separation().abs(),
            v_res: freq_res * SPEED_OF_LIGHT / 2.0 / config.center_freq,
            decimated_rate: config.samp_rate / config.decim_fac as f64,
            fft_len: config.packet_len / config.decim_fac,
        }
    }
}

/// Immutable, versioned view of the parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSnapshot {
    pub version: u64,
    pub config: RadarConfig,
    pub derived: Derived,
}

impl ParamSnapshot {
    pub fn new(config: RadarConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let derived = Derived::compute(&config);
        Ok(Self {
            version: 0,
            config,
            derived,
        })
    }
}

/// Parses a control-surface decimation value, rejecting fractions.
pub fn decimation_factor(value: f64) -> Result<usize, ConfigError> {
    if !value.is_finite() || value < 1.0 || value.fract() != 0.0 {
        return Err(ConfigError::InvalidDecimation(value));
    }
    Ok(value as usize)
}

/// Single-writer/multi-reader handle to the live parameters.
pub struct SharedParams {
    current: RwLock<Arc<ParamSnapshot>>,
    logger: LogManager,
}

impl SharedParams {
    pub fn new(config: RadarConfig) -> Result<Self, ConfigError> {
        let snapshot = ParamSnapshot::new(config)?;
        Ok(Self {
            current: RwLock::new(Arc::new(snapshot)),
            logger: LogManager::for_stage("params"),
        })
    }

    pub fn snapshot(&self) -> Arc<ParamSnapshot> {
        let guard = self
            .current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&guard)
    }

    /// Applies `change` to a copy of the live config and publishes it with a
    /// freshly computed [`Derived`] block. On validation failure the live
    /// snapshot is left untouched.
    pub fn update<F>(&self, change: F) -> Result<Arc<ParamSnapshot>, ConfigError>
    where
        F: FnOnce(&mut RadarConfig),
    {
        let mut guard = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut config = guard.config.clone();
        change(&mut config);
        if let Err(err) = config.validate() {
            self.logger.warn(&format!("rejected parameter update: {err}"));
            return Err(err);
        }
        let derived = Derived::compute(&config);
        let next = Arc::new(ParamSnapshot {
            version: guard.version + 1,
            config,
            derived,
        });
        *guard = Arc::clone(&next);
        self.logger.record_json("parameters updated", &next.derived);
        Ok(next)
    }

    pub fn set_samp_rate(&self, samp_rate: f64) -> Result<Arc<ParamSnapshot>, ConfigError> {
        self.update(|cfg| cfg.samp_rate = samp_rate)
    }

    pub fn set_packet_len(&self, packet_len: usize) -> Result<Arc<ParamSnapshot>, ConfigError> {
        self.update(|cfg| cfg.packet_len = packet_len)
    }

    pub fn set_tone_freqs(&self, freq: [f64; 2]) -> Result<Arc<ParamSnapshot>, ConfigError> {
        self.update(|cfg| cfg.freq = freq)
    }

    pub fn set_center_freq(&self, center_freq: f64) -> Result<Arc<ParamSnapshot>, ConfigError> {
        self.update(|cfg| cfg.center_freq = center_freq)
    }

    pub fn set_gain_tx(&self, gain: f64) -> Result<Arc<ParamSnapshot>, ConfigError> {
        self.update(|cfg| cfg.gain_tx = gain)
    }

    pub fn set_gain_rx(&self, gain: f64) -> Result<Arc<ParamSnapshot>, ConfigError> {
        self.update(|cfg| cfg.gain_rx = gain)
    }

    pub fn set_delay_samp(&self, delay: usize) -> Result<Arc<ParamSnapshot>, ConfigError> {
        self.update(|cfg| cfg.delay_samp = delay)
    }

    pub fn set_decim_fac(&self, factor: f64) -> Result<Arc<ParamSnapshot>, ConfigError> {
        let factor = decimation_factor(factor)?;
        self.update(|cfg| cfg.decim_fac = factor)
    }

    pub fn set_threshold(&self, threshold: f32) -> Result<Arc<ParamSnapshot>, ConfigError> {
        self.update(|cfg| cfg.threshold = threshold)
    }

    pub fn set_guard_bins(&self, guard: usize) -> Result<Arc<ParamSnapshot>, ConfigError> {
        self.update(|cfg| cfg.guard_bins = guard)
    }

    pub fn set_search_band(&self, band: [f64; 2]) -> Result<Arc<ParamSnapshot>, ConfigError> {
        self.update(|cfg| cfg.search_band = band)
    }

    pub fn set_amplitude(&self, amplitude: f32) -> Result<Arc<ParamSnapshot>, ConfigError> {
        self.update(|cfg| cfg.amplitude = amplitude)
    }

    pub fn set_velocity_mode(&self, enabled: bool) -> Result<Arc<ParamSnapshot>, ConfigError> {
        self.update(|cfg| cfg.velocity_mode = enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_scenario_resolutions() {
        let snapshot = ParamSnapshot::new(RadarConfig::default()).unwrap();
        assert!((snapshot.derived.range_res - 25.0).abs() < 1e-9);
        assert!((snapshot.derived.time_res - 0.147).abs() < 1e-3);
        assert_eq!(snapshot.derived.fft_len, 16384);
        let expected_v_res = 14.25e6 / (1u64 << 21) as f64 * 3e8 / 2.0 / 2.4e9;
        assert!((snapshot.derived.v_res - expected_v_res).abs() < 1e-12);
    }

    #[test]
    fn invalid_configs_are_rejected() {
        let above_nyquist = RadarConfig {
            freq: [-3e6, 8e6],
            ..RadarConfig::default()
        };
        assert!(matches!(
            above_nyquist.validate(),
            Err(ConfigError::AboveNyquist { .. })
        ));

        let negative_amplitude = RadarConfig {
            amplitude: -0.1,
            ..RadarConfig::default()
        };
        assert_eq!(
            negative_amplitude.validate(),
            Err(ConfigError::NegativeAmplitude(-0.1))
        );

        let negative_threshold = RadarConfig {
            threshold: -200.0,
            ..RadarConfig::default()
        };
        assert!(negative_threshold.validate().is_err());

        let same_tones = RadarConfig {
            freq: [1e6, 1e6],
            ..RadarConfig::default()
        };
        assert_eq!(same_tones.validate(), Err(ConfigError::IdenticalTones(1e6)));
    }

    #[test]
    fn fractional_decimation_is_rejected() {
        assert_eq!(decimation_factor(128.0), Ok(128));
        assert_eq!(
            decimation_factor(2.5),
            Err(ConfigError::InvalidDecimation(2.5))
        );
        assert!(decimation_factor(0.0).is_err());

        let params = SharedParams::new(RadarConfig::default()).unwrap();
        assert!(params.set_decim_fac(3.5).is_err());
        assert_eq!(params.snapshot().config.decim_fac, 128);
    }

    #[test]
    fn update_recomputes_whole_chain() {
        let params = SharedParams::new(RadarConfig::default()).unwrap();
        let before = params.snapshot();

        let after = params.set_packet_len(1 << 20).unwrap();
        assert_eq!(after.version, before.version + 1);
        assert!((after.derived.freq_res - 2.0 * before.derived.freq_res).abs() < 1e-9);
        assert!((after.derived.v_res - 2.0 * before.derived.v_res).abs() < 1e-12);
        assert!((after.derived.time_res - before.derived.time_res / 2.0).abs() < 1e-12);
        assert_eq!(after.derived.fft_len, 8192);
    }

    #[test]
    fn held_snapshot_is_unaffected_by_later_updates() {
        let params = SharedParams::new(RadarConfig::default()).unwrap();
        let in_flight = params.snapshot();

        params.set_center_freq(5.8e9).unwrap();
        params.set_tone_freqs([-1e6, 1e6]).unwrap();

        assert_eq!(in_flight.config.center_freq, 2.4e9);
        assert!((in_flight.derived.range_res - 25.0).abs() < 1e-9);

        let current = params.snapshot();
        assert!((current.derived.range_res - 75.0).abs() < 1e-9);
        assert!(current.derived.v_res < in_flight.derived.v_res);
    }

    #[test]
    fn rejected_update_keeps_live_snapshot() {
        let params = SharedParams::new(RadarConfig::default()).unwrap();
        let before = params.snapshot();
        assert!(params.set_amplitude(-1.0).is_err());
        assert!(params.set_search_band([300.0, -300.0]).is_err());
        assert_eq!(*params.snapshot(), *before);
    }
}
