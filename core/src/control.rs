//! Operator commands accepted while the pipeline runs.

use crate::params::{ConfigError, ParamSnapshot, SharedParams};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One control-surface change, serialized as `{"setting": ..., "value": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "setting", content = "value", rename_all = "snake_case")]
pub enum ControlRequest {
    GainTx(f64),
    GainRx(f64),
    DelaySamp(usize),
    /// Sent as a float so fractional values from a slider can be rejected.
    DecimFac(f64),
    Threshold(f32),
    GuardBins(usize),
    Amplitude(f32),
    CenterFreq(f64),
    ToneFreqs([f64; 2]),
    SampRate(f64),
    PacketLen(usize),
    SearchBand([f64; 2]),
    VelocityMode(bool),
}

impl ControlRequest {
    pub fn apply(&self, params: &SharedParams) -> Result<Arc<ParamSnapshot>, ConfigError> {
        match *self {
            ControlRequest::GainTx(gain) => params.set_gain_tx(gain),
            ControlRequest::GainRx(gain) => params.set_gain_rx(gain),
            ControlRequest::DelaySamp(delay) => params.set_delay_samp(delay),
            ControlRequest::DecimFac(factor) => params.set_decim_fac(factor),
            ControlRequest::Threshold(threshold) => params.set_threshold(threshold),
            ControlRequest::GuardBins(guard) => params.set_guard_bins(guard),
            ControlRequest::Amplitude(amplitude) => params.set_amplitude(amplitude),
            ControlRequest::CenterFreq(freq) => params.set_center_freq(freq),
            ControlRequest::ToneFreqs(freq) => params.set_tone_freqs(freq),
            ControlRequest::SampRate(rate) => params.set_samp_rate(rate),
            ControlRequest::PacketLen(len) => params.set_packet_len(len),
            ControlRequest::SearchBand(band) => params.set_search_band(band),
            ControlRequest::VelocityMode(enabled) => params.set_velocity_mode(enabled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::RadarConfig;

    #[test]
    fn requests_use_tagged_json() {
        let request: ControlRequest =
            serde_json::from_str(r#"{"setting":"gain_tx","value":55.0}"#).unwrap();
        assert_eq!(request, ControlRequest::GainTx(55.0));

        let json = serde_json::to_string(&ControlRequest::SearchBand([-50.0, 50.0])).unwrap();
        assert_eq!(json, r#"{"setting":"search_band","value":[-50.0,50.0]}"#);
    }

    #[test]
    fn apply_routes_to_setter() {
        let params = SharedParams::new(RadarConfig::default()).unwrap();
        let snapshot = ControlRequest::GuardBins(3).apply(&params).unwrap();
        assert_eq!(snapshot.config.guard_bins, 3);
        assert_eq!(params.snapshot().version, 1);
    }

    #[test]
    fn fractional_decimation_is_rejected() {
        let params = SharedParams::new(RadarConfig::default()).unwrap();
        let err = ControlRequest::DecimFac(2.5).apply(&params).unwrap_err();
        assert_eq!(err, ConfigError::InvalidDecimation(2.5));
        assert_eq!(params.snapshot().version, 0);
    }
}
