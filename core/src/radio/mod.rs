//! Hardware boundary of the radar.
//!
//! Only the transceiver adapter talks to a [`RadioFrontEnd`]; every other
//! stage sees the radio as the frames it produces.

pub mod loopback;

pub use loopback::{LoopbackFault, LoopbackRadio, TransmitMonitor};

use crate::prelude::Sample;
use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum HardwareError {
    #[error("radio disconnected: {0}")]
    Disconnected(String),
    #[error("receive underrun: expected {expected} samples, got {received}")]
    Underrun { expected: usize, received: usize },
    #[error("receive overflow: {0}")]
    Overrun(String),
    #[error("radio used before it was configured")]
    NotConfigured,
    #[error("device error: {0}")]
    Device(String),
}

/// Reference clock or time source of one USRP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncSource {
    None,
    Internal,
    External,
    Mimo,
}

/// Addressing and timing for one direction of the echo timer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadioPort {
    pub args: String,
    pub wire: String,
    pub clock_source: SyncSource,
    pub time_source: SyncSource,
    pub antenna: String,
    /// Seconds to wait for the device before giving up.
    pub timeout: f64,
    /// Seconds between issuing and starting the timed burst.
    pub wait: f64,
    pub lo_offset: f64,
}

impl Default for RadioPort {
    fn default() -> Self {
        Self {
            args: String::new(),
            wire: String::new(),
            clock_source: SyncSource::Internal,
            time_source: SyncSource::None,
            antenna: "TX/RX".into(),
            timeout: 0.1,
            wait: 0.05,
            lo_offset: 0.0,
        }
    }
}

/// Static device description; TX owns the clock, RX follows over MIMO.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadioDevice {
    pub tx: RadioPort,
    pub rx: RadioPort,
}

impl Default for RadioDevice {
    fn default() -> Self {
        Self {
            tx: RadioPort {
                args: "addr=10.10.3.20".into(),
                ..RadioPort::default()
            },
            rx: RadioPort {
                args: "addr=10.10.3.25".into(),
                clock_source: SyncSource::Mimo,
                time_source: SyncSource::Mimo,
                ..RadioPort::default()
            },
        }
    }
}

/// Everything a front end needs to tune and level itself for a cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadioSettings {
    pub samp_rate: f64,
    pub center_freq: f64,
    pub gain_tx: f64,
    pub gain_rx: f64,
    pub device: RadioDevice,
}

/// Transmit/receive driver of a software-defined radio.
pub trait RadioFrontEnd: Send {
    fn configure(&mut self, settings: &RadioSettings) -> Result<(), HardwareError>;

    /// Starts transmitting both tones; they share one antenna path.
    fn transmit(&mut self, tone_a: &[Sample], tone_b: &[Sample]) -> Result<(), HardwareError>;

    /// Blocks until `len` samples have been captured.
    fn receive(&mut self, len: usize) -> Result<Vec<Sample>, HardwareError>;

    fn stop_transmission(&mut self) -> Result<(), HardwareError>;
}

impl<R: RadioFrontEnd + ?Sized> RadioFrontEnd for Box<R> {
    fn configure(&mut self, settings: &RadioSettings) -> Result<(), HardwareError> {
        (**self).configure(settings)
    }

    fn transmit(&mut self, tone_a: &[Sample], tone_b: &[Sample]) -> Result<(), HardwareError> {
        (**self).transmit(tone_a, tone_b)
    }

    fn receive(&mut self, len: usize) -> Result<Vec<Sample>, HardwareError> {
        (**self).receive(len)
    }

    fn stop_transmission(&mut self) -> Result<(), HardwareError> {
        (**self).stop_transmission()
    }
}
