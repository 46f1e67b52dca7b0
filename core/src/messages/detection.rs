use crate::prelude::Frame;
use serde::{Deserialize, Serialize};

/// Constants the estimator needs, frozen from the frame's parameter snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EstimatorContext {
    /// Seconds from the first cycle to the start of the detection's cycle.
    pub elapsed: f64,
    pub center_freq: f64,
    pub tone_separation: f64,
    pub range_res: f64,
    pub velocity_res: f64,
    pub velocity_mode: bool,
}

impl EstimatorContext {
    pub fn from_frame(frame: &Frame) -> Self {
        let snapshot = &frame.params;
        Self {
            elapsed: frame.elapsed,
            center_freq: snapshot.config.center_freq,
            tone_separation: snapshot.config.tone_separation(),
            range_res: snapshot.derived.range_res,
            velocity_res: snapshot.derived.v_res,
            velocity_mode: snapshot.config.velocity_mode,
        }
    }
}

/// Strongest correlation peak of one cycle, emitted by the peak detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionMessage {
    pub seq: u64,
    pub bin: usize,
    /// Peak frequency offset in Hz at the decimated rate.
    pub frequency: f64,
    pub magnitude: f32,
    /// Phase of the cross-channel correlation bin, in radians.
    pub phase: f32,
    pub context: EstimatorContext,
}
