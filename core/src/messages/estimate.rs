use serde::{Deserialize, Serialize};

/// Range/velocity result handed to the display sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimateMessage {
    pub seq: u64,
    /// Seconds since the first cycle, summed over each cycle's own length.
    pub timestamp: f64,
    pub range: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub velocity: Option<f64>,
    pub frequency: f64,
    pub magnitude: f32,
    pub range_res: f64,
    pub velocity_res: f64,
}
