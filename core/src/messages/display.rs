use super::EstimateMessage;
use crate::telemetry::metrics::MetricsSnapshot;
use serde::{Deserialize, Serialize};

/// Rolling range/velocity history as served to a display.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DisplayModel {
    /// Width of the history window in seconds.
    pub range_time: f64,
    /// Estimates inside the window, oldest first.
    #[serde(default)]
    pub estimates: Vec<EstimateMessage>,
    #[serde(default)]
    pub received: u64,
    #[serde(default)]
    pub metrics: MetricsSnapshot,
}

impl DisplayModel {
    pub fn latest(&self) -> Option<&EstimateMessage> {
        self.estimates.last()
    }
}
