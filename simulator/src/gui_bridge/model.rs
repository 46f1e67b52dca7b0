use echocore::messages::{DisplayModel, EstimateMessage};
use echocore::telemetry::MetricsSnapshot;
use std::collections::VecDeque;

/// Display sink: keeps the last `range_time` seconds of estimates.
///
/// Estimates arrive in cycle order. One with an older timestamp than the
/// newest held means a new run started, so the window restarts.
#[derive(Debug, Clone)]
pub struct RollingHistory {
    range_time: f64,
    estimates: VecDeque<EstimateMessage>,
    received: u64,
    metrics: MetricsSnapshot,
}

impl RollingHistory {
    pub fn new(range_time: f64) -> Self {
        Self {
            range_time,
            estimates: VecDeque::new(),
            received: 0,
            metrics: MetricsSnapshot::default(),
        }
    }

    pub fn push(&mut self, estimate: EstimateMessage) {
        let newest = self.estimates.back().map(|last| last.timestamp);
        if newest.is_some_and(|newest| estimate.timestamp < newest) {
            self.estimates.clear();
        }
        let horizon = estimate.timestamp - self.range_time;
        self.estimates.push_back(estimate);
        self.received += 1;
        while self
            .estimates
            .front()
            .is_some_and(|oldest| oldest.timestamp < horizon)
        {
            self.estimates.pop_front();
        }
    }

    pub fn set_metrics(&mut self, metrics: MetricsSnapshot) {
        self.metrics = metrics;
    }

    pub fn model(&self) -> DisplayModel {
        DisplayModel {
            range_time: self.range_time,
            estimates: self.estimates.iter().cloned().collect(),
            received: self.received,
            metrics: self.metrics,
        }
    }
}
