use log::{debug, info, warn};
use serde::Serialize;

/// Stage-scoped wrapper over the `log` facade.
pub struct LogManager {
    stage: &'static str,
}

impl LogManager {
    pub fn for_stage(stage: &'static str) -> Self {
        Self { stage }
    }

    pub fn record(&self, message: &str) {
        info!("[{}] {}", self.stage, message);
    }

    pub fn warn(&self, message: &str) {
        warn!("[{}] {}", self.stage, message);
    }

    pub fn debug(&self, message: &str) {
        debug!("[{}] {}", self.stage, message);
    }

    /// Logs `value` as compact JSON next to `message`.
    pub fn record_json<T: Serialize>(&self, message: &str, value: &T) {
        match serde_json::to_string(value) {
            Ok(json) => info!("[{}] {} {}", self.stage, message, json),
            Err(err) => warn!("[{}] {} (unserializable: {})", self.stage, message, err),
        }
    }
}
