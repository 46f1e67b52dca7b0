use crate::messages::{DetectionMessage, EstimateMessage};
use crate::params::{ParamSnapshot, SPEED_OF_LIGHT};
use crate::prelude::{ProcessingStage, StageResult};
use crate::telemetry::log::LogManager;
use std::f64::consts::{PI, TAU};

/// Two-tone FSK range from the cross-channel phase.
///
/// `tone_separation` is the signed `freq[1] - freq[0]`; the phase turns with
/// it, so a reversed tone pair flips the phase before it is wrapped into
/// `[0, 2pi)`. Results fall in `[0, c / (2 * |delta_f|))`, the unambiguous
/// range of the tone pair.
pub fn fsk_range(phase: f64, tone_separation: f64) -> f64 {
    let phase = phase * tone_separation.signum();
    SPEED_OF_LIGHT * phase.rem_euclid(TAU) / (4.0 * PI * tone_separation.abs())
}

/// Radial velocity from the Doppler shift of the peak; positive is closing.
pub fn doppler_velocity(frequency: f64, center_freq: f64) -> f64 {
    frequency * SPEED_OF_LIGHT / 2.0 / center_freq
}

/// Converts detections into range/velocity estimates.
///
/// The only state is the velocity-mode flag, refreshed from each detection.
pub struct RangeVelocityEstimator {
    velocity_mode: bool,
    logger: LogManager,
}

impl RangeVelocityEstimator {
    pub fn new() -> Self {
        Self {
            velocity_mode: false,
            logger: LogManager::for_stage("estimator"),
        }
    }

    pub fn velocity_mode(&self) -> bool {
        self.velocity_mode
    }

    pub fn estimate(&self, detection: &DetectionMessage) -> EstimateMessage {
        let context = &detection.context;
        let velocity = self
            .velocity_mode
            .then(|| doppler_velocity(detection.frequency, context.center_freq));
        EstimateMessage {
            seq: detection.seq,
            timestamp: context.elapsed,
            range: fsk_range(detection.phase as f64, context.tone_separation),
            velocity,
            frequency: detection.frequency,
            magnitude: detection.magnitude,
            range_res: context.range_res,
            velocity_res: context.velocity_res,
        }
    }
}

impl Default for RangeVelocityEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessingStage for RangeVelocityEstimator {
    type Input = DetectionMessage;
    type Output = EstimateMessage;

    fn name(&self) -> &'static str {
        "estimator"
    }

    fn initialize(&mut self, params: &ParamSnapshot) -> StageResult<()> {
        self.velocity_mode = params.config.velocity_mode;
        Ok(())
    }

    fn execute(&mut self, detection: DetectionMessage) -> StageResult<EstimateMessage> {
        if detection.context.velocity_mode != self.velocity_mode {
            self.velocity_mode = detection.context.velocity_mode;
            self.logger.record(&format!(
                "velocity estimation {}",
                if self.velocity_mode { "enabled" } else { "disabled" }
            ));
        }
        Ok(self.estimate(&detection))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::EstimatorContext;

    fn detection(phase: f32, frequency: f64, velocity_mode: bool) -> DetectionMessage {
        DetectionMessage {
            seq: 4,
            bin: 3,
            frequency,
            magnitude: 12.0,
            phase,
            context: EstimatorContext {
                elapsed: 2.0,
                center_freq: 2.4e9,
                tone_separation: 6e6,
                range_res: 25.0,
                velocity_res: 0.1,
                velocity_mode,
            },
        }
    }

    #[test]
    fn half_turn_maps_to_half_unambiguous_range() {
        assert!((fsk_range(PI, 6e6) - 12.5).abs() < 1e-9);
        assert!(fsk_range(0.0, 6e6).abs() < 1e-12);
        // Negative phase wraps instead of yielding a negative range.
        assert!((fsk_range(-PI / 2.0, 6e6) - 18.75).abs() < 1e-9);
    }

    #[test]
    fn reversed_tone_order_gives_same_range() {
        let forward = fsk_range(PI / 3.0, 6e6);
        let reversed = fsk_range(-PI / 3.0, -6e6);
        assert!((forward - 25.0 / 6.0).abs() < 1e-9);
        assert!((reversed - forward).abs() < 1e-9);
    }

    #[test]
    fn doppler_converts_to_closing_speed() {
        // 16 Hz at 2.4 GHz is one metre per second.
        assert!((doppler_velocity(16.0, 2.4e9) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn velocity_only_reported_in_velocity_mode() {
        let mut estimator = RangeVelocityEstimator::new();
        let without = estimator.execute(detection(1.0, 32.0, false)).unwrap();
        assert!(without.velocity.is_none());

        let with = estimator.execute(detection(1.0, 32.0, true)).unwrap();
        assert!(estimator.velocity_mode());
        assert!((with.velocity.unwrap() - 2.0).abs() < 1e-9);
        assert_eq!(with.seq, 4);
        assert!((with.timestamp - 2.0).abs() < 1e-12);
        assert_eq!(with.range_res, 25.0);
        assert!((with.range - without.range).abs() < 1e-12);
    }
}
