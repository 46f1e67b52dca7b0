use crate::messages::{DetectionMessage, EstimatorContext};
use crate::params::ParamSnapshot;
use crate::prelude::{Frame, ProcessingStage, Sample, StageResult};
use crate::telemetry::log::LogManager;

/// Search constraints for one spectrum, taken from its parameter snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakSettings {
    pub threshold: f32,
    pub guard_bins: usize,
    pub band: [f64; 2],
    /// Sample rate the spectrum was computed at.
    pub sample_rate: f64,
}

impl PeakSettings {
    pub fn from_snapshot(params: &ParamSnapshot) -> Self {
        Self {
            threshold: params.config.threshold,
            guard_bins: params.config.guard_bins,
            band: params.config.search_band,
            sample_rate: params.derived.decimated_rate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    pub bin: usize,
    pub frequency: f64,
    pub magnitude: f32,
    pub phase: f32,
}

/// Signed frequency of `bin` in an unshifted `len`-point spectrum.
pub fn bin_frequency(bin: usize, len: usize, sample_rate: f64) -> f64 {
    let resolution = sample_rate / len as f64;
    if bin < len.div_ceil(2) {
        bin as f64 * resolution
    } else {
        (bin as f64 - len as f64) * resolution
    }
}

/// Strongest bin inside the band and outside the DC guard, if it clears the
/// threshold.
///
/// Bins are scanned in ascending index order and only a strictly larger
/// magnitude replaces the current best, so equal maxima resolve to the lowest
/// index.
pub fn find_peak(spectrum: &[Sample], settings: &PeakSettings) -> Option<Peak> {
    let len = spectrum.len();
    let [lo, hi] = settings.band;
    let mut best: Option<(usize, f32)> = None;

    for (bin, value) in spectrum.iter().enumerate() {
        let dc_distance = bin.min(len - bin);
        if dc_distance < settings.guard_bins {
            continue;
        }
        let frequency = bin_frequency(bin, len, settings.sample_rate);
        if frequency < lo || frequency > hi {
            continue;
        }
        let magnitude = value.norm();
        if best.map_or(true, |(_, current)| magnitude > current) {
            best = Some((bin, magnitude));
        }
    }

    let (bin, magnitude) = best?;
    if magnitude <= settings.threshold {
        return None;
    }
    Some(Peak {
        bin,
        frequency: bin_frequency(bin, len, settings.sample_rate),
        magnitude,
        phase: spectrum[bin].arg(),
    })
}

/// Emits one detection per correlation spectrum whose peak clears the
/// threshold; frames without one produce `None`.
pub struct PeakDetector {
    logger: LogManager,
}

impl PeakDetector {
    pub fn new() -> Self {
        Self {
            logger: LogManager::for_stage("peak"),
        }
    }
}

impl Default for PeakDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessingStage for PeakDetector {
    type Input = Frame;
    type Output = Option<DetectionMessage>;

    fn name(&self) -> &'static str {
        "peak"
    }

    fn initialize(&mut self, _params: &ParamSnapshot) -> StageResult<()> {
        Ok(())
    }

    fn execute(&mut self, frame: Frame) -> StageResult<Option<DetectionMessage>> {
        frame.check_tag("peak")?;
        let settings = PeakSettings::from_snapshot(&frame.params);
        let Some(peak) = find_peak(&frame.samples, &settings) else {
            self.logger.debug(&format!("frame {}: no peak above threshold", frame.seq));
            return Ok(None);
        };

        self.logger.debug(&format!(
            "frame {}: peak bin {} at {:.2} Hz, magnitude {:.3e}",
            frame.seq, peak.bin, peak.frequency, peak.magnitude
        ));
        Ok(Some(DetectionMessage {
            seq: frame.seq,
            bin: peak.bin,
            frequency: peak.frequency,
            magnitude: peak.magnitude,
            phase: peak.phase,
            context: EstimatorContext::from_frame(&frame),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(guard_bins: usize) -> PeakSettings {
        PeakSettings {
            threshold: 0.5,
            guard_bins,
            band: [-8.0, 8.0],
            sample_rate: 16.0,
        }
    }

    fn spectrum(magnitudes: &[f32]) -> Vec<Sample> {
        magnitudes.iter().map(|&m| Sample::new(m, 0.0)).collect()
    }

    #[test]
    fn bin_frequencies_wrap_at_half_length() {
        assert_eq!(bin_frequency(0, 16, 16.0), 0.0);
        assert_eq!(bin_frequency(7, 16, 16.0), 7.0);
        assert_eq!(bin_frequency(8, 16, 16.0), -8.0);
        assert_eq!(bin_frequency(15, 16, 16.0), -1.0);
    }

    #[test]
    fn equal_maxima_resolve_to_lower_index() {
        let mut mags = vec![0.0; 16];
        mags[3] = 4.0;
        mags[12] = 4.0;
        let peak = find_peak(&spectrum(&mags), &settings(1)).unwrap();
        assert_eq!(peak.bin, 3);
    }

    #[test]
    fn guard_zone_hides_dc_adjacent_maximum() {
        let mut mags = vec![0.0; 16];
        mags[1] = 10.0;
        mags[15] = 9.0;
        mags[5] = 2.0;
        let peak = find_peak(&spectrum(&mags), &settings(2)).unwrap();
        assert_eq!(peak.bin, 5);
        assert_eq!(peak.frequency, 5.0);

        let unguarded = find_peak(&spectrum(&mags), &settings(0)).unwrap();
        assert_eq!(unguarded.bin, 1);
    }

    #[test]
    fn search_band_limits_candidates() {
        let mut mags = vec![0.0; 16];
        mags[6] = 10.0;
        mags[2] = 1.0;
        let narrow = PeakSettings {
            band: [-3.0, 3.0],
            ..settings(1)
        };
        assert_eq!(find_peak(&spectrum(&mags), &narrow).unwrap().bin, 2);
    }

    #[test]
    fn nothing_above_threshold_emits_nothing() {
        let mags = vec![0.5; 16];
        assert!(find_peak(&spectrum(&mags), &settings(1)).is_none());
    }

    #[test]
    fn peak_reports_correlation_phase() {
        let mut values = vec![Sample::new(0.0, 0.0); 16];
        values[4] = Sample::from_polar(3.0, 1.25);
        let peak = find_peak(&values, &settings(1)).unwrap();
        assert!((peak.phase - 1.25).abs() < 1e-6);
        assert!((peak.magnitude - 3.0).abs() < 1e-6);
    }
}
