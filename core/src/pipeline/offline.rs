use crate::messages::{DetectionMessage, EstimateMessage};
use crate::params::ParamSnapshot;
use crate::prelude::{CycleTick, Frame, ProcessingStage, StageResult};
use crate::processing::{
    ConjugateMixer, Decimator, LengthScaler, PeakDetector, RangeVelocityEstimator, SpectrumStage,
    ToneChannel, ToneStage, TransceiverAdapter,
};
use crate::radio::RadioFrontEnd;
use std::sync::Arc;

/// Output of the transceiver for one cycle, plus the references it needs.
#[derive(Debug, Clone)]
pub struct CapturedCycle {
    pub echo: Frame,
    pub reference_a: Frame,
    pub reference_b: Frame,
}

/// What one cycle produced.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub detection: Option<DetectionMessage>,
    pub estimate: Option<EstimateMessage>,
}

/// The same stages as the threaded pipeline, stepped one cycle at a time on
/// the calling thread.
pub struct OfflineChain<R: RadioFrontEnd> {
    tone_a: ToneStage,
    tone_b: ToneStage,
    transceiver: TransceiverAdapter<R>,
    mixer_a: ConjugateMixer,
    mixer_b: ConjugateMixer,
    decim_a: Decimator,
    decim_b: Decimator,
    scale_a: LengthScaler,
    scale_b: LengthScaler,
    fft_a: SpectrumStage,
    fft_b: SpectrumStage,
    correlator: ConjugateMixer,
    peak: PeakDetector,
    estimator: RangeVelocityEstimator,
    next_seq: u64,
    elapsed: f64,
}

impl<R: RadioFrontEnd> OfflineChain<R> {
    pub fn new(radio: R, initial: &ParamSnapshot) -> StageResult<Self> {
        let mut chain = Self {
            tone_a: ToneStage::new(ToneChannel::A),
            tone_b: ToneStage::new(ToneChannel::B),
            transceiver: TransceiverAdapter::new(radio),
            mixer_a: ConjugateMixer::new("mixer_a"),
            mixer_b: ConjugateMixer::new("mixer_b"),
            decim_a: Decimator::new("decim_a"),
            decim_b: Decimator::new("decim_b"),
            scale_a: LengthScaler::new("scale_a"),
            scale_b: LengthScaler::new("scale_b"),
            fft_a: SpectrumStage::new("fft_a"),
            fft_b: SpectrumStage::new("fft_b"),
            correlator: ConjugateMixer::correlator(),
            peak: PeakDetector::new(),
            estimator: RangeVelocityEstimator::new(),
            next_seq: 0,
            elapsed: 0.0,
        };
        chain.tone_a.initialize(initial)?;
        chain.tone_b.initialize(initial)?;
        chain.transceiver.initialize(initial)?;
        chain.mixer_a.initialize(initial)?;
        chain.mixer_b.initialize(initial)?;
        chain.decim_a.initialize(initial)?;
        chain.decim_b.initialize(initial)?;
        chain.scale_a.initialize(initial)?;
        chain.scale_b.initialize(initial)?;
        chain.fft_a.initialize(initial)?;
        chain.fft_b.initialize(initial)?;
        chain.correlator.initialize(initial)?;
        chain.peak.initialize(initial)?;
        chain.estimator.initialize(initial)?;
        Ok(chain)
    }

    pub fn radio(&self) -> &R {
        self.transceiver.radio()
    }

    /// Synthesizes both tones under `params` and runs one echo cycle.
    pub fn capture(&mut self, params: Arc<ParamSnapshot>) -> StageResult<CapturedCycle> {
        let tick = CycleTick {
            seq: self.next_seq,
            elapsed: self.elapsed,
            params,
        };
        self.next_seq += 1;
        self.elapsed += tick.params.derived.time_res;
        let reference_a = self.tone_a.execute(tick.clone())?;
        let reference_b = self.tone_b.execute(tick)?;
        let echo = self
            .transceiver
            .execute((reference_a.clone(), reference_b.clone()))?;
        Ok(CapturedCycle {
            echo,
            reference_a,
            reference_b,
        })
    }

    /// Runs a captured cycle through the receive chain, using the snapshot it
    /// was captured under.
    pub fn analyze(&mut self, captured: CapturedCycle) -> StageResult<CycleReport> {
        let CapturedCycle {
            echo,
            reference_a,
            reference_b,
        } = captured;

        let mixed_a = self.mixer_a.execute((echo.clone(), reference_a))?;
        let mixed_b = self.mixer_b.execute((echo, reference_b))?;
        let spectrum_a = self
            .fft_a
            .execute(self.scale_a.execute(self.decim_a.execute(mixed_a)?)?)?;
        let spectrum_b = self
            .fft_b
            .execute(self.scale_b.execute(self.decim_b.execute(mixed_b)?)?)?;
        let correlation = self.correlator.execute((spectrum_a, spectrum_b))?;

        let Some(detection) = self.peak.execute(correlation)? else {
            return Ok(CycleReport::default());
        };
        let estimate = self.estimator.execute(detection.clone())?;
        Ok(CycleReport {
            detection: Some(detection),
            estimate: Some(estimate),
        })
    }

    pub fn process(&mut self, params: Arc<ParamSnapshot>) -> StageResult<CycleReport> {
        let captured = self.capture(params)?;
        self.analyze(captured)
    }

    /// Stops the transmitter and releases every stage's buffers.
    pub fn shutdown(&mut self) {
        self.transceiver.cleanup();
        self.tone_a.cleanup();
        self.tone_b.cleanup();
        self.fft_a.cleanup();
        self.fft_b.cleanup();
    }
}
