//! Assembly and scheduling of the echo-ranging graph.
//!
//! Every stage runs on its own thread. Stream edges carry frames with
//! backpressure; detections and estimates travel on drop-newest message
//! channels so a slow consumer never stalls the sample stream.
//!
//! ```text
//! clock ─┬─ tone_a ─┬──────────────┐
//!        │          └─ mixer_a ◄─┐ │
//!        └─ tone_b ─┬─ mixer_b ◄─┤ ▼
//!                   └────────► transceiver
//! mixer_x → decim_x → scale_x → fft_x ─► correlator → peak ⇢ estimator ⇢ display
//! ```

pub mod edge;
pub mod offline;
pub mod worker;

pub use edge::{MessageReceiver, StopSignal};
pub use offline::{CapturedCycle, CycleReport, OfflineChain};

use crate::messages::{DetectionMessage, EstimateMessage};
use crate::params::{ConfigError, SharedParams};
use crate::prelude::{ErrorKind, ProcessingStage, StageError};
use crate::processing::{
    ConjugateMixer, Decimator, LengthScaler, PeakDetector, RangeVelocityEstimator, SpectrumStage,
    ToneChannel, ToneStage, TransceiverAdapter,
};
use crate::radio::RadioFrontEnd;
use crate::telemetry::log::LogManager;
use crate::telemetry::metrics::{MetricsRecorder, MetricsSnapshot};
use edge::{edge, message_channel};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use worker::{drive, drive_clock, CycleClock, Optional, Sink, Source, Tee, Zip};

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("stage `{stage}` failed: {source}")]
    Stage {
        stage: &'static str,
        #[source]
        source: StageError,
    },
    #[error("stage `{0}` panicked")]
    Panicked(&'static str),
    #[error("failed to spawn stage `{stage}`: {source}")]
    Spawn {
        stage: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Config(_) => ErrorKind::Configuration,
            PipelineError::Stage { source, .. } => source.kind(),
            PipelineError::Panicked(_) | PipelineError::Spawn { .. } => ErrorKind::Internal,
        }
    }
}

/// First fatal error reported by any stage thread.
#[derive(Default)]
struct FailureSlot {
    first: Mutex<Option<PipelineError>>,
}

impl FailureSlot {
    fn record(&self, error: PipelineError) {
        if let Ok(mut slot) = self.first.lock() {
            if slot.is_none() {
                *slot = Some(error);
            }
        }
    }

    fn take(&self) -> Option<PipelineError> {
        self.first.lock().ok().and_then(|mut slot| slot.take())
    }
}

/// Fixed dual-tone CW topology, ready to be started against a radio.
pub struct EchoPipeline<R> {
    params: Arc<SharedParams>,
    radio: R,
    max_cycles: Option<u64>,
    stop: StopSignal,
}

impl<R: RadioFrontEnd + 'static> EchoPipeline<R> {
    pub fn new(params: Arc<SharedParams>, radio: R) -> Self {
        Self {
            params,
            radio,
            max_cycles: None,
            stop: StopSignal::new(),
        }
    }

    /// Ends the run on its own after `cycles` radar cycles.
    pub fn with_max_cycles(mut self, cycles: u64) -> Self {
        self.max_cycles = Some(cycles);
        self
    }

    /// Shares `stop` with the run, e.g. so a signal handler can end it.
    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    pub fn start(self) -> Result<RunningPipeline, PipelineError> {
        let initial = self.params.snapshot();
        initial.config.validate()?;
        let capacity = initial.config.min_output_buffer;
        let messages = initial.config.message_capacity;

        let stop = self.stop;
        let metrics = Arc::new(MetricsRecorder::new());
        let mut launcher = Launcher {
            initial: initial.clone(),
            stop: stop.clone(),
            metrics: Arc::clone(&metrics),
            failure: Arc::new(FailureSlot::default()),
            handles: Vec::new(),
        };

        let (tick_a_tx, tick_a_rx) = edge(capacity);
        let (tick_b_tx, tick_b_rx) = edge(capacity);
        let (tx_a_tx, tx_a_rx) = edge(capacity);
        let (tx_b_tx, tx_b_rx) = edge(capacity);
        let (ref_a_tx, ref_a_rx) = edge(capacity);
        let (ref_b_tx, ref_b_rx) = edge(capacity);
        let (echo_a_tx, echo_a_rx) = edge(capacity);
        let (echo_b_tx, echo_b_rx) = edge(capacity);
        let (mixed_a_tx, mixed_a_rx) = edge(capacity);
        let (mixed_b_tx, mixed_b_rx) = edge(capacity);
        let (decim_a_tx, decim_a_rx) = edge(capacity);
        let (decim_b_tx, decim_b_rx) = edge(capacity);
        let (scaled_a_tx, scaled_a_rx) = edge(capacity);
        let (scaled_b_tx, scaled_b_rx) = edge(capacity);
        let (spectrum_a_tx, spectrum_a_rx) = edge(capacity);
        let (spectrum_b_tx, spectrum_b_rx) = edge(capacity);
        let (corr_tx, corr_rx) = edge(capacity);
        let (detection_tx, detection_rx) =
            message_channel::<DetectionMessage>("detections", messages, Arc::clone(&metrics));
        let (estimate_tx, estimate_rx) =
            message_channel::<EstimateMessage>("estimates", messages, Arc::clone(&metrics));

        let mut clock = CycleClock::new(Arc::clone(&self.params), stop.clone(), self.max_cycles);
        let mut ticks = Tee::new(tick_a_tx, tick_b_tx);
        launcher.spawn_raw("clock", move || {
            drive_clock(&mut clock, &mut ticks);
            Ok(())
        })?;

        launcher.spawn(
            ToneStage::new(ToneChannel::A),
            tick_a_rx,
            Tee::new(tx_a_tx, ref_a_tx),
        )?;
        launcher.spawn(
            ToneStage::new(ToneChannel::B),
            tick_b_rx,
            Tee::new(tx_b_tx, ref_b_tx),
        )?;
        launcher.spawn(
            TransceiverAdapter::new(self.radio),
            Zip::new(tx_a_rx, tx_b_rx),
            Tee::new(echo_a_tx, echo_b_tx),
        )?;
        launcher.spawn(
            ConjugateMixer::new("mixer_a"),
            Zip::new(echo_a_rx, ref_a_rx),
            mixed_a_tx,
        )?;
        launcher.spawn(
            ConjugateMixer::new("mixer_b"),
            Zip::new(echo_b_rx, ref_b_rx),
            mixed_b_tx,
        )?;
        launcher.spawn(Decimator::new("decim_a"), mixed_a_rx, decim_a_tx)?;
        launcher.spawn(Decimator::new("decim_b"), mixed_b_rx, decim_b_tx)?;
        launcher.spawn(LengthScaler::new("scale_a"), decim_a_rx, scaled_a_tx)?;
        launcher.spawn(LengthScaler::new("scale_b"), decim_b_rx, scaled_b_tx)?;
        launcher.spawn(SpectrumStage::new("fft_a"), scaled_a_rx, spectrum_a_tx)?;
        launcher.spawn(SpectrumStage::new("fft_b"), scaled_b_rx, spectrum_b_tx)?;
        launcher.spawn(
            ConjugateMixer::correlator(),
            Zip::new(spectrum_a_rx, spectrum_b_rx),
            corr_tx,
        )?;
        launcher.spawn(
            PeakDetector::new(),
            corr_rx,
            CountingSink {
                inner: Optional(detection_tx),
                metrics: Arc::clone(&metrics),
            },
        )?;
        launcher.spawn(RangeVelocityEstimator::new(), detection_rx, estimate_tx)?;

        LogManager::for_stage("pipeline").record(&format!(
            "started {} stages, edge capacity {} frames",
            launcher.handles.len(),
            capacity
        ));

        Ok(RunningPipeline {
            params: self.params,
            stop,
            metrics,
            failure: launcher.failure,
            handles: launcher.handles,
            estimates: Some(estimate_rx),
        })
    }
}

/// Counts detections on their way to the message channel.
struct CountingSink<S> {
    inner: S,
    metrics: Arc<MetricsRecorder>,
}

impl<S: Sink<Option<DetectionMessage>>> Sink<Option<DetectionMessage>> for CountingSink<S> {
    fn push(&mut self, item: Option<DetectionMessage>) -> bool {
        if item.is_some() {
            self.metrics.record_detection();
        }
        self.inner.push(item)
    }
}

struct Launcher {
    initial: Arc<crate::params::ParamSnapshot>,
    stop: StopSignal,
    metrics: Arc<MetricsRecorder>,
    failure: Arc<FailureSlot>,
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl Launcher {
    fn spawn<S, I, O>(&mut self, mut stage: S, mut source: I, mut sink: O) -> Result<(), PipelineError>
    where
        S: ProcessingStage + 'static,
        I: Source<S::Input> + Send + 'static,
        O: Sink<S::Output> + Send + 'static,
    {
        let initial = Arc::clone(&self.initial);
        let stop = self.stop.clone();
        let metrics = Arc::clone(&self.metrics);
        self.spawn_raw(stage.name(), move || {
            drive(&mut stage, &initial, &mut source, &mut sink, &stop, &metrics)
        })
    }

    fn spawn_raw<F>(&mut self, name: &'static str, body: F) -> Result<(), PipelineError>
    where
        F: FnOnce() -> Result<(), StageError> + Send + 'static,
    {
        let stop = self.stop.clone();
        let failure = Arc::clone(&self.failure);
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                if let Err(source) = body() {
                    stop.raise();
                    failure.record(PipelineError::Stage {
                        stage: name,
                        source,
                    });
                }
            });
        match handle {
            Ok(handle) => {
                self.handles.push((name, handle));
                Ok(())
            }
            Err(source) => {
                // Already-started stages wind down once the clock stops.
                self.stop.raise();
                Err(PipelineError::Spawn {
                    stage: name,
                    source,
                })
            }
        }
    }
}

/// Handle to a started pipeline.
pub struct RunningPipeline {
    params: Arc<SharedParams>,
    stop: StopSignal,
    metrics: Arc<MetricsRecorder>,
    failure: Arc<FailureSlot>,
    handles: Vec<(&'static str, JoinHandle<()>)>,
    estimates: Option<MessageReceiver<EstimateMessage>>,
}

impl RunningPipeline {
    /// Live parameters; setters take effect at each stage's next frame.
    pub fn params(&self) -> &Arc<SharedParams> {
        &self.params
    }

    /// Result stream for the display sink. Can be taken once.
    pub fn take_estimates(&mut self) -> Option<MessageReceiver<EstimateMessage>> {
        self.estimates.take()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Asks every stage to wind down; the transmitter is silenced as the
    /// transceiver exits.
    pub fn stop(&self) {
        self.stop.raise();
    }

    /// Waits for every stage thread and reports the first fatal error.
    pub fn join(self) -> Result<MetricsSnapshot, PipelineError> {
        let RunningPipeline {
            stop,
            metrics,
            failure,
            handles,
            ..
        } = self;

        let mut panicked = None;
        for (name, handle) in handles {
            if handle.join().is_err() {
                stop.raise();
                panicked.get_or_insert(name);
            }
        }

        let snapshot = metrics.snapshot();
        let logger = LogManager::for_stage("pipeline");
        if let Some(error) = failure.take() {
            logger.warn(&format!("pipeline aborted: {error}"));
            return Err(error);
        }
        if let Some(name) = panicked {
            return Err(PipelineError::Panicked(name));
        }
        logger.record_json("pipeline finished", &snapshot);
        Ok(snapshot)
    }
}
