use crate::generator::target::SimulatedRadio;
use crate::gui_bridge::bridge::SharedHistory;
use crate::workflow::config::WorkflowConfig;
use anyhow::Context;
use echocore::messages::EstimateMessage;
use echocore::pipeline::{OfflineChain, StopSignal};
use echocore::telemetry::MetricsSnapshot;
use echocore::{EchoPipeline, SharedParams};
use log::info;
use std::sync::Arc;

/// Outcome of an offline run.
pub struct WorkflowResult {
    pub cycles: u64,
    pub detections: usize,
    pub estimates: Vec<EstimateMessage>,
    pub final_target_range: f64,
}

/// Runs the workflow against a [`SimulatedRadio`], feeding every estimate to
/// the shared display history.
#[derive(Clone)]
pub struct Runner {
    config: WorkflowConfig,
    params: Arc<SharedParams>,
    history: SharedHistory,
}

impl Runner {
    pub fn new(config: WorkflowConfig, params: Arc<SharedParams>, history: SharedHistory) -> Self {
        Self {
            config,
            params,
            history,
        }
    }

    fn radio(&self) -> SimulatedRadio {
        SimulatedRadio::new(self.config.target.clone(), self.config.radar.delay_samp)
    }

    fn publish(&self, estimate: &EstimateMessage) {
        let mut history = self
            .history
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        history.push(estimate.clone());
    }

    /// Steps `cycles` radar cycles on the calling thread.
    pub fn execute(&self, cycles: u64) -> anyhow::Result<WorkflowResult> {
        let mut chain = OfflineChain::new(self.radio(), &self.params.snapshot())
            .context("initializing offline chain")?;
        let mut estimates = Vec::new();
        let mut detections = 0;
        for cycle in 0..cycles {
            let report = chain
                .process(self.params.snapshot())
                .with_context(|| format!("processing cycle {cycle}"))?;
            if report.detection.is_some() {
                detections += 1;
            }
            if let Some(estimate) = report.estimate {
                self.publish(&estimate);
                estimates.push(estimate);
            }
        }
        let final_target_range = chain.radio().range();
        chain.shutdown();
        Ok(WorkflowResult {
            cycles,
            detections,
            estimates,
            final_target_range,
        })
    }

    /// Runs the threaded pipeline until `max_cycles` elapse, `stop` is raised,
    /// or a stage fails.
    pub fn run_live(
        &self,
        max_cycles: Option<u64>,
        stop: StopSignal,
    ) -> anyhow::Result<MetricsSnapshot> {
        let mut pipeline =
            EchoPipeline::new(Arc::clone(&self.params), self.radio()).with_stop_signal(stop);
        if let Some(cycles) = max_cycles {
            pipeline = pipeline.with_max_cycles(cycles);
        }
        let mut running = pipeline.start().context("starting pipeline")?;
        let mut estimates = running
            .take_estimates()
            .context("estimate stream already taken")?;

        while let Some(estimate) = estimates.recv() {
            info!(
                "[display] cycle {} range {:.2} m velocity {}",
                estimate.seq,
                estimate.range,
                estimate
                    .velocity
                    .map_or_else(|| "n/a".to_string(), |v| format!("{v:.3} m/s"))
            );
            self.publish(&estimate);
            let metrics = running.metrics();
            self.history
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .set_metrics(metrics);
        }

        let metrics = running.join().context("pipeline aborted")?;
        self.history
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .set_metrics(metrics);
        Ok(metrics)
    }
}
