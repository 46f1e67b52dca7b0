use crate::params::{ParamSnapshot, SharedParams};
use crate::pipeline::edge::{EdgeReceiver, EdgeSender, MessageReceiver, MessageSender, StopSignal};
use crate::prelude::{CycleTick, ProcessingStage, StageResult};
use crate::telemetry::log::LogManager;
use crate::telemetry::metrics::MetricsRecorder;
use std::sync::Arc;

/// Where a stage thread pulls its next input from.
pub trait Source<T> {
    /// `None` ends the stage.
    fn pull(&mut self) -> Option<T>;
}

/// Where a stage thread pushes its output.
pub trait Sink<T> {
    /// `false` means nobody downstream is listening any more.
    fn push(&mut self, item: T) -> bool;
}

impl<T> Source<T> for EdgeReceiver<T> {
    fn pull(&mut self) -> Option<T> {
        self.recv()
    }
}

impl<T> Source<T> for MessageReceiver<T> {
    fn pull(&mut self) -> Option<T> {
        self.recv()
    }
}

impl<T> Sink<T> for EdgeSender<T> {
    fn push(&mut self, item: T) -> bool {
        self.send(item)
    }
}

impl<T> Sink<T> for MessageSender<T> {
    fn push(&mut self, item: T) -> bool {
        self.publish(item);
        true
    }
}

/// Pairs the heads of two rate-locked edges.
pub struct Zip<A, B> {
    left: EdgeReceiver<A>,
    right: EdgeReceiver<B>,
}

impl<A, B> Zip<A, B> {
    pub fn new(left: EdgeReceiver<A>, right: EdgeReceiver<B>) -> Self {
        Self { left, right }
    }
}

impl<A, B> Source<(A, B)> for Zip<A, B> {
    fn pull(&mut self) -> Option<(A, B)> {
        let left = self.left.pull()?;
        let right = self.right.pull()?;
        Some((left, right))
    }
}

/// Fans every item out to two edges.
pub struct Tee<T> {
    first: EdgeSender<T>,
    second: EdgeSender<T>,
}

impl<T> Tee<T> {
    pub fn new(first: EdgeSender<T>, second: EdgeSender<T>) -> Self {
        Self { first, second }
    }
}

impl<T: Clone> Sink<T> for Tee<T> {
    fn push(&mut self, item: T) -> bool {
        self.first.send(item.clone()) && self.second.send(item)
    }
}

/// Forwards only `Some` outputs, for stages that may emit nothing.
pub struct Optional<S>(pub S);

impl<T, S: Sink<T>> Sink<Option<T>> for Optional<S> {
    fn push(&mut self, item: Option<T>) -> bool {
        match item {
            Some(item) => self.0.push(item),
            None => true,
        }
    }
}

/// Source of cycle ticks: one parameter snapshot per radar cycle.
pub struct CycleClock {
    params: Arc<SharedParams>,
    stop: StopSignal,
    next_seq: u64,
    elapsed: f64,
    remaining: Option<u64>,
}

impl CycleClock {
    pub fn new(params: Arc<SharedParams>, stop: StopSignal, max_cycles: Option<u64>) -> Self {
        Self {
            params,
            stop,
            next_seq: 0,
            elapsed: 0.0,
            remaining: max_cycles,
        }
    }
}

impl Source<CycleTick> for CycleClock {
    fn pull(&mut self) -> Option<CycleTick> {
        if self.stop.is_raised() {
            return None;
        }
        if let Some(remaining) = self.remaining.as_mut() {
            if *remaining == 0 {
                return None;
            }
            *remaining -= 1;
        }
        let params = self.params.snapshot();
        let tick = CycleTick {
            seq: self.next_seq,
            elapsed: self.elapsed,
            params,
        };
        self.next_seq += 1;
        self.elapsed += tick.params.derived.time_res;
        Some(tick)
    }
}

/// Runs `stage` until its source dries up, its sink closes, the stop signal
/// is raised, or it fails. `cleanup` runs on every exit path.
pub fn drive<S, I, O>(
    stage: &mut S,
    initial: &ParamSnapshot,
    source: &mut I,
    sink: &mut O,
    stop: &StopSignal,
    metrics: &MetricsRecorder,
) -> StageResult<()>
where
    S: ProcessingStage,
    I: Source<S::Input>,
    O: Sink<S::Output>,
{
    let logger = LogManager::for_stage(stage.name());
    let result = run(stage, initial, source, sink, stop, metrics);
    stage.cleanup();
    match &result {
        Ok(()) => logger.debug("stage finished"),
        Err(err) => {
            metrics.record_error();
            logger.warn(&format!("stage aborted: {err}"));
        }
    }
    result
}

fn run<S, I, O>(
    stage: &mut S,
    initial: &ParamSnapshot,
    source: &mut I,
    sink: &mut O,
    stop: &StopSignal,
    metrics: &MetricsRecorder,
) -> StageResult<()>
where
    S: ProcessingStage,
    I: Source<S::Input>,
    O: Sink<S::Output>,
{
    stage.initialize(initial)?;
    while let Some(input) = source.pull() {
        if stop.is_raised() {
            break;
        }
        let output = stage.execute(input)?;
        metrics.record_processed();
        if !sink.push(output) {
            break;
        }
    }
    Ok(())
}

/// Forwards cycle ticks from the clock to both tone generators.
pub fn drive_clock(clock: &mut CycleClock, sink: &mut Tee<CycleTick>) {
    while let Some(tick) = clock.pull() {
        if !sink.push(tick) {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::RadarConfig;
    use crate::pipeline::edge::edge;
    use crate::prelude::StageError;

    struct Doubler {
        fail_on: Option<u32>,
        cleaned: bool,
    }

    impl ProcessingStage for Doubler {
        type Input = u32;
        type Output = u32;

        fn name(&self) -> &'static str {
            "doubler"
        }

        fn initialize(&mut self, _params: &ParamSnapshot) -> StageResult<()> {
            Ok(())
        }

        fn execute(&mut self, input: u32) -> StageResult<u32> {
            if Some(input) == self.fail_on {
                return Err(StageError::Internal("boom".into()));
            }
            Ok(input * 2)
        }

        fn cleanup(&mut self) {
            self.cleaned = true;
        }
    }

    fn snapshot() -> ParamSnapshot {
        ParamSnapshot::new(RadarConfig::default()).unwrap()
    }

    #[test]
    fn drive_processes_until_source_closes() {
        let (in_tx, mut in_rx) = edge::<u32>(8);
        let (mut out_tx, mut out_rx) = edge::<u32>(8);
        for i in 1..=3 {
            in_tx.send(i);
        }
        drop(in_tx);

        let mut stage = Doubler {
            fail_on: None,
            cleaned: false,
        };
        let metrics = MetricsRecorder::new();
        drive(
            &mut stage,
            &snapshot(),
            &mut in_rx,
            &mut out_tx,
            &StopSignal::new(),
            &metrics,
        )
        .unwrap();
        drop(out_tx);

        let out: Vec<u32> = std::iter::from_fn(|| out_rx.recv()).collect();
        assert_eq!(out, vec![2, 4, 6]);
        assert!(stage.cleaned);
        assert_eq!(metrics.snapshot().processed, 3);
    }

    #[test]
    fn failing_stage_still_cleans_up() {
        let (in_tx, mut in_rx) = edge::<u32>(8);
        let (mut out_tx, _out_rx) = edge::<u32>(8);
        in_tx.send(1);
        in_tx.send(2);
        drop(in_tx);

        let mut stage = Doubler {
            fail_on: Some(2),
            cleaned: false,
        };
        let metrics = MetricsRecorder::new();
        let err = drive(
            &mut stage,
            &snapshot(),
            &mut in_rx,
            &mut out_tx,
            &StopSignal::new(),
            &metrics,
        )
        .unwrap_err();
        assert!(matches!(err, StageError::Internal(_)));
        assert!(stage.cleaned);
        assert_eq!(metrics.snapshot().errors, 1);
    }

    #[test]
    fn clock_honours_cycle_limit_and_stop() {
        let params = Arc::new(SharedParams::new(RadarConfig::default()).unwrap());
        let stop = StopSignal::new();
        let mut clock = CycleClock::new(Arc::clone(&params), stop.clone(), Some(2));
        assert_eq!(clock.pull().map(|tick| tick.seq), Some(0));
        assert_eq!(clock.pull().map(|tick| tick.seq), Some(1));
        assert!(clock.pull().is_none());

        let mut endless = CycleClock::new(params, stop.clone(), None);
        assert!(endless.pull().is_some());
        stop.raise();
        assert!(endless.pull().is_none());
    }

    #[test]
    fn clock_accumulates_cycle_times_across_updates() {
        let config = RadarConfig {
            samp_rate: 8192.0,
            packet_len: 8192,
            freq: [-1000.0, 1000.0],
            decim_fac: 16,
            ..RadarConfig::default()
        };
        let params = Arc::new(SharedParams::new(config).unwrap());
        let mut clock = CycleClock::new(Arc::clone(&params), StopSignal::new(), None);
        let first = clock.pull().unwrap();
        let second = clock.pull().unwrap();
        params.set_packet_len(2048).unwrap();
        let third = clock.pull().unwrap();
        let fourth = clock.pull().unwrap();
        let elapsed: Vec<f64> = [first, second, third, fourth]
            .iter()
            .map(|tick| tick.elapsed)
            .collect();
        assert_eq!(elapsed, vec![0.0, 1.0, 2.0, 2.25]);
    }

    #[test]
    fn optional_sink_skips_empty_outputs() {
        let (tx, mut rx) = edge::<u32>(4);
        let mut sink = Optional(tx);
        assert!(sink.push(None));
        assert!(sink.push(Some(9)));
        drop(sink);
        assert_eq!(rx.recv(), Some(9));
        assert_eq!(rx.recv(), None);
    }
}
