use crate::params::{ConfigError, ParamSnapshot};
use crate::radio::HardwareError;
use num_complex::Complex32;
use std::sync::Arc;

/// One complex I/Q sample.
pub type Sample = Complex32;

/// Fixed-length block of samples corresponding to one radar cycle.
///
/// `len_tag` is the stream's packet-length tag. Stages that change the sample
/// rate either rewrite it or hand it unchanged to a length-scaling step, which
/// must leave it equal to `samples.len()` before any frame-synchronous stage.
#[derive(Debug, Clone)]
pub struct Frame {
    pub seq: u64,
    /// Seconds from the first cycle to the start of this frame's cycle.
    pub elapsed: f64,
    pub len_tag: usize,
    pub samples: Vec<Sample>,
    pub params: Arc<ParamSnapshot>,
}

impl Frame {
    pub fn new(seq: u64, samples: Vec<Sample>, params: Arc<ParamSnapshot>) -> Self {
        Self {
            seq,
            elapsed: 0.0,
            len_tag: samples.len(),
            samples,
            params,
        }
    }

    pub fn with_elapsed(mut self, elapsed: f64) -> Self {
        self.elapsed = elapsed;
        self
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Fails when the carried tag disagrees with the sample count.
    pub fn check_tag(&self, stage: &str) -> StageResult<()> {
        if self.len_tag != self.samples.len() {
            return Err(StageError::Protocol(format!(
                "{stage}: frame {} tagged {} but holds {} samples",
                self.seq,
                self.len_tag,
                self.samples.len()
            )));
        }
        Ok(())
    }
}

/// Checks that two frames expected to be rate-locked line up exactly.
pub fn check_aligned(stage: &str, lhs: &Frame, rhs: &Frame) -> StageResult<()> {
    if lhs.seq != rhs.seq {
        return Err(StageError::Protocol(format!(
            "{stage}: sequence mismatch {} vs {}",
            lhs.seq, rhs.seq
        )));
    }
    if lhs.len() != rhs.len() || lhs.len_tag != rhs.len_tag {
        return Err(StageError::Protocol(format!(
            "{stage}: frame {} length mismatch {}/{} vs {}/{}",
            lhs.seq,
            lhs.len(),
            lhs.len_tag,
            rhs.len(),
            rhs.len_tag
        )));
    }
    Ok(())
}

/// Start-of-cycle marker fanned out to both tone generators.
#[derive(Debug, Clone)]
pub struct CycleTick {
    pub seq: u64,
    /// Sum of the cycle times of every earlier tick.
    pub elapsed: f64,
    pub params: Arc<ParamSnapshot>,
}

/// Output/input sample-rate ratio declared by a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateChange {
    pub interpolation: usize,
    pub decimation: usize,
}

impl RateChange {
    pub const UNITY: RateChange = RateChange {
        interpolation: 1,
        decimation: 1,
    };

    pub fn decimate(factor: usize) -> Self {
        Self {
            interpolation: 1,
            decimation: factor.max(1),
        }
    }

    /// Output length for an input frame of `len` samples.
    pub fn apply(&self, len: usize) -> usize {
        len * self.interpolation / self.decimation
    }
}

/// Broad class of a stage failure, surfaced to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Hardware,
    Protocol,
    Internal,
}

/// Common error type for stage execution.
#[derive(thiserror::Error, Debug)]
pub enum StageError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("hardware error: {0}")]
    Hardware(#[from] HardwareError),
    #[error("protocol violation: {0}")]
    Protocol(String),
    #[error("internal failure: {0}")]
    Internal(String),
}

impl StageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StageError::Config(_) => ErrorKind::Configuration,
            StageError::Hardware(_) => ErrorKind::Hardware,
            StageError::Protocol(_) => ErrorKind::Protocol,
            StageError::Internal(_) => ErrorKind::Internal,
        }
    }
}

pub type StageResult<T> = Result<T, StageError>;

/// Capability interface shared by every pipeline stage.
///
/// `initialize` receives the snapshot in force when the pipeline starts;
/// afterwards a stage picks up parameter changes from the snapshot carried by
/// its next input, never in the middle of a frame.
pub trait ProcessingStage: Send {
    type Input: Send;
    type Output: Send;

    fn name(&self) -> &'static str;

    fn rate(&self) -> RateChange {
        RateChange::UNITY
    }

    fn initialize(&mut self, params: &ParamSnapshot) -> StageResult<()>;

    fn execute(&mut self, input: Self::Input) -> StageResult<Self::Output>;

    fn cleanup(&mut self) {}
}
