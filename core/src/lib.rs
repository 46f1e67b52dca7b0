//! Streaming signal-processing core of the dual-tone CW echo-ranging radar.
//!
//! Two tones are synthesized, sent through a radio front end, mixed back to
//! baseband against each reference, decimated, transformed, and correlated.
//! The correlation peak yields the Doppler shift (velocity) and the
//! inter-tone phase (range).

pub mod control;
pub mod math;
pub mod messages;
pub mod params;
pub mod pipeline;
pub mod prelude;
pub mod processing;
pub mod radio;
pub mod telemetry;

pub use control::ControlRequest;
pub use params::{RadarConfig, SharedParams};
pub use pipeline::{EchoPipeline, PipelineError, RunningPipeline};
pub use prelude::{Frame, ProcessingStage, StageError};
