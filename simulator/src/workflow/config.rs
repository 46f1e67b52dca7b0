use crate::generator::target::TargetConfig;
use anyhow::Context;
use echocore::RadarConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Seconds of history kept for plotting.
    pub range_time: f64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self { range_time: 60.0 }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub radar: RadarConfig,
    pub target: TargetConfig,
    pub display: DisplayConfig,
}

/// Command-line values that take precedence over the workflow file.
#[derive(clap::Args, Clone, Debug, Default)]
pub struct Overrides {
    #[arg(long)]
    pub samp_rate: Option<f64>,
    #[arg(long)]
    pub packet_len: Option<usize>,
    #[arg(long)]
    pub decim_fac: Option<usize>,
    #[arg(long)]
    pub center_freq: Option<f64>,
    #[arg(long)]
    pub threshold: Option<f32>,
    /// Initial target range in metres
    #[arg(long)]
    pub target_range: Option<f64>,
    /// Target radial velocity in m/s, positive when closing
    #[arg(long)]
    pub target_velocity: Option<f64>,
    #[arg(long)]
    pub range_time: Option<f64>,
}

impl WorkflowConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading workflow config {}", path_ref.display()))?;
        let config: WorkflowConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing workflow config {}", path_ref.display()))?;
        Ok(config)
    }

    pub fn apply(&mut self, overrides: &Overrides) {
        let radar = &mut self.radar;
        if let Some(samp_rate) = overrides.samp_rate {
            radar.samp_rate = samp_rate;
        }
        if let Some(packet_len) = overrides.packet_len {
            radar.packet_len = packet_len;
        }
        if let Some(decim_fac) = overrides.decim_fac {
            radar.decim_fac = decim_fac;
        }
        if let Some(center_freq) = overrides.center_freq {
            radar.center_freq = center_freq;
        }
        if let Some(threshold) = overrides.threshold {
            radar.threshold = threshold;
        }
        if let Some(range) = overrides.target_range {
            self.target.range = range;
        }
        if let Some(velocity) = overrides.target_velocity {
            self.target.velocity = velocity;
        }
        if let Some(range_time) = overrides.range_time {
            self.display.range_time = range_time;
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.radar
            .validate()
            .context("validating radar section of workflow config")?;
        anyhow::ensure!(
            self.display.range_time > 0.0,
            "display range_time must be positive, got {}",
            self.display.range_time
        );
        anyhow::ensure!(
            self.target.range >= 0.0,
            "target range must be non-negative, got {}",
            self.target.range
        );
        Ok(())
    }
}
