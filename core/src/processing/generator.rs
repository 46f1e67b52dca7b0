use crate::params::{ConfigError, ParamSnapshot};
use crate::prelude::{CycleTick, Frame, ProcessingStage, Sample, StageError, StageResult};
use crate::telemetry::log::LogManager;
use std::f64::consts::TAU;

/// Continuous complex tone, emitted one frame at a time.
///
/// The phase carries over between frames; [`CwGenerator::restart`] rewinds it.
#[derive(Debug, Clone)]
pub struct CwGenerator {
    frequency: f64,
    samp_rate: f64,
    frame_len: usize,
    amplitude: f32,
    phase: f64,
}

impl CwGenerator {
    pub fn new(
        frequency: f64,
        samp_rate: f64,
        frame_len: usize,
        amplitude: f32,
    ) -> Result<Self, ConfigError> {
        if !(samp_rate.is_finite() && samp_rate > 0.0) {
            return Err(ConfigError::InvalidSampleRate(samp_rate));
        }
        if frame_len == 0 {
            return Err(ConfigError::EmptyPacket);
        }
        let nyquist = samp_rate / 2.0;
        if !frequency.is_finite() || frequency.abs() > nyquist {
            return Err(ConfigError::AboveNyquist {
                freq: frequency,
                nyquist,
            });
        }
        if !(amplitude.is_finite() && amplitude >= 0.0) {
            return Err(ConfigError::NegativeAmplitude(amplitude));
        }
        Ok(Self {
            frequency,
            samp_rate,
            frame_len,
            amplitude,
            phase: 0.0,
        })
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    pub fn set_amplitude(&mut self, amplitude: f32) {
        self.amplitude = amplitude;
    }

    pub fn restart(&mut self) {
        self.phase = 0.0;
    }

    pub fn next_frame(&mut self) -> Vec<Sample> {
        let step = TAU * self.frequency / self.samp_rate;
        let mut samples = Vec::with_capacity(self.frame_len);
        for _ in 0..self.frame_len {
            samples.push(Sample::new(
                self.amplitude * self.phase.cos() as f32,
                self.amplitude * self.phase.sin() as f32,
            ));
            self.phase = (self.phase + step).rem_euclid(TAU);
        }
        samples
    }
}

impl Iterator for CwGenerator {
    type Item = Vec<Sample>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.next_frame())
    }
}

/// Which of the two transmitted tones a generator stage produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToneChannel {
    A,
    B,
}

impl ToneChannel {
    fn index(self) -> usize {
        match self {
            ToneChannel::A => 0,
            ToneChannel::B => 1,
        }
    }
}

/// Pipeline stage wrapping a [`CwGenerator`] for one tone.
pub struct ToneStage {
    channel: ToneChannel,
    generator: Option<CwGenerator>,
    version: u64,
    logger: LogManager,
}

impl ToneStage {
    pub fn new(channel: ToneChannel) -> Self {
        let name = match channel {
            ToneChannel::A => "tone_a",
            ToneChannel::B => "tone_b",
        };
        Self {
            channel,
            generator: None,
            version: 0,
            logger: LogManager::for_stage(name),
        }
    }

    fn refresh(&mut self, params: &ParamSnapshot) -> StageResult<()> {
        let config = &params.config;
        let frequency = config.freq[self.channel.index()];
        match self.generator.as_mut() {
            Some(generator)
                if generator.frequency() == frequency
                    && generator.frame_len() == config.packet_len
                    && generator.samp_rate == config.samp_rate =>
            {
                generator.set_amplitude(config.amplitude);
            }
            _ => {
                self.generator = Some(CwGenerator::new(
                    frequency,
                    config.samp_rate,
                    config.packet_len,
                    config.amplitude,
                )?);
                self.logger.record(&format!(
                    "tone {:.1} Hz, {} samples per frame",
                    frequency, config.packet_len
                ));
            }
        }
        self.version = params.version;
        Ok(())
    }
}

impl ProcessingStage for ToneStage {
    type Input = CycleTick;
    type Output = Frame;

    fn name(&self) -> &'static str {
        match self.channel {
            ToneChannel::A => "tone_a",
            ToneChannel::B => "tone_b",
        }
    }

    fn initialize(&mut self, params: &ParamSnapshot) -> StageResult<()> {
        self.generator = None;
        self.refresh(params)
    }

    fn execute(&mut self, tick: CycleTick) -> StageResult<Frame> {
        if self.generator.is_none() || tick.params.version != self.version {
            self.refresh(&tick.params)?;
        }
        let generator = self
            .generator
            .as_mut()
            .ok_or_else(|| StageError::Internal("generator not configured".into()))?;
        let samples = generator.next_frame();
        Ok(Frame::new(tick.seq, samples, tick.params).with_elapsed(tick.elapsed))
    }

    fn cleanup(&mut self) {
        self.generator = None;
    }
}
