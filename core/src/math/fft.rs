use crate::math::window;
use num_complex::Complex32;
use rustfft::{num_traits::Zero, Fft, FftPlanner};
use std::sync::Arc;

/// Windowed forward FFT of a fixed size, planned once and reused per frame.
pub struct FftHelper {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    scratch: Vec<Complex32>,
}

impl FftHelper {
    pub fn new(size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(size);
        let scratch = vec![Complex32::zero(); fft.get_inplace_scratch_len()];
        Self {
            fft,
            window: window::hann(size),
            scratch,
        }
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Applies the Hann window and transforms `buffer` in place.
    ///
    /// `buffer` must hold exactly `self.len()` samples.
    pub fn forward_in_place(&mut self, buffer: &mut [Complex32]) {
        debug_assert_eq!(buffer.len(), self.window.len());
        for (sample, &weight) in buffer.iter_mut().zip(&self.window) {
            *sample *= weight;
        }
        self.fft.process_with_scratch(buffer, &mut self.scratch);
    }
}
