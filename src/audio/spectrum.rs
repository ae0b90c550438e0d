//! Frequency bars for the live visualizer.
//!
//! Mirrors a browser analyser node: 256-point FFT, Hann window, magnitudes
//! smoothed over time and mapped to bytes between `MIN_DB` and `MAX_DB`.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

use super::convert::i16_to_f32;

pub const FFT_SIZE: usize = 256;
pub const BIN_COUNT: usize = FFT_SIZE / 2;

const MIN_DB: f32 = -100.0;
const MAX_DB: f32 = -30.0;
const SMOOTHING: f32 = 0.8;

pub struct SpectrumAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    history: Vec<f32>,
    smoothed: Vec<f32>,
}

impl Default for SpectrumAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl SpectrumAnalyzer {
    pub fn new() -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(FFT_SIZE);

        let n_minus_1 = (FFT_SIZE - 1) as f32;
        let window = (0..FFT_SIZE)
            .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / n_minus_1).cos()))
            .collect();

        Self {
            fft,
            window,
            history: vec![0.0; FFT_SIZE],
            smoothed: vec![0.0; BIN_COUNT],
        }
    }

    /// Feed mono samples; keeps the most recent `FFT_SIZE` of them
    pub fn push(&mut self, samples: &[i16]) {
        let incoming = samples.len().min(FFT_SIZE);
        self.history.drain(..incoming);
        self.history
            .extend(samples[samples.len() - incoming..].iter().map(|&s| i16_to_f32(s)));
    }

    /// Current byte magnitudes, one per frequency bin (0 = silent, 255 = loud)
    pub fn byte_frequency_data(&mut self) -> [u8; BIN_COUNT] {
        let mut buffer: Vec<Complex<f32>> = self
            .history
            .iter()
            .zip(&self.window)
            .map(|(s, w)| Complex::new(s * w, 0.0))
            .collect();
        self.fft.process(&mut buffer);

        let mut out = [0u8; BIN_COUNT];
        for (i, bin) in buffer.iter().take(BIN_COUNT).enumerate() {
            let magnitude = bin.norm() / FFT_SIZE as f32;
            self.smoothed[i] = SMOOTHING * self.smoothed[i] + (1.0 - SMOOTHING) * magnitude;

            let db = if self.smoothed[i] > 0.0 {
                20.0 * self.smoothed[i].log10()
            } else {
                MIN_DB
            };
            let scaled = (db - MIN_DB) / (MAX_DB - MIN_DB);
            out[i] = (scaled.clamp(0.0, 1.0) * 255.0) as u8;
        }
        out
    }

    pub fn reset(&mut self) {
        self.history.iter_mut().for_each(|s| *s = 0.0);
        self.smoothed.iter_mut().for_each(|s| *s = 0.0);
    }
}
