//! Offline time stretching and pitch shifting over whole buffers.
//!
//! Time stretch is a phase vocoder: STFT with a Hann window, magnitude
//! interpolation between analysis frames, phase accumulation from the
//! measured instantaneous frequency, then overlap-add resynthesis normalised
//! by the summed squared window.
//!
//! Pitch shift combines a stretch by `2^(-steps/12)` with a resample back to
//! the input length, so the sample count never changes. Upward shifts resample
//! first and downward shifts stretch first, which keeps every intermediate
//! buffer no longer than the input.

use rustfft::num_complex::Complex32;
use rustfft::{Fft, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;
use thiserror::Error;

pub const FFT_SIZE: usize = 2048;
pub const HOP_SIZE: usize = FFT_SIZE / 4;
pub const BINS_PER_OCTAVE: f64 = 12.0;

#[derive(Error, Debug, PartialEq)]
pub enum DspError {
    #[error("stretch rate must be finite and positive, got {0}")]
    InvalidRate(f64),
    #[error("pitch shift must be finite, got {0}")]
    InvalidSteps(f64),
    #[error("stretch of {len} samples by {rate} is too large")]
    TooLong { len: usize, rate: f64 },
}

/// Upper bound for a time-stretch output, in samples.
const MAX_SAMPLES: f64 = (1u64 << 27) as f64;

/// Changes duration by `1 / rate` without changing pitch.
///
/// `rate > 1` shortens, `rate < 1` lengthens. Output length is `round(len / rate)`.
pub fn time_stretch(samples: &[f32], rate: f64) -> Result<Vec<f32>, DspError> {
    if !rate.is_finite() || rate <= 0.0 {
        return Err(DspError::InvalidRate(rate));
    }
    let target = (samples.len() as f64 / rate).round();
    if target > MAX_SAMPLES {
        return Err(DspError::TooLong {
            len: samples.len(),
            rate,
        });
    }
    let target = target as usize;
    if samples.is_empty() || target == 0 {
        return Ok(vec![0.0; target]);
    }

    let mut vocoder = PhaseVocoder::new(FFT_SIZE, HOP_SIZE);
    let analysis = vocoder.stft(samples);
    Ok(vocoder.resynthesize(&analysis, rate, target))
}

/// Shifts pitch by `n_steps` semitones (fractional allowed) and keeps the sample count.
pub fn pitch_shift(samples: &[f32], n_steps: f64) -> Result<Vec<f32>, DspError> {
    if !n_steps.is_finite() {
        return Err(DspError::InvalidSteps(n_steps));
    }
    if n_steps == 0.0 || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let rate = 2f64.powf(-n_steps / BINS_PER_OCTAVE);
    // Order the two stages so no intermediate buffer outgrows the input.
    let shifted = if rate < 1.0 {
        let shortened = ((samples.len() as f64 * rate).round() as usize).max(1);
        time_stretch(&resample_linear(samples, shortened), rate)?
    } else {
        time_stretch(samples, rate)?
    };
    Ok(resample_linear(&shifted, samples.len()))
}

/// Linear-interpolation resampling of `samples` onto exactly `target_len` points.
pub fn resample_linear(samples: &[f32], target_len: usize) -> Vec<f32> {
    if target_len == 0 {
        return Vec::new();
    }
    if samples.is_empty() {
        return vec![0.0; target_len];
    }
    if samples.len() == target_len {
        return samples.to_vec();
    }

    let step = samples.len() as f64 / target_len as f64;
    let last = samples.len() - 1;
    (0..target_len)
        .map(|i| {
            let pos = i as f64 * step;
            let idx = pos.floor() as usize;
            if idx >= last {
                return samples[last];
            }
            let frac = (pos - idx as f64) as f32;
            samples[idx] + (samples[idx + 1] - samples[idx]) * frac
        })
        .collect()
}

struct PhaseVocoder {
    fft_size: usize,
    hop: usize,
    window: Vec<f32>,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
    scratch: Vec<Complex32>,
}

impl PhaseVocoder {
    fn new(fft_size: usize, hop: usize) -> Self {
        let mut planner = FftPlanner::<f32>::new();
        PhaseVocoder {
            fft_size,
            hop,
            window: hann_window(fft_size),
            forward: planner.plan_fft_forward(fft_size),
            inverse: planner.plan_fft_inverse(fft_size),
            scratch: vec![Complex32::new(0.0, 0.0); fft_size],
        }
    }

    fn bins(&self) -> usize {
        self.fft_size / 2 + 1
    }

    /// Centered STFT: the signal is padded by half a window on both sides.
    fn stft(&mut self, samples: &[f32]) -> Vec<Vec<Complex32>> {
        let pad = self.fft_size / 2;
        let mut padded = vec![0.0f32; samples.len() + 2 * pad];
        padded[pad..pad + samples.len()].copy_from_slice(samples);
        if padded.len() < self.fft_size {
            padded.resize(self.fft_size, 0.0);
        }

        let frames = 1 + (padded.len() - self.fft_size) / self.hop;
        let bins = self.bins();
        let mut spectrum = Vec::with_capacity(frames);
        for frame in 0..frames {
            let start = frame * self.hop;
            for (i, slot) in self.scratch.iter_mut().enumerate() {
                *slot = Complex32::new(padded[start + i] * self.window[i], 0.0);
            }
            self.forward.process(&mut self.scratch);
            spectrum.push(self.scratch[..bins].to_vec());
        }
        spectrum
    }

    /// Stretches `analysis` by `rate` and overlap-adds each synthesis frame as
    /// soon as it is built. The result is trimmed (or zero-padded) to `length`.
    fn resynthesize(&mut self, analysis: &[Vec<Complex32>], rate: f64, length: usize) -> Vec<f32> {
        let n = self.fft_size;
        let bins = self.bins();
        let phase_advance: Vec<f32> = (0..bins)
            .map(|k| 2.0 * PI * k as f32 * self.hop as f32 / n as f32)
            .collect();
        let silent = vec![Complex32::new(0.0, 0.0); bins];

        let out_frames = (analysis.len() as f64 / rate).ceil() as usize;
        let total = n + self.hop * out_frames.saturating_sub(1);
        let mut signal = vec![0.0f32; total];
        let mut window_sum = vec![0.0f32; total];

        let mut phase: Vec<f32> = analysis[0].iter().map(|c| c.arg()).collect();
        let mut frame = vec![Complex32::new(0.0, 0.0); bins];
        for t in 0..out_frames {
            let step = t as f64 * rate;
            let idx = step.floor() as usize;
            if idx >= analysis.len() {
                break;
            }
            let alpha = (step - idx as f64) as f32;
            let current = &analysis[idx];
            let next = analysis.get(idx + 1).unwrap_or(&silent);

            for k in 0..bins {
                let magnitude = (1.0 - alpha) * current[k].norm() + alpha * next[k].norm();
                frame[k] = Complex32::from_polar(magnitude, phase[k]);

                let deviation = wrap_phase(next[k].arg() - current[k].arg() - phase_advance[k]);
                phase[k] = wrap_phase(phase[k] + phase_advance[k] + deviation);
            }
            self.overlap_add(&frame, t * self.hop, &mut signal, &mut window_sum);
        }

        for (s, w) in signal.iter_mut().zip(&window_sum) {
            if *w > 1e-8 {
                *s /= *w;
            }
        }

        let pad = n / 2;
        let mut out: Vec<f32> = signal.into_iter().skip(pad).take(length).collect();
        out.resize(length, 0.0);
        out
    }

    /// Inverse FFT of one half spectrum, windowed and added at `start`.
    fn overlap_add(
        &mut self,
        frame: &[Complex32],
        start: usize,
        signal: &mut [f32],
        window_sum: &mut [f32],
    ) {
        let n = self.fft_size;
        let bins = self.bins();
        let scale = 1.0 / n as f32;

        self.scratch[..bins].copy_from_slice(frame);
        for k in 1..n - bins + 1 {
            self.scratch[n - k] = frame[k].conj();
        }
        self.inverse.process(&mut self.scratch);

        for i in 0..n {
            let w = self.window[i];
            signal[start + i] += self.scratch[i].re * scale * w;
            window_sum[start + i] += w * w;
        }
    }
}

/// Periodic Hann window.
fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / size as f32).cos()))
        .collect()
}

/// Wraps a phase into `[-PI, PI]`.
#[inline]
fn wrap_phase(phase: f32) -> f32 {
    phase - 2.0 * PI * (phase / (2.0 * PI)).round()
}
