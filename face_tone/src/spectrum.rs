//! Spectrum analysis of the synthesizer output.
//!
//! The audio callback pushes every rendered sample into a [`SpectrumTap`];
//! the visualizer samples it once per display frame through a
//! [`SpectrumAnalyser`], which behaves like a browser analyser node:
//! Blackman window, magnitude averaged over time, dB mapped onto 0–255.

use rustfft::num_complex::Complex32;
use rustfft::{Fft, FftPlanner};
use std::f32::consts::TAU;
use std::sync::{Arc, Mutex, PoisonError};

use crate::config::AudioConfig;

// ════════════════════════════════════════════════════════════════════════════
// SpectrumTap — ring buffer fed by the audio callback
// ════════════════════════════════════════════════════════════════════════════

struct Ring {
    buf:  Vec<f32>,
    head: usize,
}

/// The most recent `capacity` mono output samples.
pub struct SpectrumTap {
    ring: Mutex<Ring>,
}

impl SpectrumTap {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(SpectrumTap {
            ring: Mutex::new(Ring { buf: vec![0.0; capacity.max(1)], head: 0 }),
        })
    }

    pub fn capacity(&self) -> usize {
        self.ring.lock().unwrap_or_else(PoisonError::into_inner).buf.len()
    }

    pub fn push(&self, samples: &[f32]) {
        let mut ring = self.ring.lock().unwrap_or_else(PoisonError::into_inner);
        let len = ring.buf.len();
        for &s in samples {
            let h = ring.head;
            ring.buf[h] = s;
            ring.head = (h + 1) % len;
        }
    }

    /// Copy out the window, oldest sample first.
    pub fn snapshot(&self, out: &mut Vec<f32>) {
        let ring = self.ring.lock().unwrap_or_else(PoisonError::into_inner);
        out.clear();
        out.extend_from_slice(&ring.buf[ring.head..]);
        out.extend_from_slice(&ring.buf[..ring.head]);
    }
}

// ════════════════════════════════════════════════════════════════════════════
// SpectrumAnalyser
// ════════════════════════════════════════════════════════════════════════════

pub struct SpectrumAnalyser {
    tap:       Arc<SpectrumTap>,
    fft:       Arc<dyn Fft<f32>>,
    window:    Vec<f32>,
    smoothing: f32,
    min_db:    f32,
    max_db:    f32,
    smoothed:  Vec<f32>,
    bytes:     Vec<u8>,
    time:      Vec<f32>,
    buf:       Vec<Complex32>,
}

impl SpectrumAnalyser {
    /// `fft_size` must be a power of two; the analyser exposes half as many
    /// frequency bins.
    pub fn new(tap: Arc<SpectrumTap>, fft_size: usize, smoothing: f32, min_db: f32, max_db: f32) -> Self {
        let n = fft_size.max(2);
        let fft = FftPlanner::<f32>::new().plan_fft_forward(n);
        SpectrumAnalyser {
            tap,
            fft,
            window:   blackman(n),
            smoothing: smoothing.clamp(0.0, 1.0),
            min_db,
            max_db,
            smoothed: vec![0.0; n / 2],
            bytes:    vec![0; n / 2],
            time:     Vec::with_capacity(n),
            buf:      vec![Complex32::new(0.0, 0.0); n],
        }
    }

    pub fn from_config(tap: Arc<SpectrumTap>, cfg: &AudioConfig) -> Self {
        Self::new(tap, cfg.fft_size, cfg.smoothing, cfg.min_db, cfg.max_db)
    }

    pub fn fft_size(&self) -> usize { self.window.len() }
    pub fn bin_count(&self) -> usize { self.smoothed.len() }

    /// Analyse the tap's current contents.
    pub fn sample(&mut self) -> &[u8] {
        let mut time = std::mem::take(&mut self.time);
        self.tap.snapshot(&mut time);
        self.analyse(&time);
        self.time = time;
        &self.bytes
    }

    /// Analyse the last `fft_size` samples of `time` (zero-padded in front
    /// when shorter).
    pub fn analyse(&mut self, time: &[f32]) -> &[u8] {
        let n = self.window.len();
        let tail = &time[time.len().saturating_sub(n)..];
        let pad = n - tail.len();

        for (i, c) in self.buf.iter_mut().enumerate() {
            let s = if i < pad { 0.0 } else { tail[i - pad] };
            *c = Complex32::new(s * self.window[i], 0.0);
        }
        self.fft.process(&mut self.buf);

        let scale = 255.0 / (self.max_db - self.min_db);
        for k in 0..self.smoothed.len() {
            let mag = self.buf[k].norm() / n as f32;
            let avg = self.smoothing * self.smoothed[k] + (1.0 - self.smoothing) * mag;
            // Keep denormals out of the running average.
            self.smoothed[k] = if avg.is_finite() && avg > 1e-30 { avg } else { 0.0 };

            let db = 20.0 * self.smoothed[k].max(1e-30).log10();
            self.bytes[k] = ((db - self.min_db) * scale).floor().clamp(0.0, 255.0) as u8;
        }
        &self.bytes
    }
}

fn blackman(n: usize) -> Vec<f32> {
    const A: f32 = 0.16;
    let (a0, a1, a2) = ((1.0 - A) / 2.0, 0.5, A / 2.0);
    (0..n)
        .map(|i| {
            let x = i as f32 / n as f32;
            a0 - a1 * (TAU * x).cos() + a2 * (2.0 * TAU * x).cos()
        })
        .collect()
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(bin: usize, n: usize, len: usize) -> Vec<f32> {
        (0..len).map(|i| (TAU * bin as f32 * i as f32 / n as f32).sin()).collect()
    }

    #[test]
    fn tap_keeps_latest_in_order() {
        let tap = SpectrumTap::new(4);
        tap.push(&[1.0, 2.0, 3.0]);
        tap.push(&[4.0, 5.0]);
        let mut out = Vec::new();
        tap.snapshot(&mut out);
        assert_eq!(out, vec![2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn silence_reads_all_zero() {
        let mut a = SpectrumAnalyser::new(SpectrumTap::new(64), 64, 0.8, -100.0, -30.0);
        assert_eq!(a.bin_count(), 32);
        assert!(a.sample().iter().all(|&b| b == 0));
    }

    #[test]
    fn sine_peaks_in_its_bin() {
        // Wide range so the main lobe does not saturate.
        let mut a = SpectrumAnalyser::new(SpectrumTap::new(64), 64, 0.0, -100.0, 0.0);
        let bytes = a.analyse(&tone(8, 64, 64)).to_vec();
        let peak = bytes.iter().enumerate().max_by_key(|&(_, &b)| b).map(|(i, _)| i);
        assert_eq!(peak, Some(8));
        assert!(bytes[8] > bytes[7] && bytes[8] > bytes[9]);
        assert!(bytes[20] < bytes[8]);
    }

    #[test]
    fn smoothing_decays_gradually() {
        let mut a = SpectrumAnalyser::new(SpectrumTap::new(64), 64, 0.8, -100.0, -30.0);
        let loud = tone(4, 64, 64);
        for _ in 0..20 { a.analyse(&loud); }
        let held = a.analyse(&loud)[4];

        let after_one = a.analyse(&[0.0; 64])[4];
        assert!(after_one > 0 && after_one <= held);
        let mut last = after_one;
        for _ in 0..10 {
            let v = a.analyse(&[0.0; 64])[4];
            assert!(v <= last);
            last = v;
        }
        assert!(last < after_one);
    }

    #[test]
    fn sample_reads_pushed_audio() {
        let tap = SpectrumTap::new(64);
        let mut a = SpectrumAnalyser::new(Arc::clone(&tap), 64, 0.0, -100.0, -30.0);
        tap.push(&tone(12, 64, 64));
        assert!(a.sample()[12] > 200);
    }
}
