//! Audio output — renders the [`SynthGraph`] to a cpal device.
//!
//! When no usable device exists the graph is driven by a null clock thread
//! at the nominal rate instead, so the voice and the spectrum behave the same
//! with or without sound hardware.
//!
//! A locked output (the default) starts paused.  [`AudioOutput::resume`] is
//! the user-interaction unlock.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::config::AudioConfig;
use crate::spectrum::{SpectrumAnalyser, SpectrumTap};
use crate::synth::{tone_synth, AudioGate, SynthGraph, SynthRenderer, ToneSynth};
use crate::{Error, Result};

/// Sample rate of the null clock.
pub const NULL_SAMPLE_RATE: u32 = 48_000;
const NULL_BLOCK_FRAMES: usize = 256;

// ════════════════════════════════════════════════════════════════════════════
// Backend — cpal stream or null clock
// ════════════════════════════════════════════════════════════════════════════

enum Backend {
    Device {
        stream: cpal::Stream,
        name:   String,
    },
    Null {
        running: Arc<AtomicBool>,
        thread:  Option<JoinHandle<()>>,
    },
}

// ════════════════════════════════════════════════════════════════════════════
// AudioOutput
// ════════════════════════════════════════════════════════════════════════════

/// Owns the output stream.  `cpal::Stream` is not `Send` on every host, so
/// this stays on the thread that opened it.
pub struct AudioOutput {
    backend:     Backend,
    gate:        Arc<AudioGate>,
    tap:         Arc<SpectrumTap>,
    cfg:         AudioConfig,
    sample_rate: u32,
    channels:    u16,
}

impl AudioOutput {
    /// Open the configured (or default) device, falling back to the null
    /// clock when that fails.
    pub fn open(cfg: &AudioConfig) -> Result<(AudioOutput, ToneSynth)> {
        match Self::open_device(cfg) {
            Ok(pair) => Ok(pair),
            Err(e) => {
                tracing::warn!(error = %e, "no usable audio device; using null output");
                Self::null(cfg)
            }
        }
    }

    /// Open the device named in `cfg`, or the host default.
    pub fn open_device(cfg: &AudioConfig) -> Result<(AudioOutput, ToneSynth)> {
        let host = cpal::default_host();
        let device = match &cfg.device {
            Some(want) => host
                .output_devices()
                .map_err(|e| Error::Audio(e.to_string()))?
                .find(|d| d.name().map(|n| &n == want).unwrap_or(false))
                .ok_or_else(|| Error::Audio(format!("output device {want:?} not found")))?,
            None => host
                .default_output_device()
                .ok_or_else(|| Error::Audio("no default output device".into()))?,
        };
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());

        let supported = device
            .default_output_config()
            .map_err(|e| Error::Audio(e.to_string()))?;
        let format = supported.sample_format();
        let config: cpal::StreamConfig = supported.into();
        let sample_rate = config.sample_rate.0;
        let channels = config.channels;

        if !is_buildable(format) {
            return Err(Error::Audio(format!("unsupported sample format {format:?}")));
        }

        let tap  = SpectrumTap::new(cfg.fft_size);
        let gate = AudioGate::new(cfg.require_unlock);
        let (synth, renderer) = tone_synth(
            SynthGraph::new(sample_rate as f32, cfg.ramp_seconds, Some(Arc::clone(&tap))),
            Arc::clone(&gate),
        );

        let stream = match format {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, renderer)?,
            SampleFormat::F64 => build_stream::<f64>(&device, &config, renderer)?,
            SampleFormat::I8  => build_stream::<i8>(&device, &config, renderer)?,
            SampleFormat::I16 => build_stream::<i16>(&device, &config, renderer)?,
            SampleFormat::I32 => build_stream::<i32>(&device, &config, renderer)?,
            SampleFormat::I64 => build_stream::<i64>(&device, &config, renderer)?,
            SampleFormat::U8  => build_stream::<u8>(&device, &config, renderer)?,
            SampleFormat::U16 => build_stream::<u16>(&device, &config, renderer)?,
            SampleFormat::U32 => build_stream::<u32>(&device, &config, renderer)?,
            SampleFormat::U64 => build_stream::<u64>(&device, &config, renderer)?,
            other => return Err(Error::Audio(format!("unsupported sample format {other:?}"))),
        };

        if gate.is_unlocked() {
            stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        } else {
            // Some hosts start streams on creation.
            let _ = stream.pause();
        }

        tracing::info!(
            device = %name,
            sample_rate,
            channels,
            format = ?format,
            locked = !gate.is_unlocked(),
            "audio output opened"
        );

        let output = AudioOutput {
            backend: Backend::Device { stream, name },
            gate:    Arc::clone(&gate),
            tap,
            cfg:     cfg.clone(),
            sample_rate,
            channels,
        };
        Ok((output, synth))
    }

    /// Drive the graph from a paced clock thread and discard the samples.
    pub fn null(cfg: &AudioConfig) -> Result<(AudioOutput, ToneSynth)> {
        let tap  = SpectrumTap::new(cfg.fft_size);
        let gate = AudioGate::new(cfg.require_unlock);
        let (synth, renderer) = tone_synth(
            SynthGraph::new(NULL_SAMPLE_RATE as f32, cfg.ramp_seconds, Some(Arc::clone(&tap))),
            Arc::clone(&gate),
        );

        let running = Arc::new(AtomicBool::new(true));
        let thread = {
            let running = Arc::clone(&running);
            let gate    = Arc::clone(&gate);
            thread::Builder::new()
                .name("audio-clock".into())
                .spawn(move || null_clock(running, renderer, gate))?
        };

        tracing::info!(sample_rate = NULL_SAMPLE_RATE, locked = !gate.is_unlocked(), "null audio output");

        let output = AudioOutput {
            backend: Backend::Null { running, thread: Some(thread) },
            gate:    Arc::clone(&gate),
            tap,
            cfg:     cfg.clone(),
            sample_rate: NULL_SAMPLE_RATE,
            channels:    1,
        };
        Ok((output, synth))
    }

    /// Unlock playback.  Safe to call repeatedly; after a failed start the
    /// output stays locked and the next call tries again.
    pub fn resume(&self) -> Result<()> {
        let unlocked = unlock_after(&self.gate, || match &self.backend {
            Backend::Device { stream, .. } => stream.play().map_err(|e| Error::Audio(e.to_string())),
            Backend::Null { .. }           => Ok(()),
        })?;
        if unlocked {
            tracing::info!(backend = self.backend_name(), "audio unlocked");
        }
        Ok(())
    }

    pub fn is_unlocked(&self) -> bool { self.gate.is_unlocked() }

    /// A fresh analyser over this output's tap.
    pub fn analyser(&self) -> SpectrumAnalyser {
        SpectrumAnalyser::from_config(Arc::clone(&self.tap), &self.cfg)
    }

    pub fn backend_name(&self) -> &str {
        match &self.backend {
            Backend::Device { name, .. } => name,
            Backend::Null { .. }         => "null",
        }
    }

    pub fn sample_rate(&self) -> u32 { self.sample_rate }
    pub fn channels(&self) -> u16 { self.channels }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        match &mut self.backend {
            Backend::Device { stream, .. } => {
                let _ = stream.pause();
            }
            Backend::Null { running, thread } => {
                running.store(false, Ordering::SeqCst);
                if let Some(h) = thread.take() {
                    let _ = h.join();
                }
            }
        }
        tracing::debug!("audio output closed");
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Stream construction
// ════════════════════════════════════════════════════════════════════════════

/// Open `gate` once `start` has succeeded.  Returns whether this call
/// unlocked it.
fn unlock_after(gate: &AudioGate, start: impl FnOnce() -> Result<()>) -> Result<bool> {
    if gate.is_unlocked() {
        return Ok(false);
    }
    start()?;
    Ok(gate.unlock())
}

/// Sample formats [`build_stream`] is instantiated for.
fn is_buildable(format: SampleFormat) -> bool {
    matches!(
        format,
        SampleFormat::F32 | SampleFormat::F64
            | SampleFormat::I8 | SampleFormat::I16 | SampleFormat::I32 | SampleFormat::I64
            | SampleFormat::U8 | SampleFormat::U16 | SampleFormat::U32 | SampleFormat::U64
    )
}

fn build_stream<T>(
    device:       &cpal::Device,
    config:       &cpal::StreamConfig,
    mut renderer: SynthRenderer,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    let mut scratch: Vec<f32> = Vec::new();

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                scratch.resize(data.len(), 0.0);
                renderer.render(&mut scratch, channels);
                for (out, &s) in data.iter_mut().zip(scratch.iter()) {
                    *out = T::from_sample(s);
                }
            },
            |err| tracing::error!(error = %err, "audio stream error"),
            None,
        )
        .map_err(|e| Error::Audio(e.to_string()))
}

fn null_clock(running: Arc<AtomicBool>, mut renderer: SynthRenderer, gate: Arc<AudioGate>) {
    let period = Duration::from_secs_f64(NULL_BLOCK_FRAMES as f64 / NULL_SAMPLE_RATE as f64);
    let mut block = vec![0.0f32; NULL_BLOCK_FRAMES];
    let mut next = Instant::now();

    while running.load(Ordering::SeqCst) {
        // A locked context does not advance.
        if gate.is_unlocked() {
            renderer.render(&mut block, 1);
        }
        next += period;
        let now = Instant::now();
        if next > now {
            thread::sleep(next - now);
        } else {
            next = now;
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════
