//! The gesture cadence: take a frame, detect, extract, map, update the synth.
//!
//! One thread runs the cycle.  It only asks the [`FrameSlot`] for the next
//! frame after the previous cycle has fully finished, so there is never more
//! than one detection in flight and nothing queues behind a slow provider.
//! A frame without a face or hand, or a failed detection, leaves the current
//! sound as it is.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tone_map::{extract, ControlSignals, HandSide, LandmarkResult, Mapping, MappingEngine, NoGesture, PitchMultiplier};

use crate::frames::{Frame, FrameSlot};
use crate::provider::LandmarkProvider;
use crate::synth::ToneSynth;
use crate::Result;

// ════════════════════════════════════════════════════════════════════════════
// Controls — user input shared with the loop
// ════════════════════════════════════════════════════════════════════════════

/// The pitch slider, readable from the gesture thread.
#[derive(Debug)]
pub struct Controls {
    pitch_bits: AtomicU32,
}

impl Controls {
    pub fn new(pitch: PitchMultiplier) -> Arc<Self> {
        Arc::new(Controls { pitch_bits: AtomicU32::new(pitch.value().to_bits()) })
    }

    pub fn pitch(&self) -> PitchMultiplier {
        PitchMultiplier::new(f32::from_bits(self.pitch_bits.load(Ordering::Relaxed)))
    }

    pub fn set_pitch(&self, pitch: PitchMultiplier) {
        self.pitch_bits.store(pitch.value().to_bits(), Ordering::Relaxed);
    }

    /// Move the slider and return the new position.
    pub fn nudge_pitch(&self, steps: i32) -> PitchMultiplier {
        let p = self.pitch().nudged(steps);
        self.set_pitch(p);
        p
    }
}

// ════════════════════════════════════════════════════════════════════════════
// FrameReport — what one cycle did
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Debug)]
pub enum CycleOutcome {
    /// Signals extracted and the mapping applied to the synth.
    Mapped { signals: ControlSignals, mapping: Mapping },
    /// Nothing to act on; audio held.
    Held(NoGesture),
    /// The provider failed; audio held.
    Failed(String),
}

#[derive(Clone, Debug)]
pub struct FrameReport {
    pub seq:       u64,
    pub detect:    Duration,
    pub landmarks: LandmarkResult,
    pub outcome:   CycleOutcome,
    /// Whether a voice was sounding after the cycle.
    pub sounding:  bool,
}

/// Counters returned when the loop exits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub cycles: u64,
    pub mapped: u64,
    pub held:   u64,
    pub failed: u64,
}

// ════════════════════════════════════════════════════════════════════════════
// GestureLoop
// ════════════════════════════════════════════════════════════════════════════

pub struct GestureLoop {
    provider: Box<dyn LandmarkProvider>,
    engine:   MappingEngine,
    side:     HandSide,
    synth:    ToneSynth,
    controls: Arc<Controls>,
    stats:    LoopStats,
}

impl GestureLoop {
    pub fn new(
        provider: Box<dyn LandmarkProvider>,
        engine:   MappingEngine,
        side:     HandSide,
        synth:    ToneSynth,
        controls: Arc<Controls>,
    ) -> Self {
        GestureLoop { provider, engine, side, synth, controls, stats: LoopStats::default() }
    }

    /// Run one full cycle on `frame`.
    pub fn cycle(&mut self, frame: &Frame) -> FrameReport {
        let started = Instant::now();
        let detected = self.provider.detect(frame);
        let detect = started.elapsed();
        self.stats.cycles += 1;

        let (landmarks, outcome) = match detected {
            Err(e) => {
                tracing::warn!(seq = frame.seq, error = %e, "detection failed; holding audio");
                self.stats.failed += 1;
                (LandmarkResult::default(), CycleOutcome::Failed(e.to_string()))
            }
            Ok(landmarks) => {
                let outcome = match extract(&landmarks, self.side, self.engine.calibration()) {
                    Err(reason) => {
                        tracing::trace!(seq = frame.seq, %reason, "no gesture");
                        self.stats.held += 1;
                        CycleOutcome::Held(reason)
                    }
                    Ok(signals) => {
                        let mapping = self.engine.map(&signals, self.controls.pitch());
                        self.synth.apply(mapping.command);
                        self.stats.mapped += 1;
                        tracing::trace!(
                            seq = frame.seq,
                            note = mapping.params.note_index,
                            frequency_hz = mapping.params.frequency_hz,
                            volume = mapping.params.volume,
                            play = mapping.command.is_play(),
                            "mapped"
                        );
                        CycleOutcome::Mapped { signals, mapping }
                    }
                };
                (landmarks, outcome)
            }
        };

        FrameReport { seq: frame.seq, detect, landmarks, outcome, sounding: self.synth.is_active() }
    }

    pub fn stats(&self) -> LoopStats { self.stats }

    /// Drive cycles from `slot` until it closes, then silence the synth.
    pub fn run(mut self, slot: Arc<FrameSlot>, reports: Sender<FrameReport>) -> LoopStats {
        tracing::debug!(provider = self.provider.name(), hand = self.side.name(), "gesture loop started");
        while let Some(frame) = slot.take() {
            let report = self.cycle(&frame);
            let _ = reports.send(report);
            slot.finish();
        }
        self.synth.stop();
        tracing::debug!(
            cycles = self.stats.cycles,
            mapped = self.stats.mapped,
            held = self.stats.held,
            failed = self.stats.failed,
            "gesture loop stopped"
        );
        self.stats
    }

    /// Start the loop on its own thread.
    pub fn spawn(self, slot: Arc<FrameSlot>) -> Result<GestureLoopHandle> {
        let (tx, rx) = mpsc::channel();
        let thread_slot = Arc::clone(&slot);
        let thread = thread::Builder::new()
            .name("gesture-loop".into())
            .spawn(move || self.run(thread_slot, tx))?;
        Ok(GestureLoopHandle { slot, reports: rx, thread: Some(thread) })
    }
}

// ════════════════════════════════════════════════════════════════════════════
// GestureLoopHandle
// ════════════════════════════════════════════════════════════════════════════

/// Owner's handle on the running loop.  Dropping it shuts the loop down.
pub struct GestureLoopHandle {
    slot:    Arc<FrameSlot>,
    reports: Receiver<FrameReport>,
    thread:  Option<JoinHandle<LoopStats>>,
}

impl GestureLoopHandle {
    /// Drain pending reports (non-blocking).
    pub fn drain_reports(&self) -> Vec<FrameReport> {
        self.reports.try_iter().collect()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<FrameReport> {
        self.reports.recv_timeout(timeout).ok()
    }

    pub fn slot(&self) -> &Arc<FrameSlot> { &self.slot }

    /// Close the slot and wait for the in-flight cycle to finish.
    pub fn shutdown(mut self) -> LoopStats {
        self.join()
    }

    fn join(&mut self) -> LoopStats {
        self.slot.close();
        match self.thread.take() {
            Some(h) => h.join().unwrap_or_else(|_| {
                tracing::error!("gesture loop panicked");
                LoopStats::default()
            }),
            None => LoopStats::default(),
        }
    }
}

impl Drop for GestureLoopHandle {
    fn drop(&mut self) {
        self.join();
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════
