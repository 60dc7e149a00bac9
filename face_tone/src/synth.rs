//! The tone synthesizer: one sine voice behind one persistent gain stage.
//!
//! [`SynthGraph`] is the DSP itself.  It is owned by a [`SynthRenderer`] on
//! the audio thread; [`ToneSynth`] is the only writer and reaches it through
//! a lock-free command queue.  The control loop owns that handle and calls
//! [`play`](ToneSynth::play) / [`stop`](ToneSynth::stop) once per gesture
//! cycle.
//!
//! ```text
//!   ToneSynth ──(queue)──► SynthRenderer
//!                            Oscillator (0 or 1) ──► gain ──┬──► device
//!                                                           └──► SpectrumTap
//! ```

use std::f64::consts::TAU;
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tone_map::ToneCommand;

use crate::spectrum::SpectrumTap;

// ════════════════════════════════════════════════════════════════════════════
// LinearRamp — a parameter that glides to its target
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Debug, PartialEq)]
pub struct LinearRamp {
    current:   f32,
    target:    f32,
    step:      f32,
    remaining: u32,
}

impl LinearRamp {
    pub fn new(value: f32) -> Self {
        LinearRamp { current: value, target: value, step: 0.0, remaining: 0 }
    }

    /// Glide from the current value to `target` over `samples` steps.
    pub fn ramp_to(&mut self, target: f32, samples: u32) {
        self.target = target;
        if samples == 0 {
            self.current   = target;
            self.step      = 0.0;
            self.remaining = 0;
        } else {
            self.step      = (target - self.current) / samples as f32;
            self.remaining = samples;
        }
    }

    /// Advance one sample and return the new value.
    pub fn next_value(&mut self) -> f32 {
        if self.remaining > 0 {
            self.remaining -= 1;
            self.current = if self.remaining == 0 { self.target } else { self.current + self.step };
        }
        self.current
    }

    pub fn value(&self) -> f32 { self.current }
    pub fn target(&self) -> f32 { self.target }
    pub fn is_settled(&self) -> bool { self.remaining == 0 }
}

// ════════════════════════════════════════════════════════════════════════════
// Oscillator
// ════════════════════════════════════════════════════════════════════════════

/// A sine oscillator with an immediate frequency and a ramped detune.
#[derive(Clone, Debug)]
pub struct Oscillator {
    frequency_hz: f32,
    detune:       LinearRamp,
    phase:        f64,
}

impl Oscillator {
    fn new(frequency_hz: f32) -> Self {
        Oscillator { frequency_hz, detune: LinearRamp::new(0.0), phase: 0.0 }
    }

    pub fn frequency_hz(&self) -> f32 { self.frequency_hz }
    pub fn detune_cents(&self) -> f32 { self.detune.value() }

    /// Frequency after detune.
    pub fn effective_hz(&self) -> f32 {
        self.frequency_hz * (self.detune.value() / 1200.0).exp2()
    }

    fn next_sample(&mut self, sample_rate: f32) -> f32 {
        let s = (TAU * self.phase).sin() as f32;
        self.detune.next_value();
        self.phase = (self.phase + (self.effective_hz() / sample_rate) as f64).fract();
        s
    }
}

// ════════════════════════════════════════════════════════════════════════════
// SynthGraph
// ════════════════════════════════════════════════════════════════════════════

/// Result of a `play` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayOutcome {
    /// No voice was running; one was created.
    Started,
    /// The running voice was retargeted in place.
    Retargeted,
    /// Output still locked; nothing changed.
    Locked,
    /// The renderer is not keeping up; nothing changed.
    Busy,
}

pub struct SynthGraph {
    sample_rate:  f32,
    ramp_samples: u32,
    voice:        Option<Oscillator>,
    gain:         LinearRamp,
    created:      u64,
    tap:          Option<Arc<SpectrumTap>>,
    mono:         Vec<f32>,
}

impl SynthGraph {
    pub fn new(sample_rate: f32, ramp_seconds: f32, tap: Option<Arc<SpectrumTap>>) -> Self {
        SynthGraph {
            sample_rate,
            ramp_samples: (ramp_seconds.max(0.0) * sample_rate).round() as u32,
            voice:        None,
            gain:         LinearRamp::new(0.0),
            created:      0,
            tap,
            mono:         Vec::new(),
        }
    }

    pub fn sample_rate(&self) -> f32 { self.sample_rate }

    /// Start the voice, or retarget the running one.
    pub fn play(&mut self, frequency_hz: f32, volume: f32, detune_cents: f32) -> PlayOutcome {
        let outcome = match self.voice {
            Some(_) => PlayOutcome::Retargeted,
            None => {
                self.created += 1;
                PlayOutcome::Started
            }
        };
        let ramp = self.ramp_samples;
        let osc = self.voice.get_or_insert_with(|| Oscillator::new(frequency_hz));
        osc.frequency_hz = frequency_hz;
        osc.detune.ramp_to(detune_cents, ramp);
        self.gain.ramp_to(volume.clamp(0.0, 1.0), ramp);
        outcome
    }

    /// Release the voice.  Returns whether there was one.
    pub fn stop(&mut self) -> bool {
        self.voice.take().is_some()
    }

    pub fn apply(&mut self, command: ToneCommand) {
        match command {
            ToneCommand::Play { frequency_hz, volume, detune_cents } => {
                self.play(frequency_hz, volume, detune_cents);
            }
            ToneCommand::Stop => {
                self.stop();
            }
        }
    }

    pub fn is_active(&self) -> bool { self.voice.is_some() }
    pub fn voice(&self) -> Option<&Oscillator> { self.voice.as_ref() }
    pub fn gain(&self) -> &LinearRamp { &self.gain }
    /// Oscillators created since start.
    pub fn oscillators_created(&self) -> u64 { self.created }

    /// Fill an interleaved buffer of `channels` channels.
    pub fn render(&mut self, out: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        let frames = out.len() / channels;
        self.mono.resize(frames, 0.0);

        for (frame, m) in out.chunks_mut(channels).zip(self.mono.iter_mut()) {
            let g = self.gain.next_value();
            let s = match self.voice.as_mut() {
                Some(osc) => osc.next_sample(self.sample_rate) * g,
                None      => 0.0,
            };
            frame.fill(s);
            *m = s;
        }

        if let Some(tap) = &self.tap {
            tap.push(&self.mono);
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// AudioGate — autoplay lock
// ════════════════════════════════════════════════════════════════════════════

/// Output stays silent and synth calls are ignored until unlocked by a user
/// interaction.
#[derive(Debug)]
pub struct AudioGate {
    unlocked: AtomicBool,
}

impl AudioGate {
    pub fn new(locked: bool) -> Arc<Self> {
        Arc::new(AudioGate { unlocked: AtomicBool::new(!locked) })
    }

    /// Returns `true` the first time.
    pub fn unlock(&self) -> bool {
        !self.unlocked.swap(true, Ordering::SeqCst)
    }

    pub fn is_unlocked(&self) -> bool { self.unlocked.load(Ordering::SeqCst) }
}

// ════════════════════════════════════════════════════════════════════════════
// ToneSynth / SynthRenderer — the two ends of the command queue
// ════════════════════════════════════════════════════════════════════════════

/// Commands the renderer has not yet picked up.  The audio side drains the
/// queue at the start of every block, so it only fills if rendering stalls.
pub const COMMAND_QUEUE: usize = 256;

/// Build the writer and renderer ends around `graph`.
///
/// The renderer owns the graph and lives on the audio thread; the writer
/// never touches it directly, so rendering never waits on the control loop.
pub fn tone_synth(graph: SynthGraph, gate: Arc<AudioGate>) -> (ToneSynth, SynthRenderer) {
    let (commands, inbox) = HeapRb::<ToneCommand>::new(COMMAND_QUEUE).split();
    let synth = ToneSynth { commands, gate, active: graph.is_active(), created: graph.oscillators_created() };
    (synth, SynthRenderer { graph, inbox })
}

/// The single writer.  Keeps its own copy of the voice state, which the
/// renderer reaches once it has drained the queue.
pub struct ToneSynth {
    commands: HeapProd<ToneCommand>,
    gate:     Arc<AudioGate>,
    active:   bool,
    created:  u64,
}

impl ToneSynth {
    fn send(&mut self, command: ToneCommand) -> bool {
        let sent = self.commands.try_push(command).is_ok();
        if !sent {
            tracing::warn!(?command, "synth command queue full; dropping");
        }
        sent
    }

    pub fn play(&mut self, frequency_hz: f32, volume: f32, detune_cents: f32) -> PlayOutcome {
        if !self.gate.is_unlocked() {
            return PlayOutcome::Locked;
        }
        if !self.send(ToneCommand::Play { frequency_hz, volume, detune_cents }) {
            return PlayOutcome::Busy;
        }
        if self.active {
            PlayOutcome::Retargeted
        } else {
            self.active = true;
            self.created += 1;
            tracing::debug!(frequency_hz, volume, detune_cents, "voice started");
            PlayOutcome::Started
        }
    }

    /// Idempotent.  Returns whether a voice was released.
    pub fn stop(&mut self) -> bool {
        if !self.gate.is_unlocked() || !self.active {
            return false;
        }
        if !self.send(ToneCommand::Stop) {
            return false;
        }
        self.active = false;
        tracing::debug!("voice stopped");
        true
    }

    pub fn apply(&mut self, command: ToneCommand) {
        match command {
            ToneCommand::Play { frequency_hz, volume, detune_cents } => {
                self.play(frequency_hz, volume, detune_cents);
            }
            ToneCommand::Stop => {
                self.stop();
            }
        }
    }

    pub fn is_active(&self) -> bool { self.active }
    pub fn is_unlocked(&self) -> bool { self.gate.is_unlocked() }
    pub fn oscillators_created(&self) -> u64 { self.created }
}

/// Audio-thread end: applies queued commands, then renders.
pub struct SynthRenderer {
    graph: SynthGraph,
    inbox: HeapCons<ToneCommand>,
}

impl SynthRenderer {
    /// Apply every queued command.
    pub fn drain(&mut self) {
        while let Some(command) = self.inbox.try_pop() {
            self.graph.apply(command);
        }
    }

    pub fn render(&mut self, out: &mut [f32], channels: usize) {
        self.drain();
        self.graph.render(out, channels);
    }

    pub fn graph(&self) -> &SynthGraph { &self.graph }
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn graph() -> SynthGraph {
        // 1 kHz with a 0.1 s ramp = 100 samples.
        SynthGraph::new(1000.0, 0.1, None)
    }

    fn synth(locked: bool) -> (ToneSynth, SynthRenderer, Arc<AudioGate>) {
        let gate = AudioGate::new(locked);
        let (s, r) = tone_synth(graph(), Arc::clone(&gate));
        (s, r, gate)
    }

    #[test]
    fn ramp_reaches_target_exactly() {
        let mut r = LinearRamp::new(0.0);
        r.ramp_to(1.0, 4);
        let v: Vec<f32> = (0..6).map(|_| r.next_value()).collect();
        assert_eq!(v, vec![0.25, 0.5, 0.75, 1.0, 1.0, 1.0]);
        assert!(r.is_settled());
    }

    #[test]
    fn repeated_play_retargets_one_voice() {
        let mut g = graph();
        assert_eq!(g.play(440.0, 1.0, 0.0), PlayOutcome::Started);
        assert_eq!(g.play(493.88, 0.8, 5.0), PlayOutcome::Retargeted);
        assert_eq!(g.play(523.25, 0.6, -5.0), PlayOutcome::Retargeted);
        assert_eq!(g.oscillators_created(), 1);
        assert_eq!(g.voice().map(Oscillator::frequency_hz), Some(523.25));
    }

    #[test]
    fn play_play_stop_play_never_doubles() {
        let mut g = graph();
        let mut buf = [0.0f32; 32];
        for step in 0..4 {
            match step {
                2 => { g.stop(); }
                _ => { g.play(261.63, 1.0, 0.0); }
            }
            g.render(&mut buf, 1);
            assert!(g.voice().into_iter().count() <= 1);
        }
        assert_eq!(g.oscillators_created(), 2);
        assert!(g.is_active());
    }

    #[test]
    fn stop_is_idempotent() {
        let mut g = graph();
        g.play(440.0, 1.0, 0.0);
        assert!(g.stop());
        assert!(!g.stop());
        assert!(!g.is_active());
        let mut fresh = graph();
        assert!(!fresh.stop());
    }

    #[test]
    fn frequency_immediate_gain_and_detune_ramped() {
        let mut g = graph();
        g.play(300.0, 1.0, 10.0);
        let mut buf = vec![0.0f32; 50];
        g.render(&mut buf, 1);
        assert!((g.gain().value() - 0.5).abs() < 1e-4);
        assert!((g.voice().unwrap().detune_cents() - 5.0).abs() < 1e-3);

        g.play(600.0, 1.0, 10.0);
        assert_eq!(g.voice().unwrap().frequency_hz(), 600.0);

        let mut buf = vec![0.0f32; 100];
        g.render(&mut buf, 1);
        assert_eq!(g.gain().value(), 1.0);
        assert_eq!(g.voice().unwrap().detune_cents(), 10.0);
    }

    #[test]
    fn gain_starts_silent_and_persists_across_stop() {
        let mut g = graph();
        assert_eq!(g.gain().value(), 0.0);
        g.play(440.0, 0.7, 0.0);
        let mut buf = vec![0.0f32; 200];
        g.render(&mut buf, 1);
        g.stop();
        assert!((g.gain().value() - 0.7).abs() < 1e-5);
    }

    #[test]
    fn render_quarter_rate_sine() {
        let mut g = SynthGraph::new(1000.0, 0.0, None);
        g.play(250.0, 1.0, 0.0);
        let mut buf = vec![0.0f32; 8];
        g.render(&mut buf, 2);
        let left: Vec<f32> = buf.iter().step_by(2).map(|s| (s * 1000.0).round() / 1000.0).collect();
        assert_eq!(left, vec![0.0, 1.0, 0.0, -1.0]);
        assert_eq!(buf[2], buf[3]);
    }

    #[test]
    fn render_without_voice_is_silent_and_feeds_tap() {
        let tap = SpectrumTap::new(4);
        let mut g = SynthGraph::new(1000.0, 0.1, Some(Arc::clone(&tap)));
        tap.push(&[1.0; 4]);
        let mut buf = vec![1.0f32; 8];
        g.render(&mut buf, 2);
        assert!(buf.iter().all(|&s| s == 0.0));
        let mut seen = Vec::new();
        tap.snapshot(&mut seen);
        assert_eq!(seen, vec![0.0; 4]);
    }

    #[test]
    fn detune_raises_effective_pitch() {
        let mut g = SynthGraph::new(1000.0, 0.0, None);
        g.play(440.0, 1.0, 1200.0);
        assert!((g.voice().unwrap().effective_hz() - 880.0).abs() < 1e-3);
    }

    // ── handle ────────────────────────────────────────────────────────────
    #[test]
    fn locked_synth_ignores_calls() {
        let (mut s, mut r, gate) = synth(true);
        assert_eq!(s.play(440.0, 1.0, 0.0), PlayOutcome::Locked);
        assert!(!s.stop());
        assert!(!s.is_active());
        r.drain();
        assert_eq!(r.graph().oscillators_created(), 0);

        assert!(gate.unlock());
        assert!(!gate.unlock());
        assert_eq!(s.play(440.0, 1.0, 0.0), PlayOutcome::Started);
        assert!(s.is_active());
    }

    #[test]
    fn apply_follows_commands() {
        let (mut s, mut r, _gate) = synth(false);
        s.apply(ToneCommand::Play { frequency_hz: 392.0, volume: 1.0, detune_cents: 0.0 });
        s.apply(ToneCommand::Play { frequency_hz: 440.0, volume: 1.0, detune_cents: 0.0 });
        assert!(s.is_active());
        assert_eq!(s.oscillators_created(), 1);

        let mut buf = [0.0f32; 16];
        r.render(&mut buf, 1);
        assert_eq!(r.graph().voice().map(Oscillator::frequency_hz), Some(440.0));
        assert_eq!(r.graph().oscillators_created(), 1);

        s.apply(ToneCommand::Stop);
        s.apply(ToneCommand::Stop);
        assert!(!s.is_active());
        r.drain();
        assert!(!r.graph().is_active());
    }

    #[test]
    fn writer_state_matches_renderer_after_drain() {
        let (mut s, mut r, _gate) = synth(false);
        for step in 0..10 {
            if step % 3 == 2 { s.stop(); } else { s.play(261.63 + step as f32, 0.5, 0.0); }
        }
        r.drain();
        assert_eq!(s.is_active(), r.graph().is_active());
        assert_eq!(s.oscillators_created(), r.graph().oscillators_created());
    }

    #[test]
    fn full_queue_reports_busy_without_changing_state() {
        let (mut s, mut r, _gate) = synth(false);
        assert_eq!(s.play(440.0, 1.0, 0.0), PlayOutcome::Started);
        for _ in 1..COMMAND_QUEUE {
            assert_eq!(s.play(440.0, 1.0, 0.0), PlayOutcome::Retargeted);
        }
        assert_eq!(s.play(440.0, 1.0, 0.0), PlayOutcome::Busy);
        assert!(!s.stop());
        assert!(s.is_active());

        r.drain();
        assert!(s.stop());
        r.drain();
        assert!(!r.graph().is_active());
    }

    #[test]
    fn rendering_runs_without_the_writer() {
        let (mut s, mut r, _gate) = synth(false);
        s.play(250.0, 1.0, 0.0);
        let worker = std::thread::spawn(move || {
            let mut buf = vec![0.0f32; 200];
            r.render(&mut buf, 1);
            buf
        });
        let buf = worker.join().unwrap();
        // Gain ramps up from silence without gaps.
        assert!(buf[150..].iter().any(|&x| x.abs() > 0.5));
        drop(s);
    }
}
