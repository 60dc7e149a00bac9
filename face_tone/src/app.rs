//! Top-level application state.
//!
//! `AppState` owns the frame source, the gesture loop and the audio output.
//! The gesture loop runs on its own thread; this side drains its reports,
//! samples the spectrum and applies UI events once per display frame.

use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tone_map::{HandSide, LandmarkResult, Mapping, MappingEngine, PitchMultiplier};

use crate::config::{AppConfig, ProviderKind};
use crate::control::{Controls, CycleOutcome, FrameReport, GestureLoop, GestureLoopHandle, LoopStats};
use crate::frames::{FrameSlot, FrameSource, TimerFrameSource};
use crate::output::AudioOutput;
use crate::provider::{open_provider, LandmarkProvider, SimInput};
use crate::spectrum::SpectrumAnalyser;
use crate::synth::ToneSynth;
use crate::visualizer::{Scene, UiEvent, Visualizer};
use crate::Result;

// ════════════════════════════════════════════════════════════════════════════
// AppState
// ════════════════════════════════════════════════════════════════════════════

pub struct AppState {
    // Declared in teardown order: frames stop, then the loop, then audio.
    source:   TimerFrameSource,
    gesture:  GestureLoopHandle,
    output:   AudioOutput,
    analyser: SpectrumAnalyser,
    controls: Arc<Controls>,

    side:          HandSide,
    provider_name: String,

    // ── latest cycle, for display ────────────────────────────────────────
    landmarks: Option<LandmarkResult>,
    mapping:   Option<Mapping>,
    sounding:  bool,
    spectrum:  Vec<u8>,
    reports:   u64,

    pub status:    String,
    detect_failed: bool,
    quit:          bool,
}

impl AppState {
    /// Open the audio device and the configured provider, then start the
    /// frame source and gesture loop.
    pub fn new(cfg: &AppConfig, sim_rx: Option<Receiver<SimInput>>) -> Result<Self> {
        let provider = open_provider(&cfg.provider, cfg.mapping.hand, sim_rx)?;
        let (output, synth) = AudioOutput::open(&cfg.audio)?;
        Self::with_parts(cfg, provider, output, synth)
    }

    pub fn with_parts(
        cfg:      &AppConfig,
        provider: Box<dyn LandmarkProvider>,
        output:   AudioOutput,
        synth:    ToneSynth,
    ) -> Result<Self> {
        let provider_name = provider.name().to_string();
        let controls = Controls::new(cfg.mapping.pitch());
        let engine = MappingEngine::new(cfg.mapping.calibration.clone());

        let slot = FrameSlot::new();
        let gesture = GestureLoop::new(provider, engine, cfg.mapping.hand, synth, Arc::clone(&controls))
            .spawn(Arc::clone(&slot))?;

        let mut source = TimerFrameSource::new(cfg.video.width, cfg.video.height, cfg.video.fps);
        source.start(slot)?;

        let analyser = output.analyser();
        let status = if output.is_unlocked() {
            format!("READY  PROVIDER {provider_name}  AUDIO {}", output.backend_name())
        } else {
            format!("READY  PROVIDER {provider_name}  CLICK TO ENABLE AUDIO")
        };

        Ok(AppState {
            source,
            gesture,
            output,
            spectrum: vec![0; analyser.bin_count()],
            analyser,
            controls,
            side: cfg.mapping.hand,
            provider_name,
            landmarks: None,
            mapping:   None,
            sounding:  false,
            reports:   0,
            status,
            detect_failed: false,
            quit: false,
        })
    }

    // ── UI events ─────────────────────────────────────────────────────────

    pub fn handle_ui(&mut self, event: UiEvent) {
        match event {
            UiEvent::PitchUp    => self.set_pitch_status(self.controls.nudge_pitch(1)),
            UiEvent::PitchDown  => self.set_pitch_status(self.controls.nudge_pitch(-1)),
            UiEvent::PitchReset => {
                self.controls.set_pitch(PitchMultiplier::default());
                self.set_pitch_status(PitchMultiplier::default());
            }
            UiEvent::Unlock => match self.output.resume() {
                Ok(()) => self.status = format!("AUDIO ON  {}", self.output.backend_name()),
                Err(e) => {
                    tracing::warn!(error = %e, "audio resume failed");
                    self.status = format!("AUDIO ERROR: {e}");
                }
            },
            UiEvent::Quit => self.quit = true,
        }
    }

    fn set_pitch_status(&mut self, p: PitchMultiplier) {
        self.status = format!("PITCH X{:.2}", p.value());
    }

    // ── Per-frame tick ────────────────────────────────────────────────────

    pub fn tick(&mut self) {
        for report in self.gesture.drain_reports() {
            self.apply_report(report);
        }

        let bins = self.analyser.sample();
        self.spectrum.clear();
        self.spectrum.extend_from_slice(bins);
    }

    fn apply_report(&mut self, report: FrameReport) {
        self.reports += 1;
        self.sounding = report.sounding;
        match report.outcome {
            CycleOutcome::Failed(e) => {
                self.status = format!("DETECTION FAILED: {e}");
                self.detect_failed = true;
            }
            outcome => {
                if let CycleOutcome::Mapped { mapping, .. } = outcome {
                    self.mapping = Some(mapping);
                }
                if self.detect_failed {
                    self.status = format!("TRACKING  PROVIDER {}", self.provider_name);
                    self.detect_failed = false;
                }
            }
        }
        self.landmarks = Some(report.landmarks);
    }

    // ── Accessors for the render loop ─────────────────────────────────────

    pub fn scene(&self) -> Scene<'_> {
        Scene {
            landmarks: self.landmarks.as_ref(),
            side:      self.side,
            mapping:   self.mapping.as_ref(),
            spectrum:  &self.spectrum,
            pitch:     self.controls.pitch(),
            sounding:  self.sounding,
            unlocked:  self.output.is_unlocked(),
            status:    &self.status,
        }
    }

    pub fn pitch(&self) -> PitchMultiplier { self.controls.pitch() }
    pub fn is_sounding(&self) -> bool { self.sounding }
    pub fn is_unlocked(&self) -> bool { self.output.is_unlocked() }
    pub fn mapping(&self) -> Option<&Mapping> { self.mapping.as_ref() }
    pub fn spectrum(&self) -> &[u8] { &self.spectrum }
    pub fn reports_seen(&self) -> u64 { self.reports }
    pub fn should_quit(&self) -> bool { self.quit }

    /// Stop frames, then the gesture loop (which silences the synth), then
    /// close the audio output.
    pub fn shutdown(self) -> LoopStats {
        let AppState { mut source, gesture, output, provider_name, .. } = self;
        source.stop();
        let stats = gesture.shutdown();
        drop(output);
        tracing::info!(
            provider = %provider_name,
            cycles = stats.cycles,
            mapped = stats.mapped,
            held = stats.held,
            failed = stats.failed,
            "session ended"
        );
        stats
    }
}

// ════════════════════════════════════════════════════════════════════════════
// run() — the windowed application loop
// ════════════════════════════════════════════════════════════════════════════

/// Run with the visualizer window until it closes or the user quits.
pub fn run(cfg: &AppConfig) -> Result<()> {
    let (sim_tx, sim_rx) = mpsc::channel::<SimInput>();
    let simulated = cfg.provider.kind == ProviderKind::Sim;

    let mut vis = Visualizer::new(simulated.then_some(sim_tx))?;
    let mut app = AppState::new(cfg, simulated.then_some(sim_rx))?;

    while vis.is_open() && !app.should_quit() {
        for event in vis.poll_input() {
            app.handle_ui(event);
        }
        if app.should_quit() {
            break;
        }
        app.tick();
        vis.render(&app.scene())?;
    }

    app.shutdown();
    Ok(())
}

/// Run without a window for `duration`.  Audio is unlocked at once since
/// there is nobody to click.
pub fn run_headless(cfg: &AppConfig, duration: Duration) -> Result<LoopStats> {
    // Keeps the simulated subject (face only, no hand) alive.
    let (_sim_tx, sim_rx) = mpsc::channel::<SimInput>();
    let sim_rx = (cfg.provider.kind == ProviderKind::Sim).then_some(sim_rx);

    let mut app = AppState::new(cfg, sim_rx)?;
    app.handle_ui(UiEvent::Unlock);

    let frame = Duration::from_millis(16);
    let t0 = Instant::now();
    while t0.elapsed() < duration {
        thread::sleep(frame);
        app.tick();
    }
    tracing::info!(reports = app.reports_seen(), sounding = app.is_sounding(), "headless run complete");
    Ok(app.shutdown())
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════
