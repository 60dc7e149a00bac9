//! Landmark providers — the tracker side of the control loop.
//!
//! The public interface is the [`LandmarkProvider`] trait: given a frame,
//! produce whatever face and hand landmarks were found.  The control loop
//! doesn't know whether results came from a live model, a recording, or the
//! keyboard simulator.
//!
//! * [`SimProvider`] — mouse and keys pose a synthetic face and hand.
//! * [`ReplayProvider`] — plays back a JSON-lines recording, one
//!   [`LandmarkResult`] per line.
//! * [`Delayed`] — wraps any provider with a fixed inference latency.

use serde::{Deserialize, Serialize};
use std::f32::consts::TAU;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::mpsc::Receiver;
use std::thread;
use std::time::Duration;

use tone_map::landmark::{face, hand};
use tone_map::{HandSide, Landmark, LandmarkResult};

use crate::config::{ProviderConfig, ProviderKind};
use crate::frames::Frame;
use crate::{Error, Result};

// ════════════════════════════════════════════════════════════════════════════
// ProviderOptions
// ════════════════════════════════════════════════════════════════════════════

/// Tracker options.  Live models honour all of them; the built-in providers
/// use the subset that applies to them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProviderOptions {
    pub max_faces: u32,
    /// 478-point mesh with iris points instead of 468.
    pub refine_landmarks: bool,
    pub min_detection_confidence: f32,
    pub min_tracking_confidence: f32,
    /// 0 = fastest, 2 = most accurate.
    pub model_complexity: u8,
    pub smooth_landmarks: bool,
}

impl Default for ProviderOptions {
    fn default() -> Self {
        ProviderOptions {
            max_faces: 1,
            refine_landmarks: true,
            min_detection_confidence: 0.5,
            min_tracking_confidence: 0.5,
            model_complexity: 1,
            smooth_landmarks: true,
        }
    }
}

impl ProviderOptions {
    pub fn validate(&self) -> Result<()> {
        if self.max_faces == 0 {
            return Err(Error::Config("provider.options.max_faces must be at least 1".into()));
        }
        for (name, v) in [
            ("min_detection_confidence", self.min_detection_confidence),
            ("min_tracking_confidence", self.min_tracking_confidence),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return Err(Error::Config(format!("provider.options.{name} {v} outside 0–1")));
            }
        }
        if self.model_complexity > 2 {
            return Err(Error::Config(format!(
                "provider.options.model_complexity {} outside 0–2", self.model_complexity
            )));
        }
        Ok(())
    }

    fn face_points(&self) -> usize {
        if self.refine_landmarks { face::REFINED_POINTS } else { face::MESH_POINTS }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// LandmarkProvider trait
// ════════════════════════════════════════════════════════════════════════════

/// Anything that can turn a frame into landmarks.
///
/// `detect` may block for as long as inference takes; the caller guarantees
/// only one call is in flight.  An empty result means "nothing tracked".
pub trait LandmarkProvider: Send {
    fn name(&self) -> &str;
    fn detect(&mut self, frame: &Frame) -> Result<LandmarkResult>;
}

impl LandmarkProvider for Box<dyn LandmarkProvider> {
    fn name(&self) -> &str { (**self).name() }
    fn detect(&mut self, frame: &Frame) -> Result<LandmarkResult> { (**self).detect(frame) }
}

/// Build the provider named by `cfg`.
///
/// `sim_rx` feeds the simulator; it is ignored by other kinds.
pub fn open_provider(
    cfg: &ProviderConfig,
    hand_side: HandSide,
    sim_rx: Option<Receiver<SimInput>>,
) -> Result<Box<dyn LandmarkProvider>> {
    let inner: Box<dyn LandmarkProvider> = match cfg.kind {
        ProviderKind::Sim => {
            let rx = sim_rx.ok_or_else(|| {
                Error::Provider("simulated tracker needs a window for input".into())
            })?;
            Box::new(SimProvider::new(rx, cfg.options.clone(), hand_side))
        }
        ProviderKind::Replay => {
            let path = cfg.replay_path.as_deref().ok_or_else(|| {
                Error::Config("provider.replay_path not set".into())
            })?;
            Box::new(ReplayProvider::open(path, cfg.options.clone(), cfg.loop_replay)?)
        }
    };

    tracing::info!(
        provider = inner.name(),
        max_faces = cfg.options.max_faces,
        refine = cfg.options.refine_landmarks,
        min_detection = cfg.options.min_detection_confidence,
        min_tracking = cfg.options.min_tracking_confidence,
        complexity = cfg.options.model_complexity,
        latency_ms = cfg.latency_ms,
        "landmark provider ready"
    );

    if cfg.latency_ms > 0 {
        Ok(Box::new(Delayed::new(inner, Duration::from_millis(cfg.latency_ms))))
    } else {
        Ok(inner)
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Delayed — fixed inference latency
// ════════════════════════════════════════════════════════════════════════════

/// Sleeps before every detection, to behave like a slow model.
pub struct Delayed<P> {
    inner:   P,
    latency: Duration,
}

impl<P: LandmarkProvider> Delayed<P> {
    pub fn new(inner: P, latency: Duration) -> Self {
        Delayed { inner, latency }
    }
}

impl<P: LandmarkProvider> LandmarkProvider for Delayed<P> {
    fn name(&self) -> &str { self.inner.name() }

    fn detect(&mut self, frame: &Frame) -> Result<LandmarkResult> {
        thread::sleep(self.latency);
        self.inner.detect(frame)
    }
}

// ════════════════════════════════════════════════════════════════════════════
// SimProvider — keyboard/mouse simulation (always available)
// ════════════════════════════════════════════════════════════════════════════

/// Raw input event from the simulation window.
#[derive(Clone, Debug, PartialEq)]
pub enum SimInput {
    /// Hand centre in landmark coordinates (already un-mirrored).
    HandAt { x: f32, y: f32 },
    /// Pointer left the camera view.
    HandLost,
    /// Inner-lip gap.
    Mouth(f32),
    ToggleBrows,
    /// Head roll change in radians.
    TiltBy(f32),
    /// Level the head.
    TiltReset,
    ToggleFace,
}

/// The synthetic subject's current pose.
#[derive(Clone, Debug, PartialEq)]
pub struct SimPose {
    pub face_visible: bool,
    pub mouth:        f32,
    pub brows_raised: bool,
    /// Head roll, radians, positive = clockwise on screen.
    pub roll:         f32,
    pub hand:         Option<(f32, f32)>,
}

impl Default for SimPose {
    fn default() -> Self {
        SimPose { face_visible: true, mouth: 0.0, brows_raised: false, roll: 0.0, hand: None }
    }
}

const MAX_ROLL: f32 = 0.5;

impl SimPose {
    pub fn apply(&mut self, input: SimInput) {
        match input {
            SimInput::HandAt { x, y } => self.hand = Some((x, y)),
            SimInput::HandLost        => self.hand = None,
            SimInput::Mouth(gap)      => self.mouth = gap.max(0.0),
            SimInput::ToggleBrows     => self.brows_raised = !self.brows_raised,
            SimInput::TiltBy(d)       => self.roll = (self.roll + d).clamp(-MAX_ROLL, MAX_ROLL),
            SimInput::TiltReset       => self.roll = 0.0,
            SimInput::ToggleFace      => self.face_visible = !self.face_visible,
        }
    }
}

/// Tracker driven by [`SimInput`] events from the visualizer's window.
///
/// The window sends input here; on each detection the pending events are
/// folded into the pose and a full face mesh and hand are synthesised.
pub struct SimProvider {
    rx:      Receiver<SimInput>,
    pose:    SimPose,
    options: ProviderOptions,
    side:    HandSide,
}

impl SimProvider {
    pub fn new(rx: Receiver<SimInput>, options: ProviderOptions, side: HandSide) -> Self {
        SimProvider { rx, pose: SimPose::default(), options, side }
    }

    pub fn pose(&self) -> &SimPose { &self.pose }
}

impl LandmarkProvider for SimProvider {
    fn name(&self) -> &str { "sim" }

    fn detect(&mut self, _frame: &Frame) -> Result<LandmarkResult> {
        while let Ok(input) = self.rx.try_recv() {
            self.pose.apply(input);
        }
        Ok(synthesize(&self.pose, &self.options, self.side))
    }
}

// ── synthetic geometry ────────────────────────────────────────────────────

const FACE_CX: f32 = 0.5;
const FACE_CY: f32 = 0.45;
const FACE_RX: f32 = 0.17;
const FACE_RY: f32 = 0.23;
const MOUTH_DY:   f32 = 0.12;
const MOUTH_HALF_W: f32 = 0.05;
const BROW_GAP_RELAXED: f32 = 0.012;
const BROW_GAP_RAISED:  f32 = 0.035;

/// Build the landmark result for a pose.
pub fn synthesize(pose: &SimPose, options: &ProviderOptions, side: HandSide) -> LandmarkResult {
    let face_pts = if pose.face_visible { Some(synth_face(pose, options.face_points())) } else { None };
    let hand_pts = pose.hand.map(|(x, y)| synth_hand(x, y));

    let (left_hand, right_hand) = match side {
        HandSide::Left => (hand_pts, None),
        HandSide::Right | HandSide::Either => (None, hand_pts),
    };

    LandmarkResult { face: face_pts, left_hand, right_hand, score: Some(1.0) }
}

fn synth_face(pose: &SimPose, count: usize) -> Vec<Landmark> {
    let mut pts: Vec<Option<Landmark>> = vec![None; count];

    // Outline on the ellipse, clockwise from the top.
    for (i, &idx) in face::OVAL.iter().enumerate() {
        let th = i as f32 / face::OVAL.len() as f32 * TAU;
        pts[idx] = Some(Landmark::new(FACE_CX + FACE_RX * th.sin(), FACE_CY - FACE_RY * th.cos(), 0.0));
    }

    // Inner lips: left corner, over the top, right corner, under the bottom.
    let half_h = pose.mouth / 2.0;
    let my = FACE_CY + MOUTH_DY;
    for (i, &idx) in face::INNER_LIPS.iter().enumerate() {
        let ph = std::f32::consts::PI + i as f32 / face::INNER_LIPS.len() as f32 * TAU;
        pts[idx] = Some(Landmark::new(FACE_CX + MOUTH_HALF_W * ph.cos(), my + half_h * ph.sin(), 0.0));
    }

    let eye = Landmark::new(FACE_CX - 0.07, FACE_CY - 0.03, 0.0);
    let gap = if pose.brows_raised { BROW_GAP_RAISED } else { BROW_GAP_RELAXED };
    pts[face::EYE_UPPER] = Some(eye);
    pts[face::BROW]      = Some(Landmark::new(eye.x - 0.01, eye.y - gap, 0.0));

    // Everything else on a sunflower spiral inside the outline.
    let free = pts.iter().filter(|p| p.is_none()).count().max(1);
    let mut j = 0usize;
    for p in pts.iter_mut().filter(|p| p.is_none()) {
        let r  = 0.85 * ((j as f32 + 0.5) / free as f32).sqrt();
        let th = j as f32 * 2.399_963;
        *p = Some(Landmark::new(FACE_CX + FACE_RX * r * th.cos(), FACE_CY + FACE_RY * r * th.sin(), -0.02));
        j += 1;
    }

    let (s, c) = pose.roll.sin_cos();
    pts.into_iter()
        .map(|p| {
            let p = p.unwrap_or_default();
            let (dx, dy) = (p.x - FACE_CX, p.y - FACE_CY);
            Landmark::new(FACE_CX + dx * c - dy * s, FACE_CY + dx * s + dy * c, p.z)
        })
        .collect()
}

/// 21-point hand: palm centred on `(x, y)`, fingers pointing up.
fn synth_hand(x: f32, y: f32) -> Vec<Landmark> {
    let mut pts = vec![Landmark::default(); hand::POINTS];
    pts[hand::WRIST] = Landmark::new(x, y + 0.06, 0.0);

    // Knuckles sit 0.015 above centre; with the wrist 0.06 below the palm
    // mean lands exactly on `y`.
    let knuckles = [hand::INDEX_MCP, hand::MIDDLE_MCP, hand::RING_MCP, hand::PINKY_MCP];
    for (k, &mcp) in knuckles.iter().enumerate() {
        let kx = x - 0.03 + k as f32 * 0.02;
        pts[mcp] = Landmark::new(kx, y - 0.015, 0.0);
        for joint in 1..=3 {
            pts[mcp + joint] = Landmark::new(kx, y - 0.015 - 0.03 * joint as f32, -0.01 * joint as f32);
        }
    }
    for joint in 1..=4 {
        let t = joint as f32;
        pts[joint] = Landmark::new(x - 0.04 - 0.012 * t, y + 0.04 - 0.02 * t, -0.01 * t);
    }
    pts
}

// ════════════════════════════════════════════════════════════════════════════
// ReplayProvider — recorded landmarks
// ════════════════════════════════════════════════════════════════════════════

/// Plays back recorded results, one per detection.
pub struct ReplayProvider {
    records: Vec<LandmarkResult>,
    cursor:  usize,
    looped:  bool,
    options: ProviderOptions,
}

impl ReplayProvider {
    pub fn open(path: &Path, options: ProviderOptions, looped: bool) -> Result<Self> {
        let file = File::open(path)?;
        let provider = Self::from_reader(BufReader::new(file), options, looped)?;
        tracing::debug!(path = %path.display(), records = provider.len(), "replay loaded");
        Ok(provider)
    }

    /// Parse JSON lines; blank lines are skipped.
    pub fn from_reader<R: BufRead>(reader: R, options: ProviderOptions, looped: bool) -> Result<Self> {
        let mut records = Vec::new();
        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let rec: LandmarkResult = serde_json::from_str(&line)
                .map_err(|source| Error::Replay { line: i + 1, source })?;
            records.push(rec);
        }
        Ok(Self::from_results(records, options, looped))
    }

    pub fn from_results(records: Vec<LandmarkResult>, options: ProviderOptions, looped: bool) -> Self {
        ReplayProvider { records, cursor: 0, looped, options }
    }

    pub fn len(&self) -> usize { self.records.len() }
    pub fn is_empty(&self) -> bool { self.records.is_empty() }
    /// No more records will be produced.
    pub fn finished(&self) -> bool { !self.looped && self.cursor >= self.records.len() }
}

impl LandmarkProvider for ReplayProvider {
    fn name(&self) -> &str { "replay" }

    fn detect(&mut self, _frame: &Frame) -> Result<LandmarkResult> {
        if self.cursor >= self.records.len() {
            if !self.looped || self.records.is_empty() {
                return Ok(LandmarkResult::default());
            }
            self.cursor = 0;
        }
        let rec = self.records[self.cursor].clone();
        self.cursor += 1;

        if rec.score.is_some_and(|s| s < self.options.min_detection_confidence) {
            return Ok(LandmarkResult::default());
        }
        Ok(rec)
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════
