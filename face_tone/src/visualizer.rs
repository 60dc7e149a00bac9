//! Software-rendered visualizer using `minifb`.
//!
//! Layout:
//!
//! ```text
//! ┌──────────────────────────────────────────────┬──────────────┐
//! │ C ─────────────────────────────────────────── │ ▌            │
//! │ D ─────────────  · · ·  ──────────────────── │ ▌▌           │
//! │ E ─────────────· face ·───────●hand───────── │ ▌▌▌  spectrum│
//! │ …            (mirrored)                      │ ▌▌▌▌▌        │
//! ├──────────────────────────────────────────────┴──────────────┤
//! │ status bar: pitch slider, note, scale, volume       legend   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Drawing goes through a [`Canvas`] so scenes can be rendered and checked
//! without opening a window.  The window also serves as the simulated
//! camera: mouse and keys become [`SimInput`] events.

use minifb::{Key, KeyRepeat, MouseButton, MouseMode, Window, WindowOptions};
use std::sync::mpsc::Sender;

use tone_map::landmark::{face, hand};
use tone_map::{note_name, HandSide, Landmark, LandmarkResult, Mapping, PitchMultiplier, ScaleKind, NOTE_SLOTS};

use crate::provider::SimInput;
use crate::{Error, Result};

// ════════════════════════════════════════════════════════════════════════════
// Layout constants
// ════════════════════════════════════════════════════════════════════════════

pub const OVERLAY_W: usize = 640;
pub const OVERLAY_H: usize = 480;
pub const PANEL_W:   usize = 200;
const STATUS_H:      usize = 36;
pub const WIN_W:     usize = OVERLAY_W + PANEL_W;
pub const WIN_H:     usize = OVERLAY_H + STATUS_H;

const BG_COLOR:     u32 = 0xFF101018;
const PANEL_BG:     u32 = 0xFF000000;
const STATUS_BG:    u32 = 0xFF0F3460;
const BAND_COLOR:   u32 = 0xFF2A2A40;
const ACTIVE_BAND:  u32 = 0xFF3A3A10;
const FACE_DOT:     u32 = 0xFF00FFFF;   // cyan
const HAND_DOT:     u32 = 0xFFFF8C00;
const PALM_MARK:    u32 = 0xFFFFD700;
const BAR_COLOR:    u32 = 0xFF00FF00;   // lime
const TEXT_COLOR:   u32 = 0xFFEEEEEE;
const DIM_TEXT:     u32 = 0xFF888888;
const WARN_TEXT:    u32 = 0xFFFFBB66;

/// Simulated mouth gaps: wide open and a soft half-open.
const MOUTH_WIDE: f32 = 0.05;
const MOUTH_HALF: f32 = 0.024;
/// Roll change per repeated arrow key.
const TILT_STEP:  f32 = 0.02;

// ════════════════════════════════════════════════════════════════════════════
// Canvas — ARGB framebuffer with drawing primitives
// ════════════════════════════════════════════════════════════════════════════

pub struct Canvas {
    width:  usize,
    height: usize,
    buf:    Vec<u32>,
}

impl Canvas {
    pub fn new(width: usize, height: usize) -> Self {
        Canvas { width, height, buf: vec![BG_COLOR; width * height] }
    }

    pub fn width(&self) -> usize { self.width }
    pub fn height(&self) -> usize { self.height }
    pub fn pixels(&self) -> &[u32] { &self.buf }

    pub fn pixel(&self, x: usize, y: usize) -> Option<u32> {
        (x < self.width && y < self.height).then(|| self.buf[y * self.width + x])
    }

    pub fn clear(&mut self, color: u32) { self.buf.fill(color); }

    pub fn set_pixel(&mut self, x: i32, y: i32, color: u32) {
        if x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height {
            self.buf[y as usize * self.width + x as usize] = color;
        }
    }

    pub fn fill_rect(&mut self, x: usize, y: usize, w: usize, h: usize, color: u32) {
        let (x1, y1) = ((x + w).min(self.width), (y + h).min(self.height));
        for row in y.min(y1)..y1 {
            self.buf[row * self.width + x.min(x1)..row * self.width + x1].fill(color);
        }
    }

    pub fn draw_border(&mut self, x: usize, y: usize, w: usize, h: usize, color: u32) {
        if w == 0 || h == 0 { return; }
        let (x, y, w, h) = (x as i32, y as i32, w as i32, h as i32);
        for col in x..x + w {
            self.set_pixel(col, y, color);
            self.set_pixel(col, y + h - 1, color);
        }
        for row in y..y + h {
            self.set_pixel(x, row, color);
            self.set_pixel(x + w - 1, row, color);
        }
    }

    /// Filled disc of radius `r`.
    pub fn draw_dot(&mut self, cx: i32, cy: i32, r: i32, color: u32) {
        for dy in -r..=r {
            for dx in -r..=r {
                if dx * dx + dy * dy <= r * r {
                    self.set_pixel(cx + dx, cy + dy, color);
                }
            }
        }
    }

    /// Bresenham line.
    pub fn draw_line(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, color: u32) {
        let (dx, dy) = ((x1 - x0).abs(), -(y1 - y0).abs());
        let (sx, sy) = (if x0 < x1 { 1 } else { -1 }, if y0 < y1 { 1 } else { -1 });
        let (mut x, mut y, mut err) = (x0, y0, dx + dy);
        loop {
            self.set_pixel(x, y, color);
            if x == x1 && y == y1 { break; }
            let e2 = 2 * err;
            if e2 >= dy { err += dy; x += sx; }
            if e2 <= dx { err += dx; y += sy; }
        }
    }

    /// 3×5 bitmap text, `scale` pixels per font pixel.
    pub fn draw_label(&mut self, text: &str, x: usize, y: usize, color: u32, scale: usize) {
        let s = scale.max(1);
        let mut cx = x;
        for ch in text.chars() {
            let g = glyph(ch);
            for row in 0..5 {
                for col in 0..3 {
                    if g & (1 << (14 - (row * 3 + col))) != 0 {
                        self.fill_rect(cx + col * s, y + row * s, s, s, color);
                    }
                }
            }
            cx += 4 * s;
            if cx + 4 * s > self.width { break; }
        }
    }
}

/// Glyphs packed as five 3-bit rows, top row in the high bits.
fn glyph(c: char) -> u16 {
    match c.to_ascii_uppercase() {
        '0' => 0b111_101_101_101_111, '1' => 0b010_110_010_010_111,
        '2' => 0b111_001_111_100_111, '3' => 0b111_001_111_001_111,
        '4' => 0b101_101_111_001_001, '5' => 0b111_100_111_001_111,
        '6' => 0b111_100_111_101_111, '7' => 0b111_001_001_001_001,
        '8' => 0b111_101_111_101_111, '9' => 0b111_101_111_001_111,
        'A' => 0b111_101_111_101_101, 'B' => 0b110_101_110_101_110,
        'C' => 0b111_100_100_100_111, 'D' => 0b110_101_101_101_110,
        'E' => 0b111_100_111_100_111, 'F' => 0b111_100_111_100_100,
        'G' => 0b111_100_101_101_111, 'H' => 0b101_101_111_101_101,
        'I' => 0b111_010_010_010_111, 'J' => 0b001_001_001_101_111,
        'K' => 0b101_101_110_101_101, 'L' => 0b100_100_100_100_111,
        'M' => 0b101_111_101_101_101, 'N' => 0b111_101_101_101_101,
        'O' => 0b111_101_101_101_111, 'P' => 0b111_101_111_100_100,
        'Q' => 0b111_101_101_111_001, 'R' => 0b110_101_110_101_101,
        'S' => 0b111_100_111_001_111, 'T' => 0b111_010_010_010_010,
        'U' => 0b101_101_101_101_111, 'V' => 0b101_101_101_010_010,
        'W' => 0b101_101_101_111_101, 'X' => 0b101_101_010_101_101,
        'Y' => 0b101_101_111_010_010, 'Z' => 0b111_001_010_100_111,
        '/' => 0b001_001_010_100_100, '-' => 0b000_000_111_000_000,
        '+' => 0b000_010_111_010_000, '=' => 0b000_111_000_111_000,
        '.' => 0b000_000_000_000_010, ',' => 0b000_000_000_010_100,
        ':' => 0b000_010_000_010_000, '(' => 0b010_100_100_100_010,
        ')' => 0b010_001_001_001_010, '#' => 0b101_111_101_111_101,
        ' ' => 0,
        _   => 0b000_000_010_000_000,
    }
}

/// Mix two ARGB colours; `t` = 0 gives `a`, 1 gives `b`.
pub fn blend(a: u32, b: u32, t: f32) -> u32 {
    let t = t.clamp(0.0, 1.0);
    let mix = |shift: u32| {
        let (ca, cb) = (((a >> shift) & 0xFF) as f32, ((b >> shift) & 0xFF) as f32);
        ((ca + (cb - ca) * t).round() as u32) << shift
    };
    0xFF00_0000 | mix(16) | mix(8) | mix(0)
}

// ════════════════════════════════════════════════════════════════════════════
// Scene — everything one frame shows
// ════════════════════════════════════════════════════════════════════════════

pub struct Scene<'a> {
    pub landmarks: Option<&'a LandmarkResult>,
    pub side:      HandSide,
    /// Latest mapping, if the last cycle produced one.
    pub mapping:   Option<&'a Mapping>,
    pub spectrum:  &'a [u8],
    pub pitch:     PitchMultiplier,
    pub sounding:  bool,
    pub unlocked:  bool,
    pub status:    &'a str,
}

/// Overlay pixel for a landmark, mirrored like a selfie view.
fn overlay_point(p: &Landmark) -> (i32, i32) {
    let x = OVERLAY_W as f32 - p.x * OVERLAY_W as f32;
    let y = p.y * OVERLAY_H as f32;
    (x.round() as i32, y.round() as i32)
}

pub fn draw_scene(c: &mut Canvas, scene: &Scene<'_>) {
    c.clear(BG_COLOR);
    draw_bands(c, scene.mapping.map(|m| m.params.note_index));

    if let Some(r) = scene.landmarks {
        if let Some(mesh) = &r.face {
            for p in mesh {
                let (x, y) = overlay_point(p);
                c.draw_dot(x, y, 1, FACE_DOT);
            }
        }
        if let Some(pts) = r.hand(scene.side) {
            for p in pts {
                let (x, y) = overlay_point(p);
                c.draw_dot(x, y, 2, HAND_DOT);
            }
            if let Some(palm) = palm_centre(pts) {
                let (x, y) = overlay_point(&palm);
                c.draw_dot(x, y, 6, PALM_MARK);
            }
        }
        if r.face.is_none() {
            c.draw_label("NO FACE", OVERLAY_W / 2 - 28, 12, WARN_TEXT, 2);
        }
    }
    if !scene.unlocked {
        c.draw_label("CLICK TO ENABLE AUDIO", OVERLAY_W / 2 - 84, OVERLAY_H / 2 - 5, WARN_TEXT, 2);
    }

    draw_spectrum(c, scene.spectrum);
    draw_status(c, scene);
}

fn palm_centre(pts: &[Landmark]) -> Option<Landmark> {
    let mut sum = Landmark::default();
    for &i in &hand::PALM {
        let p = pts.get(i)?;
        sum.x += p.x;
        sum.y += p.y;
    }
    let n = hand::PALM.len() as f32;
    Some(Landmark::new(sum.x / n, sum.y / n, 0.0))
}

fn draw_bands(c: &mut Canvas, active: Option<usize>) {
    let band_h = OVERLAY_H / NOTE_SLOTS;
    for i in 0..NOTE_SLOTS {
        let y = i * band_h;
        if active == Some(i) {
            c.fill_rect(0, y, OVERLAY_W, band_h, ACTIVE_BAND);
        }
        c.fill_rect(0, y, OVERLAY_W, 1, BAND_COLOR);
        c.draw_label(note_name(i), 6, y + 6, DIM_TEXT, 2);
    }
}

fn draw_spectrum(c: &mut Canvas, bins: &[u8]) {
    c.fill_rect(OVERLAY_W, 0, PANEL_W, OVERLAY_H, PANEL_BG);
    if bins.is_empty() { return; }
    let bar_w = (PANEL_W / bins.len()).max(1);
    for (i, &b) in bins.iter().enumerate() {
        let h = b as usize * OVERLAY_H / 255;
        let x = OVERLAY_W + i * bar_w;
        if x >= WIN_W { break; }
        c.fill_rect(x, OVERLAY_H - h, bar_w.saturating_sub(1).max(1), h, BAR_COLOR);
    }
}

fn draw_status(c: &mut Canvas, scene: &Scene<'_>) {
    let y = OVERLAY_H;
    c.fill_rect(0, y, WIN_W, STATUS_H, STATUS_BG);

    // Pitch slider.
    let (sx, sw) = (10, 120);
    c.draw_border(sx, y + 6, sw, 8, DIM_TEXT);
    let frac = (scene.pitch.value() - PitchMultiplier::MIN) / (PitchMultiplier::MAX - PitchMultiplier::MIN);
    let knob = sx + (frac * (sw - 4) as f32).round() as usize;
    c.fill_rect(knob, y + 4, 4, 12, PALM_MARK);

    let mut line = format!("PITCH X{:.2}", scene.pitch.value());
    if let Some(m) = scene.mapping {
        let scale = match m.scale { ScaleKind::Major => "MAJOR", ScaleKind::Minor => "MINOR" };
        line.push_str(&format!(
            "  NOTE {}  {}  {:.0} HZ  VOL {:.2}  TILT {:+.1}",
            note_name(m.params.note_index), scale, m.params.frequency_hz, m.params.volume, m.params.detune_cents,
        ));
    }
    line.push_str(if scene.sounding { "  PLAYING" } else { "  SILENT" });
    c.draw_label(&line, sx + sw + 10, y + 6, TEXT_COLOR, 1);
    c.draw_label(scene.status, sx + sw + 10, y + 14, DIM_TEXT, 1);

    c.draw_label(
        "MOUSE=HAND  SPACE/M=MOUTH  E=BROWS  LEFT/RIGHT/T=TILT  F=FACE  UP/DOWN/R=PITCH  CLICK=AUDIO  Q=QUIT",
        10, y + 26, DIM_TEXT, 1,
    );
}

// ════════════════════════════════════════════════════════════════════════════
// Input — window state → UI events and simulated tracker input
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UiEvent {
    PitchUp,
    PitchDown,
    PitchReset,
    Unlock,
    Quit,
}

/// One poll of the window.
#[derive(Clone, Debug, Default)]
pub struct InputSnapshot {
    /// Pointer position in window pixels.
    pub mouse:      Option<(f32, f32)>,
    pub mouse_down: bool,
    /// Keys currently held.
    pub held:       Vec<Key>,
    /// Keys newly pressed this poll.
    pub pressed:    Vec<Key>,
    /// Newly pressed keys including auto-repeat.
    pub repeated:   Vec<Key>,
}

/// Edge detection across polls.
#[derive(Debug, Default)]
pub struct InputState {
    hand:       Option<(f32, f32)>,
    mouth:      f32,
    mouse_down: bool,
}

impl InputState {
    pub fn translate(&mut self, snap: &InputSnapshot) -> (Vec<UiEvent>, Vec<SimInput>) {
        let mut ui  = Vec::new();
        let mut sim = Vec::new();
        let pressed  = |k: Key| snap.pressed.contains(&k);
        let repeated = |k: Key| snap.repeated.contains(&k);

        if pressed(Key::Q) || pressed(Key::Escape) { ui.push(UiEvent::Quit); }
        if (snap.mouse_down && !self.mouse_down) || pressed(Key::Enter) { ui.push(UiEvent::Unlock); }
        self.mouse_down = snap.mouse_down;

        if repeated(Key::Up)   { ui.push(UiEvent::PitchUp); }
        if repeated(Key::Down) { ui.push(UiEvent::PitchDown); }
        if pressed(Key::R)     { ui.push(UiEvent::PitchReset); }

        // Hand follows the pointer while it is over the camera view.
        let hand = snap.mouse
            .filter(|&(x, y)| x >= 0.0 && y >= 0.0 && x < OVERLAY_W as f32 && y < OVERLAY_H as f32)
            .map(|(x, y)| (1.0 - x / OVERLAY_W as f32, y / OVERLAY_H as f32));
        if hand != self.hand {
            sim.push(match hand {
                Some((x, y)) => SimInput::HandAt { x, y },
                None         => SimInput::HandLost,
            });
            self.hand = hand;
        }

        let mouth = if snap.held.contains(&Key::Space) {
            MOUTH_WIDE
        } else if snap.held.contains(&Key::M) {
            MOUTH_HALF
        } else {
            0.0
        };
        if mouth != self.mouth {
            sim.push(SimInput::Mouth(mouth));
            self.mouth = mouth;
        }

        if pressed(Key::E) { sim.push(SimInput::ToggleBrows); }
        if pressed(Key::F) { sim.push(SimInput::ToggleFace); }
        if pressed(Key::T) { sim.push(SimInput::TiltReset); }
        if repeated(Key::Left)  { sim.push(SimInput::TiltBy(-TILT_STEP)); }
        if repeated(Key::Right) { sim.push(SimInput::TiltBy(TILT_STEP)); }

        (ui, sim)
    }
}

fn snapshot(window: &Window) -> InputSnapshot {
    InputSnapshot {
        mouse:      window.get_mouse_pos(MouseMode::Discard),
        mouse_down: window.get_mouse_down(MouseButton::Left),
        held:       window.get_keys(),
        pressed:    window.get_keys_pressed(KeyRepeat::No),
        repeated:   window.get_keys_pressed(KeyRepeat::Yes),
    }
}

fn open_window(title: &str, w: usize, h: usize) -> Result<Window> {
    let mut window = Window::new(title, w, h, WindowOptions { resize: false, ..WindowOptions::default() })
        .map_err(|e| Error::Window(e.to_string()))?;
    window.set_target_fps(60);
    Ok(window)
}

// ════════════════════════════════════════════════════════════════════════════
// Visualizer — the main window
// ════════════════════════════════════════════════════════════════════════════

pub struct Visualizer {
    window: Window,
    canvas: Canvas,
    input:  InputState,
    sim_tx: Option<Sender<SimInput>>,
}

impl Visualizer {
    /// `sim_tx` receives simulated tracker input; `None` when a real or
    /// recorded provider is in use.
    pub fn new(sim_tx: Option<Sender<SimInput>>) -> Result<Self> {
        Ok(Visualizer {
            window: open_window("Face Tone — gesture synthesizer", WIN_W, WIN_H)?,
            canvas: Canvas::new(WIN_W, WIN_H),
            input:  InputState::default(),
            sim_tx,
        })
    }

    pub fn is_open(&self) -> bool { self.window.is_open() }

    /// Poll the window; simulated input is forwarded, UI events returned.
    pub fn poll_input(&mut self) -> Vec<UiEvent> {
        if !self.window.is_open() {
            return vec![UiEvent::Quit];
        }
        let (ui, sim) = self.input.translate(&snapshot(&self.window));
        if let Some(tx) = &self.sim_tx {
            for s in sim {
                let _ = tx.send(s);
            }
        }
        ui
    }

    pub fn render(&mut self, scene: &Scene<'_>) -> Result<()> {
        draw_scene(&mut self.canvas, scene);
        self.window
            .update_with_buffer(self.canvas.pixels(), WIN_W, WIN_H)
            .map_err(|e| Error::Window(e.to_string()))
    }
}

// ════════════════════════════════════════════════════════════════════════════
// MeshView — the face-mesh demo window
// ════════════════════════════════════════════════════════════════════════════

/// Landmarks as dots, with the face outline and inner lips joined up.
///
/// This is a reduced connector set: the full triangle tessellation is not
/// drawn, only [`face::OVAL`] and [`face::INNER_LIPS`].
pub struct MeshView {
    window: Window,
    canvas: Canvas,
    input:  InputState,
}

impl MeshView {
    pub fn new() -> Result<Self> {
        Ok(MeshView {
            window: open_window("Face Mesh", OVERLAY_W, OVERLAY_H)?,
            canvas: Canvas::new(OVERLAY_W, OVERLAY_H),
            input:  InputState::default(),
        })
    }

    pub fn is_open(&self) -> bool { self.window.is_open() }

    /// Returns simulated input and whether quit was requested.
    pub fn poll_input(&mut self) -> (Vec<SimInput>, bool) {
        if !self.window.is_open() {
            return (Vec::new(), true);
        }
        let (ui, sim) = self.input.translate(&snapshot(&self.window));
        (sim, ui.contains(&UiEvent::Quit))
    }

    pub fn render(&mut self, result: &LandmarkResult, status: &str) -> Result<()> {
        draw_mesh(&mut self.canvas, result, status);
        self.window
            .update_with_buffer(self.canvas.pixels(), OVERLAY_W, OVERLAY_H)
            .map_err(|e| Error::Window(e.to_string()))
    }
}

/// Dots for every landmark plus the oval and inner-lip loops.
pub fn draw_mesh(c: &mut Canvas, result: &LandmarkResult, status: &str) {
    c.clear(BG_COLOR);
    if let Some(mesh) = &result.face {
        for contour in [&face::OVAL[..], &face::INNER_LIPS[..]] {
            draw_loop(c, mesh, contour, blend(FACE_DOT, BG_COLOR, 0.5));
        }
        for p in mesh {
            let (x, y) = overlay_point(p);
            c.draw_dot(x, y, 1, FACE_DOT);
        }
    }
    for pts in [&result.left_hand, &result.right_hand].into_iter().flatten() {
        for p in pts {
            let (x, y) = overlay_point(p);
            c.draw_dot(x, y, 2, HAND_DOT);
        }
    }
    c.draw_label(status, 6, c.height().saturating_sub(10), DIM_TEXT, 1);
}

fn draw_loop(c: &mut Canvas, mesh: &[Landmark], contour: &[usize], color: u32) {
    let pts: Vec<(i32, i32)> = contour.iter().filter_map(|&i| mesh.get(i)).map(overlay_point).collect();
    for (i, &(x0, y0)) in pts.iter().enumerate() {
        let (x1, y1) = pts[(i + 1) % pts.len()];
        c.draw_line(x0, y0, x1, y1, color);
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use tone_map::{Calibration, ControlSignals, MappingEngine};

    fn scene<'a>(landmarks: Option<&'a LandmarkResult>, mapping: Option<&'a Mapping>, spectrum: &'a [u8]) -> Scene<'a> {
        Scene {
            landmarks,
            side: HandSide::Right,
            mapping,
            spectrum,
            pitch: PitchMultiplier::default(),
            sounding: false,
            unlocked: true,
            status: "",
        }
    }

    #[test]
    fn blend_endpoints() {
        assert_eq!(blend(0xFF000000, 0xFFFFFFFF, 0.0), 0xFF000000);
        assert_eq!(blend(0xFF000000, 0xFFFFFFFF, 1.0), 0xFFFFFFFF);
        assert_eq!(blend(0xFF000000, 0xFF0000FF, 0.5), 0xFF000080);
    }

    #[test]
    fn primitives_clip_at_edges() {
        let mut c = Canvas::new(10, 10);
        c.fill_rect(8, 8, 5, 5, 1);
        c.draw_dot(-3, -3, 4, 2);
        c.draw_line(-5, 5, 15, 5, 3);
        c.draw_border(0, 0, 20, 20, 4);
        assert_eq!(c.pixel(9, 9), Some(1));
        assert_eq!(c.pixel(0, 9), Some(4));
        assert_eq!(c.pixel(5, 5), Some(3));
        assert_eq!(c.pixel(10, 0), None);
    }

    #[test]
    fn line_hits_both_endpoints() {
        let mut c = Canvas::new(20, 20);
        c.draw_line(2, 3, 15, 11, 7);
        assert_eq!(c.pixel(2, 3), Some(7));
        assert_eq!(c.pixel(15, 11), Some(7));
    }

    #[test]
    fn face_dots_are_mirrored() {
        let r = LandmarkResult { face: Some(vec![Landmark::new(0.25, 0.5, 0.0)]), ..Default::default() };
        let mut c = Canvas::new(WIN_W, WIN_H);
        draw_scene(&mut c, &scene(Some(&r), None, &[]));
        assert_eq!(c.pixel(480, 240), Some(FACE_DOT));
        assert_ne!(c.pixel(160, 240), Some(FACE_DOT));
    }

    #[test]
    fn spectrum_bars_rise_from_panel_floor() {
        let mut bins = vec![0u8; 32];
        bins[0] = 255;
        bins[1] = 128;
        let mut c = Canvas::new(WIN_W, WIN_H);
        draw_scene(&mut c, &scene(None, None, &bins));
        assert_eq!(c.pixel(OVERLAY_W, 0), Some(BAR_COLOR));
        assert_eq!(c.pixel(OVERLAY_W + 6, OVERLAY_H - 1), Some(BAR_COLOR));
        assert_eq!(c.pixel(OVERLAY_W + 6, 10), Some(PANEL_BG));
        assert_eq!(c.pixel(OVERLAY_W + 100, OVERLAY_H - 1), Some(PANEL_BG));
    }

    #[test]
    fn active_note_band_highlighted() {
        let signals = ControlSignals { mouth_openness: 0.05, head_tilt: 0.0, eyebrow_raised: true, hand_height: 0.4 };
        let m = MappingEngine::new(Calibration::default()).map(&signals, PitchMultiplier::default());
        assert_eq!(m.params.note_index, 3);
        let mut c = Canvas::new(WIN_W, WIN_H);
        draw_scene(&mut c, &scene(None, Some(&m), &[]));
        assert_eq!(c.pixel(OVERLAY_W - 10, 3 * 60 + 30), Some(ACTIVE_BAND));
        assert_eq!(c.pixel(OVERLAY_W - 10, 30), Some(BG_COLOR));
    }

    #[test]
    fn mesh_view_joins_outline() {
        let mut mesh = vec![Landmark::new(0.5, 0.5, 0.0); face::MESH_POINTS];
        mesh[face::OVAL[0]] = Landmark::new(0.5, 0.1, 0.0);
        mesh[face::OVAL[1]] = Landmark::new(0.5, 0.3, 0.0);
        let r = LandmarkResult { face: Some(mesh), ..Default::default() };
        let mut c = Canvas::new(OVERLAY_W, OVERLAY_H);
        draw_mesh(&mut c, &r, "");
        // Midway along the first outline segment.
        assert_eq!(c.pixel(320, 96), Some(blend(FACE_DOT, BG_COLOR, 0.5)));
    }

    // ── input translation ─────────────────────────────────────────────────
    #[test]
    fn pointer_drives_unmirrored_hand() {
        let mut st = InputState::default();
        let snap = InputSnapshot { mouse: Some((160.0, 120.0)), ..Default::default() };
        let (_, sim) = st.translate(&snap);
        assert_eq!(sim, vec![SimInput::HandAt { x: 0.75, y: 0.25 }]);

        // Unchanged position sends nothing.
        assert!(st.translate(&snap).1.is_empty());

        let off = InputSnapshot { mouse: Some((700.0, 120.0)), ..Default::default() };
        assert_eq!(st.translate(&off).1, vec![SimInput::HandLost]);
    }

    #[test]
    fn mouth_keys_send_on_change_only() {
        let mut st = InputState::default();
        let wide = InputSnapshot { held: vec![Key::Space], ..Default::default() };
        assert_eq!(st.translate(&wide).1, vec![SimInput::Mouth(MOUTH_WIDE)]);
        assert!(st.translate(&wide).1.is_empty());
        let half = InputSnapshot { held: vec![Key::M], ..Default::default() };
        assert_eq!(st.translate(&half).1, vec![SimInput::Mouth(MOUTH_HALF)]);
        assert_eq!(st.translate(&InputSnapshot::default()).1, vec![SimInput::Mouth(0.0)]);
    }

    #[test]
    fn half_open_mouth_still_sounds() {
        let v = MappingEngine::default().volume(MOUTH_HALF);
        assert!(v > Calibration::default().play_threshold && v < 1.0);
    }

    #[test]
    fn click_unlocks_on_press_edge() {
        let mut st = InputState::default();
        let down = InputSnapshot { mouse_down: true, ..Default::default() };
        assert_eq!(st.translate(&down).0, vec![UiEvent::Unlock]);
        assert!(st.translate(&down).0.is_empty());
    }

    #[test]
    fn keys_map_to_ui_and_sim_events() {
        let mut st = InputState::default();
        let snap = InputSnapshot {
            pressed:  vec![Key::Q, Key::R, Key::E, Key::F],
            repeated: vec![Key::Up, Key::Left],
            ..Default::default()
        };
        let (ui, sim) = st.translate(&snap);
        assert_eq!(ui, vec![UiEvent::Quit, UiEvent::PitchUp, UiEvent::PitchReset]);
        assert_eq!(sim, vec![SimInput::ToggleBrows, SimInput::ToggleFace, SimInput::TiltBy(-TILT_STEP)]);
    }
}
