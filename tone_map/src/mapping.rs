//! Mapping engine — control signals → audio parameters and a play/stop decision.
//!
//! ```text
//! mouth ──► volume = clamp((mouth − 0.02) × 50, 0, 1) ──► gate: play iff > 0.05
//! hand  ──► note   = clamp(floor(height × 8), 0, 7)
//! brows ──► scale  = major | minor          freq = scale[note] × pitch
//! tilt  ──► detune (cents, unclamped)
//! ```
//!
//! The volume ramps smoothly between 0.02 and 0.04 openness, but the gate at
//! 0.05 switches the voice hard on or off.

use serde::{Deserialize, Serialize};

use crate::gesture::ControlSignals;
use crate::scale::{Scale, ScaleKind, NOTE_SLOTS};

// ════════════════════════════════════════════════════════════════════════════
// Calibration
// ════════════════════════════════════════════════════════════════════════════

/// Thresholds and gains tied to the tracker's coordinate conventions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Calibration {
    /// Mouth openness at which volume starts rising.
    pub mouth_floor: f32,
    /// Volume gained per unit of openness above the floor.
    pub mouth_gain: f32,
    /// Volume must be strictly above this to sound.
    pub play_threshold: f32,
    /// Brow minus eye y below this counts as raised.
    pub brow_raise_threshold: f32,
    /// Scale from face-edge y difference to detune cents.
    pub tilt_gain: f32,
}

impl Default for Calibration {
    fn default() -> Self {
        Calibration {
            mouth_floor:          0.02,
            mouth_gain:           50.0,
            play_threshold:       0.05,
            brow_raise_threshold: -0.02,
            tilt_gain:            100.0,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// PitchMultiplier — the one user-facing slider
// ════════════════════════════════════════════════════════════════════════════

/// Global pitch scaling, always within [`PitchMultiplier::MIN`, `PitchMultiplier::MAX`].
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub struct PitchMultiplier(f32);

impl PitchMultiplier {
    pub const MIN:  f32 = 0.5;
    pub const MAX:  f32 = 2.0;
    /// Slider resolution.
    pub const STEP: f32 = 0.01;

    /// Clamp `value` into range.  NaN falls back to 1.0.
    pub fn new(value: f32) -> Self {
        if value.is_nan() {
            return PitchMultiplier::default();
        }
        PitchMultiplier(value.clamp(Self::MIN, Self::MAX))
    }

    pub fn value(self) -> f32 { self.0 }

    /// Move the slider by `steps` increments, staying in range.
    pub fn nudged(self, steps: i32) -> Self {
        let raw = self.0 + steps as f32 * Self::STEP;
        // Snap to the slider grid so repeated nudges do not drift.
        PitchMultiplier::new((raw / Self::STEP).round() * Self::STEP)
    }
}

impl Default for PitchMultiplier {
    fn default() -> Self { PitchMultiplier(1.0) }
}

// ════════════════════════════════════════════════════════════════════════════
// AudioParams / ToneCommand / Mapping
// ════════════════════════════════════════════════════════════════════════════

/// Tone parameters computed for one frame, whether or not they sound.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AudioParams {
    pub frequency_hz: f32,
    pub detune_cents: f32,
    pub volume:       f32,
    /// Slot 0–7.
    pub note_index:   usize,
}

/// What the synthesizer should do this frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ToneCommand {
    Play { frequency_hz: f32, volume: f32, detune_cents: f32 },
    Stop,
}

impl ToneCommand {
    pub fn is_play(&self) -> bool { matches!(self, ToneCommand::Play { .. }) }
}

/// Full result of mapping one frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Mapping {
    pub scale:   ScaleKind,
    pub params:  AudioParams,
    pub command: ToneCommand,
}

// ════════════════════════════════════════════════════════════════════════════
// MappingEngine
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Debug, Default)]
pub struct MappingEngine {
    cal: Calibration,
}

impl MappingEngine {
    pub fn new(cal: Calibration) -> Self {
        MappingEngine { cal }
    }

    pub fn calibration(&self) -> &Calibration { &self.cal }

    /// Map one frame's signals.
    pub fn map(&self, signals: &ControlSignals, pitch: PitchMultiplier) -> Mapping {
        let scale      = Scale::for_eyebrows(signals.eyebrow_raised);
        let volume     = self.volume(signals.mouth_openness);
        let note_index = note_index(signals.hand_height);

        let params = AudioParams {
            frequency_hz: scale.frequency(note_index) * pitch.value(),
            detune_cents: signals.head_tilt,
            volume,
            note_index,
        };

        Mapping { scale: scale.kind, params, command: self.decide(&params) }
    }

    /// Linear mouth gate: 0 at or below the floor, saturating at 1.
    pub fn volume(&self, mouth_openness: f32) -> f32 {
        ((mouth_openness - self.cal.mouth_floor) * self.cal.mouth_gain).clamp(0.0, 1.0)
    }

    /// Play iff volume is strictly above the threshold.
    pub fn decide(&self, params: &AudioParams) -> ToneCommand {
        if params.volume > self.cal.play_threshold {
            ToneCommand::Play {
                frequency_hz: params.frequency_hz,
                volume:       params.volume,
                detune_cents: params.detune_cents,
            }
        } else {
            ToneCommand::Stop
        }
    }
}

/// Band of the frame height the hand sits in, top band = 0.
pub fn note_index(hand_height: f32) -> usize {
    let band = (hand_height * NOTE_SLOTS as f32).floor();
    if band.is_nan() || band < 0.0 {
        0
    } else {
        (band as usize).min(NOTE_SLOTS - 1)
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn signals(mouth: f32, hand: f32, raised: bool, tilt: f32) -> ControlSignals {
        ControlSignals {
            mouth_openness: mouth,
            head_tilt:      tilt,
            eyebrow_raised: raised,
            hand_height:    hand,
        }
    }

    fn engine() -> MappingEngine { MappingEngine::default() }

    // ── volume ────────────────────────────────────────────────────────────
    #[test]
    fn volume_silent_below_floor() {
        for m in [0.0, 0.005, 0.01, 0.019, 0.0199] {
            assert_eq!(engine().volume(m), 0.0, "mouth {m}");
        }
    }

    #[test]
    fn volume_saturates_from_004() {
        for m in [0.04, 0.045, 0.05, 0.2, 1.0] {
            assert_eq!(engine().volume(m), 1.0, "mouth {m}");
        }
    }

    #[test]
    fn volume_monotonic_across_ramp() {
        let e = engine();
        let mut prev = e.volume(0.02);
        for i in 1..=40 {
            let m = 0.02 + i as f32 * 0.0005;
            let v = e.volume(m);
            assert!(v >= prev, "volume fell at mouth {m}");
            prev = v;
        }
    }

    // ── note index ────────────────────────────────────────────────────────
    #[test]
    fn note_index_partitions_height_into_eight_bands() {
        let mut prev = 0;
        for i in 0..1000 {
            let h = i as f32 / 1000.0;
            let n = note_index(h);
            assert!(n < NOTE_SLOTS);
            assert!(n >= prev);
            assert_eq!(n, (h * 8.0) as usize);
            prev = n;
        }
        assert_eq!(note_index(0.125), 1);
        assert_eq!(note_index(0.875), 7);
    }

    #[test]
    fn note_index_clamps_outside_frame() {
        assert_eq!(note_index(0.99), 7);
        assert_eq!(note_index(1.0),  7);
        assert_eq!(note_index(1.7),  7);
        assert_eq!(note_index(-0.3), 0);
        assert_eq!(note_index(f32::NAN), 0);
    }

    // ── frequency ─────────────────────────────────────────────────────────
    #[test]
    fn frequency_is_scale_times_pitch() {
        let e = engine();
        for p in [0.5, 0.75, 1.0, 1.33, 2.0] {
            let pitch = PitchMultiplier::new(p);
            for slot in 0..NOTE_SLOTS {
                let h = (slot as f32 + 0.5) / NOTE_SLOTS as f32;
                let m = e.map(&signals(0.05, h, true, 0.0), pitch);
                assert_eq!(m.params.note_index, slot);
                assert_eq!(m.params.frequency_hz, Scale::major().frequencies[slot] * p);
            }
        }
    }

    #[test]
    fn brows_select_scale_only() {
        let e = engine();
        let up   = e.map(&signals(0.05, 0.3, true,  0.0), PitchMultiplier::default());
        let down = e.map(&signals(0.05, 0.3, false, 0.0), PitchMultiplier::default());
        assert_eq!(up.scale,   ScaleKind::Major);
        assert_eq!(down.scale, ScaleKind::Minor);
        assert_eq!(up.params.frequency_hz,   329.63);
        assert_eq!(down.params.frequency_hz, 311.13);
        assert_eq!(up.params.volume, down.params.volume);
    }

    // ── gate ──────────────────────────────────────────────────────────────
    #[test]
    fn gate_exclusive_at_threshold() {
        let e = engine();
        let at = AudioParams { frequency_hz: 440.0, detune_cents: 0.0, volume: 0.05, note_index: 5 };
        assert_eq!(e.decide(&at), ToneCommand::Stop);
        let above = AudioParams { volume: 0.0501, ..at };
        assert!(e.decide(&above).is_play());
    }

    #[test]
    fn closed_mouth_stops_regardless() {
        let e = engine();
        for raised in [true, false] {
            for h in [0.0, 0.5, 0.99] {
                let m = e.map(&signals(0.0, h, raised, 12.0), PitchMultiplier::new(2.0));
                assert_eq!(m.params.volume, 0.0);
                assert_eq!(m.command, ToneCommand::Stop);
            }
        }
    }

    #[test]
    fn open_mouth_low_hand_minor_plays_middle_c() {
        let m = engine().map(&signals(0.05, 0.1, false, -3.5), PitchMultiplier::new(1.0));
        assert_eq!(m.scale, ScaleKind::Minor);
        assert_eq!(m.params.note_index, 0);
        assert_eq!(m.command, ToneCommand::Play {
            frequency_hz: 261.63,
            volume:       1.0,
            detune_cents: -3.5,
        });
    }

    #[test]
    fn hand_near_bottom_is_top_note() {
        let m = engine().map(&signals(0.05, 0.99, true, 0.0), PitchMultiplier::default());
        assert_eq!(m.params.note_index, 7);
        assert_eq!(m.params.frequency_hz, 523.25);
    }

    #[test]
    fn detune_passes_through_unclamped() {
        let m = engine().map(&signals(0.05, 0.5, true, 250.0), PitchMultiplier::default());
        assert_eq!(m.params.detune_cents, 250.0);
    }

    #[test]
    fn ramp_zone_below_gate_stops() {
        // 0.0205 openness → volume 0.025: audible ramp zone, but under the gate.
        let m = engine().map(&signals(0.0205, 0.5, true, 0.0), PitchMultiplier::default());
        assert!(m.params.volume > 0.0 && m.params.volume < 0.05);
        assert_eq!(m.command, ToneCommand::Stop);
    }

    // ── pitch multiplier ──────────────────────────────────────────────────
    #[test]
    fn pitch_multiplier_clamps() {
        assert_eq!(PitchMultiplier::new(0.1).value(), 0.5);
        assert_eq!(PitchMultiplier::new(9.0).value(), 2.0);
        assert_eq!(PitchMultiplier::new(f32::NAN).value(), 1.0);
    }

    #[test]
    fn pitch_multiplier_nudge_stays_on_grid() {
        let mut p = PitchMultiplier::default();
        for _ in 0..10 { p = p.nudged(1); }
        assert!((p.value() - 1.1).abs() < 1e-5);
        for _ in 0..500 { p = p.nudged(-1); }
        assert_eq!(p.value(), 0.5);
    }

    #[test]
    fn custom_calibration_moves_gate() {
        let e = MappingEngine::new(Calibration { play_threshold: 0.5, ..Calibration::default() });
        // 0.03 openness → volume 0.5: not strictly above 0.5.
        let at  = AudioParams { frequency_hz: 1.0, detune_cents: 0.0, volume: 0.5, note_index: 0 };
        assert_eq!(e.decide(&at), ToneCommand::Stop);
    }
}
