//! Gesture extraction — one frame of landmarks → continuous control signals.
//!
//! Extraction is a pure function of the current frame.  There is no history
//! and no smoothing beyond whatever the tracker itself does.

use thiserror::Error;

use crate::landmark::{face, hand, HandSide, Landmark, LandmarkResult};
use crate::mapping::Calibration;

// ════════════════════════════════════════════════════════════════════════════
// ControlSignals
// ════════════════════════════════════════════════════════════════════════════

/// Control signals derived from one frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ControlSignals {
    /// Vertical gap between the inner lips (normalised units, ≥ 0).
    pub mouth_openness: f32,
    /// Signed head-roll proxy: `(y234 − y454) × tilt_gain`.
    pub head_tilt: f32,
    /// Brow clearly above the eye.
    pub eyebrow_raised: bool,
    /// Mean height of the palm points as a fraction of frame height.
    pub hand_height: f32,
}

// ════════════════════════════════════════════════════════════════════════════
// NoGesture — "nothing to act on this frame"
// ════════════════════════════════════════════════════════════════════════════

/// Why a frame produced no control signals.  Not a fault: callers hold the
/// current audio state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum NoGesture {
    #[error("no face tracked")]
    NoFace,
    #[error("no {0} hand tracked")]
    NoHand(&'static str),
    #[error("{set} landmarks stop before index {index}")]
    Truncated { set: &'static str, index: usize },
}

// ════════════════════════════════════════════════════════════════════════════
// extract
// ════════════════════════════════════════════════════════════════════════════

/// Derive [`ControlSignals`] from a frame.
///
/// Both the face and the `side` hand must be present.
pub fn extract(
    result: &LandmarkResult,
    side: HandSide,
    cal: &Calibration,
) -> Result<ControlSignals, NoGesture> {
    let face_pts = result.face.as_deref().ok_or(NoGesture::NoFace)?;
    let hand_pts = result.hand(side).ok_or(NoGesture::NoHand(side.name()))?;

    let upper = point(face_pts, "face", face::UPPER_INNER_LIP)?;
    let lower = point(face_pts, "face", face::LOWER_INNER_LIP)?;
    let mouth_openness = (lower.y - upper.y).abs();

    let edge_r = point(face_pts, "face", face::FACE_EDGE_RIGHT)?;
    let edge_l = point(face_pts, "face", face::FACE_EDGE_LEFT)?;
    let head_tilt = (edge_r.y - edge_l.y) * cal.tilt_gain;

    let brow = point(face_pts, "face", face::BROW)?;
    let eye  = point(face_pts, "face", face::EYE_UPPER)?;
    let eyebrow_raised = brow.y - eye.y < cal.brow_raise_threshold;

    let mut sum = 0.0_f32;
    for &i in &hand::PALM {
        sum += point(hand_pts, "hand", i)?.y;
    }
    let hand_height = sum / hand::PALM.len() as f32;

    Ok(ControlSignals { mouth_openness, head_tilt, eyebrow_raised, hand_height })
}

fn point(set: &[Landmark], name: &'static str, index: usize) -> Result<Landmark, NoGesture> {
    set.get(index).copied().ok_or(NoGesture::Truncated { set: name, index })
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    /// A neutral face: everything at mid-frame.
    fn face_mesh() -> Vec<Landmark> {
        vec![Landmark::new(0.5, 0.5, 0.0); face::MESH_POINTS]
    }

    fn hand_at(y: f32) -> Vec<Landmark> {
        vec![Landmark::new(0.5, y, 0.0); hand::POINTS]
    }

    fn frame(face_pts: Vec<Landmark>, hand_pts: Vec<Landmark>) -> LandmarkResult {
        LandmarkResult {
            face: Some(face_pts),
            right_hand: Some(hand_pts),
            ..Default::default()
        }
    }

    #[test]
    fn mouth_openness_is_absolute_lip_gap() {
        let mut f = face_mesh();
        f[face::UPPER_INNER_LIP].y = 0.60;
        f[face::LOWER_INNER_LIP].y = 0.55;   // inverted still counts
        let s = extract(&frame(f, hand_at(0.5)), HandSide::Right, &Calibration::default()).unwrap();
        assert!((s.mouth_openness - 0.05).abs() < 1e-6);
    }

    #[test]
    fn head_tilt_scaled_by_100() {
        let mut f = face_mesh();
        f[face::FACE_EDGE_RIGHT].y = 0.52;
        f[face::FACE_EDGE_LEFT].y  = 0.48;
        let s = extract(&frame(f, hand_at(0.5)), HandSide::Right, &Calibration::default()).unwrap();
        assert!((s.head_tilt - 4.0).abs() < 1e-4);
    }

    #[test]
    fn eyebrow_threshold_is_strict() {
        let cal = Calibration::default();

        let mut raised = face_mesh();
        raised[face::BROW].y      = 0.40;
        raised[face::EYE_UPPER].y = 0.45;
        let s = extract(&frame(raised, hand_at(0.5)), HandSide::Right, &cal).unwrap();
        assert!(s.eyebrow_raised);

        let mut relaxed = face_mesh();
        relaxed[face::BROW].y      = 0.44;
        relaxed[face::EYE_UPPER].y = 0.45;
        let s = extract(&frame(relaxed, hand_at(0.5)), HandSide::Right, &cal).unwrap();
        assert!(!s.eyebrow_raised);
    }

    #[test]
    fn hand_height_is_palm_mean() {
        let mut h = hand_at(0.0);
        for (k, &i) in hand::PALM.iter().enumerate() {
            h[i].y = 0.1 * (k + 1) as f32;          // 0.1 .. 0.5
        }
        h[8].y = 0.99;                               // fingertip ignored
        let s = extract(&frame(face_mesh(), h), HandSide::Right, &Calibration::default()).unwrap();
        assert!((s.hand_height - 0.3).abs() < 1e-6);
    }

    #[test]
    fn missing_face_or_hand_is_no_gesture() {
        let cal = Calibration::default();
        let no_face = LandmarkResult { right_hand: Some(hand_at(0.5)), ..Default::default() };
        assert_eq!(extract(&no_face, HandSide::Right, &cal), Err(NoGesture::NoFace));

        let no_hand = LandmarkResult { face: Some(face_mesh()), ..Default::default() };
        assert_eq!(extract(&no_hand, HandSide::Right, &cal), Err(NoGesture::NoHand("right")));
    }

    #[test]
    fn left_hand_ignored_when_right_selected() {
        let r = LandmarkResult {
            face: Some(face_mesh()),
            left_hand: Some(hand_at(0.5)),
            ..Default::default()
        };
        assert!(extract(&r, HandSide::Right, &Calibration::default()).is_err());
        assert!(extract(&r, HandSide::Left,  &Calibration::default()).is_ok());
    }

    #[test]
    fn truncated_face_does_not_panic() {
        let short = vec![Landmark::default(); 100];
        let err = extract(&frame(short, hand_at(0.5)), HandSide::Right, &Calibration::default());
        assert_eq!(err, Err(NoGesture::Truncated { set: "face", index: face::FACE_EDGE_RIGHT }));
    }
}
