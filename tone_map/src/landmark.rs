//! Landmark data as delivered by a face/hand tracker.
//!
//! Coordinates are normalised to the frame: `x` and `y` in 0.0–1.0 with the
//! origin top-left (smaller `y` = higher on screen), `z` relative depth.
//! Indices follow the 468-point face mesh and the 21-point hand model.

use serde::{Deserialize, Serialize};

// ════════════════════════════════════════════════════════════════════════════
// Landmark indices
// ════════════════════════════════════════════════════════════════════════════

/// Face-mesh indices used by the gesture extractor and the mesh demo.
pub mod face {
    /// Points in the base face mesh.
    pub const MESH_POINTS: usize = 468;
    /// Points when iris refinement is enabled.
    pub const REFINED_POINTS: usize = 478;

    pub const UPPER_INNER_LIP: usize = 13;
    pub const LOWER_INNER_LIP: usize = 14;
    /// Edge of the face on the subject's right (image left).
    pub const FACE_EDGE_RIGHT: usize = 234;
    /// Edge of the face on the subject's left (image right).
    pub const FACE_EDGE_LEFT:  usize = 454;
    pub const BROW:            usize = 70;
    pub const EYE_UPPER:       usize = 159;

    /// Face outline, clockwise from the top of the forehead.
    pub const OVAL: [usize; 36] = [
        10, 338, 297, 332, 284, 251, 389, 356, 454, 323, 361, 288,
        397, 365, 379, 378, 400, 377, 152, 148, 176, 149, 150, 136,
        172,  58, 132,  93, 234, 127, 162,  21,  54, 103,  67, 109,
    ];

    /// Inner lip contour, left corner → upper lip → right corner → lower lip.
    pub const INNER_LIPS: [usize; 20] = [
         78, 191,  80,  81,  82,  13, 312, 311, 310, 415,
        308, 324, 318, 402, 317,  14,  87, 178,  88,  95,
    ];
}

/// Hand-model indices.
pub mod hand {
    pub const POINTS: usize = 21;

    pub const WRIST:      usize = 0;
    pub const INDEX_MCP:  usize = 5;
    pub const MIDDLE_MCP: usize = 9;
    pub const RING_MCP:   usize = 13;
    pub const PINKY_MCP:  usize = 17;

    /// Wrist plus the four knuckle bases, averaged for hand height.
    pub const PALM: [usize; 5] = [WRIST, INDEX_MCP, MIDDLE_MCP, RING_MCP, PINKY_MCP];
}

// ════════════════════════════════════════════════════════════════════════════
// Landmark + LandmarkResult
// ════════════════════════════════════════════════════════════════════════════

/// A single tracked point.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub z: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Landmark { x, y, z }
    }
}

/// Everything the tracker found in one frame.  Any set may be absent.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LandmarkResult {
    #[serde(default)]
    pub face:       Option<Vec<Landmark>>,
    #[serde(default)]
    pub left_hand:  Option<Vec<Landmark>>,
    #[serde(default)]
    pub right_hand: Option<Vec<Landmark>>,
    /// Detection confidence reported by the tracker, if it gives one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score:      Option<f32>,
}

impl LandmarkResult {
    /// True when nothing at all was tracked.
    pub fn is_empty(&self) -> bool {
        self.face.is_none() && self.left_hand.is_none() && self.right_hand.is_none()
    }

    /// The hand set selected by `side`.  `Either` prefers the right hand.
    pub fn hand(&self, side: HandSide) -> Option<&[Landmark]> {
        match side {
            HandSide::Left  => self.left_hand.as_deref(),
            HandSide::Right => self.right_hand.as_deref(),
            HandSide::Either => self.right_hand.as_deref()
                .or(self.left_hand.as_deref()),
        }
    }
}

/// Which tracked hand drives the note and volume gate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandSide {
    Left,
    #[default]
    Right,
    Either,
}

impl HandSide {
    pub fn name(self) -> &'static str {
        match self {
            HandSide::Left   => "left",
            HandSide::Right  => "right",
            HandSide::Either => "either",
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn set(y: f32) -> Vec<Landmark> {
        vec![Landmark::new(0.5, y, 0.0); hand::POINTS]
    }

    #[test]
    fn empty_result_is_empty() {
        assert!(LandmarkResult::default().is_empty());
    }

    #[test]
    fn either_prefers_right_hand() {
        let r = LandmarkResult {
            left_hand:  Some(set(0.2)),
            right_hand: Some(set(0.8)),
            ..Default::default()
        };
        assert_eq!(r.hand(HandSide::Either).map(|h| h[0].y), Some(0.8));
        assert_eq!(r.hand(HandSide::Left).map(|h| h[0].y),   Some(0.2));
    }

    #[test]
    fn either_falls_back_to_left() {
        let r = LandmarkResult { left_hand: Some(set(0.3)), ..Default::default() };
        assert_eq!(r.hand(HandSide::Either).map(|h| h[0].y), Some(0.3));
        assert!(r.hand(HandSide::Right).is_none());
    }

    #[test]
    fn oval_contains_both_face_edges() {
        assert!(face::OVAL.contains(&face::FACE_EDGE_RIGHT));
        assert!(face::OVAL.contains(&face::FACE_EDGE_LEFT));
        assert!(face::INNER_LIPS.contains(&face::UPPER_INNER_LIP));
        assert!(face::INNER_LIPS.contains(&face::LOWER_INNER_LIP));
    }
}
