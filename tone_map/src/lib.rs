//! # tone_map
//!
//! Turns one frame of face and hand landmarks into tone parameters for a
//! single sine voice.
//!
//! ## Gesture → Sound mapping
//!
//! | Gesture | Landmarks | Sound |
//! |---|---|---|
//! | Open mouth | inner lips 13 / 14 | Volume (0 below 0.02, 1 from 0.04) |
//! | Raise eyebrows | brow 70 vs eye 159 | Major scale (minor otherwise) |
//! | Tilt head | face edges 234 / 454 | Detune in cents |
//! | Move hand up/down | wrist + 4 knuckles | Note slot 0–7 |
//!
//! A note plays only while the computed volume is above the play threshold
//! (0.05); below it the voice is stopped outright rather than faded.
//!
//! ## Quick start
//!
//! ```rust
//! use tone_map::{
//!     extract, Calibration, HandSide, LandmarkResult, MappingEngine,
//!     PitchMultiplier, ToneCommand,
//! };
//!
//! let engine = MappingEngine::new(Calibration::default());
//! let frame  = LandmarkResult::default();       // nothing tracked
//! assert!(extract(&frame, HandSide::Right, engine.calibration()).is_err());
//! # let _ = (PitchMultiplier::default(), ToneCommand::Stop);
//! ```

pub mod landmark;
pub mod gesture;
pub mod scale;
pub mod mapping;

pub use landmark::{HandSide, Landmark, LandmarkResult};
pub use gesture::{extract, ControlSignals, NoGesture};
pub use scale::{note_name, Scale, ScaleKind, NOTE_NAMES, NOTE_SLOTS};
pub use mapping::{AudioParams, Calibration, Mapping, MappingEngine, PitchMultiplier, ToneCommand};
