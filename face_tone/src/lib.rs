//! # face_tone
//!
//! Face and hand gesture tone controller.  Each video frame goes through a
//! landmark provider; the gestures found drive a single sine voice, and a
//! spectrum of the output is drawn beside a mirrored camera overlay.
//!
//! ## Control loop
//!
//! ```text
//!  frame source ──► FrameSlot ──► provider ──► extract ──► map ──► ToneSynth
//!   (own rate)     (one in flight)                                    │
//!                                                     SpectrumTap ◄───┘
//!                                                          │
//!                                   visualizer (display rate) ◄─┘
//! ```
//!
//! ## Providers
//!
//! * `sim` (default) — the window is the camera; mouse and keys pose a face
//!   and a hand.
//! * `replay` — JSON-lines landmark recordings, one frame per line.
//!
//! ### Simulation controls
//!
//! | Input | Gesture |
//! |---|---|
//! | Mouse over the overlay | Right hand position (note) |
//! | `Space` / `M` held | Mouth wide / half open (volume) |
//! | `E` | Toggle raised eyebrows (major / minor) |
//! | `Left` / `Right`, `T` | Tilt head (detune), level |
//! | `F` | Hide / show the face |
//! | `Up` / `Down`, `R` | Pitch multiplier ±0.01, reset |
//! | Click or `Enter` | Enable audio |
//! | `Q` / `Escape` | Quit |

pub mod error;
pub mod config;
pub mod frames;
pub mod provider;
pub mod control;
pub mod spectrum;
pub mod synth;
pub mod output;
pub mod visualizer;
pub mod app;

pub use error::{Error, Result};
