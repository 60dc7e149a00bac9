//! TOML configuration.
//!
//! Every field has a default, so an empty file (or no file at all) gives the
//! stock toy: simulated tracker, 640×480 at 30 fps, audio locked until the
//! first click.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use tone_map::{Calibration, HandSide, PitchMultiplier};

use crate::provider::ProviderOptions;
use crate::{Error, Result};

// ════════════════════════════════════════════════════════════════════════════
// [audio]
// ════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Keep the output silent until a user interaction unlocks it.
    #[serde(default = "AudioConfig::default_require_unlock")]
    pub require_unlock: bool,
    /// Detune and gain ramp length.
    #[serde(default = "AudioConfig::default_ramp_seconds")]
    pub ramp_seconds: f32,
    /// Output device name; the host default when absent.
    #[serde(default)]
    pub device: Option<String>,
    /// Analyser window length (power of two).
    #[serde(default = "AudioConfig::default_fft_size")]
    pub fft_size: usize,
    /// Analyser temporal smoothing, 0.0–1.0.
    #[serde(default = "AudioConfig::default_smoothing")]
    pub smoothing: f32,
    #[serde(default = "AudioConfig::default_min_db")]
    pub min_db: f32,
    #[serde(default = "AudioConfig::default_max_db")]
    pub max_db: f32,
}

impl AudioConfig {
    fn default_require_unlock() -> bool {
        true
    }
    fn default_ramp_seconds() -> f32 {
        0.1
    }
    fn default_fft_size() -> usize {
        64
    }
    fn default_smoothing() -> f32 {
        0.8
    }
    fn default_min_db() -> f32 {
        -100.0
    }
    fn default_max_db() -> f32 {
        -30.0
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            require_unlock: Self::default_require_unlock(),
            ramp_seconds: Self::default_ramp_seconds(),
            device: None,
            fft_size: Self::default_fft_size(),
            smoothing: Self::default_smoothing(),
            min_db: Self::default_min_db(),
            max_db: Self::default_max_db(),
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// [mapping]
// ════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingConfig {
    /// Initial slider position, 0.5–2.0.
    #[serde(default = "MappingConfig::default_pitch_multiplier")]
    pub pitch_multiplier: f32,
    #[serde(default)]
    pub hand: HandSide,
    #[serde(default)]
    pub calibration: Calibration,
}

impl MappingConfig {
    fn default_pitch_multiplier() -> f32 {
        1.0
    }

    pub fn pitch(&self) -> PitchMultiplier {
        PitchMultiplier::new(self.pitch_multiplier)
    }
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            pitch_multiplier: Self::default_pitch_multiplier(),
            hand: HandSide::default(),
            calibration: Calibration::default(),
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// [provider]
// ════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    /// Keyboard and mouse stand in for the tracker.
    #[default]
    Sim,
    /// Recorded landmark results from a JSON-lines file.
    Replay,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub kind: ProviderKind,
    #[serde(default)]
    pub replay_path: Option<PathBuf>,
    /// Start the replay again once it runs out.
    #[serde(default)]
    pub loop_replay: bool,
    /// Artificial inference time added to every detection.
    #[serde(default)]
    pub latency_ms: u64,
    #[serde(default)]
    pub options: ProviderOptions,
}

// ════════════════════════════════════════════════════════════════════════════
// [video]
// ════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoConfig {
    #[serde(default = "VideoConfig::default_width")]
    pub width: u32,
    #[serde(default = "VideoConfig::default_height")]
    pub height: u32,
    #[serde(default = "VideoConfig::default_fps")]
    pub fps: f32,
}

impl VideoConfig {
    fn default_width() -> u32 {
        640
    }
    fn default_height() -> u32 {
        480
    }
    fn default_fps() -> f32 {
        30.0
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            width: Self::default_width(),
            height: Self::default_height(),
            fps: Self::default_fps(),
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// AppConfig
// ════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub mapping: MappingConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub video: VideoConfig,
}

impl AppConfig {
    /// Load from `path`, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let cfg = match path {
            Some(p) => {
                let text = fs::read_to_string(p)?;
                let cfg: AppConfig = toml::from_str(&text)?;
                tracing::debug!(path = %p.display(), "config loaded");
                cfg
            }
            None => AppConfig::default(),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject values the control loop cannot run with.
    pub fn validate(&self) -> Result<()> {
        let a = &self.audio;
        if !(a.ramp_seconds >= 0.0 && a.ramp_seconds <= 5.0) {
            return Err(Error::Config(format!("audio.ramp_seconds {} outside 0–5", a.ramp_seconds)));
        }
        if !a.fft_size.is_power_of_two() || !(32..=32_768).contains(&a.fft_size) {
            return Err(Error::Config(format!(
                "audio.fft_size {} must be a power of two in 32–32768", a.fft_size
            )));
        }
        if !(0.0..=1.0).contains(&a.smoothing) {
            return Err(Error::Config(format!("audio.smoothing {} outside 0–1", a.smoothing)));
        }
        if a.min_db >= a.max_db {
            return Err(Error::Config(format!(
                "audio.min_db {} must be below audio.max_db {}", a.min_db, a.max_db
            )));
        }

        let m = &self.mapping;
        if !(PitchMultiplier::MIN..=PitchMultiplier::MAX).contains(&m.pitch_multiplier) {
            return Err(Error::Config(format!(
                "mapping.pitch_multiplier {} outside {}–{}",
                m.pitch_multiplier, PitchMultiplier::MIN, PitchMultiplier::MAX
            )));
        }
        let c = &m.calibration;
        if !(c.mouth_gain > 0.0) {
            return Err(Error::Config("mapping.calibration.mouth_gain must be positive".into()));
        }
        if !(0.0..1.0).contains(&c.play_threshold) {
            return Err(Error::Config(format!(
                "mapping.calibration.play_threshold {} outside 0–1", c.play_threshold
            )));
        }

        let p = &self.provider;
        p.options.validate()?;
        if p.kind == ProviderKind::Replay && p.replay_path.is_none() {
            return Err(Error::Config("provider.kind = \"replay\" needs provider.replay_path".into()));
        }

        let v = &self.video;
        if v.width == 0 || v.height == 0 {
            return Err(Error::Config(format!("video size {}x{} is empty", v.width, v.height)));
        }
        if !(v.fps > 0.0 && v.fps <= 240.0) {
            return Err(Error::Config(format!("video.fps {} outside (0, 240]", v.fps)));
        }
        Ok(())
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(body: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(body.as_bytes()).unwrap();
        f
    }

    #[test]
    fn no_path_gives_defaults() {
        let cfg = AppConfig::load(None).unwrap();
        assert!(cfg.audio.require_unlock);
        assert_eq!(cfg.audio.fft_size, 64);
        assert_eq!(cfg.mapping.hand, HandSide::Right);
        assert_eq!(cfg.provider.kind, ProviderKind::Sim);
        assert_eq!(cfg.video.width, 640);
        assert_eq!(cfg.mapping.calibration, Calibration::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let f = write_config(
            "[mapping]\npitch_multiplier = 1.5\nhand = \"either\"\n\
             [mapping.calibration]\nplay_threshold = 0.1\n",
        );
        let cfg = AppConfig::load(Some(f.path())).unwrap();
        assert_eq!(cfg.mapping.pitch_multiplier, 1.5);
        assert_eq!(cfg.mapping.hand, HandSide::Either);
        assert_eq!(cfg.mapping.calibration.play_threshold, 0.1);
        assert_eq!(cfg.mapping.calibration.mouth_floor, 0.02);
        assert_eq!(cfg.audio.ramp_seconds, 0.1);
    }

    #[test]
    fn replay_section_parses() {
        let f = write_config(
            "[provider]\nkind = \"replay\"\nreplay_path = \"take1.jsonl\"\nloop_replay = true\n\
             [provider.options]\nrefine_landmarks = false\nmin_detection_confidence = 0.7\n",
        );
        let cfg = AppConfig::load(Some(f.path())).unwrap();
        assert_eq!(cfg.provider.kind, ProviderKind::Replay);
        assert!(cfg.provider.loop_replay);
        assert!(!cfg.provider.options.refine_landmarks);
        assert_eq!(cfg.provider.options.min_detection_confidence, 0.7);
        assert_eq!(cfg.provider.options.max_faces, 1);
    }

    #[test]
    fn pitch_out_of_range_rejected() {
        let f = write_config("[mapping]\npitch_multiplier = 3.0\n");
        assert!(matches!(AppConfig::load(Some(f.path())), Err(Error::Config(_))));
    }

    #[test]
    fn fft_size_must_be_power_of_two() {
        let f = write_config("[audio]\nfft_size = 100\n");
        assert!(matches!(AppConfig::load(Some(f.path())), Err(Error::Config(_))));
    }

    #[test]
    fn replay_without_path_rejected() {
        let f = write_config("[provider]\nkind = \"replay\"\n");
        assert!(matches!(AppConfig::load(Some(f.path())), Err(Error::Config(_))));
    }

    #[test]
    fn bad_toml_is_toml_error() {
        let f = write_config("[audio\nfft_size = 64\n");
        assert!(matches!(AppConfig::load(Some(f.path())), Err(Error::Toml(_))));
    }

    #[test]
    fn missing_file_is_io_error() {
        let r = AppConfig::load(Some(Path::new("/nonexistent/face_tone.toml")));
        assert!(matches!(r, Err(Error::Io(_))));
    }
}
