//! Error types for face_tone

use thiserror::Error;

/// Result type alias for face_tone operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced while setting up or feeding the control loop.
///
/// Nothing inside a running gesture cycle returns these to a caller: a
/// failed detection is logged and the current sound is held.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Malformed landmark record in a replay file
    #[error("replay line {line}: {source}")]
    Replay {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    /// Landmark provider failure
    #[error("provider error: {0}")]
    Provider(String),

    /// Audio device error
    #[error("audio error: {0}")]
    Audio(String),

    /// Window / framebuffer error
    #[error("window error: {0}")]
    Window(String),
}
