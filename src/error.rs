//! Error types for sound and music playback

use thiserror::Error;

/// Playback error types
///
/// Loading failures are reported at load time, never deferred: a `Sound` or
/// `Music` value that exists is always backed by decodable audio.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Audio device or stream error
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// Byte stream could not be opened (missing file, unreadable source)
    #[error("Stream open error: {0}")]
    Stream(String),

    /// Audio data could not be probed or decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Mixing channel index outside the allocated range
    #[error("Channel {channel} out of range ({allocated} allocated)")]
    ChannelOutOfRange { channel: usize, allocated: usize },

    /// No idle mixing channel available for playback
    #[error("No free channel available")]
    NoFreeChannel,

    /// Operation not valid in current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// File I/O error
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for playback operations
pub type Result<T> = std::result::Result<T, Error>;
