use thiserror::Error;

/// Top-level error type
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration loading/validation error.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Streaming transport error.
    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    /// Internal protocol type error.
    #[error("Proto error: {0}")]
    Proto(#[from] ProtoError),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field has an invalid value and reason.
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    /// Filesystem read error.
    #[error("IO error reading config: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse error.
    #[error("TOML parse error: {0}")]
    Toml(String),
}

/// Errors that abort a streamed answer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    /// The request could not be issued or no body was obtained.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The server answered with a non-success status instead of a stream.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Reading the body failed after at least one chunk was processed.
    #[error("Stream interrupted: {0}")]
    MidStream(String),
}

impl StreamError {
    /// Returns `true` when no placeholder message should exist yet, i.e. the
    /// failure happened before a consumable body was obtained.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Status { .. })
    }
}

/// Per-line frame decoding error; recovered locally by skipping the line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameParseError {
    /// The `data:` payload is not a JSON object of the expected shape.
    #[error("Invalid frame payload: {0}")]
    InvalidJson(String),
}

/// Internal proto errors
#[derive(Debug, Error)]
pub enum ProtoError {
    /// Invalid sender string value.
    #[error("Invalid sender: {0}")]
    InvalidSender(String),
}
