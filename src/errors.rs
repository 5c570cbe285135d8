use thiserror::Error;

/// Errors surfaced by session negotiation and configuration.
///
/// Busy setups and stale answers are not errors; they are reported through
/// [`crate::webrtc::SetupOutcome`] and [`crate::webrtc::AnswerOutcome`].
#[derive(Debug, Error)]
pub enum RtcError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid ICE server configuration: {0}")]
    IceServers(String),

    #[error("Negotiation error: {0}")]
    Negotiation(String),

    #[error("WebRTC error: {0}")]
    WebRtc(#[from] webrtc::Error),

    #[error("Invalid answer: {0}")]
    InvalidAnswer(String),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Playback error: {0}")]
    Playback(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RtcError>;
