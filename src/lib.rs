//! avatar-rtc: WebRTC session negotiation for conversational avatar clients
//!
//! This crate owns the client side of a live audio/video session with a
//! remote avatar: it negotiates one peer connection per session, routes the
//! avatar's video and audio to host surfaces, and speaks the realtime
//! session protocol that carries the offer and answer.
//!
//! # Features
//! - Non-trickle ICE: one offer per session, sent once gathering completes
//! - ICE server normalization with uniform TURN credentials
//! - Receive-only audio/video transceivers over a single bundled transport
//! - Single audio sink with autoplay-policy recovery
//! - Duplicate `session.updated` suppression
//!
//! # Usage
//! ```rust,ignore
//! use avatar_rtc::{AvatarRtcConfig, AvatarSession, UserActivation};
//!
//! let config = AvatarRtcConfig::load_or_default();
//! avatar_rtc::init_logging_with(&config.logging.filter);
//!
//! let session = AvatarSession::new(&config, channel, video, audio_factory, UserActivation::new());
//! while let Some(text) = socket.next_text().await {
//!     session.handle_text(&text).await?;
//! }
//! session.close().await;
//! ```
pub mod config;
pub mod errors;
pub mod session;
pub mod webrtc;

// Testing utilities - in-memory surfaces for offline negotiation
pub mod testing;

// Re-exports for convenience
pub use crate::config::AvatarRtcConfig;
pub use errors::{Result, RtcError};
pub use session::{AvatarSession, MessageDisposition, RealtimeChannel};
pub use crate::webrtc::{
    AnswerOutcome, MediaRouter, PeerSessionManager, SetupOutcome, SignalingPhase, UserActivation,
};

/// Initialize logging with the default filter
pub fn init_logging() {
    init_logging_with("avatar_rtc=info");
}

/// Initialize logging, using `filter` when `RUST_LOG` is unset
pub fn init_logging_with(filter: &str) {
    let env = env_logger::Env::default().default_filter_or(filter);
    let _ = env_logger::Builder::from_env(env).try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get crate information
pub fn get_info() -> CrateInfo {
    CrateInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: DESCRIPTION.to_string(),
    }
}

/// Crate information structure
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CrateInfo {
    pub name: String,
    pub version: String,
    pub description: String,
}
