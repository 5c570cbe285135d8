//! Avatar session driver
//!
//! Connects the realtime message channel to a [`PeerSessionManager`]:
//! `session.updated` starts negotiation, the offer goes out as
//! `session.avatar.connect`, and the service's answer is applied when it
//! arrives.

pub mod messages;

pub use messages::{connect_message, message_type, IceSettings, SessionUpdateFilter, SESSION_UPDATED};

use crate::config::{AvatarRtcConfig, SignalingConfig};
use crate::errors::Result;
use crate::webrtc::{
    AnswerOutcome, AudioOutputFactory, MediaRouter, PeerSessionManager, SetupOutcome,
    UserActivation, VideoSurface,
};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Outbound half of the realtime connection to the avatar service
pub trait RealtimeChannel: Send + Sync {
    fn send(&self, message: Value) -> Result<()>;
}

/// What [`AvatarSession::handle_server_message`] did with a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageDisposition {
    SetupStarted,
    SetupBusy,
    DuplicateUpdate,
    NoIceServers,
    AnswerApplied,
    AnswerIgnored,
    Ignored,
}

pub struct AvatarSession {
    manager: PeerSessionManager,
    signaling: SignalingConfig,
    fallback_ice_servers: Vec<String>,
    update_filter: Mutex<SessionUpdateFilter>,
}

impl AvatarSession {
    pub fn new(
        config: &AvatarRtcConfig,
        channel: Arc<dyn RealtimeChannel>,
        video: Arc<dyn VideoSurface>,
        audio_factory: Arc<dyn AudioOutputFactory>,
        activation: UserActivation,
    ) -> Self {
        let router = MediaRouter::new(video, audio_factory, activation)
            .with_volume(config.audio.volume)
            .with_interaction_retry(config.audio.retry_on_interaction);

        let connect_type = config.signaling.connect_message_type.clone();
        let manager = PeerSessionManager::new(router, config.peer_options(), move |envelope| {
            let message = connect_message(&connect_type, &envelope);
            if let Err(e) = channel.send(message) {
                log::error!("Failed to send {}: {}", connect_type, e);
            }
        });

        Self {
            manager,
            signaling: config.signaling.clone(),
            fallback_ice_servers: config.rtc.fallback_ice_servers.clone(),
            update_filter: Mutex::new(SessionUpdateFilter::new()),
        }
    }

    pub fn manager(&self) -> &PeerSessionManager {
        &self.manager
    }

    /// Parse and dispatch a text frame from the realtime channel.
    pub async fn handle_text(&self, text: &str) -> Result<MessageDisposition> {
        let message: Value = serde_json::from_str(text)?;
        self.handle_server_message(&message).await
    }

    pub async fn handle_server_message(&self, message: &Value) -> Result<MessageDisposition> {
        let Some(kind) = message_type(message) else {
            return Ok(MessageDisposition::Ignored);
        };

        if kind == SESSION_UPDATED {
            return self.on_session_updated(message).await;
        }

        if self.signaling.answer_message_types.iter().any(|t| t == kind) {
            log::debug!("Received answer message {}", kind);
            return Ok(match self.manager.handle_answer(message).await? {
                AnswerOutcome::Applied => MessageDisposition::AnswerApplied,
                AnswerOutcome::Ignored => MessageDisposition::AnswerIgnored,
            });
        }

        Ok(MessageDisposition::Ignored)
    }

    async fn on_session_updated(&self, message: &Value) -> Result<MessageDisposition> {
        if self.signaling.dedupe_session_updates
            && self.update_filter.lock().await.is_duplicate(message)
        {
            log::debug!("Skipping duplicate session.updated");
            return Ok(MessageDisposition::DuplicateUpdate);
        }

        let settings = match IceSettings::from_session_update(message)? {
            Some(settings) => settings,
            None if !self.fallback_ice_servers.is_empty() => {
                log::info!("Session carries no ICE servers, using configured fallback");
                IceSettings::from_urls(self.fallback_ice_servers.clone())
            }
            None => {
                log::debug!("session.updated without ICE servers, not negotiating");
                return Ok(MessageDisposition::NoIceServers);
            }
        };

        let outcome = self
            .manager
            .setup_webrtc(
                settings.servers,
                settings.username.as_deref(),
                settings.credential.as_deref(),
            )
            .await?;

        Ok(match outcome {
            SetupOutcome::Started { .. } => MessageDisposition::SetupStarted,
            SetupOutcome::Busy => MessageDisposition::SetupBusy,
        })
    }

    /// Tear down the connection and forget the last session update.
    pub async fn close(&self) {
        self.manager.dispose().await;
        self.update_filter.lock().await.reset();
    }
}
