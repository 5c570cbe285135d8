//! Inbound media routing
//!
//! Remote tracks are handed to host surfaces by kind. Video always goes to
//! the one persistent surface the host supplied. Audio gets a fresh output
//! per track, created through a factory, and the previous output is torn
//! down first so only one audio sink is ever live.

use crate::errors::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::track::track_remote::TrackRemote;

/// Media kind of an inbound track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackKind {
    Audio,
    Video,
    Unknown,
}

impl From<RTPCodecType> for TrackKind {
    fn from(kind: RTPCodecType) -> Self {
        match kind {
            RTPCodecType::Audio => TrackKind::Audio,
            RTPCodecType::Video => TrackKind::Video,
            RTPCodecType::Unspecified => TrackKind::Unknown,
        }
    }
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKind::Audio => write!(f, "audio"),
            TrackKind::Video => write!(f, "video"),
            TrackKind::Unknown => write!(f, "unknown"),
        }
    }
}

/// Handle to an inbound stream, as given to media surfaces
#[derive(Clone)]
pub struct MediaStream {
    id: String,
    track_id: String,
    kind: TrackKind,
    track: Option<Arc<TrackRemote>>,
}

impl MediaStream {
    /// A stream with no RTP track behind it (synthetic sources, tests).
    pub fn new(id: impl Into<String>, track_id: impl Into<String>, kind: TrackKind) -> Self {
        Self {
            id: id.into(),
            track_id: track_id.into(),
            kind,
            track: None,
        }
    }

    pub fn from_remote(track: Arc<TrackRemote>) -> Self {
        Self {
            id: track.stream_id(),
            track_id: track.id(),
            kind: track.kind().into(),
            track: Some(track),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn track_id(&self) -> &str {
        &self.track_id
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    /// The remote RTP track, for surfaces that decode it themselves.
    pub fn track(&self) -> Option<&Arc<TrackRemote>> {
        self.track.as_ref()
    }
}

impl fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaStream")
            .field("id", &self.id)
            .field("track_id", &self.track_id)
            .field("kind", &self.kind)
            .field("has_track", &self.track.is_some())
            .finish()
    }
}

/// Persistent video render surface owned by the host
#[async_trait]
pub trait VideoSurface: Send + Sync {
    fn attach(&self, stream: MediaStream);

    async fn play(&self) -> Result<()>;
}

/// Output properties forced onto every audio sink
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioOutputSettings {
    pub autoplay: bool,
    pub muted: bool,
    pub volume: f32,
    /// Audio sinks have no visual representation
    pub hidden: bool,
}

impl Default for AudioOutputSettings {
    fn default() -> Self {
        Self {
            autoplay: true,
            muted: false,
            volume: 1.0,
            hidden: true,
        }
    }
}

/// Ephemeral audio output created for one inbound audio track
#[async_trait]
pub trait AudioOutput: Send + Sync {
    /// `None` clears the source.
    fn set_source(&self, stream: Option<MediaStream>);

    fn apply_settings(&self, settings: AudioOutputSettings);

    /// Attach to the host's output tree.
    fn mount(&self);

    fn unmount(&self);

    async fn play(&self) -> Result<()>;
}

pub trait AudioOutputFactory: Send + Sync {
    fn create(&self) -> Arc<dyn AudioOutput>;
}

/// Broadcasts user interactions (clicks, key presses) from the host.
///
/// Playback that was refused by an autoplay policy is retried on the next
/// notification.
#[derive(Debug, Clone)]
pub struct UserActivation {
    tx: broadcast::Sender<()>,
}

impl UserActivation {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self { tx }
    }

    pub fn notify(&self) {
        let _ = self.tx.send(());
    }

    fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }
}

impl Default for UserActivation {
    fn default() -> Self {
        Self::new()
    }
}

type AudioSlot = Arc<Mutex<Option<Arc<dyn AudioOutput>>>>;

/// Routes inbound streams to the video surface or a fresh audio sink
pub struct MediaRouter {
    video: Arc<dyn VideoSurface>,
    audio_factory: Arc<dyn AudioOutputFactory>,
    audio_sink: AudioSlot,
    activation: UserActivation,
    settings: AudioOutputSettings,
    retry_on_interaction: bool,
}

impl MediaRouter {
    pub fn new(
        video: Arc<dyn VideoSurface>,
        audio_factory: Arc<dyn AudioOutputFactory>,
        activation: UserActivation,
    ) -> Self {
        Self {
            video,
            audio_factory,
            audio_sink: Arc::new(Mutex::new(None)),
            activation,
            settings: AudioOutputSettings::default(),
            retry_on_interaction: true,
        }
    }

    pub fn with_volume(mut self, volume: f32) -> Self {
        self.settings.volume = volume.clamp(0.0, 1.0);
        self
    }

    pub fn with_interaction_retry(mut self, enabled: bool) -> Self {
        self.retry_on_interaction = enabled;
        self
    }

    pub fn activation(&self) -> &UserActivation {
        &self.activation
    }

    /// Dispatch one inbound stream by kind.
    pub async fn route(&self, stream: MediaStream) {
        log::info!(
            "Inbound {} track {} (stream {})",
            stream.kind(),
            stream.track_id(),
            stream.id()
        );

        match stream.kind() {
            TrackKind::Video => self.attach_video(stream).await,
            TrackKind::Audio => self.attach_audio(stream).await,
            TrackKind::Unknown => {
                log::warn!("Ignoring track {} of unknown kind", stream.track_id());
            }
        }
    }

    async fn attach_video(&self, stream: MediaStream) {
        self.video.attach(stream);
        if let Err(e) = self.video.play().await {
            log::warn!("Video playback did not start: {}", e);
        }
    }

    async fn attach_audio(&self, stream: MediaStream) {
        let sink = {
            let mut slot = self.audio_sink.lock().await;
            if let Some(previous) = slot.take() {
                log::debug!("Replacing existing audio sink");
                detach_sink(previous.as_ref());
            }

            let sink = self.audio_factory.create();
            sink.set_source(Some(stream));
            sink.apply_settings(self.settings);
            sink.mount();
            *slot = Some(Arc::clone(&sink));
            sink
        };

        if let Err(e) = sink.play().await {
            log::warn!("Audio playback blocked: {}", e);
            if self.retry_on_interaction {
                self.retry_on_next_interaction(sink);
            }
        }
    }

    fn retry_on_next_interaction(&self, sink: Arc<dyn AudioOutput>) {
        let mut interactions = self.activation.subscribe();
        let slot = Arc::clone(&self.audio_sink);

        tokio::spawn(async move {
            match interactions.recv().await {
                Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return,
            }

            let still_current = slot
                .lock()
                .await
                .as_ref()
                .is_some_and(|current| Arc::ptr_eq(current, &sink));
            if !still_current {
                log::debug!("Audio sink replaced before user interaction, skipping retry");
                return;
            }

            match sink.play().await {
                Ok(()) => log::info!("Audio playback started after user interaction"),
                Err(e) => log::warn!("Audio playback retry failed: {}", e),
            }
        });
    }

    /// Clear and unmount the live audio sink. Returns whether one existed.
    pub async fn detach_audio(&self) -> bool {
        match self.audio_sink.lock().await.take() {
            Some(sink) => {
                detach_sink(sink.as_ref());
                true
            }
            None => false,
        }
    }

    pub async fn has_audio_sink(&self) -> bool {
        self.audio_sink.lock().await.is_some()
    }
}

fn detach_sink(sink: &dyn AudioOutput) {
    sink.set_source(None);
    sink.unmount();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryAudioFactory, MemoryVideoSurface};
    use std::time::Duration;

    fn router(video: &Arc<MemoryVideoSurface>, audio: &Arc<MemoryAudioFactory>) -> MediaRouter {
        MediaRouter::new(
            Arc::clone(video) as Arc<dyn VideoSurface>,
            Arc::clone(audio) as Arc<dyn AudioOutputFactory>,
            UserActivation::new(),
        )
    }

    #[tokio::test]
    async fn test_video_goes_to_surface() {
        let video = Arc::new(MemoryVideoSurface::new());
        let audio = Arc::new(MemoryAudioFactory::new());
        let router = router(&video, &audio);

        router
            .route(MediaStream::new("s1", "v1", TrackKind::Video))
            .await;

        assert_eq!(video.attached_track().as_deref(), Some("v1"));
        assert_eq!(video.play_calls(), 1);
        assert!(audio.outputs().is_empty());
    }

    #[tokio::test]
    async fn test_video_play_failure_is_not_fatal() {
        let video = Arc::new(MemoryVideoSurface::new());
        video.fail_playback(true);
        let audio = Arc::new(MemoryAudioFactory::new());
        let router = router(&video, &audio);

        router
            .route(MediaStream::new("s1", "v1", TrackKind::Video))
            .await;
        assert_eq!(video.attached_track().as_deref(), Some("v1"));
    }

    #[tokio::test]
    async fn test_second_audio_track_replaces_first() {
        let video = Arc::new(MemoryVideoSurface::new());
        let audio = Arc::new(MemoryAudioFactory::new());
        let router = router(&video, &audio);

        router
            .route(MediaStream::new("s1", "a1", TrackKind::Audio))
            .await;
        router
            .route(MediaStream::new("s1", "a2", TrackKind::Audio))
            .await;

        let outputs = audio.outputs();
        assert_eq!(outputs.len(), 2);
        assert!(outputs[0].source().is_none());
        assert!(!outputs[0].is_mounted());
        assert_eq!(outputs[1].source().as_deref(), Some("a2"));
        assert!(outputs[1].is_mounted());
        assert_eq!(audio.live_outputs(), 1);
    }

    #[tokio::test]
    async fn test_audio_settings_forced() {
        let video = Arc::new(MemoryVideoSurface::new());
        let audio = Arc::new(MemoryAudioFactory::new());
        let router = router(&video, &audio).with_volume(3.0);

        router
            .route(MediaStream::new("s1", "a1", TrackKind::Audio))
            .await;

        let settings = audio.outputs()[0].settings().unwrap();
        assert!(settings.autoplay);
        assert!(!settings.muted);
        assert!(settings.hidden);
        assert_eq!(settings.volume, 1.0);
    }

    #[tokio::test]
    async fn test_blocked_audio_retries_once_on_interaction() {
        let video = Arc::new(MemoryVideoSurface::new());
        let audio = Arc::new(MemoryAudioFactory::new());
        audio.block_autoplay(true);
        let router = router(&video, &audio);

        router
            .route(MediaStream::new("s1", "a1", TrackKind::Audio))
            .await;
        let output = Arc::clone(&audio.outputs()[0]);
        assert_eq!(output.play_calls(), 1);
        assert!(!output.is_playing());

        audio.block_autoplay(false);
        router.activation().notify();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(output.play_calls(), 2);
        assert!(output.is_playing());

        router.activation().notify();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(output.play_calls(), 2);
    }

    #[tokio::test]
    async fn test_replaced_sink_is_not_retried() {
        let video = Arc::new(MemoryVideoSurface::new());
        let audio = Arc::new(MemoryAudioFactory::new());
        audio.block_autoplay(true);
        let router = router(&video, &audio);

        router
            .route(MediaStream::new("s1", "a1", TrackKind::Audio))
            .await;
        assert!(router.detach_audio().await);

        router.activation().notify();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(audio.outputs()[0].play_calls(), 1);
    }

    #[tokio::test]
    async fn test_detach_without_sink() {
        let video = Arc::new(MemoryVideoSurface::new());
        let audio = Arc::new(MemoryAudioFactory::new());
        let router = router(&video, &audio);
        assert!(!router.detach_audio().await);
        assert!(!router.has_audio_sink().await);
    }
}
