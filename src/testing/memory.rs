//! In-memory media surfaces and realtime channel
//!
//! These stand in for a host UI when no real renderer or audio device is
//! attached: integration tests, the CLI, and headless probes.

use crate::errors::{Result, RtcError};
use crate::session::RealtimeChannel;
use crate::webrtc::media::{
    AudioOutput, AudioOutputFactory, AudioOutputSettings, MediaStream, VideoSurface,
};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Video surface that records what was attached
#[derive(Debug, Default)]
pub struct MemoryVideoSurface {
    attached: Mutex<Option<MediaStream>>,
    play_calls: AtomicUsize,
    fail_playback: AtomicBool,
}

impl MemoryVideoSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_playback(&self, fail: bool) {
        self.fail_playback.store(fail, Ordering::SeqCst);
    }

    pub fn attached_track(&self) -> Option<String> {
        lock(&self.attached)
            .as_ref()
            .map(|s| s.track_id().to_string())
    }

    pub fn play_calls(&self) -> usize {
        self.play_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VideoSurface for MemoryVideoSurface {
    fn attach(&self, stream: MediaStream) {
        *lock(&self.attached) = Some(stream);
    }

    async fn play(&self) -> Result<()> {
        self.play_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_playback.load(Ordering::SeqCst) {
            return Err(RtcError::Playback("video surface refused playback".to_string()));
        }
        Ok(())
    }
}

/// Audio output that tracks its source, mount state and playback attempts
#[derive(Debug)]
pub struct MemoryAudioOutput {
    source: Mutex<Option<MediaStream>>,
    settings: Mutex<Option<AudioOutputSettings>>,
    mounted: AtomicBool,
    playing: AtomicBool,
    play_calls: AtomicUsize,
    autoplay_blocked: Arc<AtomicBool>,
}

impl MemoryAudioOutput {
    fn new(autoplay_blocked: Arc<AtomicBool>) -> Self {
        Self {
            source: Mutex::new(None),
            settings: Mutex::new(None),
            mounted: AtomicBool::new(false),
            playing: AtomicBool::new(false),
            play_calls: AtomicUsize::new(0),
            autoplay_blocked,
        }
    }

    /// Track id of the attached source, if any
    pub fn source(&self) -> Option<String> {
        lock(&self.source).as_ref().map(|s| s.track_id().to_string())
    }

    pub fn settings(&self) -> Option<AudioOutputSettings> {
        *lock(&self.settings)
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::SeqCst)
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    pub fn play_calls(&self) -> usize {
        self.play_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioOutput for MemoryAudioOutput {
    fn set_source(&self, stream: Option<MediaStream>) {
        if stream.is_none() {
            self.playing.store(false, Ordering::SeqCst);
        }
        *lock(&self.source) = stream;
    }

    fn apply_settings(&self, settings: AudioOutputSettings) {
        *lock(&self.settings) = Some(settings);
    }

    fn mount(&self) {
        self.mounted.store(true, Ordering::SeqCst);
    }

    fn unmount(&self) {
        self.mounted.store(false, Ordering::SeqCst);
    }

    async fn play(&self) -> Result<()> {
        self.play_calls.fetch_add(1, Ordering::SeqCst);
        if self.autoplay_blocked.load(Ordering::SeqCst) {
            return Err(RtcError::Playback(
                "play() rejected: user has not interacted with the page".to_string(),
            ));
        }
        self.playing.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Factory keeping every output it ever created, newest last
#[derive(Debug, Default)]
pub struct MemoryAudioFactory {
    outputs: Mutex<Vec<Arc<MemoryAudioOutput>>>,
    autoplay_blocked: Arc<AtomicBool>,
}

impl MemoryAudioFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a browser autoplay policy for current and future outputs.
    pub fn block_autoplay(&self, blocked: bool) {
        self.autoplay_blocked.store(blocked, Ordering::SeqCst);
    }

    pub fn outputs(&self) -> Vec<Arc<MemoryAudioOutput>> {
        lock(&self.outputs).clone()
    }

    /// Outputs that are mounted with a source attached
    pub fn live_outputs(&self) -> usize {
        lock(&self.outputs)
            .iter()
            .filter(|o| o.is_mounted() && o.source().is_some())
            .count()
    }
}

impl AudioOutputFactory for MemoryAudioFactory {
    fn create(&self) -> Arc<dyn AudioOutput> {
        let output = Arc::new(MemoryAudioOutput::new(Arc::clone(&self.autoplay_blocked)));
        lock(&self.outputs).push(Arc::clone(&output));
        output
    }
}

/// Realtime channel that queues outbound messages for inspection
#[derive(Debug)]
pub struct MemoryChannel {
    sent: Mutex<Vec<Value>>,
    tx: mpsc::UnboundedSender<Value>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Value>>,
}

impl MemoryChannel {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            sent: Mutex::new(Vec::new()),
            tx,
            rx: tokio::sync::Mutex::new(rx),
        }
    }

    pub fn sent(&self) -> Vec<Value> {
        lock(&self.sent).clone()
    }

    /// Wait for the next outbound message.
    pub async fn next_message(&self, timeout: Duration) -> Option<Value> {
        let mut rx = self.rx.lock().await;
        tokio::time::timeout(timeout, rx.recv()).await.ok().flatten()
    }
}

impl Default for MemoryChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl RealtimeChannel for MemoryChannel {
    fn send(&self, message: Value) -> Result<()> {
        lock(&self.sent).push(message.clone());
        self.tx
            .send(message)
            .map_err(|e| RtcError::Channel(format!("memory channel closed: {}", e)))
    }
}
