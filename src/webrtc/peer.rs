use crate::errors::Result;
use crate::webrtc::envelope::{encode_offer, extract_answer_sdp};
use crate::webrtc::ice::{normalize_ice_servers, validate_ice_servers, IceServer, IceServerInput};
use crate::webrtc::media::{MediaRouter, MediaStream};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use webrtc::peer_connection::policy::ice_transport_policy::RTCIceTransportPolicy;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::signaling_state::RTCSignalingState;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;

/// Receives the base64 offer envelope once ICE gathering completes
pub type OfferCallback = Arc<dyn Fn(String) + Send + Sync>;

/// ICE transport policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IceTransportPolicy {
    Relay,
    All,
}

impl From<IceTransportPolicy> for RTCIceTransportPolicy {
    fn from(policy: IceTransportPolicy) -> Self {
        match policy {
            IceTransportPolicy::Relay => RTCIceTransportPolicy::Relay,
            IceTransportPolicy::All => RTCIceTransportPolicy::All,
        }
    }
}

/// Bundle policy for RTC connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BundlePolicy {
    Balanced,
    MaxCompat,
    MaxBundle,
}

impl From<BundlePolicy> for RTCBundlePolicy {
    fn from(policy: BundlePolicy) -> Self {
        match policy {
            BundlePolicy::Balanced => RTCBundlePolicy::Balanced,
            BundlePolicy::MaxCompat => RTCBundlePolicy::MaxCompat,
            BundlePolicy::MaxBundle => RTCBundlePolicy::MaxBundle,
        }
    }
}

/// Connection-level options applied to every new peer connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerOptions {
    pub bundle_policy: BundlePolicy,
    pub ice_transport_policy: IceTransportPolicy,
}

impl Default for PeerOptions {
    fn default() -> Self {
        Self {
            bundle_policy: BundlePolicy::MaxBundle,
            ice_transport_policy: IceTransportPolicy::All,
        }
    }
}

/// WebRTC peer connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl From<RTCPeerConnectionState> for ConnectionState {
    fn from(state: RTCPeerConnectionState) -> Self {
        match state {
            RTCPeerConnectionState::New | RTCPeerConnectionState::Unspecified => {
                ConnectionState::New
            }
            RTCPeerConnectionState::Connecting => ConnectionState::Connecting,
            RTCPeerConnectionState::Connected => ConnectionState::Connected,
            RTCPeerConnectionState::Disconnected => ConnectionState::Disconnected,
            RTCPeerConnectionState::Failed => ConnectionState::Failed,
            RTCPeerConnectionState::Closed => ConnectionState::Closed,
        }
    }
}

/// Offer/answer negotiation phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalingPhase {
    Stable,
    HaveLocalOffer,
    HaveRemoteOffer,
    HaveLocalPranswer,
    HaveRemotePranswer,
    Closed,
}

impl From<RTCSignalingState> for SignalingPhase {
    fn from(state: RTCSignalingState) -> Self {
        match state {
            RTCSignalingState::Stable | RTCSignalingState::Unspecified => SignalingPhase::Stable,
            RTCSignalingState::HaveLocalOffer => SignalingPhase::HaveLocalOffer,
            RTCSignalingState::HaveRemoteOffer => SignalingPhase::HaveRemoteOffer,
            RTCSignalingState::HaveLocalPranswer => SignalingPhase::HaveLocalPranswer,
            RTCSignalingState::HaveRemotePranswer => SignalingPhase::HaveRemotePranswer,
            RTCSignalingState::Closed => SignalingPhase::Closed,
        }
    }
}

/// Result of a `setup_webrtc` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetupOutcome {
    /// A new connection committed its local offer
    Started { session_id: String },
    /// Another setup was in flight; nothing was touched
    Busy,
}

/// Result of a `handle_answer` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerOutcome {
    Applied,
    /// No connection waiting for an answer
    Ignored,
}

/// Peer session statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerSessionStats {
    pub session_id: Option<String>,
    pub state: ConnectionState,
    pub signaling: SignalingPhase,
    pub offers_sent: u64,
    pub has_local_description: bool,
    pub has_remote_description: bool,
    pub audio_sink_active: bool,
    pub created_at: Option<DateTime<Utc>>,
}

struct ActiveSession {
    id: String,
    connection: Arc<RTCPeerConnection>,
    created_at: DateTime<Utc>,
}

/// Releases the setup flag on every exit path
struct SetupGuard<'a>(&'a AtomicBool);

impl Drop for SetupGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Owns one WebRTC peer connection end to end.
///
/// A session is created by [`setup_webrtc`](Self::setup_webrtc), answered by
/// [`handle_answer`](Self::handle_answer) and torn down by
/// [`dispose`](Self::dispose) or by the next setup. The offer is sent once,
/// after ICE gathering completes (no trickle ICE).
pub struct PeerSessionManager {
    options: PeerOptions,
    router: Arc<MediaRouter>,
    on_send_offer: OfferCallback,
    session: Mutex<Option<ActiveSession>>,
    setup_in_progress: AtomicBool,
    offers_sent: Arc<AtomicU64>,
}

impl PeerSessionManager {
    pub fn new<F>(router: MediaRouter, options: PeerOptions, on_send_offer: F) -> Self
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        Self {
            options,
            router: Arc::new(router),
            on_send_offer: Arc::new(on_send_offer),
            session: Mutex::new(None),
            setup_in_progress: AtomicBool::new(false),
            offers_sent: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn router(&self) -> &MediaRouter {
        &self.router
    }

    pub fn is_setup_in_progress(&self) -> bool {
        self.setup_in_progress.load(Ordering::Acquire)
    }

    /// Start a new negotiation, replacing any existing connection.
    ///
    /// Returns once the local offer is committed. The offer callback fires
    /// later, when gathering finishes. A call made while another setup is in
    /// flight returns [`SetupOutcome::Busy`] without side effects.
    pub async fn setup_webrtc(
        &self,
        ice_servers: impl Into<IceServerInput>,
        username: Option<&str>,
        password: Option<&str>,
    ) -> Result<SetupOutcome> {
        if self
            .setup_in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::debug!("WebRTC setup already in progress, ignoring request");
            return Ok(SetupOutcome::Busy);
        }
        let _guard = SetupGuard(&self.setup_in_progress);

        self.teardown().await;

        let servers = normalize_ice_servers(ice_servers.into(), username, password);
        validate_ice_servers(&servers)?;

        let connection = Arc::new(self.build_connection(servers).await?);
        let session_id = Uuid::new_v4().to_string();
        log::info!("Created peer connection for session {}", session_id);

        self.register_handlers(&session_id, &connection);

        *self.session.lock().await = Some(ActiveSession {
            id: session_id.clone(),
            connection: Arc::clone(&connection),
            created_at: Utc::now(),
        });

        for kind in [RTPCodecType::Video, RTPCodecType::Audio] {
            connection
                .add_transceiver_from_kind(
                    kind,
                    Some(RTCRtpTransceiverInit {
                        direction: RTCRtpTransceiverDirection::Recvonly,
                        send_encodings: vec![],
                    }),
                )
                .await?;
        }

        let offer = connection.create_offer(None).await?;
        connection.set_local_description(offer).await?;
        log::info!(
            "Local offer committed for session {}, waiting for ICE gathering",
            session_id
        );

        Ok(SetupOutcome::Started { session_id })
    }

    async fn build_connection(&self, servers: Vec<IceServer>) -> Result<RTCPeerConnection> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;
        let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let config = RTCConfiguration {
            ice_servers: servers.into_iter().map(Into::into).collect(),
            ice_transport_policy: self.options.ice_transport_policy.into(),
            bundle_policy: self.options.bundle_policy.into(),
            ..Default::default()
        };

        Ok(api.new_peer_connection(config).await?)
    }

    fn register_handlers(&self, session_id: &str, connection: &Arc<RTCPeerConnection>) {
        let weak = Arc::downgrade(connection);
        let on_send_offer = Arc::clone(&self.on_send_offer);
        let offers_sent = Arc::clone(&self.offers_sent);
        let offer_sent = Arc::new(AtomicBool::new(false));
        let sid = session_id.to_string();

        connection.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let weak = weak.clone();
            let on_send_offer = Arc::clone(&on_send_offer);
            let offers_sent = Arc::clone(&offers_sent);
            let offer_sent = Arc::clone(&offer_sent);
            let sid = sid.clone();

            Box::pin(async move {
                if let Some(candidate) = candidate {
                    log::trace!("ICE candidate gathered for session {}: {}", sid, candidate);
                    return;
                }

                let Some(connection) = weak.upgrade() else {
                    return;
                };
                if connection.signaling_state() == RTCSignalingState::Closed {
                    return;
                }
                let Some(local) = connection.local_description().await else {
                    log::debug!("Gathering finished without a local description ({})", sid);
                    return;
                };
                if local.sdp.is_empty() || offer_sent.swap(true, Ordering::AcqRel) {
                    return;
                }

                match encode_offer(&local.sdp) {
                    Ok(envelope) => {
                        offers_sent.fetch_add(1, Ordering::Relaxed);
                        log::info!("ICE gathering complete, sending offer for session {}", sid);
                        on_send_offer(envelope);
                    }
                    Err(e) => log::error!("Failed to encode offer for session {}: {}", sid, e),
                }
            })
        }));

        let router = Arc::clone(&self.router);
        connection.on_track(Box::new(move |track, _receiver, _transceiver| {
            let router = Arc::clone(&router);
            Box::pin(async move {
                router.route(MediaStream::from_remote(track)).await;
            })
        }));

        let sid = session_id.to_string();
        connection.on_peer_connection_state_change(Box::new(
            move |state: RTCPeerConnectionState| {
                log::info!("Peer connection {} state: {}", sid, state);
                Box::pin(async {})
            },
        ));
    }

    /// Apply the remote answer if a local offer is waiting for one.
    ///
    /// Late or duplicate answers are dropped with [`AnswerOutcome::Ignored`].
    pub async fn handle_answer(&self, message: &Value) -> Result<AnswerOutcome> {
        let connection = match self.session.lock().await.as_ref() {
            Some(session) => Arc::clone(&session.connection),
            None => {
                log::debug!("Answer received with no active connection, dropping");
                return Ok(AnswerOutcome::Ignored);
            }
        };

        let state = connection.signaling_state();
        if state != RTCSignalingState::HaveLocalOffer {
            log::debug!("Answer received in signaling state {}, dropping", state);
            return Ok(AnswerOutcome::Ignored);
        }

        let (shape, sdp) = extract_answer_sdp(message)?;
        log::debug!("Applying remote answer ({:?}, {} bytes)", shape, sdp.len());

        let answer = RTCSessionDescription::answer(sdp)?;
        connection.set_remote_description(answer).await?;
        log::info!("Remote answer applied");

        Ok(AnswerOutcome::Applied)
    }

    /// Close the connection and release the audio sink. Safe to call repeatedly.
    pub async fn dispose(&self) {
        self.teardown().await;
    }

    async fn teardown(&self) {
        if let Some(session) = self.session.lock().await.take() {
            log::info!("Closing peer connection {}", session.id);
            if let Err(e) = session.connection.close().await {
                log::warn!("Failed to close peer connection {}: {}", session.id, e);
            }
        }
        if self.router.detach_audio().await {
            log::debug!("Detached audio sink");
        }
    }

    pub async fn signaling_state(&self) -> SignalingPhase {
        match self.session.lock().await.as_ref() {
            Some(session) => session.connection.signaling_state().into(),
            None => SignalingPhase::Closed,
        }
    }

    pub async fn has_connection(&self) -> bool {
        self.session.lock().await.is_some()
    }

    pub fn offers_sent(&self) -> u64 {
        self.offers_sent.load(Ordering::Relaxed)
    }

    pub async fn stats(&self) -> PeerSessionStats {
        let audio_sink_active = self.router.has_audio_sink().await;
        let guard = self.session.lock().await;

        match guard.as_ref() {
            Some(session) => PeerSessionStats {
                session_id: Some(session.id.clone()),
                state: session.connection.connection_state().into(),
                signaling: session.connection.signaling_state().into(),
                offers_sent: self.offers_sent(),
                has_local_description: session.connection.local_description().await.is_some(),
                has_remote_description: session.connection.remote_description().await.is_some(),
                audio_sink_active,
                created_at: Some(session.created_at),
            },
            None => PeerSessionStats {
                session_id: None,
                state: ConnectionState::Closed,
                signaling: SignalingPhase::Closed,
                offers_sent: self.offers_sent(),
                has_local_description: false,
                has_remote_description: false,
                audio_sink_active,
                created_at: None,
            },
        }
    }
}

impl Drop for PeerSessionManager {
    fn drop(&mut self) {
        let Some(session) = self.session.get_mut().take() else {
            return;
        };
        let router = Arc::clone(&self.router);

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = session.connection.close().await {
                        log::warn!("Failed to close peer connection {}: {}", session.id, e);
                    }
                    router.detach_audio().await;
                });
            }
            Err(_) => log::warn!(
                "Peer connection {} dropped outside a runtime, not closed",
                session.id
            ),
        }
    }
}
