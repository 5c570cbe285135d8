//! WebRTC negotiation core
//!
//! One peer connection per avatar session: ICE server normalization, the
//! base64 offer/answer envelopes, inbound media routing, and the session
//! manager tying them together.

pub mod envelope;
pub mod ice;
pub mod media;
pub mod peer;

pub use envelope::{decode_envelope, encode_offer, extract_answer_sdp, AnswerShape};
pub use ice::{normalize_ice_servers, IceServer, IceServerEntry, IceServerInput};
pub use media::{
    AudioOutput, AudioOutputFactory, AudioOutputSettings, MediaRouter, MediaStream, TrackKind,
    UserActivation, VideoSurface,
};
pub use peer::{
    AnswerOutcome, BundlePolicy, ConnectionState, IceTransportPolicy, PeerOptions,
    PeerSessionManager, PeerSessionStats, SetupOutcome, SignalingPhase,
};
