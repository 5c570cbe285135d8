//! Property-based tests for ICE normalization and answer envelopes
//!
//! Run with: cargo test --test signaling_props

use avatar_rtc::webrtc::ice::CredentialType;
use avatar_rtc::webrtc::{encode_offer, extract_answer_sdp, normalize_ice_servers, AnswerShape, IceServerInput};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use proptest::prelude::*;
use serde_json::json;

fn ice_url() -> impl Strategy<Value = String> {
    (
        prop_oneof![Just("stun"), Just("stuns"), Just("turn"), Just("turns")],
        "[a-z]{1,12}\\.example\\.com",
        1024u16..65535,
    )
        .prop_map(|(scheme, host, port)| format!("{}:{}:{}", scheme, host, port))
}

fn sdp_text() -> impl Strategy<Value = String> {
    "[ -~]{0,64}".prop_map(|body| format!("v=0\r\n{}", body))
}

proptest! {
    /// INVARIANT: normalization preserves count and order of URLs
    #[test]
    fn url_lists_keep_order(urls in prop::collection::vec(ice_url(), 0..8)) {
        let servers = normalize_ice_servers(IceServerInput::Urls(urls.clone()), None, None);
        prop_assert_eq!(servers.len(), urls.len());
        for (server, url) in servers.iter().zip(&urls) {
            prop_assert_eq!(&server.urls, &vec![url.clone()]);
            prop_assert!(server.username.is_none());
        }
    }

    /// INVARIANT: a full credential pair lands on every entry
    #[test]
    fn credentials_are_uniform(
        urls in prop::collection::vec(ice_url(), 1..8),
        user in "[a-z0-9]{1,16}",
        pass in "[A-Za-z0-9+/]{1,32}",
    ) {
        let servers = normalize_ice_servers(IceServerInput::Urls(urls), Some(&user), Some(&pass));
        for server in &servers {
            prop_assert_eq!(server.username.as_deref(), Some(user.as_str()));
            prop_assert_eq!(server.credential.as_deref(), Some(pass.as_str()));
            prop_assert_eq!(server.credential_type, Some(CredentialType::Password));
        }
    }

    /// INVARIANT: the three answer shapes yield the same SDP
    #[test]
    fn answer_shapes_agree(sdp in sdp_text()) {
        let encoded = STANDARD.encode(json!({ "sdp": sdp }).to_string());

        let (shape, from_envelope) = extract_answer_sdp(&json!({ "server_sdp": encoded })).unwrap();
        prop_assert_eq!(shape, AnswerShape::ServerSdp);
        let (_, from_plain) = extract_answer_sdp(&json!({ "sdp": sdp })).unwrap();
        let (_, from_answer) = extract_answer_sdp(&json!({ "answer": sdp })).unwrap();

        prop_assert_eq!(&from_envelope, &sdp);
        prop_assert_eq!(&from_plain, &sdp);
        prop_assert_eq!(&from_answer, &sdp);
    }

    /// INVARIANT: our own offer envelope is accepted as a server_sdp payload
    #[test]
    fn offer_envelope_is_server_sdp_compatible(sdp in sdp_text()) {
        let encoded = encode_offer(&sdp).unwrap();
        let (_, decoded) = extract_answer_sdp(&json!({ "server_sdp": encoded })).unwrap();
        prop_assert_eq!(decoded, sdp);
    }
}
