#[cfg(test)]
mod error_tests {
    use avatar_rtc::errors::RtcError;
    use avatar_rtc::webrtc::{decode_envelope, extract_answer_sdp};
    use serde_json::json;
    use std::error::Error;

    #[test]
    fn test_config_error_display() {
        let error = RtcError::Config("volume out of range".to_string());
        assert_eq!(error.to_string(), "Configuration error: volume out of range");
    }

    #[test]
    fn test_ice_servers_error_display() {
        let error = RtcError::IceServers("unsupported scheme".to_string());
        assert!(error.to_string().contains("Invalid ICE server configuration"));
        assert!(error.to_string().contains("unsupported scheme"));
    }

    #[test]
    fn test_invalid_answer_debug_format() {
        let error = RtcError::InvalidAnswer("Debug test".to_string());
        let debug_str = format!("{:?}", error);
        assert!(debug_str.contains("InvalidAnswer"));
        assert!(debug_str.contains("Debug test"));
    }

    #[test]
    fn test_string_variants_have_no_source() {
        let errors = vec![
            RtcError::Config("c".to_string()),
            RtcError::IceServers("i".to_string()),
            RtcError::Negotiation("n".to_string()),
            RtcError::InvalidAnswer("a".to_string()),
            RtcError::Playback("p".to_string()),
            RtcError::Channel("ch".to_string()),
        ];

        for error in errors {
            let _error_trait: &dyn Error = &error;
            assert!(error.source().is_none());
            assert!(!error.to_string().is_empty());
        }
    }

    #[test]
    fn test_base64_error_converts() {
        let error = decode_envelope("!!! not base64 !!!").unwrap_err();
        assert!(matches!(error, RtcError::Base64(_)));
        assert!(error.to_string().starts_with("Base64 decode error"));
        assert!(error.source().is_some());
    }

    #[test]
    fn test_json_error_converts() {
        let error: RtcError = serde_json::from_str::<serde_json::Value>("{oops")
            .unwrap_err()
            .into();
        assert!(matches!(error, RtcError::Json(_)));
        assert!(error.to_string().starts_with("JSON error"));
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing file");
        let error: RtcError = io.into();
        assert!(matches!(error, RtcError::Io(_)));
        assert!(error.to_string().contains("missing file"));
    }

    #[test]
    fn test_webrtc_error_converts() {
        let error: RtcError = webrtc::Error::ErrConnectionClosed.into();
        assert!(matches!(error, RtcError::WebRtc(_)));
        assert!(error.to_string().starts_with("WebRTC error"));
    }

    #[test]
    fn test_answer_without_sdp_is_invalid_answer() {
        let error = extract_answer_sdp(&json!({"type": "session.avatar.connecting"})).unwrap_err();
        assert!(matches!(error, RtcError::InvalidAnswer(_)));
    }

    #[test]
    fn test_error_long_message() {
        let long_message = "A".repeat(1000);
        let error = RtcError::Negotiation(long_message.clone());
        let display = error.to_string();
        assert!(display.len() > 1000);
        assert!(display.contains(&long_message));
    }

    #[test]
    fn test_anyhow_interop() {
        fn fails() -> anyhow::Result<()> {
            Err(RtcError::Channel("socket closed".to_string()))?;
            Ok(())
        }
        let error = fails().unwrap_err();
        assert!(error.downcast_ref::<RtcError>().is_some());
    }
}
