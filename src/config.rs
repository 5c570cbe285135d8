//! Configuration management for avatar-rtc
//!
//! Provides configuration loading, saving, and environment overrides for
//! connection policies, audio output, signaling message names and logging.

use crate::errors::{Result, RtcError};
use crate::webrtc::{BundlePolicy, IceTransportPolicy, PeerOptions};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Prefix for environment overrides, e.g. `AVATAR_RTC__AUDIO__VOLUME=0.5`
pub const ENV_PREFIX: &str = "AVATAR_RTC";

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AvatarRtcConfig {
    pub rtc: RtcConfig,
    pub audio: AudioConfig,
    pub signaling: SignalingConfig,
    pub logging: LoggingConfig,
}

/// Peer connection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RtcConfig {
    pub bundle_policy: BundlePolicy,
    pub ice_transport_policy: IceTransportPolicy,
    /// Used when a session update carries no ICE server list
    pub fallback_ice_servers: Vec<String>,
}

/// Audio sink configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Output volume (0.0-1.0)
    pub volume: f32,
    /// Retry blocked playback on the next user interaction
    pub retry_on_interaction: bool,
}

/// Realtime message names
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalingConfig {
    pub connect_message_type: String,
    pub answer_message_types: Vec<String>,
    /// Skip `session.updated` messages identical to the previous one
    pub dedupe_session_updates: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `env_logger` filter used when `RUST_LOG` is unset
    pub filter: String,
}

impl Default for RtcConfig {
    fn default() -> Self {
        Self {
            bundle_policy: BundlePolicy::MaxBundle,
            ice_transport_policy: IceTransportPolicy::All,
            fallback_ice_servers: Vec::new(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            volume: 1.0,
            retry_on_interaction: true,
        }
    }
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            connect_message_type: "session.avatar.connect".to_string(),
            answer_message_types: vec!["session.avatar.connecting".to_string()],
            dedupe_session_updates: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "avatar_rtc=info".to_string(),
        }
    }
}

impl From<&RtcConfig> for PeerOptions {
    fn from(config: &RtcConfig) -> Self {
        PeerOptions {
            bundle_policy: config.bundle_policy,
            ice_transport_policy: config.ice_transport_policy,
        }
    }
}

impl AvatarRtcConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)?;
        let config: AvatarRtcConfig = toml::from_str(&contents)
            .map_err(|e| RtcError::Config(format!("Failed to parse config file: {}", e)))?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Load a file (optional) layered under `AVATAR_RTC__*` environment overrides
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(
                config::File::from(path.as_ref())
                    .format(config::FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .map_err(|e| RtcError::Config(format!("Failed to build config: {}", e)))?;

        settings
            .try_deserialize()
            .map_err(|e| RtcError::Config(format!("Failed to deserialize config: {}", e)))
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| RtcError::Config(format!("Failed to serialize config: {}", e)))?;
        fs::write(path, toml_string)?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Get default config file path
    pub fn default_path() -> PathBuf {
        PathBuf::from("avatar-rtc.toml")
    }

    /// Load from default location or fall back to defaults
    pub fn load_or_default() -> Self {
        Self::load_with_env(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.audio.volume) {
            return Err(RtcError::Config(
                "Audio volume must be between 0.0 and 1.0".to_string(),
            ));
        }
        if self.signaling.connect_message_type.trim().is_empty() {
            return Err(RtcError::Config(
                "Connect message type must not be empty".to_string(),
            ));
        }
        if self.signaling.answer_message_types.is_empty() {
            return Err(RtcError::Config(
                "At least one answer message type is required".to_string(),
            ));
        }
        let fallback = &self.rtc.fallback_ice_servers;
        let has_turn = fallback.iter().any(|url| url.starts_with("turn"));
        if self.rtc.ice_transport_policy == IceTransportPolicy::Relay
            && !fallback.is_empty()
            && !has_turn
        {
            return Err(RtcError::Config(
                "Relay-only transport needs a TURN fallback server".to_string(),
            ));
        }
        Ok(())
    }

    pub fn peer_options(&self) -> PeerOptions {
        PeerOptions::from(&self.rtc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AvatarRtcConfig::default();
        assert_eq!(config.rtc.bundle_policy, BundlePolicy::MaxBundle);
        assert_eq!(config.audio.volume, 1.0);
        assert_eq!(config.signaling.connect_message_type, "session.avatar.connect");
        assert!(config.signaling.dedupe_session_updates);
    }

    #[test]
    fn test_config_validation() {
        let config = AvatarRtcConfig::default();
        assert!(config.validate().is_ok());

        let mut bad_volume = config.clone();
        bad_volume.audio.volume = 1.5;
        assert!(bad_volume.validate().is_err());

        let mut no_answers = AvatarRtcConfig::default();
        no_answers.signaling.answer_message_types.clear();
        assert!(no_answers.validate().is_err());

        let mut relay = AvatarRtcConfig::default();
        relay.rtc.ice_transport_policy = IceTransportPolicy::Relay;
        relay.rtc.fallback_ice_servers = vec!["stun:stun.example.com".to_string()];
        assert!(relay.validate().is_err());
    }

    #[test]
    fn test_config_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("nested").join("avatar-rtc.toml");

        let mut config = AvatarRtcConfig::default();
        config.audio.volume = 0.25;
        config.rtc.fallback_ice_servers = vec!["stun:stun.example.com:3478".to_string()];
        assert!(config.save_to_file(&config_path).is_ok());

        let loaded = AvatarRtcConfig::load_from_file(&config_path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("partial.toml");
        fs::write(&config_path, "[audio]\nvolume = 0.5\n").unwrap();

        let loaded = AvatarRtcConfig::load_from_file(&config_path).unwrap();
        assert_eq!(loaded.audio.volume, 0.5);
        assert!(loaded.audio.retry_on_interaction);
        assert_eq!(loaded.signaling, SignalingConfig::default());
    }

    #[test]
    fn test_config_toml_format() {
        let config = AvatarRtcConfig::default();
        let toml_string = toml::to_string_pretty(&config).unwrap();

        assert!(toml_string.contains("[rtc]"));
        assert!(toml_string.contains("[audio]"));
        assert!(toml_string.contains("[signaling]"));
        assert!(toml_string.contains("[logging]"));
        assert!(toml_string.contains("bundle_policy = \"MaxBundle\""));
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = AvatarRtcConfig::load_from_file("nonexistent_file.toml");
        assert!(result.is_ok());
        assert_eq!(result.unwrap(), AvatarRtcConfig::default());
    }

    #[test]
    fn test_load_with_env_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = AvatarRtcConfig::load_with_env(dir.path().join("missing.toml")).unwrap();
        assert_eq!(loaded.signaling, SignalingConfig::default());
    }
}
