//! ICE server normalization
//!
//! Callers hand us whatever the session configuration carried: a bare URL,
//! a list of URLs, or a list of server objects. Everything is flattened into
//! one ordered list, and a username/password pair, when supplied, is written
//! onto every entry.

use crate::errors::{Result, RtcError};
use serde::{Deserialize, Serialize};
use webrtc::ice_transport::ice_server::RTCIceServer;

/// Credential kind carried by an ICE server entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialType {
    Password,
}

/// One normalized ICE server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceServer {
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_type: Option<CredentialType>,
}

impl IceServer {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
            credential_type: None,
        }
    }

    fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.username = Some(username.to_string());
        self.credential = Some(password.to_string());
        self.credential_type = Some(CredentialType::Password);
        self
    }
}

impl From<IceServer> for RTCIceServer {
    fn from(server: IceServer) -> Self {
        RTCIceServer {
            urls: server.urls,
            username: server.username.unwrap_or_default(),
            credential: server.credential.unwrap_or_default(),
            ..Default::default()
        }
    }
}

/// `urls` on a server object may be one string or several
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UrlList {
    One(String),
    Many(Vec<String>),
}

impl UrlList {
    fn into_vec(self) -> Vec<String> {
        match self {
            UrlList::One(url) => vec![url],
            UrlList::Many(urls) => urls,
        }
    }
}

/// Server object as it appears on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServerEntry {
    pub urls: UrlList,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub credential: Option<String>,
}

/// Accepted caller input shapes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IceServerInput {
    Url(String),
    Urls(Vec<String>),
    Servers(Vec<IceServerEntry>),
}

impl From<&str> for IceServerInput {
    fn from(url: &str) -> Self {
        IceServerInput::Url(url.to_string())
    }
}

impl From<Vec<String>> for IceServerInput {
    fn from(urls: Vec<String>) -> Self {
        IceServerInput::Urls(urls)
    }
}

impl From<Vec<IceServerEntry>> for IceServerInput {
    fn from(servers: Vec<IceServerEntry>) -> Self {
        IceServerInput::Servers(servers)
    }
}

/// Flatten `input` into an ordered server list.
///
/// Credentials are applied only when both halves are present; a lone
/// username or password leaves the entries as given.
pub fn normalize_ice_servers(
    input: IceServerInput,
    username: Option<&str>,
    password: Option<&str>,
) -> Vec<IceServer> {
    let servers: Vec<IceServer> = match input {
        IceServerInput::Url(url) => vec![IceServer::new(url)],
        IceServerInput::Urls(urls) => urls.into_iter().map(IceServer::new).collect(),
        IceServerInput::Servers(entries) => entries
            .into_iter()
            .map(|entry| {
                let has_credential = entry.username.is_some() && entry.credential.is_some();
                IceServer {
                    urls: entry.urls.into_vec(),
                    username: entry.username,
                    credential: entry.credential,
                    credential_type: has_credential.then_some(CredentialType::Password),
                }
            })
            .collect(),
    };

    match (username, password) {
        (Some(user), Some(pass)) => servers
            .into_iter()
            .map(|server| server.with_credentials(user, pass))
            .collect(),
        _ => servers,
    }
}

/// Reject lists the peer connection would refuse anyway.
pub fn validate_ice_servers(servers: &[IceServer]) -> Result<()> {
    for server in servers {
        if server.urls.is_empty() {
            return Err(RtcError::IceServers("server entry has no urls".to_string()));
        }
        if let Some(url) = server.urls.iter().find(|u| !is_ice_url(u)) {
            return Err(RtcError::IceServers(format!("unsupported ICE url: {}", url)));
        }
        let is_turn = server.urls.iter().any(|u| u.starts_with("turn"));
        if is_turn && (server.username.is_none() || server.credential.is_none()) {
            log::warn!("TURN server {:?} has no credentials", server.urls);
        }
    }
    Ok(())
}

fn is_ice_url(url: &str) -> bool {
    ["stun:", "stuns:", "turn:", "turns:"]
        .iter()
        .any(|scheme| url.starts_with(scheme))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_url_with_credentials() {
        let servers = normalize_ice_servers("turn:example.com".into(), Some("u"), Some("p"));
        assert_eq!(
            servers,
            vec![IceServer {
                urls: vec!["turn:example.com".to_string()],
                username: Some("u".to_string()),
                credential: Some("p".to_string()),
                credential_type: Some(CredentialType::Password),
            }]
        );
    }

    #[test]
    fn test_url_list_keeps_order() {
        let input = IceServerInput::Urls(vec![
            "stun:a.example.com".to_string(),
            "turn:b.example.com".to_string(),
        ]);
        let servers = normalize_ice_servers(input, None, None);
        assert_eq!(servers.len(), 2);
        assert_eq!(servers[0].urls, vec!["stun:a.example.com"]);
        assert_eq!(servers[1].urls, vec!["turn:b.example.com"]);
        assert!(servers.iter().all(|s| s.username.is_none()));
    }

    #[test]
    fn test_uniform_credentials_override_entries() {
        let input: IceServerInput = serde_json::from_str(
            r#"[{"urls": ["turn:a.example.com", "turns:a.example.com"], "username": "old", "credential": "old"},
                {"urls": "stun:b.example.com"}]"#,
        )
        .unwrap();
        let servers = normalize_ice_servers(input, Some("new"), Some("secret"));
        assert_eq!(servers.len(), 2);
        for server in &servers {
            assert_eq!(server.username.as_deref(), Some("new"));
            assert_eq!(server.credential.as_deref(), Some("secret"));
        }
        assert_eq!(servers[0].urls.len(), 2);
    }

    #[test]
    fn test_partial_credentials_are_ignored() {
        let servers = normalize_ice_servers("stun:example.com".into(), Some("u"), None);
        assert!(servers[0].username.is_none());
        assert!(servers[0].credential_type.is_none());
    }

    #[test]
    fn test_serialized_shape() {
        let servers = normalize_ice_servers("turn:example.com".into(), Some("u"), Some("p"));
        let json = serde_json::to_value(&servers).unwrap();
        assert_eq!(json[0]["credentialType"], "password");
        assert_eq!(json[0]["username"], "u");
    }

    #[test]
    fn test_validation() {
        assert!(validate_ice_servers(&[IceServer::new("stun:ok.example.com")]).is_ok());
        assert!(validate_ice_servers(&[IceServer::new("http://nope")]).is_err());
        let empty = IceServer {
            urls: vec![],
            username: None,
            credential: None,
            credential_type: None,
        };
        assert!(validate_ice_servers(&[empty]).is_err());
    }
}
