//! Realtime session messages
//!
//! The avatar service announces ICE servers in `session.updated` and
//! answers our `session.avatar.connect` with a server SDP. Field locations
//! have moved between service versions, so lookups go through a fixed
//! priority list of scopes.

use crate::errors::Result;
use crate::webrtc::IceServerInput;
use serde_json::{json, Map, Value};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

pub const SESSION_UPDATED: &str = "session.updated";

/// Scopes under `session` searched for ICE fields, highest priority first
const ICE_SCOPES: [Option<&str>; 3] = [Some("avatar"), Some("rtc"), None];

pub fn message_type(message: &Value) -> Option<&str> {
    message.get("type").and_then(Value::as_str)
}

/// ICE servers and credentials announced by the service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceSettings {
    pub servers: IceServerInput,
    pub username: Option<String>,
    pub credential: Option<String>,
}

impl IceSettings {
    pub fn from_urls(urls: Vec<String>) -> Self {
        Self {
            servers: IceServerInput::Urls(urls),
            username: None,
            credential: None,
        }
    }

    /// Extract settings from a `session.updated` message.
    ///
    /// `Ok(None)` when no scope carries a server list.
    pub fn from_session_update(message: &Value) -> Result<Option<Self>> {
        let Some(session) = message.get("session") else {
            return Ok(None);
        };
        let Some(servers) = lookup(session, "ice_servers") else {
            return Ok(None);
        };

        let servers: IceServerInput = serde_json::from_value(servers.clone())?;
        let text = |field: &str| {
            lookup(session, field)
                .and_then(Value::as_str)
                .map(str::to_string)
        };

        Ok(Some(Self {
            servers,
            username: text("username"),
            credential: text("credential"),
        }))
    }
}

fn lookup<'a>(session: &'a Value, field: &str) -> Option<&'a Value> {
    ICE_SCOPES
        .iter()
        .filter_map(|scope| match scope {
            Some(name) => session.get(*name),
            None => Some(session),
        })
        .find_map(|scope| scope.get(field).filter(|v| !v.is_null()))
}

/// Build the outbound connect message wrapping an offer envelope.
pub fn connect_message(message_type: &str, client_sdp: &str) -> Value {
    json!({
        "type": message_type,
        "client_sdp": client_sdp,
    })
}

/// Drops a `session.updated` whose session payload equals the previous one.
///
/// Repeated identical updates would otherwise tear down and renegotiate a
/// healthy connection.
#[derive(Debug, Default)]
pub struct SessionUpdateFilter {
    last: Option<u64>,
}

impl SessionUpdateFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `message` and report whether it repeats the last one.
    pub fn is_duplicate(&mut self, message: &Value) -> bool {
        let session = message.get("session").unwrap_or(&Value::Null);
        let mut hasher = DefaultHasher::new();
        canonical(session).to_string().hash(&mut hasher);
        let digest = hasher.finish();

        if self.last == Some(digest) {
            return true;
        }
        self.last = Some(digest);
        false
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

/// Copy of `value` with object keys sorted, independent of map ordering features
fn canonical(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonical(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
        other => other.clone(),
    }
}
