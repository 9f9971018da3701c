//! Protocol messages for the notification and release endpoints.

use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Key/value content of one namespace.
///
/// Values are usually strings, but the service may return structured
/// values for non-properties namespaces.
pub type Configurations = BTreeMap<String, Value>;

/// A namespace paired with its notification id.
///
/// Clients send one per tracked namespace with the last id they saw; the
/// service answers with the namespaces whose id moved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Namespace name.
    pub namespace_name: String,
    /// Notification id. `-1` means never synchronized.
    pub notification_id: i64,
}

impl Notification {
    /// Creates a notification.
    pub fn new(namespace_name: impl Into<String>, notification_id: i64) -> Self {
        Self {
            namespace_name: namespace_name.into(),
            notification_id,
        }
    }
}

/// Full content of a namespace as returned by `/configs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigRelease {
    /// Application id echoed by the service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    /// Cluster echoed by the service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,
    /// Namespace echoed by the service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace_name: Option<String>,
    /// Namespace content.
    pub configurations: Configurations,
    /// Identifier of the release the content belongs to.
    pub release_key: String,
}

impl ConfigRelease {
    /// Creates a release with no identity fields.
    pub fn new(configurations: Configurations, release_key: impl Into<String>) -> Self {
        Self {
            app_id: None,
            cluster: None,
            namespace_name: None,
            configurations,
            release_key: release_key.into(),
        }
    }
}

/// Encodes the `notifications` query value of a long-poll request.
pub fn encode_notifications(notifications: &[Notification]) -> ProtocolResult<String> {
    serde_json::to_string(notifications).map_err(ProtocolError::Encoding)
}

/// Decodes a long-poll response body (or the `notifications` query value).
pub fn decode_notifications(bytes: &[u8]) -> ProtocolResult<Vec<Notification>> {
    let value: Value = serde_json::from_slice(bytes).map_err(ProtocolError::Decoding)?;
    if !value.is_array() {
        return Err(ProtocolError::invalid_payload(
            "notifications must be a JSON array",
        ));
    }
    serde_json::from_value(value).map_err(ProtocolError::Decoding)
}

/// Encodes a release body.
pub fn encode_release(release: &ConfigRelease) -> ProtocolResult<Vec<u8>> {
    serde_json::to_vec(release).map_err(ProtocolError::Encoding)
}

/// Decodes a `/configs` response body.
pub fn decode_release(bytes: &[u8]) -> ProtocolResult<ConfigRelease> {
    serde_json::from_slice(bytes).map_err(ProtocolError::Decoding)
}

/// Encodes a `/configfiles/json` body.
pub fn encode_configurations(configurations: &Configurations) -> ProtocolResult<Vec<u8>> {
    serde_json::to_vec(configurations).map_err(ProtocolError::Encoding)
}

/// Decodes a `/configfiles/json` response body.
pub fn decode_configurations(bytes: &[u8]) -> ProtocolResult<Configurations> {
    let value: Value = serde_json::from_slice(bytes).map_err(ProtocolError::Decoding)?;
    match value {
        Value::Object(map) => Ok(map.into_iter().collect()),
        _ => Err(ProtocolError::invalid_payload(
            "configuration file must be a JSON object",
        )),
    }
}
