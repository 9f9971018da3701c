//! # Apollo Sync Protocol
//!
//! Wire types and JSON codecs for the Apollo configuration service.
//!
//! This crate provides:
//! - `Notification` records exchanged by the long-poll endpoint
//! - `ConfigRelease` payloads returned by the release endpoint
//! - Transport-neutral `HttpRequest` / `HttpResponse` envelopes
//! - Builders (and a server-side parser) for the three endpoints
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod envelope;
mod error;
mod messages;

pub mod endpoints;

pub use envelope::{HttpRequest, HttpResponse};
pub use error::{ProtocolError, ProtocolResult};
pub use messages::{
    decode_configurations, decode_notifications, decode_release, encode_configurations,
    encode_notifications, encode_release, ConfigRelease, Configurations, Notification,
};

/// Namespace used when the caller does not name one.
pub const DEFAULT_NAMESPACE: &str = "application";

/// Cluster used when the caller does not name one.
pub const DEFAULT_CLUSTER: &str = "default";

/// Notification id of a namespace that has never been synchronized.
pub const UNSEEN_NOTIFICATION_ID: i64 = -1;

/// HTTP 200.
pub const STATUS_OK: u16 = 200;

/// HTTP 304, returned by the long-poll endpoint when nothing changed.
pub const STATUS_NOT_MODIFIED: u16 = 304;

/// HTTP 404.
pub const STATUS_NOT_FOUND: u16 = 404;

/// HTTP 503.
pub const STATUS_UNAVAILABLE: u16 = 503;
