//! # Apollo Sync Engine
//!
//! Keeps an in-memory copy of namespaced configuration in step with an
//! Apollo configuration service and notifies application code on change.
//!
//! This crate provides:
//! - Notification id tracking per namespace
//! - An atomically swapped namespace cache
//! - Ordered change callbacks and a shared config store
//! - The long-poll state machine (idle → polling → no change / changed /
//!   timed out / errored → idle)
//! - A background listener with cooperative stop
//! - HTTP transport abstraction and snapshot dumps
//!
//! ## Architecture
//!
//! One listener thread repeatedly long-polls `/notifications/v2` with every
//! tracked namespace and its last notification id. For each namespace the
//! service reports, the engine fetches `/configs/...`, swaps the cache entry,
//! records the new id and then runs the callbacks. Readers go straight to
//! the cache; the first read of an unknown namespace blocks for one full
//! poll cycle so it never sees a default caused by pure absence.
//!
//! ## Key Invariants
//!
//! - The service is authoritative: notification ids are overwritten, never compared
//! - A notification id is recorded only after its namespace was written to the cache
//! - Readers see a namespace either before or after a refresh, never in between
//! - Failures never stop the listener; it backs off for the poll timeout and retries

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod cache;
mod callbacks;
mod client;
mod config;
mod dump;
mod error;
mod globals;
mod http;
mod lifecycle;
mod notifications;
mod signals;
mod state;
mod stop;
mod transport;

pub use cache::ConfigCache;
pub use callbacks::{propagate_into, Callback, CallbackRegistry, DispatchReport};
pub use client::ApolloClient;
pub use config::{detect_local_ip, SyncConfig};
pub use dump::{DirectorySink, SnapshotSink, CACHED_SNAPSHOT_NAME};
pub use error::{CallbackError, SyncError, SyncResult};
pub use globals::SharedConfig;
pub use http::{HttpClient, HttpError, HttpTransport, LoopbackClient, LoopbackServer};
pub use lifecycle::{Lifecycle, LifecycleState};
pub use notifications::NotificationTracker;
pub use signals::spawn_signal_listener;
pub use state::{CycleOutcome, PollCycleResult, SyncEngine, SyncState, SyncStats};
pub use stop::StopHandle;
pub use transport::{ConfigTransport, MockCall, MockTransport, PollOutcome};

pub use apollo_sync_protocol::{ConfigRelease, Configurations, Notification};
