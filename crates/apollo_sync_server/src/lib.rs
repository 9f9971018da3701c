//! # Apollo Sync Server
//!
//! In-memory reference implementation of the Apollo configuration service.
//!
//! This crate provides:
//! - The long-poll endpoint (`/notifications/v2`) with a hold timeout
//! - The release endpoint (`/configs/...`)
//! - The cached content endpoint (`/configfiles/json/...`)
//! - Release publishing with global notification ids
//! - Fault injection for client testing
//!
//! # Protocol
//!
//! 1. Client long-polls with every namespace it tracks and the last
//!    notification id it saw (`-1` if never synced)
//! 2. Server answers 200 with the namespaces whose id differs, holding the
//!    request up to `hold_timeout` while none does, then answers 304
//! 3. Client fetches each reported namespace from `/configs/...`

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod handler;
mod server;
mod store;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::RequestHandler;
pub use server::ConfigServer;
pub use store::{NamespaceKey, NamespaceRelease, ReleaseStore};
