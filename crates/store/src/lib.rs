//! amphigory-store: the SQLite-backed metadata store (spec §4.4), owned
//! exclusively by the controller process.

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod error;
mod migration;
mod store;

pub use error::StoreError;
pub use migration::CURRENT_VERSION;
pub use store::{DiscFilter, DiscSummary, DiscUpdate, MetadataStore, TrackUpdate};
