//! amphigory-controller: the containerized controller process (spec §2,
//! §4.4–§4.6, §4.9, §4.11–§4.12) — the task producer, the transcode
//! consumer, the metadata store's RPC-facing operations, and the
//! controller's end of the persistent link.

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod config;
pub mod consumer;
pub mod error;
pub mod ingest;
pub mod link_server;
pub mod producer;
pub mod transcoder;

pub use config::{ConfigError, ControllerConfig};
pub use consumer::{run_consumer_loop, ConsumerContext};
pub use error::ControllerError;
pub use ingest::{run_ingest_loop, IngestContext};
pub use link_server::{LinkServer, RpcCallError};
pub use producer::{build_tasks, ProducerError, Selection};
