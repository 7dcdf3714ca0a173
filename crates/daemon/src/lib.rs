//! amphigory-daemon: the host-side process (spec §2, §4.2–§4.3, §4.6–§4.8,
//! §4.12) — disc watching, proactive scanning, the scan/rip drivers, and
//! the daemon's end of the persistent link.

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod config;
pub mod consumer;
pub mod drive_table;
pub mod error;
pub mod ripper;
pub mod scan_driver;
pub mod watcher;

pub use config::{ConfigError, LocalConfig, RemoteConfig};
pub use consumer::{run_consumer_loop, scan_result_payload, ConsumerContext};
pub use drive_table::{DriveTable, ScanPlan};
pub use error::DaemonError;
pub use watcher::{DiscEvent, DiscWatcher, PollingDiscWatcher};
