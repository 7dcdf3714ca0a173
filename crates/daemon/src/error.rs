//! Unified error type for the consumer loop and its drivers.

use crate::config::ConfigError;
use crate::ripper::RipperError;
use crate::scan_driver::ScanError;
use amphigory_queue::QueueError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Ripper(#[from] RipperError),
    #[error("no disc tool found on this host")]
    NoDiscTool,
    #[error("drive {0:?} is not tracked")]
    UnknownDrive(std::path::PathBuf),
}
