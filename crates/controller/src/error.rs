//! Unified error type for the controller's consumer loop and link server.

use crate::config::ConfigError;
use crate::producer::ProducerError;
use crate::transcoder::TranscoderError;
use amphigory_link::WireError;
use amphigory_queue::QueueError;
use amphigory_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Producer(#[from] ProducerError),
    #[error(transparent)]
    Transcoder(#[from] TranscoderError),
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error("no transcoder tool found on this host")]
    NoTranscoderTool,
}
