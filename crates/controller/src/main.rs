//! `amphigoryctl`: the containerized controller process (spec §2). Owns
//! the metadata store, produces rip/transcode task pairs, runs the
//! transcode consumer, and listens for daemon connections on the
//! persistent link.

use amphigory_controller::config::ControllerConfig;
use amphigory_controller::consumer::{run_consumer_loop, ConsumerContext};
use amphigory_controller::ingest::{run_ingest_loop, IngestContext};
use amphigory_controller::link_server::LinkServer;
use amphigory_core::SystemClock;
use amphigory_queue::TaskDirectory;
use amphigory_store::MetadataStore;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const CONFIG_ENV: &str = "AMPHIGORY_CONTROLLER_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "/etc/amphigory/controller.toml";
const CONSUMER_POLL_INTERVAL: Duration = Duration::from_millis(500);
const INGEST_POLL_INTERVAL: Duration = Duration::from_millis(1000);

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = match load_config() {
        Ok(cfg) => Arc::new(cfg),
        Err(e) => {
            tracing::error!(error = %e, "failed to load controller config, using defaults");
            Arc::new(ControllerConfig::default())
        }
    };

    let store = match MetadataStore::open(&config.store_path) {
        Ok(s) => Arc::new(Mutex::new(s)),
        Err(e) => {
            tracing::error!(error = %e, "failed to open metadata store, exiting");
            return;
        }
    };

    let queue = match TaskDirectory::open(config.task_dir.clone()) {
        Ok(q) => Arc::new(q),
        Err(e) => {
            tracing::error!(error = %e, "failed to open task directory, exiting");
            return;
        }
    };
    // This process is the queue's sole producer; pick up any task file
    // orphaned by a crash between the write and the index append.
    if let Err(e) = queue.reconcile_index() {
        tracing::warn!(error = %e, "failed to reconcile task index on startup");
    }

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
    let link_server = LinkServer::new();

    // Transcode progress has nowhere to go over the daemon link (this
    // process is the link's server, not a client of it); forward it
    // straight onto the browser-facing broadcast bus instead.
    let forward_server = link_server.clone();
    let forward_handle = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            forward_server.publish(message);
        }
    });

    let consumer_ctx = ConsumerContext {
        queue: queue.clone(),
        store: store.clone(),
        config: config.clone(),
        outbound: outbound_tx,
        clock: Arc::new(SystemClock),
    };
    let consumer_handle = tokio::spawn(run_consumer_loop(consumer_ctx, CONSUMER_POLL_INTERVAL));

    let ingest_ctx = IngestContext {
        queue: queue.clone(),
        store: store.clone(),
        clock: Arc::new(SystemClock),
    };
    let ingest_handle = tokio::spawn(run_ingest_loop(ingest_ctx, INGEST_POLL_INTERVAL));

    let addr = format!("0.0.0.0:{}", config.listen_port);
    let link_handle = tokio::spawn(async move { link_server.serve(&addr).await });

    let _ = tokio::join!(consumer_handle, ingest_handle, link_handle, forward_handle);
}

fn load_config() -> Result<ControllerConfig, amphigory_controller::config::ConfigError> {
    let path = std::env::var(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
    ControllerConfig::load(&path)
}
