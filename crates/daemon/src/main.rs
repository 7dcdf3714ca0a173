//! `amphigoryd`: the host-resident daemon process (spec §2). Watches optical
//! drives, runs the scan/rip drivers, and maintains the persistent link to
//! the controller.

use amphigory_core::clock::format_timestamp;
use amphigory_core::{fingerprint, Clock, Completion, MediumKind, SystemClock, TaskKind};
use amphigory_daemon::config::{ConfigError, LocalConfig, RemoteConfig};
use amphigory_daemon::consumer::{run_consumer_loop, scan_result_payload, ConsumerContext};
use amphigory_daemon::drive_table::DriveTable;
use amphigory_daemon::scan_driver;
use amphigory_daemon::watcher::{DiscEvent, DiscWatcher, PollingDiscWatcher};
use amphigory_link::{Backoff, Message, MethodRegistry};
use amphigory_queue::TaskDirectory;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;

const LOCAL_CONFIG_ENV: &str = "AMPHIGORY_DAEMON_CONFIG";
const DEFAULT_LOCAL_CONFIG_PATH: &str = "/etc/amphigory/daemon.toml";
const REMOTE_CONFIG_CACHE_FILE: &str = "remote_config.json";
const CONSUMER_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let local = match load_local_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!(error = %e, "failed to load local daemon config, using defaults");
            LocalConfig::default()
        }
    };

    let remote_cache_path = local.task_dir.join(REMOTE_CONFIG_CACHE_FILE);
    let remote = Arc::new(Mutex::new(RemoteConfig::load_cached(&remote_cache_path)));

    let queue = match TaskDirectory::open(local.task_dir.clone()) {
        Ok(q) => Arc::new(q),
        Err(e) => {
            tracing::error!(error = %e, "failed to open task directory, exiting");
            return;
        }
    };

    let drives = Arc::new(Mutex::new(DriveTable::new()));
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<Message>();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let watcher_handle = tokio::spawn(run_watcher_loop(
        drives.clone(),
        clock.clone(),
        outbound_tx.clone(),
        queue.clone(),
        remote.clone(),
    ));

    let consumer_ctx = ConsumerContext {
        queue: queue.clone(),
        drives: drives.clone(),
        remote_config: remote.clone(),
        outbound: outbound_tx.clone(),
        clock: clock.clone(),
    };
    let consumer_handle = tokio::spawn(run_consumer_loop(consumer_ctx, CONSUMER_POLL_INTERVAL));

    let registry = build_registry(drives.clone());
    let link_handle = tokio::spawn(run_link_loop(local, outbound_tx, outbound_rx, registry));

    let _ = tokio::join!(watcher_handle, consumer_handle, link_handle);
}

/// RPC methods the controller is documented to call against this daemon
/// (spec §4.12): `get_drive_status` and `get_drives`, both read-only views
/// over the live [`DriveTable`].
fn build_registry(drives: Arc<Mutex<DriveTable>>) -> MethodRegistry {
    let mut registry = MethodRegistry::new();

    {
        let drives = drives.clone();
        registry.register("get_drives", move |_params: serde_json::Value| {
            let drives = drives.clone();
            async move {
                let table = drives.lock();
                let all: Vec<serde_json::Value> =
                    table.iter().map(|d| serde_json::to_value(d).unwrap_or(serde_json::Value::Null)).collect();
                Ok(serde_json::Value::Array(all))
            }
        });
    }

    registry.register("get_drive_status", move |params: serde_json::Value| {
        let drives = drives.clone();
        async move {
            let device = params
                .get("device")
                .and_then(|v| v.as_str())
                .ok_or_else(|| "missing `device` parameter".to_string())?;
            let table = drives.lock();
            table
                .get(Path::new(device))
                .map(|d| serde_json::to_value(d).unwrap_or(serde_json::Value::Null))
                .ok_or_else(|| format!("no drive tracked at {device}"))
        }
    });

    registry
}

fn load_local_config() -> Result<LocalConfig, ConfigError> {
    let path = std::env::var(LOCAL_CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_LOCAL_CONFIG_PATH));
    LocalConfig::load(&path)
}

/// Marshals OS disc-insert/eject notifications onto drive state (spec §5:
/// notifications arrive on a background thread and must cross onto the
/// reactor before anything touches a `Drive`).
async fn run_watcher_loop(
    drives: Arc<Mutex<DriveTable>>,
    clock: Arc<dyn Clock>,
    outbound: mpsc::UnboundedSender<Message>,
    queue: Arc<TaskDirectory>,
    remote_config: Arc<Mutex<RemoteConfig>>,
) {
    // Device enumeration (which `/dev/srN` or `/dev/rdiskN` nodes exist on
    // this host) is platform-specific and left to deployment configuration;
    // an empty list here means the watcher idles until targets are added.
    let mut watcher = PollingDiscWatcher::new(Vec::new(), Duration::from_secs(2));

    while let Some(event) = watcher.next_event().await {
        match event {
            DiscEvent::Inserted {
                device,
                volume_path,
                volume_name,
            } => {
                let device_path = PathBuf::from(&device);
                let medium = detect_medium(&volume_path);
                let now = clock.now_micros();

                let fp = fingerprint(&volume_path, medium, Some(&volume_name)).ok().map(|f| f.to_string());

                let mut table = drives.lock();
                let drive = table.get_or_insert(&device_path);
                drive.insert(volume_path, Some(volume_name), medium, now);
                if let Some(fp) = &fp {
                    let _ = drive.set_fingerprint(fp.clone());
                }
                drop(table);

                let _ = outbound.send(Message::DiscEvent {
                    drive_id: device.clone(),
                    kind: amphigory_link::DiscEventKind::Inserted,
                    fingerprint: fp.clone(),
                });

                tokio::spawn(run_proactive_scan(
                    drives.clone(),
                    clock.clone(),
                    queue.clone(),
                    remote_config.clone(),
                    device_path,
                    fp,
                ));
            }
            DiscEvent::Unmounted { volume_path } => {
                let mut table = drives.lock();
                for drive in table.iter_mut() {
                    drive.observe_unmount(&volume_path);
                }
            }
        }
    }
}

/// Scans a newly-inserted disc without waiting for a rip request to arrive
/// (spec §4.3, §5): by the time the controller asks for one, the result is
/// usually already sitting in the drive's `scan_cache`, so the consumer's
/// [`amphigory_daemon::drive_table::ScanPlan::UseCached`] path has something
/// to return. Writes its own completion straight to `complete/`, bypassing
/// `queued/`/`claim_next` entirely, since nothing enqueued this task.
async fn run_proactive_scan(
    drives: Arc<Mutex<DriveTable>>,
    clock: Arc<dyn Clock>,
    queue: Arc<TaskDirectory>,
    remote_config: Arc<Mutex<RemoteConfig>>,
    device: PathBuf,
    fingerprint: Option<String>,
) {
    let Some(tool_path) = remote_config.lock().discover_disc_tool() else {
        tracing::warn!(device = %device.display(), "no disc tool found, skipping proactive scan");
        return;
    };

    let started_at_us = clock.now_micros();
    let task_id = format!("proactive-scan-{}-{started_at_us}", device.display());

    {
        let mut table = drives.lock();
        let drive = table.get_or_insert(&device);
        if drive.start_scan(&task_id).is_err() {
            tracing::debug!(device = %device.display(), "drive busy, skipping proactive scan");
            return;
        }
    }

    let device_str = device.to_string_lossy().into_owned();
    let started_at = format_timestamp(started_at_us);

    match scan_driver::run_scan(&tool_path, &device_str).await {
        Ok(result) => {
            let payload = scan_result_payload(fingerprint.as_deref().unwrap_or_default(), &result);
            let result_json = match serde_json::to_value(&payload) {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(error = %e, device = %device_str, "failed to serialize proactive scan result");
                    let mut table = drives.lock();
                    let drive = table.get_or_insert(&device);
                    let _ = drive.fail_scan(e.to_string());
                    return;
                }
            };

            let completed_at_us = clock.now_micros();
            {
                let mut table = drives.lock();
                let drive = table.get_or_insert(&device);
                let _ = drive.complete_scan(result_json.clone(), completed_at_us);
            }

            let duration_seconds = (completed_at_us - started_at_us) as f64 / 1_000_000.0;
            let completion = Completion::success(
                &task_id,
                TaskKind::Scan,
                &started_at,
                format_timestamp(completed_at_us),
                duration_seconds,
                result_json,
            );
            if let Err(e) = queue.complete(&task_id, &completion) {
                tracing::warn!(error = %e, task_id, "failed to record proactive scan completion");
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, device = %device_str, "proactive scan failed");
            let mut table = drives.lock();
            let drive = table.get_or_insert(&device);
            let _ = drive.fail_scan(e.to_string());
        }
    }
}

/// DVD-vs-Blu-ray-vs-CD detection from mount-point structure. A real
/// deployment would ask the disc tool itself; this keeps the daemon
/// runnable without first invoking it.
fn detect_medium(mount_path: &Path) -> MediumKind {
    if mount_path.join("BDMV").is_dir() {
        MediumKind::Bluray
    } else if mount_path.join("VIDEO_TS").is_dir() {
        MediumKind::Dvd
    } else {
        MediumKind::Cd
    }
}

/// Dials the controller with exponential backoff, registers, and relays
/// outbound messages until the connection drops (spec §4.12).
async fn run_link_loop(
    local: LocalConfig,
    outbound_tx: mpsc::UnboundedSender<Message>,
    mut outbound_rx: mpsc::UnboundedReceiver<Message>,
    registry: MethodRegistry,
) {
    let mut backoff = Backoff::new();

    loop {
        let addr = format!("{}:{}", local.controller_host, local.controller_port);
        match TcpStream::connect(&addr).await {
            Ok(stream) => {
                backoff.reset();
                tracing::info!(%addr, "connected to controller");
                if let Err(e) = run_connection(stream, &local, &outbound_tx, &mut outbound_rx, &registry).await {
                    tracing::warn!(error = %e, "link connection dropped");
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, %addr, "failed to connect to controller");
            }
        }

        let delay = backoff.next_delay();
        tokio::time::sleep(delay).await;
    }
}

async fn run_connection(
    mut stream: TcpStream,
    local: &LocalConfig,
    outbound_tx: &mpsc::UnboundedSender<Message>,
    outbound_rx: &mut mpsc::UnboundedReceiver<Message>,
    registry: &MethodRegistry,
) -> Result<(), amphigory_link::WireError> {
    amphigory_link::write_message(
        &mut stream,
        &Message::DaemonConfig {
            daemon_id: local.daemon_id.clone(),
            capabilities: vec!["scan".to_string(), "rip".to_string()],
        },
    )
    .await?;

    let (mut read_half, mut write_half) = stream.into_split();

    let registry = registry.clone();
    let reply_tx = outbound_tx.clone();
    let reader = tokio::spawn(async move {
        loop {
            match amphigory_link::read_message(&mut read_half).await {
                Ok(Message::Request { request_id, method, params }) => {
                    let outcome = registry.dispatch(&method, params).await;
                    let _ = reply_tx.send(Message::Response { request_id, outcome });
                }
                Ok(Message::ConfigUpdated) => {
                    tracing::info!("controller requested config refresh");
                }
                Ok(_) => {}
                Err(_) => break,
            }
        }
    });

    while let Some(message) = outbound_rx.recv().await {
        if amphigory_link::write_message(&mut write_half, &message).await.is_err() {
            break;
        }
    }

    reader.abort();
    Ok(())
}
