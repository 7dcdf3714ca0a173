//! Daemon-side task consumer loop (spec §4.6): claims `scan`/`rip` tasks
//! from the Task Directory and dispatches them to the matching driver.

use crate::config::RemoteConfig;
use crate::drive_table::{DriveTable, ScanPlan};
use crate::error::DaemonError;
use crate::ripper::{classify_rip_outcome, run_ripper, RipOutcomeInputs, RipProgress};
use crate::scan_driver::run_scan;
use amphigory_core::duration::parse_hms;
use amphigory_core::{
    Clock, Completion, ErrorCode, Owner, ScanResultPayload, ScanResultTrack, Task, TaskError,
    TaskPayload,
};
use amphigory_link::Message;
use amphigory_queue::TaskDirectory;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

/// Shared state the consumer loop reads and mutates each iteration. Kept as
/// a bag of `Arc`s rather than a single struct behind one lock, so the
/// watcher task (which only ever touches `drives`) doesn't contend with
/// config updates pushed over the link.
#[derive(Clone)]
pub struct ConsumerContext {
    pub queue: Arc<TaskDirectory>,
    pub drives: Arc<Mutex<DriveTable>>,
    pub remote_config: Arc<Mutex<RemoteConfig>>,
    pub outbound: UnboundedSender<Message>,
    pub clock: Arc<dyn Clock>,
}

/// Runs forever: recovers any in-flight task left over from a prior crash,
/// then loops claiming and dispatching work. Callers spawn this on its own
/// task and let it run for the daemon's lifetime.
pub async fn run_consumer_loop(ctx: ConsumerContext, poll_interval: Duration) {
    if let Err(e) = ctx.queue.recover(Owner::Daemon) {
        tracing::error!(error = %e, "failed to recover in-progress tasks");
    }

    loop {
        if ctx.queue.is_paused() {
            tokio::time::sleep(poll_interval).await;
            continue;
        }

        match ctx.queue.claim_next(Owner::Daemon) {
            Ok(Some(task)) => {
                if let Err(e) = dispatch(&ctx, task).await {
                    tracing::error!(error = %e, "task dispatch failed");
                }
            }
            Ok(None) => tokio::time::sleep(poll_interval).await,
            Err(e) => {
                tracing::error!(error = %e, "claim_next failed");
                tokio::time::sleep(poll_interval).await;
            }
        }
    }
}

async fn dispatch(ctx: &ConsumerContext, task: Task) -> Result<(), DaemonError> {
    let started_micros = ctx.clock.now_micros();
    let started_at = amphigory_core::clock::format_timestamp(started_micros);
    let outcome = match &task.payload {
        TaskPayload::Scan {
            device,
            disc_fingerprint,
        } => run_scan_task(ctx, &task, device, disc_fingerprint.as_deref()).await,
        TaskPayload::Rip {
            disc_fingerprint,
            track_number,
        } => run_rip_task(ctx, &task, disc_fingerprint, *track_number).await,
        TaskPayload::Transcode { .. } | TaskPayload::Insert { .. } => {
            // Routed to the controller by `TaskKind::owner`; claim_next
            // never hands these to a daemon consumer.
            unreachable!("controller-owned task reached the daemon consumer")
        }
    };
    let completed_micros = ctx.clock.now_micros();
    let completed_at = amphigory_core::clock::format_timestamp(completed_micros);
    let duration_seconds = (completed_micros - started_micros) as f64 / 1_000_000.0;

    let completion = match outcome {
        Ok(result) => {
            Completion::success(&task.id, task.kind, &started_at, &completed_at, duration_seconds, result)
        }
        Err(err) => Completion::failed(&task.id, task.kind, &started_at, &completed_at, duration_seconds, err),
    };
    ctx.queue.complete(&task.id, &completion)?;
    Ok(())
}

async fn run_scan_task(
    ctx: &ConsumerContext,
    task: &Task,
    device: &Path,
    task_fingerprint: Option<&str>,
) -> Result<serde_json::Value, TaskError> {
    let cached_fingerprint = ctx.drives.lock().get(device).and_then(|d| d.fingerprint.clone());
    let fingerprint = task_fingerprint.map(str::to_string).or(cached_fingerprint);

    if let Some(fingerprint) = &fingerprint {
        let plan = ctx.drives.lock().plan_scan(device, fingerprint);
        if let ScanPlan::UseCached(cached) = plan {
            return Ok(cached);
        }
    }

    let tool_path = ctx
        .remote_config
        .lock()
        .discover_disc_tool()
        .ok_or_else(|| TaskError::new(ErrorCode::Unknown, "no disc tool found on this host"))?;

    {
        let mut drives = ctx.drives.lock();
        let drive = drives.get_or_insert(device);
        let _ = drive.start_scan(&task.id);
    }

    let device_str = device.to_string_lossy().into_owned();
    let result = run_scan(&tool_path, &device_str)
        .await
        .map_err(|e| TaskError::new(ErrorCode::MakemkvFailed, e.to_string()))?;

    let fingerprint = fingerprint.unwrap_or_default();
    let payload = scan_result_payload(&fingerprint, &result);
    let result_json = serde_json::to_value(&payload)
        .map_err(|e| TaskError::new(ErrorCode::Unknown, e.to_string()))?;

    let now = ctx.clock.now_micros();
    {
        let mut drives = ctx.drives.lock();
        let drive = drives.get_or_insert(device);
        let _ = drive.complete_scan(result_json.clone(), now);
    }

    Ok(result_json)
}

/// Builds the shared wire/cache shape from a freshly-parsed scan, converting
/// each track's `H:M:S` duration into seconds (missing or unparsable becomes
/// `0`, matching a track whose duration MakeMKV didn't report). Also used
/// by the proactive scan-on-insert path in `amphigoryd`'s `main.rs`.
pub fn scan_result_payload(
    disc_fingerprint: &str,
    result: &crate::scan_driver::ScanResult,
) -> ScanResultPayload {
    let tracks = result
        .tracks
        .iter()
        .map(|t| ScanResultTrack {
            track_number: t.track_number,
            duration_secs: t
                .duration_hms
                .as_deref()
                .and_then(|s| parse_hms(s).ok())
                .unwrap_or(0),
            size_bytes: t.size_bytes,
            resolution: t.resolution.clone(),
            chapters: t.chapters,
            audio_streams: t.audio_streams.clone(),
            subtitle_streams: t.subtitle_streams.clone(),
            segment_map: t.segment_map.clone(),
            source_name: t.source_name.clone(),
            is_main_feature_playlist: t.is_main_feature_playlist,
        })
        .collect();

    ScanResultPayload {
        disc_fingerprint: disc_fingerprint.to_string(),
        disc_name: result.disc_name.clone(),
        disc_kind: result.disc_kind,
        tracks,
    }
}

async fn run_rip_task(
    ctx: &ConsumerContext,
    task: &Task,
    disc_fingerprint: &str,
    track_number: u32,
) -> Result<serde_json::Value, TaskError> {
    let device = ctx
        .drives
        .lock()
        .find_by_fingerprint(disc_fingerprint)
        .map(|p| p.to_path_buf())
        .ok_or_else(|| TaskError::new(ErrorCode::DiscEjected, "disc no longer present"))?;

    let tool_path = ctx
        .remote_config
        .lock()
        .discover_disc_tool()
        .ok_or_else(|| TaskError::new(ErrorCode::Unknown, "no disc tool found on this host"))?;
    let idle_timeout = Duration::from_secs(ctx.remote_config.lock().rip_idle_timeout_secs);

    {
        let mut drives = ctx.drives.lock();
        if let Some(drive) = drives.get_mut(&device) {
            let _ = drive.start_rip(&task.id);
        }
    }

    let output_dir = task.output.parent().unwrap_or_else(|| Path::new("."));
    if let Err(e) = std::fs::create_dir_all(output_dir) {
        return Err(TaskError::new(ErrorCode::OutputWriteFailed, e.to_string()));
    }

    let task_id = task.id.clone();
    let outbound = ctx.outbound.clone();
    let device_str = device.to_string_lossy().into_owned();

    let inputs = run_ripper(
        &tool_path,
        &device_str,
        track_number,
        output_dir,
        idle_timeout,
        ctx.clock.as_ref(),
        {
            let task_id = task_id.clone();
            let outbound = outbound.clone();
            move |progress: RipProgress| {
                send_progress(&outbound, &task_id, &progress);
            }
        },
        |text, looks_like_error| {
            if looks_like_error {
                tracing::warn!(task_id = %task_id, line = %text, "ripper reported a possible read error");
            }
        },
    )
    .await
    .map_err(|e| TaskError::new(ErrorCode::MakemkvFailed, e.to_string()))?;

    {
        let mut drives = ctx.drives.lock();
        if let Some(drive) = drives.get_mut(&device) {
            let _ = drive.finish_rip();
        }
    }

    finish_rip_outcome(task, inputs)
}

fn send_progress(outbound: &UnboundedSender<Message>, task_id: &str, progress: &RipProgress) {
    let message = Message::Progress {
        task_id: task_id.to_string(),
        percent: progress.percent,
        eta_seconds: progress.eta_seconds,
        bytes: progress.bytes,
        speed: progress.speed.clone(),
    };
    // The link may be mid-reconnect; dropping a progress tick is harmless,
    // the next `PRGV` sample supersedes it.
    let _ = outbound.send(message);
}

fn finish_rip_outcome(task: &Task, mut inputs: RipOutcomeInputs) -> Result<serde_json::Value, TaskError> {
    let exists_nonzero = std::fs::metadata(&task.output)
        .map(|m| m.len() > 0)
        .unwrap_or(false);
    inputs.output_exists_nonzero = inputs.output_exists_nonzero || exists_nonzero;

    classify_rip_outcome(inputs)
        .map(|()| serde_json::json!({ "output": task.output }))
        .map_err(|code| TaskError::new(code, code.to_string()))
}
