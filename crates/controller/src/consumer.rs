//! Controller-side task consumer loop (spec §4.6): claims `transcode`
//! tasks from the Task Directory, drives the transcoder, and records the
//! result against the metadata store.

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::transcoder::{classify_transcode_outcome, run_transcoder, TranscodeOutcomeInputs};
use amphigory_core::{Clock, Completion, ErrorCode, Owner, Task, TaskError, TaskPayload, TrackStatus};
use amphigory_link::Message;
use amphigory_queue::TaskDirectory;
use amphigory_store::{MetadataStore, TrackUpdate};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

#[derive(Clone)]
pub struct ConsumerContext {
    pub queue: Arc<TaskDirectory>,
    pub store: Arc<Mutex<MetadataStore>>,
    pub config: Arc<ControllerConfig>,
    pub outbound: UnboundedSender<Message>,
    pub clock: Arc<dyn Clock>,
}

pub async fn run_consumer_loop(ctx: ConsumerContext, poll_interval: Duration) {
    if let Err(e) = ctx.queue.recover(Owner::Controller) {
        tracing::error!(error = %e, "failed to recover in-progress tasks");
    }

    loop {
        if ctx.queue.is_paused() {
            tokio::time::sleep(poll_interval).await;
            continue;
        }

        match ctx.queue.claim_next(Owner::Controller) {
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

async fn dispatch(ctx: &ConsumerContext, task: Task) -> Result<(), ControllerError> {
    let started_micros = ctx.clock.now_micros();
    let started_at = amphigory_core::clock::format_timestamp(started_micros);

    let outcome = match &task.payload {
        TaskPayload::Transcode {
            disc_fingerprint,
            track_number,
            preset_name,
        } => run_transcode_task(ctx, &task, disc_fingerprint, *track_number, preset_name).await,
        TaskPayload::Insert { .. } => {
            // No Plex-library collaborator is wired up here (spec treats
            // library naming as an external, out-of-scope consumer); a
            // task of this kind reaching the queue has nowhere to go.
            Err(TaskError::new(
                ErrorCode::Unknown,
                "insert stage has no registered handler",
            ))
        }
        TaskPayload::Scan { .. } | TaskPayload::Rip { .. } => {
            unreachable!("daemon-owned task reached the controller consumer")
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

async fn run_transcode_task(
    ctx: &ConsumerContext,
    task: &Task,
    disc_fingerprint: &str,
    track_number: u32,
    preset_name: &str,
) -> Result<serde_json::Value, TaskError> {
    let tool_path = ctx
        .config
        .discover_transcoder_tool()
        .ok_or_else(|| TaskError::new(ErrorCode::Unknown, "no transcoder tool found on this host"))?;
    let preset_path = ctx.config.preset_dir.join(format!("{preset_name}.json"));
    let idle_timeout = Duration::from_secs(ctx.config.transcode_idle_timeout_secs);

    let input = task
        .input
        .as_deref()
        .ok_or_else(|| TaskError::new(ErrorCode::Unknown, "transcode task has no input path"))?;

    if let Some(parent) = task.output.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            return Err(TaskError::new(ErrorCode::OutputWriteFailed, e.to_string()));
        }
    }

    mark_track_status(ctx, disc_fingerprint, track_number, TrackStatus::Transcoding);

    let task_id = task.id.clone();
    let outbound = ctx.outbound.clone();
    let inputs = run_transcoder(
        &tool_path,
        &preset_path,
        preset_name,
        input,
        &task.output,
        idle_timeout,
        move |percent| send_progress(&outbound, &task_id, percent),
    )
    .await
    .map_err(|e| TaskError::new(ErrorCode::Unknown, e.to_string()))?;

    finish_transcode_outcome(ctx, task, disc_fingerprint, track_number, inputs)
}

fn send_progress(outbound: &UnboundedSender<Message>, task_id: &str, percent: f64) {
    let message = Message::Progress {
        task_id: task_id.to_string(),
        percent,
        eta_seconds: None,
        bytes: None,
        speed: None,
    };
    let _ = outbound.send(message);
}

fn finish_transcode_outcome(
    ctx: &ConsumerContext,
    task: &Task,
    disc_fingerprint: &str,
    track_number: u32,
    mut inputs: TranscodeOutcomeInputs,
) -> Result<serde_json::Value, TaskError> {
    let exists_nonzero = std::fs::metadata(&task.output)
        .map(|m| m.len() > 0)
        .unwrap_or(false);
    inputs.output_exists_nonzero = inputs.output_exists_nonzero || exists_nonzero;

    match classify_transcode_outcome(inputs) {
        Ok(()) => {
            let update = TrackUpdate {
                transcoded_path: Some(task.output.clone()),
                status: Some(TrackStatus::Transcoded),
                ..Default::default()
            };
            let track_id = format!("{disc_fingerprint}:{track_number}");
            if let Err(e) = ctx.store.lock().update_track(&track_id, &update) {
                return Err(TaskError::new(ErrorCode::Unknown, e.to_string()));
            }
            Ok(serde_json::json!({ "output": task.output }))
        }
        Err(code) => {
            mark_track_status(ctx, disc_fingerprint, track_number, TrackStatus::Ripped);
            Err(TaskError::new(code, code.to_string()))
        }
    }
}

fn mark_track_status(ctx: &ConsumerContext, disc_fingerprint: &str, track_number: u32, status: TrackStatus) {
    let track_id = format!("{disc_fingerprint}:{track_number}");
    let update = TrackUpdate {
        status: Some(status),
        ..Default::default()
    };
    if let Err(e) = ctx.store.lock().update_track(&track_id, &update) {
        tracing::warn!(error = %e, %track_id, "failed to update track status");
    }
}
