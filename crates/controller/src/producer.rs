//! Task Producer (spec §4.5): turns a "process these tracks" request into
//! dependency-linked rip/transcode task pairs, skipping stages the resume
//! reconciler already considers done.

use amphigory_core::clock::format_timestamp;
use amphigory_core::{required_stages, Stage, Task, TaskKind, TaskPayload, Track};
use amphigory_store::{MetadataStore, StoreError};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProducerError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("disc {0} has no track numbered {1}")]
    TrackNotFound(String, u32),
}

/// One track the caller wants processed.
#[derive(Debug, Clone)]
pub struct Selection {
    pub track_number: u32,
    pub output_filename: String,
    pub preset_name: Option<String>,
}

/// Builds the rip/transcode task pairs for `selections`, consulting the
/// store for each track's on-disk progress. Tasks are returned in
/// enqueue order (rip before its transcode); the caller is responsible for
/// assigning ids and calling [`amphigory_queue::TaskDirectory::enqueue`] in
/// that order so `tasks.json` preserves attempt order.
pub fn build_tasks(
    store: &MetadataStore,
    now_micros: i64,
    disc_fingerprint: &str,
    ripped_dir: &Path,
    inbox_dir: &Path,
    selections: &[Selection],
    exists: impl Fn(&Path) -> bool,
) -> Result<Vec<Task>, ProducerError> {
    let with_tracks = store
        .get_disc_with_tracks(disc_fingerprint)?
        .ok_or_else(|| ProducerError::TrackNotFound(disc_fingerprint.to_string(), 0))?;

    let mut tasks = Vec::new();
    let disc_folder = disc_fingerprint;

    for (i, selection) in selections.iter().enumerate() {
        let track = with_tracks
            .tracks
            .iter()
            .find(|t| t.track_number == selection.track_number)
            .ok_or_else(|| {
                ProducerError::TrackNotFound(disc_fingerprint.to_string(), selection.track_number)
            })?;

        let stages = required_stages(track, &exists);
        let needs_rip = stages.contains(&Stage::Rip);
        let needs_transcode = stages.contains(&Stage::Transcode);
        if !needs_rip && !needs_transcode {
            continue;
        }

        let rip_output = ripped_dir
            .join(disc_folder)
            .join(format!("{}.mkv", selection.output_filename));
        let transcode_output = inbox_dir
            .join(disc_folder)
            .join(format!("{}.mp4", selection.output_filename));

        let rip_task = needs_rip.then(|| Task {
            id: task_id(now_micros, "rip", i, 0),
            kind: TaskKind::Rip,
            created_at: format_timestamp(now_micros),
            input: None,
            output: rip_output.clone(),
            payload: TaskPayload::Rip {
                disc_fingerprint: disc_fingerprint.to_string(),
                track_number: selection.track_number,
            },
        });

        let transcode_input = if needs_rip {
            Some(rip_output.clone())
        } else {
            track.ripped_path.clone()
        };

        let transcode_task = needs_transcode.then(|| Task {
            id: task_id(now_micros, "transcode", i, 1),
            kind: TaskKind::Transcode,
            created_at: format_timestamp(now_micros),
            input: transcode_input,
            output: transcode_output,
            payload: TaskPayload::Transcode {
                disc_fingerprint: disc_fingerprint.to_string(),
                track_number: selection.track_number,
                preset_name: selection.preset_name.clone().unwrap_or_else(|| "default".to_string()),
            },
        });

        tasks.extend(rip_task);
        tasks.extend(transcode_task);
    }

    Ok(tasks)
}

/// Monotonic id: `<timestamp>-<kind>-<selection index>-<suffix>`. The
/// suffix (0 for rip, 1 for transcode) keeps a pair's two ids distinct and
/// orders the rip ahead of its transcode when timestamps collide exactly,
/// satisfying the "rip before transcode in `tasks.json`" requirement.
fn task_id(now_micros: i64, kind: &str, selection_index: usize, suffix: u8) -> String {
    format!(
        "{}-{kind}-{selection_index}-{suffix}",
        format_timestamp(now_micros)
    )
}
