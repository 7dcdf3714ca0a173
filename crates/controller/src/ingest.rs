//! Scan-completion ingestion loop (spec §4.6, §4.11): the controller's
//! counterpart to the daemon's proactive scan. Polls `complete/` for
//! `scan` task completions, classifies the tracks they carry, and upserts
//! the result into the metadata store — the step that actually lands a
//! real disc's tracks where [`amphigory_controller::producer::build_tasks`]
//! can find them.

use amphigory_core::{classifier, Clock, OutcomeStatus, ScanResultPayload, TaskKind};
use amphigory_queue::TaskDirectory;
use amphigory_store::MetadataStore;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct IngestContext {
    pub queue: Arc<TaskDirectory>,
    pub store: Arc<Mutex<MetadataStore>>,
    pub clock: Arc<dyn Clock>,
}

/// Runs forever: polls `complete/`, ingests every not-yet-seen `scan`
/// success it finds, and sleeps between polls. Scan failures are left for
/// the operator to notice via the daemon's own logging — there's nothing
/// for the metadata store to record about a disc that never scanned.
pub async fn run_ingest_loop(ctx: IngestContext, poll_interval: Duration) {
    let mut seen = HashSet::new();
    loop {
        match ctx.queue.list_complete() {
            Ok(completions) => {
                for (task_id, completion) in completions {
                    if completion.kind != TaskKind::Scan {
                        continue;
                    }
                    if completion.status != OutcomeStatus::Success {
                        continue;
                    }
                    if !seen.insert(task_id.clone()) {
                        continue;
                    }
                    if let Err(e) = ingest_one(&ctx, &task_id, completion) {
                        tracing::error!(error = %e, task_id, "failed to ingest scan completion");
                    }
                }
            }
            Err(e) => tracing::error!(error = %e, "failed to list completed tasks"),
        }

        tokio::time::sleep(poll_interval).await;
    }
}

fn ingest_one(
    ctx: &IngestContext,
    task_id: &str,
    completion: amphigory_core::Completion,
) -> Result<(), IngestError> {
    let result = completion.result.ok_or(IngestError::MissingResult)?;
    let payload: ScanResultPayload = serde_json::from_value(result)?;

    let mut tracks = payload.to_tracks();
    for classification in classifier::classify(&tracks) {
        let track = &mut tracks[classification.track_index];
        track.classification = Some(classification.label);
        track.classification_confidence = Some(classification.confidence);
        track.classification_score = Some(classification.score);
        track.is_alternate_main = classification.is_alternate_main;
    }

    let medium = payload.disc_kind.unwrap_or(amphigory_core::MediumKind::Dvd);
    let scan_snapshot = serde_json::json!({
        "disc_name": payload.disc_name,
        "task_id": task_id,
    });
    let now = ctx.clock.now_micros();

    ctx.store
        .lock()
        .save_scan(&payload.disc_fingerprint, medium, scan_snapshot, &tracks, now)?;

    tracing::info!(
        fingerprint = %payload.disc_fingerprint,
        track_count = tracks.len(),
        task_id,
        "ingested scan completion"
    );
    Ok(())
}

#[derive(Debug, thiserror::Error)]
enum IngestError {
    #[error("scan completion has no result payload")]
    MissingResult,
    #[error("malformed scan result payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error(transparent)]
    Store(#[from] amphigory_store::StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use amphigory_core::{AudioStream, Completion, MediumKind, SubtitleStream};

    fn sample_completion(fingerprint: &str) -> Completion {
        let payload = ScanResultPayload {
            disc_fingerprint: fingerprint.to_string(),
            disc_name: Some("MOVIE".to_string()),
            disc_kind: Some(MediumKind::Dvd),
            tracks: vec![
                amphigory_core::ScanResultTrack {
                    track_number: 0,
                    duration_secs: 6300,
                    size_bytes: 12_000_000_000,
                    resolution: Some("1920x1080".to_string()),
                    chapters: 24,
                    audio_streams: vec![AudioStream::default()],
                    subtitle_streams: vec![SubtitleStream::default()],
                    segment_map: vec![0, 1],
                    source_name: Some("title00".to_string()),
                    is_main_feature_playlist: true,
                },
                amphigory_core::ScanResultTrack {
                    track_number: 1,
                    duration_secs: 120,
                    size_bytes: 1,
                    resolution: None,
                    chapters: 1,
                    audio_streams: vec![],
                    subtitle_streams: vec![],
                    segment_map: vec![],
                    source_name: None,
                    is_main_feature_playlist: false,
                },
            ],
        };
        Completion::success(
            "scan-1",
            TaskKind::Scan,
            "s",
            "e",
            1.0,
            serde_json::to_value(&payload).unwrap(),
        )
    }

    fn test_ctx() -> IngestContext {
        IngestContext {
            queue: Arc::new(TaskDirectory::open(tempfile::tempdir().unwrap().into_path()).unwrap()),
            store: Arc::new(Mutex::new(MetadataStore::open_in_memory().unwrap())),
            clock: Arc::new(amphigory_core::SystemClock),
        }
    }

    #[test]
    fn ingest_one_classifies_and_saves_tracks() {
        let ctx = test_ctx();
        let completion = sample_completion("fp-1");

        ingest_one(&ctx, "scan-1", completion).unwrap();

        let with_tracks = ctx.store.lock().get_disc_with_tracks("fp-1").unwrap().unwrap();
        assert_eq!(with_tracks.tracks.len(), 2);
        let main = with_tracks.tracks.iter().find(|t| t.track_number == 0).unwrap();
        assert_eq!(main.classification, Some(amphigory_core::ClassificationLabel::MainFeature));
        assert_eq!(main.classification_confidence, Some(amphigory_core::Confidence::High));
    }

    #[test]
    fn ingest_one_rejects_missing_result() {
        let ctx = test_ctx();
        let completion = Completion::failed(
            "scan-1",
            TaskKind::Scan,
            "s",
            "e",
            1.0,
            amphigory_core::TaskError::new(amphigory_core::ErrorCode::Unknown, "boom"),
        );
        let err = ingest_one(&ctx, "scan-1", completion).unwrap_err();
        assert!(matches!(err, IngestError::MissingResult));
    }
}
