//! End-to-end scenarios threading the domain types, the task directory,
//! the metadata store, and the producer/reconciler/classifier together
//! without a live daemon or controller process.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use amphigory_core::clock::format_timestamp;
use amphigory_core::{
    classifier, fingerprint, required_stages, AudioStream, Completion, Drive, DriveStateKind,
    ErrorCode, MediumKind, Owner, SubtitleStream, Task, TaskError, TaskKind, TaskPayload,
    TrackStatus,
};
use amphigory_queue::TaskDirectory;
use amphigory_store::MetadataStore;
use std::path::PathBuf;

fn track(
    fingerprint: &str,
    number: u32,
    duration: u64,
    chapters: u32,
    audio: usize,
    subs: usize,
) -> amphigory_core::Track {
    amphigory_core::Track {
        disc_fingerprint: fingerprint.to_string(),
        track_number: number,
        duration_secs: duration,
        size_bytes: 0,
        resolution: Some("1920x1080".to_string()),
        chapters,
        audio_streams: (0..audio).map(|_| AudioStream::default()).collect(),
        subtitle_streams: (0..subs).map(|_| SubtitleStream::default()).collect(),
        status: TrackStatus::Discovered,
        classification: None,
        classification_confidence: None,
        classification_score: None,
        is_alternate_main: false,
        segment_map: vec![],
        makemkv_name: None,
        preset_name: None,
        output_filename: None,
        ripped_path: None,
        transcoded_path: None,
        inserted_path: None,
        is_main_feature_playlist: false,
    }
}

/// S1: fresh disc, full pipeline (minus the actual subprocess calls,
/// which need a real disc tool binary on `PATH`). Verifies the
/// fingerprint formula, the classifier's main-feature pick, the
/// producer's single rip/transcode pair, and that a successful
/// completion lands the right paths in the metadata store.
#[test]
fn s1_fresh_disc_full_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let video_ts = dir.path().join("VIDEO_TS");
    std::fs::create_dir_all(&video_ts).unwrap();
    std::fs::write(video_ts.join("VIDEO_TS.IFO"), b"v").unwrap();
    std::fs::write(video_ts.join("VTS_01_0.IFO"), b"w").unwrap();

    let fp = fingerprint(dir.path(), MediumKind::Dvd, Some("A")).unwrap();
    let fp_again = fingerprint(dir.path(), MediumKind::Dvd, Some("A")).unwrap();
    assert_eq!(fp, fp_again, "fingerprint must be deterministic");

    std::fs::write(video_ts.join("VTS_01_0.IFO"), b"changed").unwrap();
    let fp_changed = fingerprint(dir.path(), MediumKind::Dvd, Some("A")).unwrap();
    assert_ne!(fp, fp_changed, "changing a structural byte must change the fingerprint");

    let tracks = vec![
        track(&fp.0, 0, 6300, 24, 3, 3),
        track(&fp.0, 1, 600, 8, 1, 0),
    ];
    let classifications = classifier::classify(&tracks);
    assert_eq!(classifications[0].label, amphigory_core::ClassificationLabel::MainFeature);
    assert_eq!(classifications[0].confidence, amphigory_core::Confidence::High);

    let mut store = MetadataStore::open_in_memory().unwrap();
    store
        .save_scan(&fp.0, MediumKind::Dvd, serde_json::json!({"raw": "scan"}), &tracks, 0)
        .unwrap();

    let ripped_dir = dir.path().join("ripped");
    let inbox_dir = dir.path().join("inbox");
    let selections = vec![amphigory_controller::Selection {
        track_number: 0,
        output_filename: "movie".to_string(),
        preset_name: None,
    }];
    let tasks = amphigory_controller::build_tasks(&store, 0, &fp.0, &ripped_dir, &inbox_dir, &selections, |_| false).unwrap();
    assert_eq!(tasks.len(), 2);

    let rip_output = tasks[0].output.clone();
    std::fs::create_dir_all(rip_output.parent().unwrap()).unwrap();
    std::fs::write(&rip_output, b"ripped bytes").unwrap();
    let transcode_output = tasks[1].output.clone();
    std::fs::create_dir_all(transcode_output.parent().unwrap()).unwrap();
    std::fs::write(&transcode_output, b"transcoded bytes").unwrap();

    let update = amphigory_store::TrackUpdate {
        ripped_path: Some(rip_output.clone()),
        transcoded_path: Some(transcode_output.clone()),
        status: Some(TrackStatus::Transcoded),
        ..Default::default()
    };
    store.update_track(&format!("{}:0", fp.0), &update).unwrap();

    let with_tracks = store.get_disc_with_tracks(&fp.0).unwrap().unwrap();
    assert_eq!(with_tracks.tracks[0].ripped_path, Some(rip_output));
    assert_eq!(with_tracks.tracks[0].transcoded_path, Some(transcode_output));
}

/// S2: a drive mid-rip loses its disc. The driver should terminate, the
/// queue record the failure as `DISC_EJECTED`, and the drive return to
/// `empty`.
#[test]
fn s2_eject_mid_rip() {
    let mount = PathBuf::from("/media/disc0");
    let mut drive = Drive::new(PathBuf::from("/dev/sr0"));
    drive.insert(mount.clone(), Some("MOVIE".to_string()), MediumKind::Dvd, 0);
    drive.start_scan("scan-1").unwrap();
    drive.set_fingerprint("fp-1").unwrap();
    drive.complete_scan(serde_json::json!({}), 1).unwrap();
    drive.start_rip("rip-1").unwrap();
    assert_eq!(drive.state, DriveStateKind::Ripping);

    drive.observe_unmount(&mount);
    assert_eq!(drive.state, DriveStateKind::Empty);

    let dir = tempfile::tempdir().unwrap();
    let queue = TaskDirectory::open(dir.path()).unwrap();
    let task = Task {
        id: "rip-1".to_string(),
        kind: TaskKind::Rip,
        created_at: format_timestamp(0),
        input: None,
        output: dir.path().join("out.mkv"),
        payload: TaskPayload::Rip {
            disc_fingerprint: "fp-1".to_string(),
            track_number: 0,
        },
    };
    queue.enqueue(&task).unwrap();
    queue.claim_next(Owner::Daemon).unwrap();

    let completion = Completion::failed(
        &task.id,
        TaskKind::Rip,
        format_timestamp(0),
        format_timestamp(1),
        1.0,
        TaskError::new(ErrorCode::DiscEjected, "disc no longer present"),
    );
    queue.complete(&task.id, &completion).unwrap();

    let failed_path = dir.path().join("failed").join("rip-1.json");
    let recorded: Completion = serde_json::from_str(&std::fs::read_to_string(failed_path).unwrap()).unwrap();
    assert_eq!(recorded.error.unwrap().code, ErrorCode::DiscEjected);
}

/// S3: the daemon crashes with a rip task in flight; on restart,
/// `recover()` must move it back to `queued/` so the consumer can
/// re-claim and re-run it.
#[test]
fn s3_resume_after_daemon_crash() {
    let dir = tempfile::tempdir().unwrap();
    let queue = TaskDirectory::open(dir.path()).unwrap();
    let task = Task {
        id: "rip-9".to_string(),
        kind: TaskKind::Rip,
        created_at: format_timestamp(0),
        input: None,
        output: dir.path().join("out.mkv"),
        payload: TaskPayload::Rip {
            disc_fingerprint: "fp-9".to_string(),
            track_number: 0,
        },
    };
    queue.enqueue(&task).unwrap();
    queue.claim_next(Owner::Daemon).unwrap();

    assert!(dir.path().join("in_progress").join("rip-9.json").is_file());

    let recovered = queue.recover(Owner::Daemon).unwrap();
    assert_eq!(recovered, 1);
    assert!(dir.path().join("queued").join("rip-9.json").is_file());

    let reclaimed = queue.claim_next(Owner::Daemon).unwrap().unwrap();
    assert_eq!(reclaimed.id, "rip-9");
}

/// S4: a disc is re-inserted after a prior rip completed but the
/// transcode never ran. The reconciler should report only the remaining
/// stages, and the producer should enqueue a transcode task whose input
/// is the existing ripped file.
#[test]
fn s4_partial_prior_processing() {
    let dir = tempfile::tempdir().unwrap();
    let ripped_path = dir.path().join("ripped/fp-4/movie.mkv");
    std::fs::create_dir_all(ripped_path.parent().unwrap()).unwrap();
    std::fs::write(&ripped_path, b"already ripped").unwrap();

    let mut t = track("fp-4", 0, 6300, 24, 1, 1);
    t.ripped_path = Some(ripped_path.clone());
    let stages = required_stages(&t, |p| p.exists());
    assert_eq!(
        stages,
        vec![amphigory_core::Stage::Transcode, amphigory_core::Stage::Insert]
    );

    let mut store = MetadataStore::open_in_memory().unwrap();
    store
        .save_scan("fp-4", MediumKind::Dvd, serde_json::json!({}), std::slice::from_ref(&t), 0)
        .unwrap();

    let selections = vec![amphigory_controller::Selection {
        track_number: 0,
        output_filename: "movie".to_string(),
        preset_name: None,
    }];
    let exists = |p: &std::path::Path| p == ripped_path.as_path();
    let tasks = amphigory_controller::build_tasks(
        &store,
        0,
        "fp-4",
        &dir.path().join("ripped"),
        &dir.path().join("inbox"),
        &selections,
        exists,
    )
    .unwrap();

    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].kind, TaskKind::Transcode);
    assert_eq!(tasks[0].input, Some(ripped_path));
}

/// S5: the rip task's output doesn't exist yet, so the downstream
/// transcode task isn't ready. Once the rip output file shows up,
/// `claim_next` returns it.
#[test]
fn s5_dependency_blocking() {
    let dir = tempfile::tempdir().unwrap();
    let queue = TaskDirectory::open(dir.path()).unwrap();
    let rip_output = dir.path().join("ripped/movie.mkv");

    let rip_task = Task {
        id: "id-rip".to_string(),
        kind: TaskKind::Rip,
        created_at: format_timestamp(0),
        input: None,
        output: rip_output.clone(),
        payload: TaskPayload::Rip {
            disc_fingerprint: "fp-5".to_string(),
            track_number: 0,
        },
    };
    let transcode_task = Task {
        id: "id-transcode".to_string(),
        kind: TaskKind::Transcode,
        created_at: format_timestamp(0),
        input: Some(rip_output.clone()),
        output: dir.path().join("inbox/movie.mp4"),
        payload: TaskPayload::Transcode {
            disc_fingerprint: "fp-5".to_string(),
            track_number: 0,
            preset_name: "default".to_string(),
        },
    };
    queue.enqueue(&rip_task).unwrap();
    queue.enqueue(&transcode_task).unwrap();

    assert!(queue.claim_next(Owner::Controller).unwrap().is_none());

    queue.claim_next(Owner::Daemon).unwrap();
    std::fs::create_dir_all(rip_output.parent().unwrap()).unwrap();
    std::fs::write(&rip_output, b"ripped").unwrap();
    let completion = Completion::success(
        "id-rip",
        TaskKind::Rip,
        format_timestamp(0),
        format_timestamp(1),
        1.0,
        serde_json::json!({}),
    );
    queue.complete("id-rip", &completion).unwrap();

    let claimed = queue.claim_next(Owner::Controller).unwrap().unwrap();
    assert_eq!(claimed.id, "id-transcode");
}

/// S6: four tracks, three tied as candidate main features plus a
/// trailer. The lowest-numbered tied track wins; the other two are
/// alternates; the trailer is classified separately.
#[test]
fn s6_alternate_language_main_features() {
    let mut en = track("fp-6", 0, 6300, 24, 1, 1);
    en.audio_streams[0].language = "en".to_string();
    let mut fr = track("fp-6", 1, 6300, 24, 1, 1);
    fr.audio_streams[0].language = "fr".to_string();
    let mut de = track("fp-6", 2, 6300, 24, 1, 1);
    de.audio_streams[0].language = "de".to_string();
    let trailer = track("fp-6", 3, 120, 2, 1, 0);

    let tracks = vec![en, fr, de, trailer];
    let classifications = classifier::classify(&tracks);

    assert_eq!(classifications[0].label, amphigory_core::ClassificationLabel::MainFeature);
    assert!(!classifications[0].is_alternate_main);

    assert_eq!(classifications[1].label, amphigory_core::ClassificationLabel::MainFeature);
    assert!(classifications[1].is_alternate_main);

    assert_eq!(classifications[2].label, amphigory_core::ClassificationLabel::MainFeature);
    assert!(classifications[2].is_alternate_main);

    assert_eq!(classifications[3].label, amphigory_core::ClassificationLabel::Trailers);
    assert!(!classifications[3].is_alternate_main);
}
