use super::*;
use amphigory_core::{AudioStream, MediumKind, SubtitleStream, TrackStatus};

fn sample_track(fingerprint: &str, number: u32) -> Track {
    Track {
        disc_fingerprint: fingerprint.to_string(),
        track_number: number,
        duration_secs: 6300,
        size_bytes: 12_000_000_000,
        resolution: Some("1920x1080".to_string()),
        chapters: 24,
        audio_streams: vec![AudioStream {
            codec: "dts".to_string(),
            language: "eng".to_string(),
            channels: 6,
        }],
        subtitle_streams: vec![SubtitleStream {
            language: "eng".to_string(),
            format: "pgs".to_string(),
        }],
        status: TrackStatus::Discovered,
        classification: None,
        classification_confidence: None,
        classification_score: None,
        is_alternate_main: false,
        segment_map: vec![0, 1, 2],
        makemkv_name: Some("title00".to_string()),
        preset_name: None,
        output_filename: None,
        ripped_path: None,
        transcoded_path: None,
        inserted_path: None,
        is_main_feature_playlist: false,
    }
}

#[test]
fn save_scan_then_fetch_round_trips() {
    let mut store = MetadataStore::open_in_memory().unwrap();
    let tracks = vec![sample_track("fp1", 0)];
    store
        .save_scan("fp1", MediumKind::Dvd, serde_json::json!({"raw": true}), &tracks, 100)
        .unwrap();

    let disc = store.get_by_fingerprint("fp1").unwrap().unwrap();
    assert_eq!(disc.medium, MediumKind::Dvd);
    assert_eq!(disc.created_at, 100);
    assert_eq!(disc.scanned_at, Some(100));

    let bundle = store.get_disc_with_tracks("fp1").unwrap().unwrap();
    assert_eq!(bundle.tracks.len(), 1);
    assert_eq!(bundle.tracks[0].duration_secs, 6300);
    assert_eq!(bundle.tracks[0].chapters, 24);
    assert_eq!(bundle.tracks[0].audio_streams.len(), 1);
}

#[test]
fn rescanning_replaces_tracks_atomically() {
    let mut store = MetadataStore::open_in_memory().unwrap();
    let first = vec![sample_track("fp1", 0), sample_track("fp1", 1)];
    store
        .save_scan("fp1", MediumKind::Dvd, serde_json::json!({}), &first, 100)
        .unwrap();

    let second = vec![sample_track("fp1", 0)];
    store
        .save_scan("fp1", MediumKind::Dvd, serde_json::json!({}), &second, 200)
        .unwrap();

    let bundle = store.get_disc_with_tracks("fp1").unwrap().unwrap();
    assert_eq!(bundle.tracks.len(), 1, "old track 1 must not survive a rescan");
    assert_eq!(bundle.disc.scanned_at, Some(200));
}

#[test]
fn get_by_fingerprint_missing_returns_none() {
    let store = MetadataStore::open_in_memory().unwrap();
    assert!(store.get_by_fingerprint("nope").unwrap().is_none());
}

#[test]
fn update_disc_metadata_only_touches_named_fields() {
    let mut store = MetadataStore::open_in_memory().unwrap();
    store
        .save_scan("fp1", MediumKind::Bluray, serde_json::json!({}), &[], 0)
        .unwrap();
    store
        .update_disc_metadata(
            "fp1",
            &DiscUpdate {
                title: Some("Arrival".to_string()),
                year: Some(2016),
                external_id: None,
            },
        )
        .unwrap();

    let disc = store.get_by_fingerprint("fp1").unwrap().unwrap();
    assert_eq!(disc.title.as_deref(), Some("Arrival"));
    assert_eq!(disc.year, Some(2016));
    assert_eq!(disc.external_id, None);
}

#[test]
fn update_track_sets_ripped_path_and_status() {
    let mut store = MetadataStore::open_in_memory().unwrap();
    let tracks = vec![sample_track("fp1", 0)];
    store
        .save_scan("fp1", MediumKind::Dvd, serde_json::json!({}), &tracks, 0)
        .unwrap();

    store
        .update_track(
            "fp1:0",
            &TrackUpdate {
                ripped_path: Some("/staging/fp1/track0.mkv".into()),
                status: Some(TrackStatus::Ripped),
                ..Default::default()
            },
        )
        .unwrap();

    let bundle = store.get_disc_with_tracks("fp1").unwrap().unwrap();
    assert_eq!(
        bundle.tracks[0].ripped_path,
        Some(std::path::PathBuf::from("/staging/fp1/track0.mkv"))
    );
    assert_eq!(bundle.tracks[0].status, TrackStatus::Ripped);
}

#[test]
fn list_discs_filters_by_medium_and_search() {
    let mut store = MetadataStore::open_in_memory().unwrap();
    store
        .save_scan("fp-dvd", MediumKind::Dvd, serde_json::json!({}), &[], 0)
        .unwrap();
    store
        .save_scan("fp-bd", MediumKind::Bluray, serde_json::json!({}), &[], 0)
        .unwrap();
    store
        .update_disc_metadata(
            "fp-bd",
            &DiscUpdate {
                title: Some("Arrival".to_string()),
                ..Default::default()
            },
        )
        .unwrap();

    let only_bluray = store
        .list_discs(&DiscFilter {
            medium: Some(MediumKind::Bluray),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(only_bluray.len(), 1);
    assert_eq!(only_bluray[0].fingerprint, "fp-bd");

    let search_hit = store
        .list_discs(&DiscFilter {
            search: Some("arriv".to_string()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(search_hit.len(), 1);
    assert_eq!(search_hit[0].fingerprint, "fp-bd");
}

#[test]
fn flag_disc_sets_and_clears_reprocessing() {
    let mut store = MetadataStore::open_in_memory().unwrap();
    store
        .save_scan("fp1", MediumKind::Dvd, serde_json::json!({}), &[], 0)
        .unwrap();

    store
        .flag_disc("fp1", Some(("rerip", "audio sync was off")))
        .unwrap();
    let disc = store.get_by_fingerprint("fp1").unwrap().unwrap();
    assert!(disc.needs_reprocessing);
    assert_eq!(disc.reprocessing_type.as_deref(), Some("rerip"));

    store.flag_disc("fp1", None).unwrap();
    let disc = store.get_by_fingerprint("fp1").unwrap().unwrap();
    assert!(!disc.needs_reprocessing);
    assert_eq!(disc.reprocessing_type, None);
}

#[test]
fn classification_round_trips_through_update_track() {
    let mut store = MetadataStore::open_in_memory().unwrap();
    let tracks = vec![sample_track("fp1", 0)];
    store
        .save_scan("fp1", MediumKind::Dvd, serde_json::json!({}), &tracks, 0)
        .unwrap();

    store
        .update_track(
            "fp1:0",
            &TrackUpdate {
                classification: Some(amphigory_core::ClassificationLabel::MainFeature),
                classification_confidence: Some(amphigory_core::Confidence::High),
                classification_score: Some(42.5),
                ..Default::default()
            },
        )
        .unwrap();

    let bundle = store.get_disc_with_tracks("fp1").unwrap().unwrap();
    assert_eq!(
        bundle.tracks[0].classification,
        Some(amphigory_core::ClassificationLabel::MainFeature)
    );
    assert_eq!(bundle.tracks[0].classification_score, Some(42.5));
}
