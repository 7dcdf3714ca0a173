//! Resume reconciler (spec §4.10): given a track's on-disk state, decide
//! which pipeline stages still need to run.

use crate::disc::{Track, TrackStatus};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Rip,
    Transcode,
    Insert,
}

use serde::{Deserialize, Serialize};

/// Inspect a track's three path slots against the filesystem and return
/// the stages still required, earliest-missing-file first.
pub fn required_stages(track: &Track, exists: impl Fn(&Path) -> bool) -> Vec<Stage> {
    if track.inserted_path.as_deref().map(&exists).unwrap_or(false) {
        return vec![];
    }
    if track.transcoded_path.as_deref().map(&exists).unwrap_or(false) {
        return vec![Stage::Insert];
    }
    if track.ripped_path.as_deref().map(&exists).unwrap_or(false) {
        return vec![Stage::Transcode, Stage::Insert];
    }
    vec![Stage::Rip, Stage::Transcode, Stage::Insert]
}

/// Convenience wrapper that checks the real filesystem.
pub fn required_stages_on_disk(track: &Track) -> Vec<Stage> {
    required_stages(track, |p| p.exists())
}

/// Clear all three path fields (best-effort file deletion) and restore the
/// track to `discovered`.
pub fn reset_track(track: &mut Track) {
    for path in [&track.ripped_path, &track.transcoded_path, &track.inserted_path] {
        if let Some(p) = path {
            let _ = std::fs::remove_file(p);
        }
    }
    track.ripped_path = None;
    track.transcoded_path = None;
    track.inserted_path = None;
    track.status = TrackStatus::Discovered;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disc::{AudioStream, SubtitleStream};
    use std::path::PathBuf;

    fn base_track() -> Track {
        Track {
            disc_fingerprint: "fp".into(),
            track_number: 0,
            duration_secs: 6300,
            size_bytes: 0,
            resolution: None,
            chapters: 24,
            audio_streams: vec![AudioStream::default()],
            subtitle_streams: vec![SubtitleStream::default()],
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

    /// All 2^3 combinations of the three paths being set, crossed with
    /// file-exists/not (property 10). A path field that is set but whose
    /// file is missing behaves like the field being unset.
    #[test]
    fn all_combinations_match_expected_stage_list() {
        let exists_paths = |paths: &[&str]| {
            let set: Vec<String> = paths.iter().map(|s| s.to_string()).collect();
            move |p: &Path| set.iter().any(|s| s == p.to_str().unwrap())
        };

        let cases: &[(bool, bool, bool, bool, bool, bool, &[Stage])] = &[
            // (ripped_set, ripped_exists, transcoded_set, transcoded_exists, inserted_set, inserted_exists, expected)
            (false, false, false, false, false, false, &[Stage::Rip, Stage::Transcode, Stage::Insert]),
            (true, false, false, false, false, false, &[Stage::Rip, Stage::Transcode, Stage::Insert]),
            (true, true, false, false, false, false, &[Stage::Transcode, Stage::Insert]),
            (true, true, true, false, false, false, &[Stage::Transcode, Stage::Insert]),
            (true, true, true, true, false, false, &[Stage::Insert]),
            (true, true, true, true, true, false, &[Stage::Insert]),
            (true, true, true, true, true, true, &[]),
        ];

        for &(rs, re, ts, te, is_, ie, expected) in cases {
            let mut t = base_track();
            let mut present = vec![];
            if rs {
                t.ripped_path = Some(PathBuf::from("/r"));
                if re {
                    present.push("/r");
                }
            }
            if ts {
                t.transcoded_path = Some(PathBuf::from("/t"));
                if te {
                    present.push("/t");
                }
            }
            if is_ {
                t.inserted_path = Some(PathBuf::from("/i"));
                if ie {
                    present.push("/i");
                }
            }
            let exists = exists_paths(&present);
            let stages = required_stages(&t, exists);
            assert_eq!(stages, expected, "case {rs} {re} {ts} {te} {is_} {ie}");
        }
    }

    #[test]
    fn reset_clears_paths_and_status() {
        let mut t = base_track();
        t.ripped_path = Some(PathBuf::from("/does/not/exist/r"));
        t.status = TrackStatus::Transcoded;
        reset_track(&mut t);
        assert!(t.ripped_path.is_none());
        assert!(t.transcoded_path.is_none());
        assert!(t.inserted_path.is_none());
        assert_eq!(t.status, TrackStatus::Discovered);
    }
}
