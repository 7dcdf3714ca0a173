//! Wire/cache shape for a completed scan (spec §4.8), shared by both
//! processes: the daemon fills one in from [`crate::disc::Track`]-shaped
//! data and ships it as a `scan` task's `Completion.result`; the
//! controller reads it back out to reconstruct tracks for the classifier
//! and the metadata store. Keeping it here, rather than duplicating an
//! equivalent struct in each crate, is what lets `serde_json::from_value`
//! on one end match what the other end serialized.

use crate::disc::{AudioStream, SubtitleStream, Track, TrackStatus};
use crate::fingerprint::MediumKind;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResultTrack {
    pub track_number: u32,
    pub duration_secs: u64,
    pub size_bytes: u64,
    pub resolution: Option<String>,
    pub chapters: u32,
    pub audio_streams: Vec<AudioStream>,
    pub subtitle_streams: Vec<SubtitleStream>,
    pub segment_map: Vec<u32>,
    pub source_name: Option<String>,
    pub is_main_feature_playlist: bool,
}

impl ScanResultTrack {
    /// Reconstructs the domain [`Track`] this scan-level view summarizes,
    /// ready to hand to [`crate::classifier::classify`] and
    /// [`amphigory_store`]'s `save_scan` (store depends on core, not the
    /// reverse, so the conversion lives on this side).
    pub fn to_track(&self, disc_fingerprint: &str) -> Track {
        Track {
            disc_fingerprint: disc_fingerprint.to_string(),
            track_number: self.track_number,
            duration_secs: self.duration_secs,
            size_bytes: self.size_bytes,
            resolution: self.resolution.clone(),
            chapters: self.chapters,
            audio_streams: self.audio_streams.clone(),
            subtitle_streams: self.subtitle_streams.clone(),
            status: TrackStatus::Discovered,
            classification: None,
            classification_confidence: None,
            classification_score: None,
            is_alternate_main: false,
            segment_map: self.segment_map.clone(),
            makemkv_name: self.source_name.clone(),
            preset_name: None,
            output_filename: None,
            ripped_path: None,
            transcoded_path: None,
            inserted_path: None,
            is_main_feature_playlist: self.is_main_feature_playlist,
        }
    }
}

/// Full per-track scan result for one disc, tagged with the fingerprint
/// it belongs to so a reader of `complete/` doesn't need the original
/// `Task` (which is gone by the time a completion is written) to know
/// which disc it scanned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResultPayload {
    pub disc_fingerprint: String,
    pub disc_name: Option<String>,
    pub disc_kind: Option<MediumKind>,
    pub tracks: Vec<ScanResultTrack>,
}

impl ScanResultPayload {
    pub fn to_tracks(&self) -> Vec<Track> {
        self.tracks
            .iter()
            .map(|t| t.to_track(&self.disc_fingerprint))
            .collect()
    }
}
