//! Disc and track domain types (spec §3).

use crate::fingerprint::MediumKind;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A disc record, keyed by its fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Disc {
    pub fingerprint: String,
    pub title: Option<String>,
    pub year: Option<u32>,
    pub external_id: Option<String>,
    pub medium: MediumKind,
    /// Raw scan snapshot, stored verbatim for later reprocessing/debugging.
    pub scan_snapshot: serde_json::Value,
    pub needs_reprocessing: bool,
    pub reprocessing_type: Option<String>,
    pub reprocessing_notes: Option<String>,
    pub created_at: i64,
    pub scanned_at: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackStatus {
    Discovered,
    Selected,
    Ripping,
    Ripped,
    Transcoding,
    Transcoded,
    Inserted,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationLabel {
    MainFeature,
    Trailers,
    Featurettes,
    DeletedScenes,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioStream {
    pub codec: String,
    pub language: String,
    pub channels: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubtitleStream {
    pub language: String,
    pub format: String,
}

/// A single track discovered on a disc.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    pub disc_fingerprint: String,
    pub track_number: u32,
    pub duration_secs: u64,
    pub size_bytes: u64,
    pub resolution: Option<String>,
    pub chapters: u32,
    pub audio_streams: Vec<AudioStream>,
    pub subtitle_streams: Vec<SubtitleStream>,
    pub status: TrackStatus,
    pub classification: Option<ClassificationLabel>,
    pub classification_confidence: Option<Confidence>,
    pub classification_score: Option<f64>,
    pub is_alternate_main: bool,
    /// MakeMKV's segment map for this title (cell/segment indices).
    pub segment_map: Vec<u32>,
    pub makemkv_name: Option<String>,
    pub preset_name: Option<String>,
    pub output_filename: Option<String>,
    pub ripped_path: Option<PathBuf>,
    pub transcoded_path: Option<PathBuf>,
    pub inserted_path: Option<PathBuf>,
    /// Whether MakeMKV flagged this title as its own main-feature guess.
    /// Tracked separately from `classification`: the classifier treats
    /// this as an authoritative tier-1 hint, not as the final label.
    pub is_main_feature_playlist: bool,
}

impl Track {
    pub fn id(&self) -> String {
        format!("{}:{}", self.disc_fingerprint, self.track_number)
    }

    pub fn has_minimum_metadata(&self) -> bool {
        self.chapters > 0 || !self.audio_streams.is_empty() || !self.subtitle_streams.is_empty()
    }
}
