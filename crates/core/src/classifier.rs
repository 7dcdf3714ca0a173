//! Deterministic track classification (spec §4.11).
//!
//! Segment-map deduplication is intentionally not implemented here: the
//! original tool already filters true duplicates, and a naive segment-map
//! comparison pass removed legitimate tracks in production. Do not re-add
//! it without validating against a much larger corpus than this one.

use crate::disc::{ClassificationLabel, Confidence, Track};

/// Tier 1 of main-feature selection: MakeMKV's own authoritative hint.
/// When present, classification skips weighted scoring for the main pick
/// entirely and classifies every other track by duration alone.
fn authoritative_main(tracks: &[Track]) -> Option<usize> {
    tracks.iter().position(|t| t.is_main_feature_playlist)
}

/// Per-track classification result, returned alongside the track's index
/// in the input slice so callers can apply it back.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub track_index: usize,
    pub label: ClassificationLabel,
    pub confidence: Confidence,
    pub score: f64,
    pub is_alternate_main: bool,
}

/// Classify every track in `tracks`. Total over the input: every index
/// gets exactly one classification.
pub fn classify(tracks: &[Track]) -> Vec<Classification> {
    if tracks.is_empty() {
        return Vec::new();
    }

    let hinted = authoritative_main(tracks);
    let main_index = hinted.unwrap_or_else(|| pick_main_feature(tracks));
    let main = &tracks[main_index];

    let mut results = Vec::with_capacity(tracks.len());
    for (i, t) in tracks.iter().enumerate() {
        if i == main_index {
            let confidence = if hinted.is_some() {
                Confidence::High
            } else {
                main_confidence(tracks, main_index)
            };
            results.push(Classification {
                track_index: i,
                label: ClassificationLabel::MainFeature,
                confidence,
                score: score_of(tracks, i),
                is_alternate_main: false,
            });
            continue;
        }

        let is_alternate = is_alternate_main(main, t);
        let label = if is_alternate {
            ClassificationLabel::MainFeature
        } else {
            classify_by_duration(t.duration_secs)
        };

        results.push(Classification {
            track_index: i,
            label,
            confidence: Confidence::Low,
            score: score_of(tracks, i),
            is_alternate_main: is_alternate,
        });
    }

    results
}

/// Order tracks for presentation: main feature first, alternates next (by
/// track number), everything else by duration descending.
pub fn smart_order(tracks: &[Track], classifications: &[Classification]) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..tracks.len()).collect();
    indices.sort_by(|&a, &b| {
        let ca = &classifications[a];
        let cb = &classifications[b];

        let rank = |c: &Classification, idx: usize| -> (u8, i64, i64) {
            if c.label == ClassificationLabel::MainFeature && !c.is_alternate_main {
                (0, 0, 0)
            } else if c.is_alternate_main {
                (1, tracks[idx].track_number as i64, 0)
            } else {
                (2, 0, -(tracks[idx].duration_secs as i64))
            }
        };

        rank(ca, a).cmp(&rank(cb, b))
    });
    indices
}

/// Tier 2 of main-feature selection: weighted scoring over duration,
/// chapters, and stream counts. Only reached when no track carries
/// `is_main_feature_playlist` (see [`authoritative_main`]).
fn pick_main_feature(tracks: &[Track]) -> usize {
    let mut best_index = None;
    let mut best_score = f64::NEG_INFINITY;

    for (i, t) in tracks.iter().enumerate() {
        if !t.has_minimum_metadata() {
            continue;
        }
        let score = score_of(tracks, i);
        if score > best_score {
            best_score = score;
            best_index = Some(i);
        }
    }

    best_index.unwrap_or(0)
}

fn score_of(tracks: &[Track], index: usize) -> f64 {
    let t = &tracks[index];
    if !t.has_minimum_metadata() {
        return f64::NEG_INFINITY;
    }

    let max_duration = tracks.iter().map(|t| t.duration_secs).max().unwrap_or(1).max(1) as f64;
    let max_chapters = tracks.iter().map(|t| t.chapters).max().unwrap_or(1).max(1) as f64;
    let max_audio = tracks
        .iter()
        .map(|t| t.audio_streams.len())
        .max()
        .unwrap_or(1)
        .max(1) as f64;
    let max_subs = tracks
        .iter()
        .map(|t| t.subtitle_streams.len())
        .max()
        .unwrap_or(0) as f64;

    let mut score = 0.0;
    if t.duration_secs > 3600 {
        score += 40.0 * (t.duration_secs as f64 / max_duration);
    }
    if t.chapters > 10 {
        score += 25.0 * (t.chapters as f64 / max_chapters);
    }
    score += 20.0 * (t.audio_streams.len() as f64 / max_audio);
    if max_subs > 0.0 {
        score += 15.0 * (t.subtitle_streams.len() as f64 / max_subs);
    }

    score
}

fn main_confidence(tracks: &[Track], main_index: usize) -> Confidence {
    let main_score = score_of(tracks, main_index);
    let runner_up = tracks
        .iter()
        .enumerate()
        .filter(|&(i, _)| i != main_index)
        .map(|(i, _)| score_of(tracks, i))
        .filter(|s| s.is_finite())
        .fold(f64::NEG_INFINITY, f64::max);

    if !runner_up.is_finite() || main_score <= 0.0 {
        return if main_score > 0.0 {
            Confidence::Medium
        } else {
            Confidence::Low
        };
    }

    let gap = (main_score - runner_up) / main_score;
    if gap > 0.30 {
        Confidence::High
    } else if gap > 0.0 {
        Confidence::Medium
    } else {
        Confidence::Low
    }
}

fn classify_by_duration(secs: u64) -> ClassificationLabel {
    match secs {
        90..=150 => ClassificationLabel::Trailers,
        0..=89 => ClassificationLabel::Other,
        300..=3600 => ClassificationLabel::Featurettes,
        s if s > 3600 => ClassificationLabel::Other,
        _ => ClassificationLabel::DeletedScenes,
    }
}

/// Tracks whose duration is within 1% of the main's, whose chapter count
/// matches, and whose track number is greater than the main's.
fn is_alternate_main(main: &Track, candidate: &Track) -> bool {
    if candidate.track_number <= main.track_number {
        return false;
    }
    if candidate.chapters != main.chapters {
        return false;
    }
    if main.duration_secs == 0 {
        return false;
    }
    let diff = (main.duration_secs as i64 - candidate.duration_secs as i64).unsigned_abs();
    let tolerance = main.duration_secs / 100; // 1%
    diff <= tolerance
}
