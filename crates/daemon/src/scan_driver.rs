//! Scan driver (spec §4.8): invokes the disc tool in info mode and parses
//! its `CINFO`/`TINFO`/`SINFO` line families into a [`ScanResult`].

use amphigory_core::{AudioStream, MediumKind, SubtitleStream};
use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("spawning disc tool: {0}")]
    Spawn(#[from] std::io::Error),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanTrack {
    pub track_number: u32,
    pub duration_hms: Option<String>,
    pub size_bytes: u64,
    pub chapters: u32,
    pub resolution: Option<String>,
    pub audio_streams: Vec<AudioStream>,
    pub subtitle_streams: Vec<SubtitleStream>,
    pub segment_map: Vec<u32>,
    pub source_name: Option<String>,
    pub is_main_feature_playlist: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanResult {
    pub disc_name: Option<String>,
    pub disc_kind: Option<MediumKind>,
    pub tracks: Vec<ScanTrack>,
}

/// Parses the tool's full info-mode output. Unrecognized lines (blank
/// lines, unrelated chatter) are ignored, matching the ripper driver's
/// tolerance for noise in a "CSV-like" stream.
pub fn parse_scan_output(output: &str) -> ScanResult {
    let mut disc_name = None;
    let mut disc_kind = None;
    let mut tracks: BTreeMap<u32, ScanTrack> = BTreeMap::new();

    for line in output.lines() {
        if let Some(rest) = line.strip_prefix("CINFO:") {
            let (field, value) = match split_fields(rest) {
                Some([a, b]) => (a, b),
                None => continue,
            };
            match field.as_str() {
                "name" => disc_name = Some(value),
                "medium" => disc_kind = parse_medium(&value),
                _ => {}
            }
        } else if let Some(rest) = line.strip_prefix("TINFO:") {
            let Some([track_str, field, value]) = split_fields(rest) else {
                continue;
            };
            let Ok(track_number) = track_str.parse::<u32>() else {
                continue;
            };
            let track = tracks.entry(track_number).or_insert_with(|| ScanTrack {
                track_number,
                ..Default::default()
            });
            apply_tinfo(track, &field, &value);
        } else if let Some(rest) = line.strip_prefix("SINFO:") {
            let Some([track_str, stream_str, kind, field, value]) = split_fields(rest) else {
                continue;
            };
            let (Ok(track_number), Ok(stream_index)) =
                (track_str.parse::<u32>(), stream_str.parse::<usize>())
            else {
                continue;
            };
            let track = tracks.entry(track_number).or_insert_with(|| ScanTrack {
                track_number,
                ..Default::default()
            });
            apply_sinfo(track, stream_index, &kind, &field, &value);
        }
    }

    ScanResult {
        disc_name,
        disc_kind,
        tracks: tracks.into_values().collect(),
    }
}

/// Splits a comma-separated line into exactly `N` fields, stripping
/// surrounding quotes from each. The last field may itself contain commas
/// (e.g. a quoted segment map); `splitn` leaves those intact.
fn split_fields<const N: usize>(rest: &str) -> Option<[String; N]> {
    let parts: Vec<&str> = rest.splitn(N, ',').collect();
    if parts.len() != N {
        return None;
    }
    let mut out: [String; N] = std::array::from_fn(|_| String::new());
    for (i, p) in parts.iter().enumerate() {
        out[i] = p.trim().trim_matches('"').to_string();
    }
    Some(out)
}

fn parse_medium(value: &str) -> Option<MediumKind> {
    match value {
        "dvd" => Some(MediumKind::Dvd),
        "bluray" => Some(MediumKind::Bluray),
        "uhd" => Some(MediumKind::Uhd),
        "cd" => Some(MediumKind::Cd),
        _ => None,
    }
}

fn apply_tinfo(track: &mut ScanTrack, field: &str, value: &str) {
    match field {
        "duration" => track.duration_hms = Some(value.to_string()),
        "chapters" => track.chapters = value.parse().unwrap_or(0),
        "size" => track.size_bytes = value.parse().unwrap_or(0),
        "resolution" => track.resolution = Some(value.to_string()),
        "source_name" => track.source_name = Some(value.to_string()),
        "main_feature" => track.is_main_feature_playlist = value == "1",
        "segment_map" => {
            track.segment_map = value
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
        }
        _ => {}
    }
}

/// `field` here is always the attribute name (`codec`, `language`,
/// `channels`, `format`) — the stream index from the line is only used to
/// grow the vector to the right length, not to pick the attribute.
fn apply_sinfo(track: &mut ScanTrack, stream_index: usize, kind: &str, field: &str, value: &str) {
    match kind {
        "audio" => {
            let stream = take_or_push(&mut track.audio_streams, stream_index);
            match field {
                "codec" => stream.codec = value.to_string(),
                "language" => stream.language = value.to_string(),
                "channels" => stream.channels = value.parse().unwrap_or(0),
                _ => {}
            }
        }
        "subtitle" => {
            let stream = take_or_push(&mut track.subtitle_streams, stream_index);
            match field {
                "language" => stream.language = value.to_string(),
                "format" => stream.format = value.to_string(),
                _ => {}
            }
        }
        _ => {}
    }
}

fn take_or_push<T: Default>(streams: &mut Vec<T>, idx: usize) -> &mut T {
    while streams.len() <= idx {
        streams.push(T::default());
    }
    &mut streams[idx]
}

pub async fn run_scan(tool_path: &Path, device: &str) -> Result<ScanResult, ScanError> {
    let output = Command::new(tool_path)
        .arg("-r")
        .arg("info")
        .arg(format!("dev:{device}"))
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .await?;

    Ok(parse_scan_output(&String::from_utf8_lossy(&output.stdout)))
}
