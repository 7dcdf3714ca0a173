//! `H:M:S` duration parsing, as emitted by the disc-scanning tool and
//! canonicalised to integer seconds at store-insert time (spec §4.4).

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DurationParseError {
    #[error("expected H:M:S, got {0:?}")]
    Malformed(String),
    #[error("component out of range in {0:?}")]
    OutOfRange(String),
}

/// Parse an `H:M:S` string (hours unbounded, minutes/seconds `0..=59`) into
/// total seconds.
pub fn parse_hms(s: &str) -> Result<u64, DurationParseError> {
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != 3 {
        return Err(DurationParseError::Malformed(s.to_string()));
    }

    let h: u64 = parts[0]
        .parse()
        .map_err(|_| DurationParseError::Malformed(s.to_string()))?;
    let m: u64 = parts[1]
        .parse()
        .map_err(|_| DurationParseError::Malformed(s.to_string()))?;
    let sec: u64 = parts[2]
        .parse()
        .map_err(|_| DurationParseError::Malformed(s.to_string()))?;

    if m > 59 || sec > 59 {
        return Err(DurationParseError::OutOfRange(s.to_string()));
    }

    Ok(h * 3600 + m * 60 + sec)
}

/// Format total seconds back to normalised `H:M:S` (no zero-padding on
/// hours, matching what the external tool emits).
pub fn format_hms(total_secs: u64) -> String {
    let h = total_secs / 3600;
    let m = (total_secs % 3600) / 60;
    let s = total_secs % 60;
    format!("{h}:{m:02}:{s:02}")
}
