//! Ripper driver (spec §4.7): spawns the disc tool in robot mode, turns its
//! line-oriented status stream into progress events, and classifies the
//! terminal outcome.

use amphigory_core::{Clock, ErrorCode};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum RipperError {
    #[error("spawning disc tool: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("disc tool's stdout was not piped")]
    MissingStdout,
}

/// One line of progress, ready to forward on the link as `Message::Progress`.
#[derive(Debug, Clone, PartialEq)]
pub struct RipProgress {
    pub percent: f64,
    pub eta_seconds: Option<u64>,
    pub bytes: Option<u64>,
    pub speed: Option<String>,
}

/// A parsed line from the tool's status stream.
#[derive(Debug, Clone, PartialEq)]
pub enum RipLine {
    Message { text: String, looks_like_error: bool },
    ValueProgress { current: u64, total: u64, max: u64 },
    TitleProgress { text: String },
    Unrecognized,
}

/// `MSG:`, `PRGV:`, `PRGT:` — the three line families the tool emits
/// (spec §4.7). Anything else is ignored rather than treated as an error:
/// robot-mode tools commonly emit blank lines and informational chatter.
pub fn parse_rip_line(line: &str) -> RipLine {
    if let Some(rest) = line.strip_prefix("MSG:") {
        let text = rest.to_string();
        let looks_like_error = text.to_ascii_lowercase().contains("error");
        return RipLine::Message { text, looks_like_error };
    }
    if let Some(rest) = line.strip_prefix("PRGV:") {
        let parts: Vec<&str> = rest.splitn(3, ',').collect();
        if let [current, total, max] = parts[..] {
            if let (Ok(current), Ok(total), Ok(max)) =
                (current.trim().parse(), total.trim().parse(), max.trim().parse())
            {
                return RipLine::ValueProgress { current, total, max };
            }
        }
        return RipLine::Unrecognized;
    }
    if let Some(rest) = line.strip_prefix("PRGT:") {
        return RipLine::TitleProgress {
            text: rest.to_string(),
        };
    }
    RipLine::Unrecognized
}

/// Turns successive `PRGV` samples into the `Progress` shape the link
/// carries, estimating speed and ETA from elapsed wall-clock time between
/// samples (the tool's own stream carries neither).
pub struct ProgressTracker<'a> {
    clock: &'a dyn Clock,
    last_sample: Option<(u64, i64)>,
}

impl<'a> ProgressTracker<'a> {
    pub fn new(clock: &'a dyn Clock) -> Self {
        Self {
            clock,
            last_sample: None,
        }
    }

    pub fn observe(&mut self, current: u64, max: u64) -> RipProgress {
        let now = self.clock.now_micros();
        let percent = if max == 0 {
            0.0
        } else {
            (current as f64 / max as f64 * 100.0).clamp(0.0, 100.0)
        };

        let (speed, eta_seconds) = match self.last_sample {
            Some((prev_current, prev_now)) if now > prev_now && current >= prev_current => {
                let elapsed_secs = (now - prev_now) as f64 / 1_000_000.0;
                let delta = (current - prev_current) as f64;
                let rate = delta / elapsed_secs;
                let remaining = (max.saturating_sub(current)) as f64;
                let eta = if rate > 0.0 {
                    Some((remaining / rate) as u64)
                } else {
                    None
                };
                (Some(format!("{:.1} units/s", rate)), eta)
            }
            _ => (None, None),
        };

        self.last_sample = Some((current, now));

        RipProgress {
            percent,
            eta_seconds,
            bytes: Some(current),
            speed,
        }
    }
}

/// Conditions observed over the lifetime of one rip attempt, used to pick
/// the terminal outcome (spec §4.7's table, in priority order).
#[derive(Debug, Clone, Copy, Default)]
pub struct RipOutcomeInputs {
    pub cancelled: bool,
    pub disc_ejected: bool,
    pub timed_out: bool,
    pub read_error_seen: bool,
    pub output_write_failed: bool,
    pub exit_success: bool,
    pub output_exists_nonzero: bool,
}

pub fn classify_rip_outcome(inputs: RipOutcomeInputs) -> Result<(), ErrorCode> {
    if inputs.cancelled {
        return Err(ErrorCode::TaskCancelled);
    }
    if inputs.disc_ejected {
        return Err(ErrorCode::DiscEjected);
    }
    if inputs.timed_out {
        return Err(ErrorCode::MakemkvTimeout);
    }
    if inputs.output_write_failed {
        return Err(ErrorCode::OutputWriteFailed);
    }
    if inputs.read_error_seen {
        return Err(ErrorCode::DiscUnreadable);
    }
    if inputs.exit_success && inputs.output_exists_nonzero {
        return Ok(());
    }
    Err(ErrorCode::MakemkvFailed)
}

/// Spawns the disc tool against `device`, ripping `track_number` to
/// `output_dir`/`filename`, invoking `on_progress` for every `PRGV` sample
/// and `on_message` for every `MSG` line. Returns once the process exits or
/// `idle_timeout` elapses with no output line.
pub async fn run_ripper(
    tool_path: &Path,
    device: &str,
    track_number: u32,
    output_dir: &Path,
    idle_timeout: Duration,
    clock: &dyn Clock,
    mut on_progress: impl FnMut(RipProgress),
    mut on_message: impl FnMut(&str, bool),
) -> Result<RipOutcomeInputs, RipperError> {
    let mut child = Command::new(tool_path)
        .arg("-r")
        .arg("mkv")
        .arg(format!("dev:{device}"))
        .arg(track_number.to_string())
        .arg(output_dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()?;

    let stdout = child.stdout.take().ok_or(RipperError::MissingStdout)?;
    let mut lines = BufReader::new(stdout).lines();
    let mut tracker = ProgressTracker::new(clock);
    let mut inputs = RipOutcomeInputs::default();

    loop {
        let next = tokio::time::timeout(idle_timeout, lines.next_line()).await;
        let line = match next {
            Ok(Ok(Some(line))) => line,
            Ok(Ok(None)) => break,
            Ok(Err(_)) => break,
            Err(_) => {
                inputs.timed_out = true;
                let _ = child.kill().await;
                break;
            }
        };

        match parse_rip_line(&line) {
            RipLine::Message { text, looks_like_error } => {
                if looks_like_error {
                    inputs.read_error_seen = true;
                }
                on_message(&text, looks_like_error);
            }
            RipLine::ValueProgress { current, total: _, max } => {
                on_progress(tracker.observe(current, max));
            }
            RipLine::TitleProgress { .. } | RipLine::Unrecognized => {}
        }
    }

    if !inputs.timed_out {
        let status = child.wait().await?;
        inputs.exit_success = status.success();
    }

    Ok(inputs)
}
