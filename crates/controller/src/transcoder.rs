//! Transcoder driver (spec §4.9): spawns the transcoding tool against a
//! preset, turns its percent-progress stream into `Progress` events, and
//! verifies the output file on success.

use amphigory_core::ErrorCode;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum TranscoderError {
    #[error("spawning transcoding tool: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("transcoding tool's stdout was not piped")]
    MissingStdout,
}

/// The tool's own progress line family is just a bare percent — it has no
/// notion of byte counts or ETA, unlike the ripper's `PRGV` stream.
pub fn parse_transcode_line(line: &str) -> Option<f64> {
    line.strip_prefix("PROGRESS:")
        .and_then(|rest| rest.trim().parse().ok())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TranscodeOutcomeInputs {
    pub cancelled: bool,
    pub timed_out: bool,
    pub output_write_failed: bool,
    pub exit_success: bool,
    pub output_exists_nonzero: bool,
}

/// Terminal outcome for a finished transcode attempt. The taxonomy (spec
/// §7) has no transcoder-specific codes; `MAKEMKV_TIMEOUT` is reused for
/// "subprocess idle too long" and a bare nonzero exit falls back to
/// `UNKNOWN` since the tool's own exit codes aren't enumerated here.
pub fn classify_transcode_outcome(inputs: TranscodeOutcomeInputs) -> Result<(), ErrorCode> {
    if inputs.cancelled {
        return Err(ErrorCode::TaskCancelled);
    }
    if inputs.timed_out {
        return Err(ErrorCode::MakemkvTimeout);
    }
    if inputs.output_write_failed {
        return Err(ErrorCode::OutputWriteFailed);
    }
    if inputs.exit_success && inputs.output_exists_nonzero {
        return Ok(());
    }
    Err(ErrorCode::Unknown)
}

/// Spawns the transcoding tool against `input`, writing `output`, using
/// `preset_path`/`preset_name`. Returns once the process exits or
/// `idle_timeout` elapses with no progress line.
pub async fn run_transcoder(
    tool_path: &Path,
    preset_path: &Path,
    preset_name: &str,
    input: &Path,
    output: &Path,
    idle_timeout: Duration,
    mut on_progress: impl FnMut(f64),
) -> Result<TranscodeOutcomeInputs, TranscoderError> {
    let mut child = Command::new(tool_path)
        .arg("--preset-file")
        .arg(preset_path)
        .arg("--preset")
        .arg(preset_name)
        .arg("--input")
        .arg(input)
        .arg("--output")
        .arg(output)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()?;

    let stdout = child.stdout.take().ok_or(TranscoderError::MissingStdout)?;
    let mut lines = BufReader::new(stdout).lines();
    let mut inputs = TranscodeOutcomeInputs::default();

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

        if let Some(percent) = parse_transcode_line(&line) {
            on_progress(percent.clamp(0.0, 100.0));
        }
    }

    if !inputs.timed_out {
        let status = child.wait().await?;
        inputs.exit_success = status.success();
    }

    Ok(inputs)
}

pub fn output_path(inbox_dir: &Path, disc_folder: &str, filename: &str) -> PathBuf {
    inbox_dir.join(disc_folder).join(format!("{filename}.mp4"))
}
