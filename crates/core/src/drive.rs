//! Per-drive lifecycle state machine (spec §4.2).

use crate::fingerprint::MediumKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriveStateKind {
    Empty,
    DiscInserted,
    Scanning,
    Scanned,
    Ripping,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DriveError {
    #[error("invalid transition: {action} is not allowed from {state:?}")]
    InvalidTransition {
        action: &'static str,
        state: DriveStateKind,
    },
}

/// Cached result of the most recent scan, keyed implicitly to the owning
/// drive. Invariant 5: authoritative only together with a matching cached
/// fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanCache {
    pub fingerprint: String,
    pub result: serde_json::Value,
}

/// The lifecycle state of one `(daemon_id, device)` drive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Drive {
    pub device: PathBuf,
    pub state: DriveStateKind,
    pub volume_name: Option<String>,
    pub medium: Option<MediumKind>,
    pub fingerprint: Option<String>,
    pub inserted_at: Option<i64>,
    pub scanned_at: Option<i64>,
    pub scan_task_id: Option<String>,
    pub scan_error: Option<String>,
    pub scan_cache: Option<ScanCache>,
    pub rip_task_id: Option<String>,
    pub rip_progress_percent: Option<f64>,
    /// The mount path the drive last observed; used to correlate unmount
    /// events with this drive rather than unrelated volumes (spec §4.2
    /// "Eject detection").
    tracked_mount_path: Option<PathBuf>,
}

impl Drive {
    pub fn new(device: PathBuf) -> Self {
        Self {
            device,
            state: DriveStateKind::Empty,
            volume_name: None,
            medium: None,
            fingerprint: None,
            inserted_at: None,
            scanned_at: None,
            scan_task_id: None,
            scan_error: None,
            scan_cache: None,
            rip_task_id: None,
            rip_progress_percent: None,
            tracked_mount_path: None,
        }
    }

    pub fn insert(
        &mut self,
        mount_path: PathBuf,
        volume_name: Option<String>,
        medium: MediumKind,
        now: i64,
    ) {
        *self = Drive::new(self.device.clone());
        self.tracked_mount_path = Some(mount_path);
        self.volume_name = volume_name;
        self.medium = Some(medium);
        self.inserted_at = Some(now);
        self.state = DriveStateKind::DiscInserted;
    }

    /// Full reset to `empty`, as triggered by `observe_unmount` or an
    /// explicit eject call.
    pub fn eject(&mut self) {
        let device = self.device.clone();
        *self = Drive::new(device);
    }

    /// Compare an observed unmount path against the tracked mount path and
    /// eject only if they match. Unmount events for unrelated volumes are
    /// ignored, as required by spec §4.2.
    pub fn observe_unmount(&mut self, unmounted_path: &Path) {
        if self.tracked_mount_path.as_deref() == Some(unmounted_path) {
            self.eject();
        }
    }

    pub fn start_scan(&mut self, task_id: impl Into<String>) -> Result<(), DriveError> {
        match self.state {
            DriveStateKind::DiscInserted | DriveStateKind::Scanned => {
                self.scan_task_id = Some(task_id.into());
                self.scan_error = None;
                self.state = DriveStateKind::Scanning;
                Ok(())
            }
            other => Err(DriveError::InvalidTransition {
                action: "start_scan",
                state: other,
            }),
        }
    }

    pub fn complete_scan(&mut self, result: serde_json::Value, now: i64) -> Result<(), DriveError> {
        match self.state {
            DriveStateKind::Scanning => {
                if let Some(fp) = &self.fingerprint {
                    self.scan_cache = Some(ScanCache {
                        fingerprint: fp.clone(),
                        result,
                    });
                }
                self.scanned_at = Some(now);
                self.state = DriveStateKind::Scanned;
                Ok(())
            }
            other => Err(DriveError::InvalidTransition {
                action: "complete_scan",
                state: other,
            }),
        }
    }

    pub fn fail_scan(&mut self, error: impl Into<String>) -> Result<(), DriveError> {
        match self.state {
            DriveStateKind::Scanning => {
                self.scan_error = Some(error.into());
                self.state = DriveStateKind::DiscInserted;
                Ok(())
            }
            other => Err(DriveError::InvalidTransition {
                action: "fail_scan",
                state: other,
            }),
        }
    }

    /// May be set any time after insert; must match the currently-mounted
    /// disc (callers are responsible for recomputing it on re-insert).
    pub fn set_fingerprint(&mut self, fp: impl Into<String>) -> Result<(), DriveError> {
        if self.state == DriveStateKind::Empty {
            return Err(DriveError::InvalidTransition {
                action: "set_fingerprint",
                state: self.state,
            });
        }
        self.fingerprint = Some(fp.into());
        Ok(())
    }

    pub fn start_rip(&mut self, task_id: impl Into<String>) -> Result<(), DriveError> {
        match self.state {
            DriveStateKind::Scanned => {
                self.rip_task_id = Some(task_id.into());
                self.rip_progress_percent = Some(0.0);
                self.state = DriveStateKind::Ripping;
                Ok(())
            }
            other => Err(DriveError::InvalidTransition {
                action: "start_rip",
                state: other,
            }),
        }
    }

    pub fn finish_rip(&mut self) -> Result<(), DriveError> {
        match self.state {
            DriveStateKind::Ripping => {
                self.rip_task_id = None;
                self.rip_progress_percent = None;
                self.state = DriveStateKind::Scanned;
                Ok(())
            }
            other => Err(DriveError::InvalidTransition {
                action: "finish_rip",
                state: other,
            }),
        }
    }

    /// Returns the cached scan result if it is still valid for the given
    /// fingerprint (Invariant 5): the cache and the drive's currently-set
    /// fingerprint must agree.
    pub fn valid_scan_cache(&self, fingerprint: &str) -> Option<&serde_json::Value> {
        self.scan_cache.as_ref().and_then(|cache| {
            (cache.fingerprint == fingerprint).then_some(&cache.result)
        })
    }

    pub fn clear_scan_cache(&mut self) {
        self.scan_cache = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn drive() -> Drive {
        Drive::new(PathBuf::from("/dev/rdisk2"))
    }

    #[test]
    fn full_happy_path() {
        let mut d = drive();
        d.insert(PathBuf::from("/Volumes/MOVIE"), Some("MOVIE".into()), MediumKind::Dvd, 100);
        assert_eq!(d.state, DriveStateKind::DiscInserted);

        d.start_scan("task-1").unwrap();
        assert_eq!(d.state, DriveStateKind::Scanning);

        d.set_fingerprint("abc123").unwrap();
        d.complete_scan(serde_json::json!({"tracks": []}), 101).unwrap();
        assert_eq!(d.state, DriveStateKind::Scanned);
        assert!(d.scan_cache.is_some());

        d.start_rip("task-2").unwrap();
        assert_eq!(d.state, DriveStateKind::Ripping);
        d.finish_rip().unwrap();
        assert_eq!(d.state, DriveStateKind::Scanned);
    }

    #[test]
    fn start_scan_from_empty_is_rejected() {
        let mut d = drive();
        let err = d.start_scan("task-1").unwrap_err();
        assert_eq!(
            err,
            DriveError::InvalidTransition {
                action: "start_scan",
                state: DriveStateKind::Empty
            }
        );
    }

    #[test]
    fn complete_scan_only_from_scanning() {
        let mut d = drive();
        d.insert(PathBuf::from("/Volumes/MOVIE"), None, MediumKind::Dvd, 0);
        let err = d.complete_scan(serde_json::json!({}), 1).unwrap_err();
        assert_eq!(
            err,
            DriveError::InvalidTransition {
                action: "complete_scan",
                state: DriveStateKind::DiscInserted
            }
        );
    }

    #[test]
    fn eject_detection_ignores_unrelated_volumes() {
        let mut d = drive();
        d.insert(PathBuf::from("/Volumes/MOVIE"), None, MediumKind::Dvd, 0);
        d.observe_unmount(&PathBuf::from("/Volumes/OTHER"));
        assert_eq!(d.state, DriveStateKind::DiscInserted);

        d.observe_unmount(&PathBuf::from("/Volumes/MOVIE"));
        assert_eq!(d.state, DriveStateKind::Empty);
    }

    #[test]
    fn scan_cache_invalid_without_matching_fingerprint() {
        let mut d = drive();
        d.insert(PathBuf::from("/Volumes/MOVIE"), None, MediumKind::Dvd, 0);
        d.start_scan("t").unwrap();
        d.set_fingerprint("fp-1").unwrap();
        d.complete_scan(serde_json::json!({"x": 1}), 1).unwrap();

        assert!(d.valid_scan_cache("fp-1").is_some());
        assert!(d.valid_scan_cache("fp-2").is_none());
    }

    #[test]
    fn fail_scan_returns_to_disc_inserted() {
        let mut d = drive();
        d.insert(PathBuf::from("/Volumes/MOVIE"), None, MediumKind::Dvd, 0);
        d.start_scan("t").unwrap();
        d.fail_scan("disc unreadable").unwrap();
        assert_eq!(d.state, DriveStateKind::DiscInserted);
        assert_eq!(d.scan_error.as_deref(), Some("disc unreadable"));
    }
}
