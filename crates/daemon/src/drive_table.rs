//! All drives owned by this daemon instance, keyed by device path.

use amphigory_core::Drive;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Default)]
pub struct DriveTable {
    drives: HashMap<PathBuf, Drive>,
}

/// What a `scan` task should do once claimed, decided before the scan
/// driver is invoked (spec §4.2 "Proactive scan & caching").
pub enum ScanPlan {
    /// Device isn't tracked, or the cache doesn't match; run the tool.
    RunFresh,
    /// Reuse the result already computed when the disc was inserted.
    UseCached(serde_json::Value),
}

impl DriveTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_insert(&mut self, device: &Path) -> &mut Drive {
        self.drives
            .entry(device.to_path_buf())
            .or_insert_with(|| Drive::new(device.to_path_buf()))
    }

    pub fn get(&self, device: &Path) -> Option<&Drive> {
        self.drives.get(device)
    }

    pub fn get_mut(&mut self, device: &Path) -> Option<&mut Drive> {
        self.drives.get_mut(device)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Drive> {
        self.drives.values_mut()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Drive> {
        self.drives.values()
    }

    /// Whether a `scan` task against `fingerprint` can be satisfied from
    /// the drive's cache instead of running the tool again: the device
    /// must be tracked, still have a disc present (any state past
    /// `empty`), and its cache must match the fingerprint exactly.
    pub fn plan_scan(&self, device: &Path, fingerprint: &str) -> ScanPlan {
        match self.drives.get(device).and_then(|d| d.valid_scan_cache(fingerprint)) {
            Some(result) => ScanPlan::UseCached(result.clone()),
            None => ScanPlan::RunFresh,
        }
    }

    /// Finds the device currently holding the disc identified by
    /// `fingerprint`. `rip` tasks carry only the fingerprint (spec §4.1),
    /// so the consumer loop resolves the device through this table before
    /// it can invoke the ripper driver.
    pub fn find_by_fingerprint(&self, fingerprint: &str) -> Option<&Path> {
        self.drives
            .values()
            .find(|d| d.fingerprint.as_deref() == Some(fingerprint))
            .map(|d| d.device.as_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use amphigory_core::MediumKind;

    #[test]
    fn plan_scan_uses_cache_when_fingerprint_matches() {
        let mut table = DriveTable::new();
        let device = PathBuf::from("/dev/sr0");
        let drive = table.get_or_insert(&device);
        drive.insert(PathBuf::from("/media/disc"), None, MediumKind::Dvd, 0);
        drive.start_scan("scan-1").unwrap();
        drive.set_fingerprint("fp-1").unwrap();
        drive.complete_scan(serde_json::json!({"tracks": []}), 1).unwrap();

        match table.plan_scan(&device, "fp-1") {
            ScanPlan::UseCached(_) => {}
            ScanPlan::RunFresh => panic!("expected cached plan"),
        }
    }

    #[test]
    fn plan_scan_runs_fresh_for_untracked_device() {
        let table = DriveTable::new();
        match table.plan_scan(&PathBuf::from("/dev/sr9"), "fp-1") {
            ScanPlan::RunFresh => {}
            ScanPlan::UseCached(_) => panic!("unexpected cache hit"),
        }
    }

    #[test]
    fn plan_scan_runs_fresh_when_fingerprint_mismatches() {
        let mut table = DriveTable::new();
        let device = PathBuf::from("/dev/sr0");
        let drive = table.get_or_insert(&device);
        drive.insert(PathBuf::from("/media/disc"), None, MediumKind::Dvd, 0);
        drive.start_scan("scan-1").unwrap();
        drive.set_fingerprint("fp-1").unwrap();
        drive.complete_scan(serde_json::json!({}), 1).unwrap();

        match table.plan_scan(&device, "fp-other") {
            ScanPlan::RunFresh => {}
            ScanPlan::UseCached(_) => panic!("unexpected cache hit"),
        }
    }

    #[test]
    fn find_by_fingerprint_locates_owning_device() {
        let mut table = DriveTable::new();
        let device = PathBuf::from("/dev/sr0");
        let drive = table.get_or_insert(&device);
        drive.insert(PathBuf::from("/media/disc"), None, MediumKind::Dvd, 0);
        drive.start_scan("scan-1").unwrap();
        drive.set_fingerprint("fp-1").unwrap();

        assert_eq!(table.find_by_fingerprint("fp-1"), Some(device.as_path()));
        assert_eq!(table.find_by_fingerprint("fp-missing"), None);
    }
}
