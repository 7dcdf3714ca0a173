//! Disc fingerprinting (spec §4.3): a content-addressed, stable identifier
//! computed from a small structural subset of the mounted disc.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediumKind {
    Dvd,
    Bluray,
    Uhd,
    Cd,
}

impl MediumKind {
    fn type_tag(self) -> &'static str {
        match self {
            MediumKind::Dvd => "dvd",
            MediumKind::Bluray | MediumKind::Uhd => "bluray",
            MediumKind::Cd => "cd",
        }
    }
}

#[derive(Debug, Error)]
pub enum FingerprintError {
    #[error("required directory missing: {0}")]
    MissingDirectory(PathBuf),
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A 256-bit disc fingerprint, rendered as 64 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint(pub String);

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Compute the fingerprint of a mounted disc.
///
/// `mount_path` is the filesystem root of the mounted volume; `volume_name`
/// is the OS-reported volume label, when known.
pub fn fingerprint(
    mount_path: &Path,
    medium: MediumKind,
    volume_name: Option<&str>,
) -> Result<Fingerprint, FingerprintError> {
    let mut hasher = Sha256::new();

    hasher.update(format!("type:{}", medium.type_tag()).as_bytes());

    match medium {
        MediumKind::Cd => {
            match volume_name {
                Some(name) => hasher.update(format!("cd_volume:{name}").as_bytes()),
                None => hasher.update(b"cd_unknown"),
            }
            return Ok(Fingerprint(hex(hasher.finalize())));
        }
        MediumKind::Dvd => {
            if let Some(name) = volume_name {
                hasher.update(format!("volume:{name}").as_bytes());
            }
            let structural_dir = mount_path.join("VIDEO_TS");
            hash_sorted_files(&mut hasher, &structural_dir, "IFO")?;
        }
        MediumKind::Bluray | MediumKind::Uhd => {
            if let Some(name) = volume_name {
                hasher.update(format!("volume:{name}").as_bytes());
            }
            let structural_dir = mount_path.join("BDMV").join("PLAYLIST");
            hash_sorted_files(&mut hasher, &structural_dir, "mpls")?;
        }
    }

    Ok(Fingerprint(hex(hasher.finalize())))
}

fn hash_sorted_files(
    hasher: &mut Sha256,
    dir: &Path,
    extension: &str,
) -> Result<(), FingerprintError> {
    if !dir.is_dir() {
        return Err(FingerprintError::MissingDirectory(dir.to_path_buf()));
    }

    let mut names: Vec<String> = fs::read_dir(dir)
        .map_err(|e| io_err(dir, e))?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            let matches = Path::new(&name)
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case(extension))
                .unwrap_or(false);
            matches.then_some(name)
        })
        .collect();
    names.sort();

    for name in names {
        let path = dir.join(&name);
        let bytes = fs::read(&path).map_err(|e| io_err(&path, e))?;
        hasher.update(format!("file:{name}").as_bytes());
        hasher.update(&bytes);
    }

    Ok(())
}

fn io_err(path: &Path, source: std::io::Error) -> FingerprintError {
    FingerprintError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn hex(bytes: impl AsRef<[u8]>) -> String {
    bytes.as_ref().iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_dvd(root: &Path, files: &[(&str, &[u8])]) {
        let video_ts = root.join("VIDEO_TS");
        fs::create_dir_all(&video_ts).unwrap();
        for (name, contents) in files {
            fs::write(video_ts.join(name), contents).unwrap();
        }
    }

    #[test]
    fn deterministic_across_calls() {
        let dir = tempdir().unwrap();
        write_dvd(
            dir.path(),
            &[("VIDEO_TS.IFO", b"v"), ("VTS_01_0.IFO", b"w")],
        );

        let fp1 = fingerprint(dir.path(), MediumKind::Dvd, Some("A")).unwrap();
        let fp2 = fingerprint(dir.path(), MediumKind::Dvd, Some("A")).unwrap();
        assert_eq!(fp1, fp2);
        assert_eq!(fp1.0.len(), 64);
    }

    #[test]
    fn matches_scenario_s1_digest() {
        let dir = tempdir().unwrap();
        write_dvd(
            dir.path(),
            &[("VIDEO_TS.IFO", b"v"), ("VTS_01_0.IFO", b"w")],
        );

        let got = fingerprint(dir.path(), MediumKind::Dvd, Some("A")).unwrap();

        let mut hasher = Sha256::new();
        hasher.update(b"type:dvd");
        hasher.update(b"volume:A");
        hasher.update(b"file:VIDEO_TS.IFO");
        hasher.update(b"v");
        hasher.update(b"file:VTS_01_0.IFO");
        hasher.update(b"w");
        let expected = Fingerprint(hex(hasher.finalize()));

        assert_eq!(got, expected);
    }

    #[test]
    fn byte_change_changes_digest() {
        let dir = tempdir().unwrap();
        write_dvd(dir.path(), &[("VIDEO_TS.IFO", b"v")]);
        let before = fingerprint(dir.path(), MediumKind::Dvd, None).unwrap();

        fs::write(dir.path().join("VIDEO_TS").join("VIDEO_TS.IFO"), b"x").unwrap();
        let after = fingerprint(dir.path(), MediumKind::Dvd, None).unwrap();

        assert_ne!(before, after);
    }

    #[test]
    fn missing_directory_errors() {
        let dir = tempdir().unwrap();
        let err = fingerprint(dir.path(), MediumKind::Dvd, None).unwrap_err();
        assert!(matches!(err, FingerprintError::MissingDirectory(_)));
    }

    #[test]
    fn cd_without_volume_is_weak_placeholder() {
        let dir = tempdir().unwrap();
        let fp = fingerprint(dir.path(), MediumKind::Cd, None).unwrap();
        let mut hasher = Sha256::new();
        hasher.update(b"type:cd");
        hasher.update(b"cd_unknown");
        assert_eq!(fp, Fingerprint(hex(hasher.finalize())));
    }
}
