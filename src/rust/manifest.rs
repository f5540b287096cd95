//! Checksums of a committed dataset release.
//!
//! The manifest sits next to the split files so the publishing side can check
//! that what it uploads is exactly what the pipeline produced.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::SplitRatios;
use crate::pipeline::{LanguageLabel, Partition, PipelineError, Result};

pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub partition: Partition,
    /// File name relative to the manifest's directory
    pub file: String,
    pub records: usize,
    pub sha256: String,
    pub languages: BTreeMap<LanguageLabel, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub seed: u64,
    pub ratios: SplitRatios,
    pub balance: bool,
    pub files: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map(|mut s| {
                s.push('\n');
                s
            })
            .map_err(|e| PipelineError::Manifest(format!("Cannot serialize manifest: {}", e)))
    }

    /// Reads `manifest.json` from `dir`
    pub fn load<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let path = dir.as_ref().join(MANIFEST_FILE);
        let raw = fs::read_to_string(&path)
            .map_err(|e| PipelineError::Manifest(format!("Cannot read {}: {}", path.display(), e)))?;
        serde_json::from_str(&raw)
            .map_err(|e| PipelineError::Manifest(format!("Invalid manifest {}: {}", path.display(), e)))
    }
}

/// Hex SHA-256 of a file's contents.
pub fn file_sha256(path: &Path) -> Result<String> {
    let bytes = fs::read(path)
        .map_err(|e| PipelineError::Manifest(format!("Cannot read {}: {}", path.display(), e)))?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

fn is_bare_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!((components.next(), components.next()), (Some(Component::Normal(_)), None))
}

/// Recomputes every checksum listed in `dir/manifest.json`.
///
/// # Errors
/// `Manifest` if the manifest is unreadable, names a file outside `dir`, a
/// file is missing, or a hash does not match.
pub fn verify_manifest<P: AsRef<Path>>(dir: P) -> Result<Manifest> {
    let dir = dir.as_ref();
    let manifest = Manifest::load(dir)?;
    log::info!("Verifying {} files listed in {:?}", manifest.files.len(), dir.join(MANIFEST_FILE));

    for entry in &manifest.files {
        if !is_bare_file_name(&entry.file) {
            return Err(PipelineError::Manifest(format!(
                "Manifest entry '{}' is not a file name inside {}",
                entry.file,
                dir.display()
            )));
        }
        let path: PathBuf = dir.join(&entry.file);
        let actual = file_sha256(&path)?;
        log::debug!("  {}: expected {}, got {}", entry.file, entry.sha256, actual);
        if actual != entry.sha256 {
            log::error!("Hash mismatch for {:?}", path);
            return Err(PipelineError::Manifest(format!(
                "Hash mismatch for {}: expected {}, got {}",
                entry.file, entry.sha256, actual
            )));
        }
    }
    log::info!("All files verified");
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_release(dir: &Path, contents: &str) -> Manifest {
        fs::write(dir.join("train.txt"), contents).unwrap();
        let manifest = Manifest {
            seed: 42,
            ratios: SplitRatios::default(),
            balance: true,
            files: vec![ManifestEntry {
                partition: Partition::Train,
                file: "train.txt".into(),
                records: 1,
                sha256: file_sha256(&dir.join("train.txt")).unwrap(),
                languages: BTreeMap::from([(LanguageLabel::new("en").unwrap(), 1)]),
            }],
        };
        fs::write(dir.join(MANIFEST_FILE), manifest.to_json().unwrap()).unwrap();
        manifest
    }

    #[test]
    fn test_verify_roundtrip() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let written = write_release(dir.path(), "__label__en Hello\n");
        let verified = verify_manifest(dir.path())?;
        assert_eq!(written, verified);
        Ok(())
    }

    #[test]
    fn test_detects_tampering() {
        let dir = TempDir::new().unwrap();
        write_release(dir.path(), "__label__en Hello\n");
        fs::write(dir.path().join("train.txt"), "__label__en Hullo\n").unwrap();
        assert!(matches!(verify_manifest(dir.path()), Err(PipelineError::Manifest(_))));
    }

    #[test]
    fn test_rejects_paths_outside_the_release() {
        let root = TempDir::new().unwrap();
        let release = root.path().join("release");
        fs::create_dir(&release).unwrap();
        let mut manifest = write_release(&release, "__label__en Hello\n");

        fs::write(root.path().join("outside.txt"), "__label__en Hello\n").unwrap();
        for file in ["../outside.txt", "/etc/hostname", "sub/train.txt", "."] {
            manifest.files[0].file = file.to_string();
            fs::write(release.join(MANIFEST_FILE), manifest.to_json().unwrap()).unwrap();
            let err = verify_manifest(&release).unwrap_err();
            assert!(matches!(err, PipelineError::Manifest(_)), "{} was accepted", file);
        }
    }

    #[test]
    fn test_missing_manifest() {
        let dir = TempDir::new().unwrap();
        assert!(verify_manifest(dir.path()).is_err());
    }
}
