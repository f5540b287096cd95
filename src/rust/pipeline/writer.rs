use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use super::error::{PipelineError, Result};
use super::record::{LanguageLabel, Partition, SentenceRecord};

/// Prefix fastText-style classifiers expect in front of the label
pub const LABEL_PREFIX: &str = "__label__";

/// Formats a record as `__label__<language> <text>\n`.
pub fn format_line(record: &SentenceRecord) -> String {
    format!("{}{} {}\n", LABEL_PREFIX, record.language, record.text)
}

/// Parses a line produced by [`format_line`]. The trailing newline is optional.
///
/// Returns `None` when the prefix is missing, the label is not a bare token or
/// the sentence is empty.
pub fn parse_line(line: &str) -> Option<SentenceRecord> {
    let line = line.strip_suffix('\n').unwrap_or(line);
    let rest = line.strip_prefix(LABEL_PREFIX)?;
    let (label, text) = rest.split_once(' ')?;
    if text.is_empty() {
        return None;
    }
    let language = LanguageLabel::new(label).ok()?;
    Some(SentenceRecord::new(text, language))
}

/// An output fully written to a temporary file next to its final path.
///
/// Dropping a `StagedFile` without committing removes the temporary file.
#[derive(Debug)]
pub struct StagedFile {
    temp: NamedTempFile,
    target: PathBuf,
    /// Number of lines written
    pub records: usize,
    /// Hex SHA-256 of the file contents
    pub sha256: String,
}

impl StagedFile {
    pub fn target(&self) -> &Path {
        &self.target
    }
}

/// Writes partitions into an output directory without ever exposing a
/// half-written file at a final path.
#[derive(Debug, Clone)]
pub struct Writer {
    output_dir: PathBuf,
    file_prefix: String,
    overwrite: bool,
}

impl Writer {
    pub fn new(output_dir: impl Into<PathBuf>, file_prefix: impl Into<String>, overwrite: bool) -> Self {
        Self {
            output_dir: output_dir.into(),
            file_prefix: file_prefix.into(),
            overwrite,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Final path of a partition file, e.g. `data/splits/train.txt`
    pub fn path_for(&self, partition: Partition) -> PathBuf {
        self.output_dir
            .join(format!("{}{}.txt", self.file_prefix, partition.stem()))
    }

    /// Fails with `OutputExists` on the first target that is already present,
    /// unless overwriting is enabled.
    pub fn check_targets<'a>(&self, targets: impl IntoIterator<Item = &'a Path>) -> Result<()> {
        if self.overwrite {
            return Ok(());
        }
        for target in targets {
            if target.exists() {
                return Err(PipelineError::OutputExists { path: target.to_path_buf() });
            }
        }
        Ok(())
    }

    /// Writes a partition to a temporary file in the output directory.
    pub fn stage(&self, partition: Partition, records: &[SentenceRecord]) -> Result<StagedFile> {
        let target = self.path_for(partition);
        let temp = self.temp_file(&target)?;
        let mut hasher = Sha256::new();
        let mut out = BufWriter::new(temp.as_file());

        for record in records {
            let line = format_line(record);
            hasher.update(line.as_bytes());
            out.write_all(line.as_bytes())
                .map_err(|e| PipelineError::write_failed(&target, e))?;
        }
        out.flush().map_err(|e| PipelineError::write_failed(&target, e))?;
        drop(out);
        temp.as_file()
            .sync_all()
            .map_err(|e| PipelineError::write_failed(&target, e))?;

        log::debug!("Staged {} records for {:?}", records.len(), target);
        Ok(StagedFile {
            temp,
            target,
            records: records.len(),
            sha256: format!("{:x}", hasher.finalize()),
        })
    }

    /// Stages arbitrary bytes, used for the manifest.
    pub fn stage_bytes(&self, file_name: &str, bytes: &[u8]) -> Result<StagedFile> {
        let target = self.output_dir.join(file_name);
        let mut temp = self.temp_file(&target)?;
        temp.write_all(bytes)
            .and_then(|_| temp.as_file().sync_all())
            .map_err(|e| PipelineError::write_failed(&target, e))?;

        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Ok(StagedFile {
            temp,
            target,
            records: 0,
            sha256: format!("{:x}", hasher.finalize()),
        })
    }

    fn temp_file(&self, target: &Path) -> Result<NamedTempFile> {
        fs::create_dir_all(&self.output_dir)
            .map_err(|e| PipelineError::write_failed(&self.output_dir, e))?;
        tempfile::Builder::new()
            .prefix(".bantu-corpus-")
            .suffix(".tmp")
            .tempfile_in(&self.output_dir)
            .map_err(|e| PipelineError::write_failed(target, e))
    }

    /// Moves every staged file to its final path, all or nothing.
    ///
    /// Existing targets (only possible with overwrite enabled) are first moved
    /// aside. If any rename fails, the files already moved into place are
    /// removed and the moved-aside originals are restored.
    pub fn commit(&self, staged: Vec<StagedFile>) -> Result<Vec<PathBuf>> {
        let mut backups: Vec<(PathBuf, PathBuf)> = Vec::new();
        for file in &staged {
            if !file.target.exists() {
                continue;
            }
            if !self.overwrite {
                restore_backups(&backups);
                return Err(PipelineError::OutputExists { path: file.target.clone() });
            }
            let backup = backup_path(&file.target);
            if let Err(e) = fs::rename(&file.target, &backup) {
                restore_backups(&backups);
                return Err(PipelineError::write_failed(&file.target, e));
            }
            backups.push((file.target.clone(), backup));
        }

        let mut committed: Vec<PathBuf> = Vec::new();
        for file in staged {
            let target = file.target;
            if let Err(e) = file.temp.persist_noclobber(&target) {
                log::error!("Failed to move {:?} into place: {}", target, e.error);
                for path in &committed {
                    if let Err(e) = fs::remove_file(path) {
                        log::error!("Could not roll back {:?}: {}", path, e);
                    }
                }
                restore_backups(&backups);
                return Err(PipelineError::write_failed(&target, e.error));
            }
            committed.push(target);
        }

        for (_, backup) in &backups {
            if let Err(e) = fs::remove_file(backup) {
                log::warn!("Could not remove previous version {:?}: {}", backup, e);
            }
        }
        log::info!("Committed {} files to {:?}", committed.len(), self.output_dir);
        Ok(committed)
    }
}

fn backup_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{}.previous", name))
}

fn restore_backups(backups: &[(PathBuf, PathBuf)]) {
    for (target, backup) in backups {
        if let Err(e) = fs::rename(backup, target) {
            log::error!("Could not restore {:?} from {:?}: {}", target, backup, e);
        }
    }
}
