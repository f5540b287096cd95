use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

use super::builder::PipelineBuilder;
use super::cleaner::{Cleaner, CleanerSettings, RejectReason};
use super::error::Result;
use super::loader::Loader;
use super::record::{LanguageLabel, Partition};
use super::splitter::{SplitOutcome, Splitter};
use super::writer::{StagedFile, Writer};
use crate::config::PipelineConfig;
use crate::manifest::{Manifest, ManifestEntry, MANIFEST_FILE};

/// Loads, cleans, splits and writes the corpus.
///
/// ```no_run
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use bantu_corpus::Pipeline;
///
/// let report = Pipeline::builder()
///     .add_source("en", "raw/english.txt")?
///     .add_source("shona", "raw/shona.txt")?
///     .with_ratios(0.8, 0.1, 0.1)?
///     .with_balance(true)
///     .with_output_dir("data/splits")
///     .build()?
///     .run()?;
/// println!("{}", report);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
}

/// Per-partition part of a [`RunReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionReport {
    pub path: PathBuf,
    pub records: usize,
    pub languages: BTreeMap<LanguageLabel, usize>,
}

/// Summary of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub seed: u64,
    /// Lines read from all sources
    pub lines_read: usize,
    /// Records that passed cleaning, per language
    pub accepted: BTreeMap<LanguageLabel, usize>,
    pub rejected: BTreeMap<RejectReason, usize>,
    /// Records removed by balancing, per language
    pub downsampled: BTreeMap<LanguageLabel, usize>,
    pub partitions: BTreeMap<Partition, PartitionReport>,
    pub stratification_drift: f64,
    pub manifest: Option<PathBuf>,
    pub elapsed_ms: u128,
}

impl RunReport {
    /// Records written across all partitions
    pub fn written(&self) -> usize {
        self.partitions.values().map(|p| p.records).sum()
    }

    pub fn rejected_for(&self, reason: RejectReason) -> usize {
        self.rejected.get(&reason).copied().unwrap_or(0)
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Lines read: {}", self.lines_read)?;
        writeln!(f, "Accepted:")?;
        for (label, count) in &self.accepted {
            writeln!(f, "  {}: {}", label, count)?;
        }
        if !self.rejected.is_empty() {
            writeln!(f, "Rejected:")?;
            for (reason, count) in &self.rejected {
                writeln!(f, "  {}: {}", reason, count)?;
            }
        }
        if self.downsampled.values().any(|&n| n > 0) {
            writeln!(f, "Dropped for balance:")?;
            for (label, count) in &self.downsampled {
                writeln!(f, "  {}: {}", label, count)?;
            }
        }
        writeln!(f, "Partitions (seed {}):", self.seed)?;
        for (partition, report) in &self.partitions {
            let languages: Vec<String> = report
                .languages
                .iter()
                .map(|(label, count)| format!("{}={}", label, count))
                .collect();
            writeln!(
                f,
                "  {:<10} {:>8}  [{}]  {}",
                partition.stem(),
                report.records,
                languages.join(", "),
                report.path.display()
            )?;
        }
        writeln!(f, "Stratification drift: {:.4}", self.stratification_drift)?;
        if let Some(manifest) = &self.manifest {
            writeln!(f, "Manifest: {}", manifest.display())?;
        }
        write!(f, "Took {} ms", self.elapsed_ms)
    }
}

impl Pipeline {
    /// Creates a new PipelineBuilder for fluent construction
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Wraps a configuration after validating it
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs every stage. On any error, no output file exists at its final path
    /// that did not exist before the run.
    pub fn run(&self) -> Result<RunReport> {
        let start = Instant::now();
        let config = &self.config;
        log::info!("=== Building corpus (seed {}) ===", config.seed);

        let writer = Writer::new(&config.output_dir, config.file_prefix.clone(), config.overwrite);
        let mut targets: Vec<PathBuf> = Partition::ALL.iter().map(|p| writer.path_for(*p)).collect();
        if config.write_manifest {
            targets.push(writer.output_dir().join(MANIFEST_FILE));
        }
        writer.check_targets(targets.iter().map(PathBuf::as_path))?;

        let loader = Loader::open(config.sources.clone(), config.source_format)?;
        let languages: Vec<LanguageLabel> = loader.languages().cloned().collect();

        let mut cleaner = Cleaner::new(CleanerSettings::from(config));
        let corpus = cleaner.clean_all(loader.records())?;
        let stats = cleaner.into_stats();

        let mut rng = StdRng::seed_from_u64(config.seed);
        let splitter = Splitter::new(config.ratios, config.balance, config.stratify_tolerance);
        let outcome = splitter.split(corpus, &languages, &mut rng)?;

        let created_dirs = missing_dirs(writer.output_dir());
        let (partitions, manifest) = match self.write(&writer, &outcome) {
            Ok(written) => written,
            Err(e) => {
                remove_created_dirs(&created_dirs);
                return Err(e);
            }
        };

        let report = RunReport {
            seed: config.seed,
            lines_read: stats.seen,
            accepted: stats.accepted,
            rejected: stats.rejected,
            downsampled: outcome.downsampled,
            partitions,
            stratification_drift: outcome.stratification_drift,
            manifest,
            elapsed_ms: start.elapsed().as_millis(),
        };
        log::info!("=== Corpus built: {} records (took {:.2?}) ===", report.written(), start.elapsed());
        Ok(report)
    }

    fn write(
        &self,
        writer: &Writer,
        outcome: &SplitOutcome,
    ) -> Result<(BTreeMap<Partition, PartitionReport>, Option<PathBuf>)> {
        let mut staged: Vec<StagedFile> = Vec::new();
        let mut partitions = BTreeMap::new();
        let mut entries = Vec::new();

        for partition in Partition::ALL {
            let records = outcome.splits.get(partition);
            let file = writer.stage(partition, records)?;
            let languages = outcome.splits.language_counts(partition);

            entries.push(ManifestEntry {
                partition,
                file: file
                    .target()
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                records: file.records,
                sha256: file.sha256.clone(),
                languages: languages.clone(),
            });
            partitions.insert(
                partition,
                PartitionReport {
                    path: file.target().to_path_buf(),
                    records: file.records,
                    languages,
                },
            );
            staged.push(file);
        }

        let mut manifest_path = None;
        if self.config.write_manifest {
            let manifest = Manifest {
                seed: self.config.seed,
                ratios: self.config.ratios,
                balance: self.config.balance,
                files: entries,
            };
            let file = writer.stage_bytes(MANIFEST_FILE, manifest.to_json()?.as_bytes())?;
            manifest_path = Some(file.target().to_path_buf());
            staged.push(file);
        }

        writer.commit(staged)?;
        Ok((partitions, manifest_path))
    }
}

/// Levels of `dir` that do not exist yet, innermost first.
fn missing_dirs(dir: &Path) -> Vec<PathBuf> {
    dir.ancestors()
        .take_while(|p| !p.as_os_str().is_empty() && !p.exists())
        .map(Path::to_path_buf)
        .collect()
}

/// Removes directories a failed run created, innermost first. `remove_dir`
/// refuses non-empty directories, so nothing put there by others is lost.
fn remove_created_dirs(dirs: &[PathBuf]) {
    for dir in dirs {
        if !dir.exists() {
            continue;
        }
        if let Err(e) = fs::remove_dir(dir) {
            log::warn!("Could not remove {:?} created by the failed run: {}", dir, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_created_dirs_are_removed_innermost_first() {
        let root = TempDir::new().unwrap();
        let nested = root.path().join("a/b/splits");

        let missing = missing_dirs(&nested);
        assert_eq!(
            missing,
            vec![nested.clone(), root.path().join("a/b"), root.path().join("a")]
        );

        fs::create_dir_all(&nested).unwrap();
        remove_created_dirs(&missing);
        assert!(!root.path().join("a").exists());
        assert!(root.path().exists());
    }

    #[test]
    fn test_existing_dirs_are_left_alone() {
        let root = TempDir::new().unwrap();
        fs::create_dir(root.path().join("a")).unwrap();
        fs::write(root.path().join("a/keep.txt"), "kept").unwrap();

        let missing = missing_dirs(&root.path().join("a/splits"));
        assert_eq!(missing, vec![root.path().join("a/splits")]);

        fs::create_dir(root.path().join("a/splits")).unwrap();
        remove_created_dirs(&missing);
        assert!(root.path().join("a/keep.txt").exists());
        assert!(!root.path().join("a/splits").exists());
        assert!(missing_dirs(root.path()).is_empty());
    }
}
