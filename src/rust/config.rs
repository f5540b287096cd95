//! Run configuration: where the raw sentences live, how to clean them and
//! how to split them.
//!
//! A configuration is usually read from a JSON file and then adjusted by the
//! command line. Every field except `sources` has a default, so a minimal file
//! looks like:
//!
//! ```json
//! {
//!   "sources": { "en": ["raw/english.txt"], "shona": ["raw/shona.txt"] },
//!   "balance": true
//! }
//! ```

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::pipeline::{LanguageLabel, PipelineError, Result};

/// Environment variable naming a config file to use when none is given
pub const CONFIG_ENV_VAR: &str = "BANTU_CORPUS_CONFIG";

const RATIO_EPSILON: f64 = 1e-6;

/// Fractions of the corpus assigned to each partition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitRatios {
    pub train: f64,
    pub validation: f64,
    pub test: f64,
}

impl SplitRatios {
    pub fn new(train: f64, validation: f64, test: f64) -> Result<Self> {
        let ratios = Self { train, validation, test };
        ratios.validate()?;
        Ok(ratios)
    }

    /// Checks that every fraction is in (0, 1) and that they sum to 1.0
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("train", self.train),
            ("validation", self.validation),
            ("test", self.test),
        ] {
            if !(value > 0.0 && value < 1.0) {
                return Err(PipelineError::Config(format!(
                    "{} ratio must be between 0 and 1 exclusive, got {}",
                    name, value
                )));
            }
        }
        let sum = self.train + self.validation + self.test;
        if (sum - 1.0).abs() > RATIO_EPSILON {
            return Err(PipelineError::Config(format!(
                "Split ratios must sum to 1.0, got {}",
                sum
            )));
        }
        Ok(())
    }
}

impl Default for SplitRatios {
    /// Matches the published ~600K/80K/80K breakdown
    fn default() -> Self {
        Self { train: 0.79, validation: 0.105, test: 0.105 }
    }
}

/// How lines of a source file are interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    /// One bare sentence per line
    #[default]
    Plain,
    /// Lines already in `__label__<lang> <text>` form, e.g. a previous release
    Labelled,
}

fn default_seed() -> u64 {
    42
}

fn default_min_length() -> usize {
    1
}

fn default_max_length() -> usize {
    1000
}

fn default_min_tokens() -> usize {
    1
}

fn default_true() -> bool {
    true
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("data/splits")
}

fn default_stratify_tolerance() -> f64 {
    0.05
}

/// Complete configuration for one corpus build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Source files per language, read in the listed order
    #[serde(default)]
    pub sources: BTreeMap<LanguageLabel, Vec<PathBuf>>,
    #[serde(default)]
    pub source_format: SourceFormat,
    #[serde(default)]
    pub ratios: SplitRatios,
    /// Downsample every language to the size of the smallest one
    #[serde(default)]
    pub balance: bool,
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Minimum sentence length in characters
    #[serde(default = "default_min_length")]
    pub min_length: usize,
    /// Maximum sentence length in characters
    #[serde(default = "default_max_length")]
    pub max_length: usize,
    /// Minimum number of whitespace-separated tokens
    #[serde(default = "default_min_tokens")]
    pub min_tokens: usize,
    #[serde(default)]
    pub overwrite: bool,
    #[serde(default = "default_true")]
    pub dedup_case_sensitive: bool,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Prepended to each partition's file stem, e.g. `shona_en_lang_`
    #[serde(default)]
    pub file_prefix: String,
    /// Largest acceptable gap between a language's share in a partition and
    /// its share in the whole corpus before a warning is logged
    #[serde(default = "default_stratify_tolerance")]
    pub stratify_tolerance: f64,
    #[serde(default = "default_true")]
    pub write_manifest: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sources: BTreeMap::new(),
            source_format: SourceFormat::default(),
            ratios: SplitRatios::default(),
            balance: false,
            seed: default_seed(),
            min_length: default_min_length(),
            max_length: default_max_length(),
            min_tokens: default_min_tokens(),
            overwrite: false,
            dedup_case_sensitive: true,
            output_dir: default_output_dir(),
            file_prefix: String::new(),
            stratify_tolerance: default_stratify_tolerance(),
            write_manifest: true,
        }
    }
}

impl PipelineConfig {
    /// Reads a JSON config file. Relative source paths and a relative
    /// `output_dir` are resolved against the file's directory.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        log::info!("Loading configuration from {:?}", path);
        let raw = fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("Cannot read config file {}: {}", path.display(), e))
        })?;
        let mut config: Self = serde_json::from_str(&raw).map_err(|e| {
            PipelineError::Config(format!("Invalid config file {}: {}", path.display(), e))
        })?;

        if let Some(base) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            config.resolve_relative_to(base);
        }
        Ok(config)
    }

    /// Returns the config file named by `BANTU_CORPUS_CONFIG`, if set
    pub fn path_from_env() -> Option<PathBuf> {
        env::var_os(CONFIG_ENV_VAR)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
    }

    fn resolve_relative_to(&mut self, base: &Path) {
        for paths in self.sources.values_mut() {
            for p in paths.iter_mut() {
                if p.is_relative() {
                    *p = base.join(&*p);
                }
            }
        }
        if self.output_dir.is_relative() {
            self.output_dir = base.join(&self.output_dir);
        }
    }

    /// Checks everything that can be checked without touching the filesystem
    pub fn validate(&self) -> Result<()> {
        if self.sources.is_empty() {
            return Err(PipelineError::Config("At least one language source is required".into()));
        }
        self.ratios.validate()?;
        if self.max_length == 0 {
            return Err(PipelineError::Config("max_length must be positive".into()));
        }
        if self.min_length > self.max_length {
            return Err(PipelineError::Config(format!(
                "min_length ({}) cannot exceed max_length ({})",
                self.min_length, self.max_length
            )));
        }
        if !(self.stratify_tolerance >= 0.0 && self.stratify_tolerance <= 1.0) {
            return Err(PipelineError::Config(format!(
                "stratify_tolerance must be within [0, 1], got {}",
                self.stratify_tolerance
            )));
        }
        if self.file_prefix.contains(['/', '\\']) {
            return Err(PipelineError::Config(format!(
                "file_prefix '{}' must not contain path separators",
                self.file_prefix
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_ratios_are_valid() {
        assert!(SplitRatios::default().validate().is_ok());
        assert!(SplitRatios::new(0.8, 0.1, 0.1).is_ok());
    }

    #[test]
    fn test_ratio_validation() {
        assert!(SplitRatios::new(0.8, 0.1, 0.2).is_err());
        assert!(SplitRatios::new(0.9, 0.1, 0.0).is_err());
        assert!(SplitRatios::new(1.0, 0.0, 0.0).is_err());
        assert!(SplitRatios::new(f64::NAN, 0.5, 0.5).is_err());
    }

    #[test]
    fn test_minimal_file_uses_defaults() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("corpus.json");
        fs::write(
            &path,
            r#"{ "sources": { "en": ["raw/en.txt"], "shona": ["/abs/sn.txt"] }, "balance": true }"#,
        )
        .unwrap();

        let config = PipelineConfig::from_file(&path)?;
        assert!(config.balance);
        assert_eq!(config.seed, 42);
        assert_eq!(config.ratios, SplitRatios::default());
        assert!(config.dedup_case_sensitive);

        let en = LanguageLabel::new("en")?;
        let shona = LanguageLabel::new("shona")?;
        assert_eq!(config.sources[&en], vec![dir.path().join("raw/en.txt")]);
        assert_eq!(config.sources[&shona], vec![PathBuf::from("/abs/sn.txt")]);
        assert_eq!(config.output_dir, dir.path().join("data/splits"));
        Ok(())
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, r#"{ "sources": {}, "shuffle": true }"#).unwrap();
        assert!(matches!(PipelineConfig::from_file(&path), Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_invalid_label_in_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, r#"{ "sources": { "en gb": ["a.txt"] } }"#).unwrap();
        assert!(PipelineConfig::from_file(&path).is_err());
    }

    #[test]
    fn test_validate() {
        let mut config = PipelineConfig::default();
        assert!(config.validate().is_err());

        config.sources.insert(LanguageLabel::new("en").unwrap(), vec![PathBuf::from("en.txt")]);
        assert!(config.validate().is_ok());

        config.min_length = 2000;
        assert!(config.validate().is_err());
        config.min_length = 1;

        config.file_prefix = "../escape_".into();
        assert!(config.validate().is_err());
    }
}
