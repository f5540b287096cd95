use std::path::PathBuf;

use super::error::{PipelineError, Result};
use super::pipeline::Pipeline;
use super::record::LanguageLabel;
use crate::config::{PipelineConfig, SourceFormat, SplitRatios};

/// A builder for constructing a [`Pipeline`] with a fluent interface.
///
/// Methods that can receive invalid values return `Result<Self, _>` so that
/// mistakes surface where they are made rather than when the run starts.
#[derive(Debug, Clone, Default)]
pub struct PipelineBuilder {
    config: PipelineConfig,
}

impl PipelineBuilder {
    /// Creates a builder with the default configuration and no sources
    ///
    /// # Example
    /// ```
    /// use bantu_corpus::PipelineBuilder;
    ///
    /// let builder = PipelineBuilder::new();
    /// ```
    pub fn new() -> Self {
        Self { config: PipelineConfig::default() }
    }

    /// Starts from an existing configuration, e.g. one read from a file
    pub fn from_config(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// The configuration as set so far
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Adds a source file for a language. Files of the same language are read
    /// in the order they are added.
    ///
    /// # Example
    /// ```
    /// use bantu_corpus::PipelineBuilder;
    ///
    /// let builder = PipelineBuilder::new()
    ///     .add_source("shona", "raw/shona_part1.txt")
    ///     .and_then(|b| b.add_source("shona", "raw/shona_part2.txt"));
    /// assert!(builder.is_ok());
    /// ```
    pub fn add_source(mut self, language: &str, path: impl Into<PathBuf>) -> Result<Self> {
        let language = LanguageLabel::new(language)?;
        self.config.sources.entry(language).or_default().push(path.into());
        Ok(self)
    }

    pub fn with_source_format(mut self, format: SourceFormat) -> Self {
        self.config.source_format = format;
        self
    }

    /// Sets the train/validation/test fractions
    ///
    /// # Errors
    /// `Config` if a fraction is outside (0, 1) or they do not sum to 1.0
    pub fn with_ratios(mut self, train: f64, validation: f64, test: f64) -> Result<Self> {
        self.config.ratios = SplitRatios::new(train, validation, test)?;
        Ok(self)
    }

    pub fn with_balance(mut self, balance: bool) -> Self {
        self.config.balance = balance;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    /// Sets the accepted sentence length range in characters, inclusive
    pub fn with_length_bounds(mut self, min_length: usize, max_length: usize) -> Result<Self> {
        if max_length == 0 || min_length > max_length {
            return Err(PipelineError::Config(format!(
                "Invalid length bounds: min {} max {}",
                min_length, max_length
            )));
        }
        self.config.min_length = min_length;
        self.config.max_length = max_length;
        Ok(self)
    }

    pub fn with_min_tokens(mut self, min_tokens: usize) -> Self {
        self.config.min_tokens = min_tokens;
        self
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.config.overwrite = overwrite;
        self
    }

    pub fn with_case_sensitive_dedup(mut self, case_sensitive: bool) -> Self {
        self.config.dedup_case_sensitive = case_sensitive;
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn with_file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.file_prefix = prefix.into();
        self
    }

    pub fn with_stratify_tolerance(mut self, tolerance: f64) -> Self {
        self.config.stratify_tolerance = tolerance;
        self
    }

    pub fn with_manifest(mut self, write_manifest: bool) -> Self {
        self.config.write_manifest = write_manifest;
        self
    }

    /// Validates the configuration and returns the pipeline
    pub fn build(self) -> Result<Pipeline> {
        Pipeline::new(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_requires_sources() {
        assert!(matches!(PipelineBuilder::new().build(), Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_builder_sets_config() -> Result<()> {
        let pipeline = PipelineBuilder::new()
            .add_source("en", "en.txt")?
            .add_source("en", "en2.txt")?
            .add_source("shona", "sn.txt")?
            .with_ratios(0.8, 0.1, 0.1)?
            .with_length_bounds(3, 200)?
            .with_seed(7)
            .with_balance(true)
            .with_case_sensitive_dedup(false)
            .with_file_prefix("shona_en_lang_")
            .build()?;

        let config = pipeline.config();
        assert_eq!(config.sources.len(), 2);
        assert_eq!(config.sources[&LanguageLabel::new("en")?].len(), 2);
        assert_eq!(config.seed, 7);
        assert_eq!(config.min_length, 3);
        assert!(config.balance);
        assert!(!config.dedup_case_sensitive);
        Ok(())
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(PipelineBuilder::new().add_source("en gb", "x.txt").is_err());
        assert!(PipelineBuilder::new().with_ratios(0.5, 0.5, 0.5).is_err());
        assert!(PipelineBuilder::new().with_length_bounds(10, 5).is_err());
    }
}
