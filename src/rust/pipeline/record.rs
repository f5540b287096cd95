use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::PipelineError;

/// A language tag such as `en` or `shona`.
///
/// Labels end up verbatim after `__label__` in the output files, so they must
/// be a single bare token: ASCII letters, digits, `_` or `-`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LanguageLabel(String);

impl LanguageLabel {
    /// Creates a label, rejecting anything that is not a bare token
    ///
    /// # Example
    /// ```
    /// use bantu_corpus::LanguageLabel;
    ///
    /// assert!(LanguageLabel::new("shona").is_ok());
    /// assert!(LanguageLabel::new("en us").is_err());
    /// ```
    pub fn new(label: impl Into<String>) -> Result<Self, PipelineError> {
        let label = label.into();
        if label.is_empty() {
            return Err(PipelineError::Config("Language label cannot be empty".into()));
        }
        if let Some(bad) = label
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
        {
            return Err(PipelineError::Config(format!(
                "Language label '{}' contains invalid character {:?}",
                label, bad
            )));
        }
        Ok(Self(label))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LanguageLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for LanguageLabel {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for LanguageLabel {
    type Error = PipelineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<LanguageLabel> for String {
    fn from(label: LanguageLabel) -> Self {
        label.0
    }
}

/// A line as read from a source, before any cleaning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    /// Line content with only the line terminator removed
    pub text: String,
    /// Language the source was declared for
    pub language: LanguageLabel,
    /// File the line came from
    pub source: PathBuf,
    /// 1-based line number within `source`
    pub line_no: usize,
    /// Whether the line is expected to carry its own `__label__` prefix
    pub labelled: bool,
}

/// A cleaned sentence with its language.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SentenceRecord {
    pub text: String,
    pub language: LanguageLabel,
}

impl SentenceRecord {
    pub fn new(text: impl Into<String>, language: LanguageLabel) -> Self {
        Self { text: text.into(), language }
    }
}

/// The three dataset partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Partition {
    Train,
    Validation,
    Test,
}

impl Partition {
    pub const ALL: [Partition; 3] = [Partition::Train, Partition::Validation, Partition::Test];

    /// File stem used for this partition's output file
    pub fn stem(self) -> &'static str {
        match self {
            Self::Train => "train",
            Self::Validation => "validation",
            Self::Test => "test",
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.stem())
    }
}
