use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::Serialize;

use super::error::Result;
use super::record::{LanguageLabel, RawRecord, SentenceRecord};
use super::utils::{normalize_text, token_count};
use super::writer::parse_line;
use crate::config::PipelineConfig;

/// Why a line was dropped. Rejections are counted, never fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Labelled line without a valid prefix, or labelled for another language
    Malformed,
    EmptyLine,
    TooLong,
    TooShort,
    Duplicate,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Malformed => "malformed",
            Self::EmptyLine => "empty_line",
            Self::TooLong => "too_long",
            Self::TooShort => "too_short",
            Self::Duplicate => "duplicate",
        };
        f.write_str(name)
    }
}

/// Outcome of cleaning a single line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accepted(SentenceRecord),
    Rejected(RejectReason),
}

/// Thresholds applied by the [`Cleaner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanerSettings {
    pub min_length: usize,
    pub max_length: usize,
    pub min_tokens: usize,
    pub dedup_case_sensitive: bool,
}

impl Default for CleanerSettings {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

impl From<&PipelineConfig> for CleanerSettings {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            min_length: config.min_length,
            max_length: config.max_length,
            min_tokens: config.min_tokens,
            dedup_case_sensitive: config.dedup_case_sensitive,
        }
    }
}

/// Accepted and rejected line counts for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleaningStats {
    pub seen: usize,
    pub accepted: BTreeMap<LanguageLabel, usize>,
    pub rejected: BTreeMap<RejectReason, usize>,
}

impl CleaningStats {
    pub fn accepted_total(&self) -> usize {
        self.accepted.values().sum()
    }

    pub fn rejected_total(&self) -> usize {
        self.rejected.values().sum()
    }

    pub fn rejected_for(&self, reason: RejectReason) -> usize {
        self.rejected.get(&reason).copied().unwrap_or(0)
    }
}

/// Normalizes lines and filters out empty, oversized, undersized and
/// duplicate sentences.
///
/// Deduplication is a single streaming pass keyed on `(language, text)`: the
/// first occurrence of a sentence is kept and every later copy is rejected.
/// Which copy survives therefore depends on source order. With
/// `dedup_case_sensitive` off, the key is lowercased but the kept text is the
/// first occurrence as written.
#[derive(Debug, Default)]
pub struct Cleaner {
    settings: CleanerSettings,
    seen: HashSet<(LanguageLabel, String)>,
    stats: CleaningStats,
}

impl Cleaner {
    pub fn new(settings: CleanerSettings) -> Self {
        Self {
            settings,
            seen: HashSet::new(),
            stats: CleaningStats::default(),
        }
    }

    /// Cleans one loader record, unwrapping its `__label__` prefix first when
    /// the source is labelled.
    pub fn clean(&mut self, raw: &RawRecord) -> Verdict {
        if !raw.labelled {
            return self.clean_text(&raw.text, &raw.language);
        }
        match parse_line(&raw.text) {
            Some(record) if record.language == raw.language => {
                self.clean_text(&record.text, &raw.language)
            }
            _ => {
                log::debug!("{:?}:{} has no '__label__{} ' prefix", raw.source, raw.line_no, raw.language);
                self.reject(RejectReason::Malformed)
            }
        }
    }

    /// Rules are checked in order and the first match wins: empty, too long,
    /// too short, duplicate.
    pub fn clean_text(&mut self, text: &str, language: &LanguageLabel) -> Verdict {
        self.stats.seen += 1;
        let text = normalize_text(text);

        if text.is_empty() {
            return self.reject(RejectReason::EmptyLine);
        }
        let chars = text.chars().count();
        if chars > self.settings.max_length {
            return self.reject(RejectReason::TooLong);
        }
        if chars < self.settings.min_length || token_count(&text) < self.settings.min_tokens {
            return self.reject(RejectReason::TooShort);
        }

        let key = if self.settings.dedup_case_sensitive {
            text.clone()
        } else {
            text.to_lowercase()
        };
        if !self.seen.insert((language.clone(), key)) {
            return self.reject(RejectReason::Duplicate);
        }

        *self.stats.accepted.entry(language.clone()).or_insert(0) += 1;
        Verdict::Accepted(SentenceRecord::new(text, language.clone()))
    }

    /// Drains a loader iterator, keeping accepted records in input order.
    ///
    /// # Errors
    /// Propagates the first source error; rejections are only counted.
    pub fn clean_all<I>(&mut self, records: I) -> Result<Vec<SentenceRecord>>
    where
        I: IntoIterator<Item = Result<RawRecord>>,
    {
        let mut corpus = Vec::new();
        for raw in records {
            if let Verdict::Accepted(record) = self.clean(&raw?) {
                corpus.push(record);
            }
        }
        log::info!(
            "Cleaning kept {} of {} lines ({} rejected)",
            self.stats.accepted_total(),
            self.stats.seen,
            self.stats.rejected_total()
        );
        for (reason, count) in &self.stats.rejected {
            log::info!("  {}: {}", reason, count);
        }
        Ok(corpus)
    }

    pub fn stats(&self) -> &CleaningStats {
        &self.stats
    }

    pub fn into_stats(self) -> CleaningStats {
        self.stats
    }

    fn reject(&mut self, reason: RejectReason) -> Verdict {
        if reason == RejectReason::Malformed {
            // malformed lines never reach clean_text, count them as seen here
            self.stats.seen += 1;
        }
        *self.stats.rejected.entry(reason).or_insert(0) += 1;
        Verdict::Rejected(reason)
    }
}
