use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use rand::Rng;

use super::error::{PipelineError, Result};
use super::record::{LanguageLabel, Partition, SentenceRecord};
use crate::config::SplitRatios;

/// Every language needs one record in each of the three partitions
pub const MIN_RECORDS_PER_LANGUAGE: usize = 3;

/// The three partitions, each in its final (seeded, shuffled) order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Splits {
    pub train: Vec<SentenceRecord>,
    pub validation: Vec<SentenceRecord>,
    pub test: Vec<SentenceRecord>,
}

impl Splits {
    pub fn get(&self, partition: Partition) -> &[SentenceRecord] {
        match partition {
            Partition::Train => &self.train,
            Partition::Validation => &self.validation,
            Partition::Test => &self.test,
        }
    }

    fn get_mut(&mut self, partition: Partition) -> &mut Vec<SentenceRecord> {
        match partition {
            Partition::Train => &mut self.train,
            Partition::Validation => &mut self.validation,
            Partition::Test => &mut self.test,
        }
    }

    /// Total records across all partitions
    pub fn len(&self) -> usize {
        self.train.len() + self.validation.len() + self.test.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn language_counts(&self, partition: Partition) -> BTreeMap<LanguageLabel, usize> {
        let mut counts = BTreeMap::new();
        for record in self.get(partition) {
            *counts.entry(record.language.clone()).or_insert(0) += 1;
        }
        counts
    }
}

/// Result of a split, with what was dropped to balance the languages.
#[derive(Debug, Clone)]
pub struct SplitOutcome {
    pub splits: Splits,
    /// Records removed per language by balancing
    pub downsampled: BTreeMap<LanguageLabel, usize>,
    /// Largest gap between a language's share of a partition and its share of
    /// the whole corpus
    pub stratification_drift: f64,
}

/// Stratified train/validation/test splitting.
#[derive(Debug, Clone)]
pub struct Splitter {
    ratios: SplitRatios,
    balance: bool,
    stratify_tolerance: f64,
}

impl Splitter {
    pub fn new(ratios: SplitRatios, balance: bool, stratify_tolerance: f64) -> Self {
        Self { ratios, balance, stratify_tolerance }
    }

    /// Splits `corpus` so that each language keeps its corpus share in every
    /// partition.
    ///
    /// Each language is shuffled on its own, optionally truncated to the
    /// smallest language's size, and cut into three slices by the ratios.
    /// Validation and test always get at least one record per language. The
    /// slices are then pooled per partition and shuffled again. All
    /// randomness comes from `rng`, so the same seed gives the same splits.
    ///
    /// `languages` lists the configured labels; a label with no records in
    /// `corpus` still counts and fails the size checks.
    ///
    /// # Errors
    /// `InsufficientData` if any language ends up with fewer records than
    /// needed to place one in every partition.
    pub fn split<R: Rng + ?Sized>(
        &self,
        corpus: Vec<SentenceRecord>,
        languages: &[LanguageLabel],
        rng: &mut R,
    ) -> Result<SplitOutcome> {
        let mut groups: BTreeMap<LanguageLabel, Vec<SentenceRecord>> = languages
            .iter()
            .map(|l| (l.clone(), Vec::new()))
            .collect();
        for record in corpus {
            groups.entry(record.language.clone()).or_default().push(record);
        }

        for group in groups.values_mut() {
            group.shuffle(rng);
        }

        let mut downsampled = BTreeMap::new();
        if self.balance {
            let (smallest, target) = groups
                .iter()
                .map(|(label, group)| (label, group.len()))
                .min_by_key(|(_, len)| *len)
                .ok_or_else(|| PipelineError::Config("No languages to split".into()))?;
            if target == 0 {
                return Err(PipelineError::InsufficientData {
                    language: smallest.to_string(),
                    available: 0,
                    required: MIN_RECORDS_PER_LANGUAGE,
                });
            }
            for (label, group) in groups.iter_mut() {
                let dropped = group.len() - target;
                group.truncate(target);
                if dropped > 0 {
                    log::info!("Balancing: dropped {} '{}' records", dropped, label);
                }
                downsampled.insert(label.clone(), dropped);
            }
        }

        let total: usize = groups.values().map(Vec::len).sum();
        let mut splits = Splits::default();
        let mut corpus_share = BTreeMap::new();

        for (label, mut group) in groups {
            let n = group.len();
            let (n_train, n_validation, _) = self.partition_sizes(n).ok_or_else(|| {
                PipelineError::InsufficientData {
                    language: label.to_string(),
                    available: n,
                    required: MIN_RECORDS_PER_LANGUAGE,
                }
            })?;
            log::debug!("'{}': {} records", label, n);

            let test = group.split_off(n_train + n_validation);
            let validation = group.split_off(n_train);
            splits.train.extend(group);
            splits.validation.extend(validation);
            splits.test.extend(test);
            corpus_share.insert(label, n as f64 / total as f64);
        }

        for partition in Partition::ALL {
            splits.get_mut(partition).shuffle(rng);
        }

        let stratification_drift = Self::drift(&splits, &corpus_share);
        if stratification_drift > self.stratify_tolerance {
            log::warn!(
                "Language shares drift by up to {:.4} across partitions (tolerance {:.4})",
                stratification_drift,
                self.stratify_tolerance
            );
        }
        log::info!(
            "Split {} records: {} train, {} validation, {} test",
            splits.len(),
            splits.train.len(),
            splits.validation.len(),
            splits.test.len()
        );

        Ok(SplitOutcome { splits, downsampled, stratification_drift })
    }

    /// (train, validation, test) sizes for a language with `n` records, or
    /// `None` if there are too few to give every partition one record.
    ///
    /// Validation and test are rounded from their ratios with a floor of one.
    /// If that leaves train empty, the larger of the two gives records back
    /// until train has one.
    fn partition_sizes(&self, n: usize) -> Option<(usize, usize, usize)> {
        if n < MIN_RECORDS_PER_LANGUAGE {
            return None;
        }
        let portion = |ratio: f64| ((n as f64 * ratio).round() as usize).max(1);
        let mut n_validation = portion(self.ratios.validation);
        let mut n_test = portion(self.ratios.test);
        while n_validation + n_test >= n {
            if n_validation >= n_test {
                n_validation -= 1;
            } else {
                n_test -= 1;
            }
        }
        Some((n - n_validation - n_test, n_validation, n_test))
    }

    fn drift(splits: &Splits, corpus_share: &BTreeMap<LanguageLabel, f64>) -> f64 {
        let mut worst: f64 = 0.0;
        for partition in Partition::ALL {
            let size = splits.get(partition).len();
            if size == 0 {
                continue;
            }
            let counts = splits.language_counts(partition);
            for (label, share) in corpus_share {
                let count = counts.get(label).copied().unwrap_or(0);
                worst = worst.max((count as f64 / size as f64 - share).abs());
            }
        }
        worst
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn label(s: &str) -> LanguageLabel {
        LanguageLabel::new(s).unwrap()
    }

    fn corpus(en: usize, shona: usize) -> Vec<SentenceRecord> {
        let mut records: Vec<SentenceRecord> = (0..en)
            .map(|i| SentenceRecord::new(format!("english {}", i), label("en")))
            .collect();
        records.extend((0..shona).map(|i| SentenceRecord::new(format!("shona {}", i), label("shona"))));
        records
    }

    fn languages() -> Vec<LanguageLabel> {
        vec![label("en"), label("shona")]
    }

    fn splitter(balance: bool) -> Splitter {
        Splitter::new(SplitRatios::new(0.8, 0.1, 0.1).unwrap(), balance, 0.05)
    }

    #[test]
    fn test_all_records_assigned_once() -> Result<()> {
        let mut rng = StdRng::seed_from_u64(7);
        let outcome = splitter(false).split(corpus(100, 60), &languages(), &mut rng)?;
        let splits = &outcome.splits;
        assert_eq!(splits.len(), 160);

        let mut all: Vec<&SentenceRecord> = Partition::ALL
            .iter()
            .flat_map(|p| splits.get(*p).iter())
            .collect();
        all.sort_by(|a, b| a.text.cmp(&b.text));
        all.dedup();
        assert_eq!(all.len(), 160);
        Ok(())
    }

    #[test]
    fn test_stratified_sizes() -> Result<()> {
        let mut rng = StdRng::seed_from_u64(42);
        let outcome = splitter(false).split(corpus(100, 50), &languages(), &mut rng)?;
        let test = outcome.splits.language_counts(Partition::Test);
        assert_eq!(test[&label("en")], 10);
        assert_eq!(test[&label("shona")], 5);
        let train = outcome.splits.language_counts(Partition::Train);
        assert_eq!(train[&label("en")], 80);
        assert_eq!(train[&label("shona")], 40);
        assert!(outcome.stratification_drift < 0.01);
        Ok(())
    }

    #[test]
    fn test_balance_downsamples() -> Result<()> {
        let mut rng = StdRng::seed_from_u64(42);
        let outcome = splitter(true).split(corpus(30, 20), &languages(), &mut rng)?;
        assert_eq!(outcome.splits.len(), 40);
        assert_eq!(outcome.downsampled[&label("en")], 10);
        assert_eq!(outcome.downsampled[&label("shona")], 0);
        for partition in Partition::ALL {
            let counts = outcome.splits.language_counts(partition);
            assert_eq!(counts[&label("en")], counts[&label("shona")]);
        }
        Ok(())
    }

    #[test]
    fn test_same_seed_same_split() -> Result<()> {
        let a = splitter(false).split(corpus(40, 40), &languages(), &mut StdRng::seed_from_u64(3))?;
        let b = splitter(false).split(corpus(40, 40), &languages(), &mut StdRng::seed_from_u64(3))?;
        let c = splitter(false).split(corpus(40, 40), &languages(), &mut StdRng::seed_from_u64(4))?;
        assert_eq!(a.splits, b.splits);
        assert_ne!(a.splits, c.splits);
        Ok(())
    }

    #[test]
    fn test_tiny_language_gets_one_per_partition() -> Result<()> {
        let mut rng = StdRng::seed_from_u64(1);
        let outcome = splitter(false).split(corpus(3, 3), &languages(), &mut rng)?;
        for partition in Partition::ALL {
            assert_eq!(outcome.splits.get(partition).len(), 2);
        }
        Ok(())
    }

    #[test]
    fn test_skewed_ratios_still_fill_train() -> Result<()> {
        let splitter = Splitter::new(SplitRatios::new(0.2, 0.4, 0.4)?, false, 0.05);
        assert_eq!(splitter.partition_sizes(4), Some((1, 1, 2)));
        assert_eq!(splitter.partition_sizes(3), Some((1, 1, 1)));
        assert_eq!(splitter.partition_sizes(2), None);

        let mut rng = StdRng::seed_from_u64(5);
        let outcome = splitter.split(corpus(4, 4), &languages(), &mut rng)?;
        for partition in Partition::ALL {
            let counts = outcome.splits.language_counts(partition);
            assert!(counts[&label("en")] >= 1);
            assert!(counts[&label("shona")] >= 1);
        }
        assert_eq!(outcome.splits.len(), 8);
        Ok(())
    }

    #[test]
    fn test_too_small_fails() {
        let mut rng = StdRng::seed_from_u64(1);
        let err = splitter(false).split(corpus(10, 2), &languages(), &mut rng).unwrap_err();
        match err {
            PipelineError::InsufficientData { language, available, .. } => {
                assert_eq!(language, "shona");
                assert_eq!(available, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_balance_against_empty_language_fails() {
        let mut rng = StdRng::seed_from_u64(1);
        let err = splitter(true).split(corpus(0, 3), &languages(), &mut rng).unwrap_err();
        assert!(matches!(err, PipelineError::InsufficientData { available: 0, .. }));
    }
}
