//! Builds the English–Shona language identification corpus.
//!
//! Raw sentence files are read per language, cleaned and deduplicated, split
//! into stratified train/validation/test partitions and written in the
//! `__label__<lang> <sentence>` format read by fastText-style classifiers.
//!
//! # Basic Usage
//!
//! ```no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use bantu_corpus::Pipeline;
//!
//! let report = Pipeline::builder()
//!     .add_source("en", "data/raw/english.txt")?
//!     .add_source("shona", "data/raw/shona.txt")?
//!     .with_balance(true)
//!     .with_seed(42)
//!     .build()?
//!     .run()?;
//!
//! println!("Wrote {} records", report.written());
//! # Ok(())
//! # }
//! ```
//!
//! # Reproducibility
//!
//! The only randomness is a seeded generator created once per run and passed
//! to the [`Splitter`]. The same input, seed and ratios produce byte-identical
//! output files.
//!
//! Deduplication keeps the first occurrence of a sentence, so reordering the
//! sources can change which copy of a duplicate survives.

pub mod config;
pub mod manifest;
pub mod pipeline;

pub use config::{PipelineConfig, SourceFormat, SplitRatios};
pub use manifest::{verify_manifest, Manifest, ManifestEntry};
pub use pipeline::{
    format_line, parse_line, Cleaner, CleanerSettings, LanguageLabel, Loader, Partition, Pipeline,
    PipelineBuilder, PipelineError, RejectReason, RunReport, SentenceRecord, Splits, Splitter,
    Verdict, Writer,
};

pub fn init_logger() {
    env_logger::init();
}
