//! The corpus pipeline: Loader → Cleaner → Splitter → Writer.

mod error;
mod record;
mod utils;
pub mod builder;
pub mod cleaner;
pub mod loader;
pub mod pipeline;
pub mod splitter;
pub mod writer;

pub use error::{PipelineError, Result};
pub use record::{LanguageLabel, Partition, RawRecord, SentenceRecord};
pub use builder::PipelineBuilder;
pub use cleaner::{Cleaner, CleanerSettings, CleaningStats, RejectReason, Verdict};
pub use loader::Loader;
pub use pipeline::{PartitionReport, Pipeline, RunReport};
pub use splitter::{SplitOutcome, Splits, Splitter};
pub use writer::{format_line, parse_line, Writer};
