use std::path::PathBuf;

use anyhow::Context;
use bantu_corpus::{verify_manifest, PipelineBuilder, PipelineConfig, SourceFormat};
use clap::Parser;
use log::info;

/// Cleans raw English and Shona sentences and writes train/validation/test splits
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON config file (defaults to $BANTU_CORPUS_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Source file for a language, as <language>=<path>; repeatable
    #[arg(short, long = "source", value_parser = parse_source)]
    sources: Vec<(String, PathBuf)>,

    /// Source line format: plain or labelled
    #[arg(long, value_parser = parse_format)]
    format: Option<SourceFormat>,

    /// Directory the split files are written to
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Prefix for the split file names, e.g. shona_en_lang_
    #[arg(long)]
    prefix: Option<String>,

    /// Seed for the shuffles behind the split
    #[arg(long)]
    seed: Option<u64>,

    /// Train,validation,test fractions, e.g. 0.8,0.1,0.1
    #[arg(long, value_parser = parse_ratios)]
    ratios: Option<(f64, f64, f64)>,

    /// Downsample every language to the smallest one
    #[arg(long)]
    balance: bool,

    /// Replace existing split files
    #[arg(long)]
    overwrite: bool,

    /// Treat sentences differing only in case as duplicates
    #[arg(long)]
    case_insensitive: bool,

    #[arg(long)]
    min_length: Option<usize>,

    #[arg(long)]
    max_length: Option<usize>,

    #[arg(long)]
    min_tokens: Option<usize>,

    /// Skip writing manifest.json
    #[arg(long)]
    no_manifest: bool,

    /// Print the run report as JSON
    #[arg(long)]
    json: bool,

    /// Verify the manifest in a directory and exit
    #[arg(long, value_name = "DIR")]
    verify: Option<PathBuf>,
}

fn parse_source(value: &str) -> Result<(String, PathBuf), String> {
    match value.split_once('=') {
        Some((language, path)) if !language.is_empty() && !path.is_empty() => {
            Ok((language.to_string(), PathBuf::from(path)))
        }
        _ => Err(format!("expected <language>=<path>, got '{}'", value)),
    }
}

fn parse_format(value: &str) -> Result<SourceFormat, String> {
    match value {
        "plain" => Ok(SourceFormat::Plain),
        "labelled" | "labeled" => Ok(SourceFormat::Labelled),
        other => Err(format!("unknown source format '{}' (plain or labelled)", other)),
    }
}

fn parse_ratios(value: &str) -> Result<(f64, f64, f64), String> {
    let parts: Vec<f64> = value
        .split(',')
        .map(|p| p.trim().parse::<f64>().map_err(|e| format!("'{}': {}", p, e)))
        .collect::<Result<_, _>>()?;
    match parts.as_slice() {
        [train, validation, test] => Ok((*train, *validation, *test)),
        _ => Err(format!("expected three comma-separated fractions, got '{}'", value)),
    }
}

fn build(args: &Args) -> anyhow::Result<PipelineBuilder> {
    let config = match args.config.clone().or_else(PipelineConfig::path_from_env) {
        Some(path) => PipelineConfig::from_file(&path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    let mut builder = PipelineBuilder::from_config(config);
    for (language, path) in &args.sources {
        builder = builder.add_source(language, path.clone())?;
    }
    if let Some(format) = args.format {
        builder = builder.with_source_format(format);
    }
    if let Some(dir) = &args.output_dir {
        builder = builder.with_output_dir(dir.clone());
    }
    if let Some(prefix) = &args.prefix {
        builder = builder.with_file_prefix(prefix.clone());
    }
    if let Some(seed) = args.seed {
        builder = builder.with_seed(seed);
    }
    if let Some((train, validation, test)) = args.ratios {
        builder = builder.with_ratios(train, validation, test)?;
    }
    if args.min_length.is_some() || args.max_length.is_some() {
        let min_length = args.min_length.unwrap_or(builder.config().min_length);
        let max_length = args.max_length.unwrap_or(builder.config().max_length);
        builder = builder.with_length_bounds(min_length, max_length)?;
    }
    if let Some(min_tokens) = args.min_tokens {
        builder = builder.with_min_tokens(min_tokens);
    }
    if args.balance {
        builder = builder.with_balance(true);
    }
    if args.overwrite {
        builder = builder.with_overwrite(true);
    }
    if args.case_insensitive {
        builder = builder.with_case_sensitive_dedup(false);
    }
    if args.no_manifest {
        builder = builder.with_manifest(false);
    }
    Ok(builder)
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    if let Some(dir) = &args.verify {
        let manifest = verify_manifest(dir)
            .with_context(|| format!("Verification failed for {}", dir.display()))?;
        println!("{} files verified in {}", manifest.files.len(), dir.display());
        return Ok(());
    }

    let builder = build(&args)?;
    let pipeline = builder
        .build()
        .context("Invalid configuration (sources come from --source <language>=<path> or a config file)")?;

    info!("Writing splits to {}", pipeline.config().output_dir.display());
    let report = pipeline.run().context("Corpus build failed")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report);
    }
    Ok(())
}
