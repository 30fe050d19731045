//! CLI for distilling raw Gutenberg samples into short training excerpts.
//!
//! Reads `sample_{index}.json` files, asks a locally served model to extract
//! token-bounded excerpts from each, and writes one
//! `sample_{index:05}_processed.json` per document. Re-running the same range
//! only processes documents that have no record yet.

mod hf;
mod llama;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use gutenberg_distill_core::{
    run_batch, Distiller, FailurePolicy, IndexWindow, InferenceClient, PipelineConfig, RunSummary,
    SampleBounds, SamplingParams, DEFAULT_MAX_COMPLETION_TOKENS, DEFAULT_TEMPERATURE, MAX_INPUT_TOKENS,
    MAX_TOKENS_PER_SAMPLE, MIN_TOKENS_PER_SAMPLE,
};

use crate::hf::RustTokenizer;
use crate::llama::{CompletionApi, HttpGenerator};

/// What to do when the model call for one document fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OnError {
    /// Log it and continue with the next document
    Skip,
    /// Stop the run
    Abort,
}

impl From<OnError> for FailurePolicy {
    fn from(value: OnError) -> Self {
        match value {
            OnError::Skip => FailurePolicy::Skip,
            OnError::Abort => FailurePolicy::Abort,
        }
    }
}

/// Extract token-bounded training samples from raw text with a local LLM.
#[derive(Parser, Debug)]
#[command(name = "gutenberg-distill")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// First source index to process (inclusive)
    #[arg(long, alias = "min_index", default_value = "0")]
    min_index: usize,

    /// Source index to stop at (exclusive); defaults to past the last input
    #[arg(long, alias = "max_index")]
    max_index: Option<usize>,

    /// Directory containing sample_{index}.json input files
    #[arg(long, default_value = "gutenberg-raw-samples")]
    input_dir: PathBuf,

    /// Directory receiving sample_{index:05}_processed.json records
    #[arg(long, default_value = "gutenberg-processed-samples")]
    output_dir: PathBuf,

    /// HuggingFace tokenizer model name or path to tokenizer.json
    #[arg(long, default_value = "Qwen/Qwen2.5-Coder-7B-Instruct")]
    tokenizer: String,

    /// Base URL of the completion server
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    endpoint: String,

    /// Completion API spoken by the server
    #[arg(long, value_enum, default_value_t = CompletionApi::Llamacpp)]
    api: CompletionApi,

    /// Model name sent with OpenAI-compatible requests
    #[arg(long)]
    model: Option<String>,

    /// Minimum tokens per extracted sample
    #[arg(long, default_value_t = MIN_TOKENS_PER_SAMPLE)]
    min_tokens: usize,

    /// Maximum tokens per extracted sample
    #[arg(long, default_value_t = MAX_TOKENS_PER_SAMPLE)]
    max_tokens: usize,

    /// Source text beyond this many tokens is cut before prompting
    #[arg(long, default_value_t = MAX_INPUT_TOKENS)]
    max_input_tokens: usize,

    /// Sampling temperature
    #[arg(long, default_value_t = DEFAULT_TEMPERATURE)]
    temperature: f32,

    /// Maximum tokens generated per document
    #[arg(long, default_value_t = DEFAULT_MAX_COMPLETION_TOKENS)]
    max_completion_tokens: usize,

    /// Per-request timeout in seconds
    #[arg(long, default_value = "600")]
    timeout_secs: u64,

    /// Behaviour when the model call for a document fails
    #[arg(long, value_enum, default_value_t = OnError::Skip)]
    on_inference_error: OnError,

    /// Write the run summary as JSON to this path (optional)
    #[arg(long)]
    summary_out: Option<PathBuf>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_target(false).try_init();
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();

    if args.min_tokens > args.max_tokens {
        anyhow::bail!(
            "--min-tokens ({}) must not exceed --max-tokens ({})",
            args.min_tokens,
            args.max_tokens
        );
    }

    info!("loading tokenizer from {}", args.tokenizer);
    let tokenizer = RustTokenizer::load(&args.tokenizer)?;
    info!(vocab_size = tokenizer.vocab_size(), "tokenizer loaded");

    let generator = HttpGenerator::new(
        &args.endpoint,
        args.api,
        args.model.clone(),
        Duration::from_secs(args.timeout_secs),
    )?;
    let params = SamplingParams {
        temperature: args.temperature,
        max_tokens: args.max_completion_tokens,
        stop: Vec::new(),
    };
    info!(endpoint = %args.endpoint, api = ?args.api, "using completion server");

    let config = PipelineConfig {
        input_dir: args.input_dir.clone(),
        output_dir: args.output_dir.clone(),
        bounds: SampleBounds::new(args.min_tokens, args.max_tokens),
        max_input_tokens: args.max_input_tokens,
        failure_policy: args.on_inference_error.into(),
    };
    let distiller = Distiller::from_config(tokenizer, InferenceClient::new(generator, params), &config);
    let window = IndexWindow::new(args.min_index, args.max_index);

    let summary = run_batch(&distiller, &config, window)?;
    print_summary(&summary, &config);

    if let Some(path) = &args.summary_out {
        let metadata = serde_json::json!({
            "config": {
                "input_dir": config.input_dir.to_string_lossy(),
                "output_dir": config.output_dir.to_string_lossy(),
                "tokenizer": args.tokenizer,
                "endpoint": args.endpoint,
                "min_tokens": config.bounds.min_tokens,
                "max_tokens": config.bounds.max_tokens,
                "max_input_tokens": config.max_input_tokens,
                "temperature": args.temperature,
                "max_completion_tokens": args.max_completion_tokens,
            },
            "summary": summary,
        });
        std::fs::write(path, serde_json::to_string_pretty(&metadata)?)
            .with_context(|| format!("failed to write summary to {:?}", path))?;
        println!("  Summary: {:?}", path);
    }

    Ok(())
}

fn print_summary(summary: &RunSummary, config: &PipelineConfig) {
    println!("\n[summary]");
    println!("  Range: {}..{}", summary.min_index, summary.max_index);
    println!("  Samples processed: {}", summary.processed);
    println!("  Records written: {}", summary.records_written);
    println!("  Skipped (already processed): {}", summary.skipped);
    println!("  Failed: {}", summary.failed);
    println!("  Total training samples generated: {}", summary.total_samples);
    println!(
        "  Processing time: {:.1}s ({:.1} minutes)",
        summary.elapsed_secs,
        summary.elapsed_secs / 60.0
    );
    if summary.processed > 0 {
        println!("  Average time per sample: {:.2}s", summary.mean_item_secs);
    }
    println!("  Output: {:?}", config.output_dir);
}
