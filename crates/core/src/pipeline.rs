//! Batch pipeline turning raw source documents into processed records.
//!
//! A run discovers the input files, narrows them to an index window, drops the
//! indices that already have a record, and then extracts the rest one at a
//! time in ascending index order. Documents whose extraction yields nothing
//! are not recorded, so the next run over the same window retries them.

use std::ops::Range;
use std::path::PathBuf;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::budget::truncate_to_token_budget;
use crate::inference::{InferenceClient, TextGenerator};
use crate::literal::parse_sample_list;
use crate::prompt::ExtractionRequest;
use crate::source::{discover_sources, SourceDocument};
use crate::store::{ProcessedRecord, RecordStore};
use crate::validate::{validate, ValidationReport};
use crate::{ItemError, PipelineError, SampleBounds, Tokenizer, MAX_INPUT_TOKENS};

/// What to do when a single document fails to load, tokenize or generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Log the failure, leave the index unrecorded and move on.
    #[default]
    Skip,
    /// Stop the run at the first failing document.
    Abort,
}

/// Configuration for the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub bounds: SampleBounds,
    pub max_input_tokens: usize,
    pub failure_policy: FailurePolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("gutenberg-raw-samples"),
            output_dir: PathBuf::from("gutenberg-processed-samples"),
            bounds: SampleBounds::default(),
            max_input_tokens: MAX_INPUT_TOKENS,
            failure_policy: FailurePolicy::Skip,
        }
    }
}

/// Half-open `[min_index, max_index)` selection of source indices.
/// `max_index` defaults to one past the highest discovered index, so an
/// unbounded window covers every document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexWindow {
    pub min_index: usize,
    pub max_index: Option<usize>,
}

impl IndexWindow {
    pub fn new(min_index: usize, max_index: Option<usize>) -> Self {
        Self { min_index, max_index }
    }

    /// Resolve against `end`, one past the highest discovered index.
    pub fn resolve(&self, end: usize) -> Result<Range<usize>, PipelineError> {
        let max_index = self.max_index.unwrap_or(end);
        if self.min_index >= max_index {
            return Err(PipelineError::InvalidRange {
                min_index: self.min_index,
                max_index,
            });
        }
        Ok(self.min_index..max_index)
    }
}

/// Result of a batch run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub min_index: usize,
    pub max_index: usize,
    pub discovered: usize,
    pub selected: usize,
    pub skipped: usize,
    /// Documents sent through extraction, including those that yielded nothing.
    pub processed: usize,
    pub records_written: usize,
    pub failed: usize,
    pub total_samples: usize,
    pub elapsed_secs: f64,
    pub mean_item_secs: f64,
}

/// Extraction context: the tokenizer and model every stage works through.
pub struct Distiller<T, G> {
    tokenizer: T,
    client: InferenceClient<G>,
    bounds: SampleBounds,
    max_input_tokens: usize,
}

impl<T, G> Distiller<T, G>
where
    T: Tokenizer,
    G: TextGenerator,
{
    pub fn new(tokenizer: T, client: InferenceClient<G>, bounds: SampleBounds, max_input_tokens: usize) -> Self {
        Self {
            tokenizer,
            client,
            bounds,
            max_input_tokens,
        }
    }

    pub fn from_config(tokenizer: T, client: InferenceClient<G>, config: &PipelineConfig) -> Self {
        Self::new(tokenizer, client, config.bounds, config.max_input_tokens)
    }

    pub fn bounds(&self) -> SampleBounds {
        self.bounds
    }

    /// Truncate, prompt, generate and parse. An unparseable answer is an
    /// empty list, not an error.
    pub fn extract(&self, text: &str) -> Result<Vec<String>, ItemError> {
        let window = truncate_to_token_budget(&self.tokenizer, text, self.max_input_tokens)?;
        let prompt = ExtractionRequest::new(&window.text, self.bounds).prompt();
        let completion = self.client.generate(&prompt)?;
        Ok(parse_sample_list(&completion))
    }

    pub fn validate(&self, samples: &[String]) -> Result<ValidationReport, ItemError> {
        Ok(validate(&self.tokenizer, samples, self.bounds.max_tokens)?)
    }

    /// Run one document through extraction and validation.
    ///
    /// Returns `None` when the model produced no samples.
    pub fn process(&self, doc: &SourceDocument) -> Result<Option<ProcessedRecord>, ItemError> {
        let started = Instant::now();
        let samples = self.extract(&doc.text)?;
        let processing_time = started.elapsed().as_secs_f64();

        if samples.is_empty() {
            return Ok(None);
        }

        let statistics = self.validate(&samples)?;
        Ok(Some(ProcessedRecord {
            source_index: doc.index,
            samples,
            statistics,
            processing_time,
        }))
    }
}

/// Progress accounting for ETA reporting.
#[derive(Debug)]
struct Progress {
    started: Instant,
    total: usize,
    attempted: usize,
}

impl Progress {
    fn new(total: usize) -> Self {
        Self {
            started: Instant::now(),
            total,
            attempted: 0,
        }
    }

    fn tick(&mut self) {
        self.attempted += 1;
    }

    fn eta_secs(&self) -> f64 {
        eta_secs(self.started.elapsed().as_secs_f64(), self.attempted, self.total)
    }
}

/// Remaining time assuming each outstanding item takes the average so far.
fn eta_secs(elapsed_secs: f64, attempted: usize, total: usize) -> f64 {
    if attempted == 0 {
        return 0.0;
    }
    let avg = elapsed_secs / attempted as f64;
    total.saturating_sub(attempted) as f64 * avg
}

/// Process every unrecorded document in `window`.
///
/// Fails without side effects when there is no input or the window selects
/// nothing. Persistence errors always end the run; per-document errors follow
/// `config.failure_policy`.
pub fn run_batch<T, G>(
    distiller: &Distiller<T, G>,
    config: &PipelineConfig,
    window: IndexWindow,
) -> Result<RunSummary, PipelineError>
where
    T: Tokenizer,
    G: TextGenerator,
{
    info!("scanning input samples from {:?}", config.input_dir);
    let entries = discover_sources(&config.input_dir);
    if entries.is_empty() {
        return Err(PipelineError::InputMissing(config.input_dir.clone()));
    }
    info!("found {} raw samples", entries.len());

    let end = entries.last().map_or(0, |e| e.index + 1);
    let range = window.resolve(end)?;
    let selected: Vec<_> = entries.iter().filter(|e| range.contains(&e.index)).collect();
    if selected.is_empty() {
        return Err(PipelineError::InvalidRange {
            min_index: range.start,
            max_index: range.end,
        });
    }
    info!("processing samples {} to {}", range.start, range.end - 1);

    let store = RecordStore::new(&config.output_dir);
    let done = store.completed_indices()?;
    let pending: Vec<_> = selected.iter().filter(|e| !done.contains(&e.index)).collect();
    let skipped = selected.len() - pending.len();
    if skipped > 0 {
        info!("found {} already processed in range - will skip", skipped);
    }

    std::fs::create_dir_all(store.dir())?;
    info!(
        min_tokens = distiller.bounds().min_tokens,
        max_tokens = distiller.bounds().max_tokens,
        "extracting {} samples",
        pending.len()
    );

    let mut summary = RunSummary {
        min_index: range.start,
        max_index: range.end,
        discovered: entries.len(),
        selected: selected.len(),
        skipped,
        ..Default::default()
    };
    let mut progress = Progress::new(pending.len());

    for entry in pending {
        let index = entry.index;
        let outcome = entry.load().and_then(|doc| distiller.process(&doc));
        progress.tick();

        let record = match outcome {
            Ok(record) => record,
            Err(source) => {
                summary.failed += 1;
                match config.failure_policy {
                    FailurePolicy::Skip => {
                        warn!(index, error = %source, "sample {}: failed, leaving it for a later run", index);
                        continue;
                    }
                    FailurePolicy::Abort => return Err(PipelineError::Item { index, source }),
                }
            }
        };
        summary.processed += 1;

        let Some(record) = record else {
            warn!(index, "sample {}: no samples generated", index);
            continue;
        };

        let sample_count = record.samples.len();
        let item_secs = record.processing_time;
        if !store.write(&record)? {
            warn!(index, "sample {}: record appeared during the run, keeping the existing one", index);
            continue;
        }
        summary.records_written += 1;
        summary.total_samples += sample_count;

        match &record.statistics.statistics {
            Some(stats) => info!(
                index,
                "sample {}: {} samples (tokens: {}-{}, mean={:.1}, over_limit={}) [{:.1}s] progress: {}/{} eta: {:.1}m",
                index,
                sample_count,
                stats.min_tokens,
                stats.max_tokens,
                stats.mean_tokens,
                stats.over_limit,
                item_secs,
                progress.attempted,
                progress.total,
                progress.eta_secs() / 60.0
            ),
            None => debug!(index, "sample {}: record written without statistics", index),
        }
    }

    summary.elapsed_secs = progress.started.elapsed().as_secs_f64();
    if summary.processed > 0 {
        summary.mean_item_secs = summary.elapsed_secs / summary.processed as f64;
    }
    info!(
        processed = summary.processed,
        written = summary.records_written,
        failed = summary.failed,
        total_samples = summary.total_samples,
        "run complete in {:.1}s",
        summary.elapsed_secs
    );

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedGenerator, WordTokenizer};
    use crate::{InferenceError, SamplingParams};
    use tempfile::TempDir;

    const REPLY: &str = "Sure! Here are the samples:\n[\"one two three\", \"four five\"]\nLet me know.";

    struct Fixture {
        _temp: TempDir,
        config: PipelineConfig,
    }

    impl Fixture {
        fn with_inputs(indices: &[usize]) -> Self {
            let temp = TempDir::new().unwrap();
            let input_dir = temp.path().join("raw");
            std::fs::create_dir_all(&input_dir).unwrap();
            for i in indices {
                let body = serde_json::json!({ "text": format!("Document number {} has some words.", i) });
                std::fs::write(input_dir.join(format!("sample_{}.json", i)), body.to_string()).unwrap();
            }
            let config = PipelineConfig {
                input_dir,
                output_dir: temp.path().join("processed"),
                bounds: SampleBounds::new(2, 3),
                ..Default::default()
            };
            Self { _temp: temp, config }
        }

        fn store(&self) -> RecordStore {
            RecordStore::new(&self.config.output_dir)
        }

        fn run(&self, generator: &ScriptedGenerator, window: IndexWindow) -> Result<RunSummary, PipelineError> {
            let client = InferenceClient::new(generator, SamplingParams::default());
            let distiller = Distiller::from_config(WordTokenizer, client, &self.config);
            run_batch(&distiller, &self.config, window)
        }
    }

    #[test]
    fn test_run_writes_records() {
        let fx = Fixture::with_inputs(&[0, 1, 2]);
        let generator = ScriptedGenerator::constant(REPLY);

        let summary = fx.run(&generator, IndexWindow::default()).unwrap();
        assert_eq!(generator.calls(), 3);
        assert_eq!(summary.processed, 3);
        assert_eq!(summary.records_written, 3);
        assert_eq!(summary.total_samples, 6);
        assert_eq!((summary.min_index, summary.max_index), (0, 3));

        let record = fx.store().load(1).unwrap();
        assert_eq!(record.source_index, 1);
        assert_eq!(record.samples, vec!["one two three", "four five"]);
        let stats = record.statistics.statistics.unwrap();
        assert_eq!((stats.min_tokens, stats.max_tokens, stats.over_limit), (2, 3, 0));
        assert!(record.statistics.valid);
    }

    #[test]
    fn test_output_shape() {
        let fx = Fixture::with_inputs(&[0]);
        fx.run(&ScriptedGenerator::constant(REPLY), IndexWindow::default()).unwrap();

        let raw = std::fs::read_to_string(fx.store().record_path(0)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["source_index"], 0);
        assert_eq!(value["statistics"]["num_samples"], 2);
        assert_eq!(value["statistics"]["valid"], true);
        assert!(value["processing_time"].is_f64());
    }

    #[test]
    fn test_second_run_is_idempotent() {
        let fx = Fixture::with_inputs(&[0, 1, 2]);
        fx.run(&ScriptedGenerator::constant(REPLY), IndexWindow::default()).unwrap();
        let before: Vec<String> = (0..3)
            .map(|i| std::fs::read_to_string(fx.store().record_path(i)).unwrap())
            .collect();

        let generator = ScriptedGenerator::constant("[\"different\"]");
        let summary = fx.run(&generator, IndexWindow::default()).unwrap();
        assert_eq!(generator.calls(), 0);
        assert_eq!(summary.skipped, 3);
        assert_eq!(summary.records_written, 0);

        let after: Vec<String> = (0..3)
            .map(|i| std::fs::read_to_string(fx.store().record_path(i)).unwrap())
            .collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_existing_record_is_skipped() {
        let fx = Fixture::with_inputs(&[5, 6, 7, 8]);
        let existing = ProcessedRecord {
            source_index: 7,
            samples: vec!["already here".to_string()],
            statistics: ValidationReport::empty(),
            processing_time: 0.0,
        };
        assert!(fx.store().write(&existing).unwrap());

        let generator = ScriptedGenerator::constant(REPLY);
        let summary = fx.run(&generator, IndexWindow::new(5, Some(9))).unwrap();
        assert_eq!(generator.calls(), 3);
        assert!(generator.prompts.borrow().iter().all(|p| !p.contains("Document number 7 ")));
        assert_eq!(summary.skipped, 1);
        assert_eq!(fx.store().load(7).unwrap(), existing);
    }

    #[test]
    fn test_empty_extraction_is_retried() {
        let fx = Fixture::with_inputs(&[3, 4]);
        let generator = ScriptedGenerator::sequence(vec![
            Ok(REPLY.to_string()),
            Ok("I could not find any suitable passages.".to_string()),
        ]);
        let summary = fx.run(&generator, IndexWindow::default()).unwrap();
        assert_eq!(summary.processed, 2);
        assert_eq!(summary.records_written, 1);
        assert!(!fx.store().record_path(4).exists());

        let retry = ScriptedGenerator::constant(REPLY);
        let summary = fx.run(&retry, IndexWindow::default()).unwrap();
        assert_eq!(retry.calls(), 1);
        assert!(retry.prompts.borrow()[0].contains("Document number 4 "));
        assert_eq!(summary.records_written, 1);
        assert!(fx.store().record_path(4).exists());
    }

    #[test]
    fn test_default_window_covers_one_based_inputs() {
        let fx = Fixture::with_inputs(&[1, 2, 3]);
        let generator = ScriptedGenerator::constant(REPLY);

        let summary = fx.run(&generator, IndexWindow::default()).unwrap();
        assert_eq!(generator.calls(), 3);
        assert_eq!((summary.discovered, summary.selected), (3, 3));
        assert_eq!((summary.min_index, summary.max_index), (0, 4));
        assert!((1..=3).all(|i| fx.store().record_path(i).exists()));
    }

    #[test]
    fn test_window_past_every_document_is_rejected() {
        let fx = Fixture::with_inputs(&[3, 4]);
        let generator = ScriptedGenerator::constant(REPLY);

        let err = fx.run(&generator, IndexWindow::new(0, Some(2))).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidRange { min_index: 0, max_index: 2 }));
        assert_eq!(generator.calls(), 0);
        assert!(!fx.config.output_dir.exists());
    }

    #[test]
    fn test_invalid_range_has_no_side_effects() {
        let fx = Fixture::with_inputs(&[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11]);
        let generator = ScriptedGenerator::constant(REPLY);

        for (min, max) in [(5, 5), (10, 3)] {
            let err = fx.run(&generator, IndexWindow::new(min, Some(max))).unwrap_err();
            assert!(matches!(err, PipelineError::InvalidRange { .. }));
        }
        assert_eq!(generator.calls(), 0);
        assert!(!fx.config.output_dir.exists());
    }

    #[test]
    fn test_missing_input() {
        let fx = Fixture::with_inputs(&[]);
        let err = fx.run(&ScriptedGenerator::constant(REPLY), IndexWindow::default()).unwrap_err();
        assert!(matches!(err, PipelineError::InputMissing(_)));
        assert!(!fx.config.output_dir.exists());
    }

    #[test]
    fn test_inference_failure_skips_item() {
        let fx = Fixture::with_inputs(&[0, 1]);
        let generator = ScriptedGenerator::sequence(vec![
            Err(InferenceError::Timeout { secs: 30 }),
            Ok(REPLY.to_string()),
        ]);

        let summary = fx.run(&generator, IndexWindow::default()).unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.processed, 1);
        assert!(!fx.store().record_path(0).exists());
        assert!(fx.store().record_path(1).exists());
    }

    #[test]
    fn test_inference_failure_aborts_when_asked() {
        let mut fx = Fixture::with_inputs(&[0, 1]);
        fx.config.failure_policy = FailurePolicy::Abort;
        let generator = ScriptedGenerator::sequence(vec![Err(InferenceError::Rejected {
            status: 500,
            message: "out of memory".to_string(),
        })]);

        let err = fx.run(&generator, IndexWindow::default()).unwrap_err();
        assert!(matches!(err, PipelineError::Item { index: 0, .. }));
        assert_eq!(generator.calls(), 1);
    }

    #[test]
    fn test_malformed_input_is_a_per_item_failure() {
        let fx = Fixture::with_inputs(&[0, 1]);
        std::fs::write(fx.config.input_dir.join("sample_0.json"), "not json").unwrap();

        let generator = ScriptedGenerator::constant(REPLY);
        let summary = fx.run(&generator, IndexWindow::default()).unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(generator.calls(), 1);
    }

    #[test]
    fn test_items_run_in_index_order() {
        let fx = Fixture::with_inputs(&[2, 10, 1]);
        let generator = ScriptedGenerator::constant(REPLY);
        fx.run(&generator, IndexWindow::new(0, Some(11))).unwrap();

        let order: Vec<usize> = generator
            .prompts
            .borrow()
            .iter()
            .map(|p| {
                [1, 2, 10]
                    .into_iter()
                    .find(|i| p.contains(&format!("Document number {} ", i)))
                    .unwrap()
            })
            .collect();
        assert_eq!(order, vec![1, 2, 10]);
    }

    #[test]
    fn test_source_is_truncated_before_prompting() {
        let mut fx = Fixture::with_inputs(&[0]);
        fx.config.max_input_tokens = 3;
        std::fs::write(
            fx.config.input_dir.join("sample_0.json"),
            r#"{"text": "one two three four five six"}"#,
        )
        .unwrap();

        let generator = ScriptedGenerator::constant(REPLY);
        fx.run(&generator, IndexWindow::default()).unwrap();
        assert!(generator.prompts.borrow()[0].contains("TEXT TO PROCESS:\none two three\n\nOUTPUT"));
    }

    #[test]
    fn test_window_resolve() {
        assert_eq!(IndexWindow::default().resolve(4).unwrap(), 0..4);
        assert_eq!(IndexWindow::new(2, Some(100)).resolve(4).unwrap(), 2..100);
        assert!(IndexWindow::new(4, None).resolve(4).is_err());
        assert!(IndexWindow::new(0, None).resolve(0).is_err());
    }

    #[test]
    fn test_eta() {
        assert_eq!(eta_secs(10.0, 0, 5), 0.0);
        assert_eq!(eta_secs(10.0, 2, 6), 20.0);
        assert_eq!(eta_secs(10.0, 6, 6), 0.0);
    }
}
