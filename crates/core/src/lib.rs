//! Core extraction pipeline for distilling raw text documents into short,
//! token-bounded training samples.
//!
//! Raw documents are truncated to an input budget, sent to a language model
//! with an extraction prompt, and the model's list-of-strings answer is parsed,
//! measured and persisted as one JSON record per document. Records double as
//! the resume ledger: a document with a record on disk is never sent to the
//! model again.

/// Trait for tokenization operations.
///
/// Implementors provide token counting and truncation capabilities. Encoding
/// must not add special tokens, so counts reflect the text alone.
pub trait Tokenizer {
    /// Count the number of tokens in the given text.
    fn count_tokens(&self, text: &str) -> Result<usize, TokenizerError>;

    /// Truncate text to at most `max_tokens` tokens.
    /// Returns the truncated text.
    fn truncate_to_max_tokens(&self, text: &str, max_tokens: usize) -> Result<String, TokenizerError>;
}

// Blanket implementation for references to Tokenizers
impl<T: Tokenizer + ?Sized> Tokenizer for &T {
    fn count_tokens(&self, text: &str) -> Result<usize, TokenizerError> {
        (*self).count_tokens(text)
    }

    fn truncate_to_max_tokens(&self, text: &str, max_tokens: usize) -> Result<String, TokenizerError> {
        (*self).truncate_to_max_tokens(text, max_tokens)
    }
}

mod budget;
mod error;
pub mod inference;
mod literal;
pub mod pipeline;
mod prompt;
pub mod source;
pub mod store;
mod validate;

pub use budget::{truncate_to_token_budget, TokenWindow};
pub use error::{InferenceError, ItemError, PipelineError, TokenizerError};
pub use inference::{InferenceClient, SamplingParams, TextGenerator};
pub use literal::{parse_sample_list, try_parse_sample_list, ParseError};
pub use pipeline::{run_batch, Distiller, FailurePolicy, IndexWindow, PipelineConfig, RunSummary};
pub use prompt::{build_extraction_prompt, ExtractionRequest};
pub use source::{discover_sources, SourceDocument, SourceEntry};
pub use store::{ProcessedRecord, RecordStore};
pub use validate::{validate, TokenStatistics, ValidationReport};

/// Default lower bound on tokens per extracted sample
pub const MIN_TOKENS_PER_SAMPLE: usize = 77;

/// Default upper bound on tokens per extracted sample
pub const MAX_TOKENS_PER_SAMPLE: usize = 122;

/// Default maximum tokens of source text sent to the model
/// (leaves room for the prompt itself inside an 8K context)
pub const MAX_INPUT_TOKENS: usize = 6000;

/// Default sampling temperature for extraction calls
pub const DEFAULT_TEMPERATURE: f32 = 0.2;

/// Default cap on generated tokens per extraction call
pub const DEFAULT_MAX_COMPLETION_TOKENS: usize = 1024;

/// Inclusive token-count range an extracted sample should satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleBounds {
    pub min_tokens: usize,
    pub max_tokens: usize,
}

impl SampleBounds {
    pub fn new(min_tokens: usize, max_tokens: usize) -> Self {
        Self { min_tokens, max_tokens }
    }
}

impl Default for SampleBounds {
    fn default() -> Self {
        Self {
            min_tokens: MIN_TOKENS_PER_SAMPLE,
            max_tokens: MAX_TOKENS_PER_SAMPLE,
        }
    }
}
