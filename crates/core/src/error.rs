//! Error types for the extraction pipeline.
//!
//! Per-item failures (`ItemError`) are contained to one document; run-level
//! failures (`PipelineError`) stop the batch.

use std::path::PathBuf;

use thiserror::Error;

/// The external tokenizer could not encode or decode a string.
#[derive(Debug, Error)]
#[error("tokenizer failure: {message}")]
pub struct TokenizerError {
    pub message: String,
}

impl TokenizerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// The text-generation capability failed to produce a completion.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("inference timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("inference transport error: {0}")]
    Transport(String),

    #[error("inference backend rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("malformed inference response: {0}")]
    MalformedResponse(String),
}

/// A failure confined to a single source document.
#[derive(Debug, Error)]
pub enum ItemError {
    #[error("failed to load {path:?}: {reason}")]
    Load { path: PathBuf, reason: String },

    #[error(transparent)]
    Tokenizer(#[from] TokenizerError),

    #[error(transparent)]
    Inference(#[from] InferenceError),
}

/// A failure that ends the whole run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no input samples found in {0:?}")]
    InputMissing(PathBuf),

    #[error("invalid range: min_index={min_index}, max_index={max_index}")]
    InvalidRange { min_index: usize, max_index: usize },

    #[error("failed to persist record for sample {index}: {source}")]
    Persist {
        index: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("sample {index} failed: {source}")]
    Item {
        index: usize,
        #[source]
        source: ItemError,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
