//! Text-generation seam.
//!
//! The pipeline never talks to a model directly; it goes through
//! [`InferenceClient`], which pins the sampling parameters for every call.

use crate::{InferenceError, DEFAULT_MAX_COMPLETION_TOKENS, DEFAULT_TEMPERATURE};

/// Sampling parameters sent with each completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingParams {
    pub temperature: f32,
    pub max_tokens: usize,
    pub stop: Vec<String>,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_COMPLETION_TOKENS,
            stop: Vec::new(),
        }
    }
}

/// Trait for a single-turn text-generation backend.
pub trait TextGenerator {
    /// Complete `prompt` and return the raw generated text.
    fn complete(&self, prompt: &str, params: &SamplingParams) -> Result<String, InferenceError>;
}

impl<G: TextGenerator + ?Sized> TextGenerator for &G {
    fn complete(&self, prompt: &str, params: &SamplingParams) -> Result<String, InferenceError> {
        (*self).complete(prompt, params)
    }
}

impl<G: TextGenerator + ?Sized> TextGenerator for Box<G> {
    fn complete(&self, prompt: &str, params: &SamplingParams) -> Result<String, InferenceError> {
        (**self).complete(prompt, params)
    }
}

/// A generator bound to fixed sampling parameters.
pub struct InferenceClient<G> {
    generator: G,
    params: SamplingParams,
}

impl<G: TextGenerator> InferenceClient<G> {
    pub fn new(generator: G, params: SamplingParams) -> Self {
        Self { generator, params }
    }

    /// Send `prompt` as a single turn and return the raw completion.
    pub fn generate(&self, prompt: &str) -> Result<String, InferenceError> {
        self.generator.complete(prompt, &self.params)
    }
}
