//! Extraction prompt construction.

use crate::SampleBounds;

/// One extraction call: the (possibly truncated) source text and the token
/// range each sample must hit.
#[derive(Debug, Clone)]
pub struct ExtractionRequest<'a> {
    pub text: &'a str,
    pub bounds: SampleBounds,
}

impl<'a> ExtractionRequest<'a> {
    pub fn new(text: &'a str, bounds: SampleBounds) -> Self {
        Self { text, bounds }
    }

    pub fn prompt(&self) -> String {
        build_extraction_prompt(self.text, self.bounds.min_tokens, self.bounds.max_tokens)
    }
}

/// Build the instruction asking the model to carve samples out of `text`.
///
/// Pure template substitution: the same inputs always produce the same prompt.
pub fn build_extraction_prompt(text: &str, min_tokens: usize, max_tokens: usize) -> String {
    format!(
        r#"Extract clean training samples from this text. Each sample MUST be {min_tokens}-{max_tokens} tokens (count tokens precisely).

CRITICAL RULES:
1. Token count: MINIMUM {min_tokens}, MAXIMUM {max_tokens} tokens per sample - COUNT CAREFULLY
2. Target length: 2-3 complete sentences per sample
3. Clean English prose - no citations, no URLs, no footnotes
4. Complete sentences with proper punctuation
5. Natural endings - no mid-sentence cuts
6. Output format: a list of strings and nothing else: ["sample1", "sample2", ...]

EXAMPLES OF CORRECT LENGTH ({min_tokens}-{max_tokens} tokens):
Example: "Serious doubts exist about the fourth commandment's binding nature. Thousands of congregations recite prayers after hearing it read, asking God to incline their hearts to keep this law. This prayer may express desire for grace or amount to a solemn mockery."

TOO SHORT (under {min_tokens} tokens): "The boy was curious."
TOO LONG (over {max_tokens} tokens): Very long paragraphs spanning many sentences

TEXT TO PROCESS:
{text}

OUTPUT (a list of strings only):
"#
    )
}
