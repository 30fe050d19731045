//! HuggingFace tokenizer adapter.

use std::path::Path;

use gutenberg_distill_core::{Tokenizer, TokenizerError};
use tokenizers::Tokenizer as HfTokenizer;

/// Wrapper around HuggingFace tokenizers for token counting and truncation.
pub struct RustTokenizer {
    inner: HfTokenizer,
}

impl RustTokenizer {
    /// Load a tokenizer from a local `tokenizer.json` or a Hub model id.
    pub fn load(name_or_path: &str) -> anyhow::Result<Self> {
        let inner = if Path::new(name_or_path).is_file() {
            HfTokenizer::from_file(name_or_path)
        } else {
            HfTokenizer::from_pretrained(name_or_path, None)
        }
        .map_err(|e| anyhow::anyhow!("failed to load tokenizer {}: {}", name_or_path, e))?;
        Ok(Self { inner })
    }

    pub fn vocab_size(&self) -> usize {
        self.inner.get_vocab_size(true)
    }

    fn encode_ids(&self, text: &str) -> Result<Vec<u32>, TokenizerError> {
        let encoding = self
            .inner
            .encode(text, false)
            .map_err(|e| TokenizerError::new(e.to_string()))?;
        Ok(encoding.get_ids().to_vec())
    }
}

impl Tokenizer for RustTokenizer {
    fn count_tokens(&self, text: &str) -> Result<usize, TokenizerError> {
        Ok(self.encode_ids(text)?.len())
    }

    fn truncate_to_max_tokens(&self, text: &str, max_tokens: usize) -> Result<String, TokenizerError> {
        let ids = self.encode_ids(text)?;
        if ids.len() <= max_tokens {
            return Ok(text.to_string());
        }

        fit_prefix(
            &ids,
            max_tokens,
            |prefix| {
                self.inner
                    .decode(prefix, true)
                    .map_err(|e| TokenizerError::new(e.to_string()))
            },
            |decoded| self.count_tokens(decoded),
        )
    }
}

/// Decode the longest prefix of `ids` (at most `max_tokens` long) whose text
/// counts as no more than `max_tokens` tokens.
///
/// Cutting a byte-level sequence inside a character decodes to U+FFFD, which
/// can re-encode to more tokens than were kept.
fn fit_prefix<D, C>(ids: &[u32], max_tokens: usize, decode: D, count: C) -> Result<String, TokenizerError>
where
    D: Fn(&[u32]) -> Result<String, TokenizerError>,
    C: Fn(&str) -> Result<usize, TokenizerError>,
{
    let mut keep = max_tokens.min(ids.len());
    loop {
        let text = decode(&ids[..keep])?;
        if keep == 0 || count(&text)? <= max_tokens {
            return Ok(text);
        }
        keep -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // one id per UTF-8 byte, like a byte-level BPE with no merges
    fn decode_bytes(ids: &[u32]) -> Result<String, TokenizerError> {
        let bytes: Vec<u8> = ids.iter().map(|&id| id as u8).collect();
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn count_bytes(text: &str) -> Result<usize, TokenizerError> {
        Ok(text.len())
    }

    fn byte_ids(text: &str) -> Vec<u32> {
        text.bytes().map(u32::from).collect()
    }

    #[test]
    fn test_fit_prefix_on_char_boundary() {
        let ids = byte_ids("abcdef");
        assert_eq!(fit_prefix(&ids, 3, decode_bytes, count_bytes).unwrap(), "abc");
    }

    #[test]
    fn test_fit_prefix_backs_off_split_character() {
        // cutting "é" after its first byte decodes to a 3-byte U+FFFD
        let ids = byte_ids("aé");
        let text = fit_prefix(&ids, 2, decode_bytes, count_bytes).unwrap();
        assert_eq!(text, "a");
        assert!(count_bytes(&text).unwrap() <= 2);
    }

    #[test]
    fn test_fit_prefix_zero_budget() {
        assert_eq!(fit_prefix(&byte_ids("é"), 0, decode_bytes, count_bytes).unwrap(), "");
    }
}
