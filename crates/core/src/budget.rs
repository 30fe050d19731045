//! Token-budget truncation of source text before it is embedded in a prompt.

use tracing::info;

use crate::{Tokenizer, TokenizerError};

/// Source text fitted to an input token budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenWindow {
    pub text: String,
    pub original_tokens: usize,
    pub kept_tokens: usize,
}

/// Fit `text` into `max_tokens`.
///
/// Text already within budget comes back unchanged. Longer text keeps its
/// first `max_tokens` tokens and is decoded back to a string, which may cut a
/// sentence in half; the extraction prompt only needs a best-effort window.
pub fn truncate_to_token_budget<T>(tokenizer: &T, text: &str, max_tokens: usize) -> Result<TokenWindow, TokenizerError>
where
    T: Tokenizer + ?Sized,
{
    let original_tokens = tokenizer.count_tokens(text)?;
    if original_tokens <= max_tokens {
        return Ok(TokenWindow {
            text: text.to_string(),
            original_tokens,
            kept_tokens: original_tokens,
        });
    }

    let truncated = tokenizer.truncate_to_max_tokens(text, max_tokens)?;
    info!(original_tokens, kept_tokens = max_tokens, "truncated source text");

    Ok(TokenWindow {
        text: truncated,
        original_tokens,
        kept_tokens: max_tokens,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::WordTokenizer;

    #[test]
    fn test_within_budget_is_unchanged() {
        let text = "one two  three\nfour";
        let window = truncate_to_token_budget(&WordTokenizer, text, 4).unwrap();
        assert_eq!(window.text, text);
        assert_eq!((window.original_tokens, window.kept_tokens), (4, 4));
    }

    #[test]
    fn test_over_budget_is_cut_to_budget() {
        let text = (0..50).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ");
        let window = truncate_to_token_budget(&WordTokenizer, &text, 10).unwrap();
        assert_eq!(window.original_tokens, 50);
        assert_eq!(window.kept_tokens, 10);
        assert!(WordTokenizer.count_tokens(&window.text).unwrap() <= 10);
        assert!(window.text.starts_with("w0 w1"));
    }

    #[test]
    fn test_zero_budget() {
        let window = truncate_to_token_budget(&WordTokenizer, "a b c", 0).unwrap();
        assert_eq!(window.text, "");
        assert_eq!(window.kept_tokens, 0);
    }
}
