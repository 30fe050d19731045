//! Token statistics over extracted samples.

use serde::{Deserialize, Serialize};

use crate::{Tokenizer, TokenizerError};

/// Token-count statistics for a non-empty sample list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenStatistics {
    pub num_samples: usize,
    pub max_tokens: usize,
    pub min_tokens: usize,
    pub mean_tokens: f64,
    pub std_tokens: f64,
    /// Samples longer than the configured upper bound. Informational only.
    pub over_limit: usize,
}

/// Result of validating a sample list.
///
/// Serializes to `{"valid": false}` for an empty list, and to the flattened
/// statistics plus `"valid": true` otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    #[serde(flatten)]
    pub statistics: Option<TokenStatistics>,
    pub valid: bool,
}

impl ValidationReport {
    pub fn empty() -> Self {
        Self {
            statistics: None,
            valid: false,
        }
    }
}

/// Measure `samples` with `tokenizer`, counting those above `max_tokens`.
pub fn validate<T>(tokenizer: &T, samples: &[String], max_tokens: usize) -> Result<ValidationReport, TokenizerError>
where
    T: Tokenizer + ?Sized,
{
    if samples.is_empty() {
        return Ok(ValidationReport::empty());
    }

    let counts = samples
        .iter()
        .map(|s| tokenizer.count_tokens(s))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ValidationReport {
        statistics: Some(statistics_for(&counts, max_tokens)),
        valid: true,
    })
}

fn statistics_for(counts: &[usize], max_tokens: usize) -> TokenStatistics {
    let n = counts.len() as f64;
    let mean = counts.iter().sum::<usize>() as f64 / n;
    // population variance, matching numpy's default
    let variance = counts
        .iter()
        .map(|&c| {
            let d = c as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;

    TokenStatistics {
        num_samples: counts.len(),
        max_tokens: counts.iter().copied().max().unwrap_or(0),
        min_tokens: counts.iter().copied().min().unwrap_or(0),
        mean_tokens: mean,
        std_tokens: variance.sqrt(),
        over_limit: counts.iter().filter(|&&c| c > max_tokens).count(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::WordTokenizer;

    fn words(n: usize) -> String {
        vec!["word"; n].join(" ")
    }

    #[test]
    fn test_empty_is_invalid_and_bare() {
        let report = validate(&WordTokenizer, &[], 122).unwrap();
        assert!(!report.valid);
        assert_eq!(serde_json::to_value(&report).unwrap(), serde_json::json!({"valid": false}));
    }

    #[test]
    fn test_statistics() {
        let samples = vec![words(10), words(20), words(30)];
        let report = validate(&WordTokenizer, &samples, 25).unwrap();
        assert!(report.valid);

        let stats = report.statistics.unwrap();
        assert_eq!(stats.num_samples, 3);
        assert_eq!(stats.min_tokens, 10);
        assert_eq!(stats.max_tokens, 30);
        assert_eq!(stats.mean_tokens, 20.0);
        assert!((stats.std_tokens - (200.0f64 / 3.0).sqrt()).abs() < 1e-9);
        assert_eq!(stats.over_limit, 1);
    }

    #[test]
    fn test_over_limit_does_not_invalidate() {
        let samples = vec![words(50), words(60)];
        let report = validate(&WordTokenizer, &samples, 10).unwrap();
        assert!(report.valid);
        assert_eq!(report.statistics.unwrap().over_limit, 2);
    }

    #[test]
    fn test_serialized_shape() {
        let samples = vec![words(4), words(4)];
        let report = validate(&WordTokenizer, &samples, 10).unwrap();
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "num_samples": 2,
                "max_tokens": 4,
                "min_tokens": 4,
                "mean_tokens": 4.0,
                "std_tokens": 0.0,
                "over_limit": 0,
                "valid": true
            })
        );

        let back: ValidationReport = serde_json::from_value(value).unwrap();
        assert_eq!(back, report);
        let bare: ValidationReport = serde_json::from_str(r#"{"valid": false}"#).unwrap();
        assert_eq!(bare, ValidationReport::empty());
    }
}
