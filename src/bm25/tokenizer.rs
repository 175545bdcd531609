//! Query and document tokenization for BM25.
//!
//! Lowercase, then split on Unicode whitespace. No stemming and no
//! stop-word removal; punctuation stays attached to its word.

/// Splits `text` into lowercase whitespace-separated tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowercase_whitespace_split() {
        assert_eq!(
            tokenize("  Deploy the API\tto PROD\n"),
            vec!["deploy", "the", "api", "to", "prod"]
        );
    }

    #[test]
    fn test_punctuation_is_kept() {
        assert_eq!(tokenize("Setup: (linux)"), vec!["setup:", "(linux)"]);
    }

    #[test]
    fn test_empty() {
        assert!(tokenize("   ").is_empty());
    }
}
