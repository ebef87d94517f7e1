//! Token Counting and Budget Trimming
//!
//! Provides token estimation for provider context windows.
//!
//! ## Strategy
//! - Estimate with a per-provider tokens-per-word ratio
//! - Take the larger of the word and character estimates so the count
//!   errs toward over-counting
//! - Trim content by whole words until it fits the remaining budget

use tracing::debug;

use crate::constants::budget::{CHARS_PER_TOKEN, PROMPT_RESERVE_TOKENS};

/// Token counter for a single provider
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenCounter {
    tokens_per_word: f64,
}

impl Default for TokenCounter {
    fn default() -> Self {
        Self::new(1.25)
    }
}

impl TokenCounter {
    pub fn new(tokens_per_word: f64) -> Self {
        Self { tokens_per_word }
    }

    pub fn tokens_per_word(&self) -> f64 {
        self.tokens_per_word
    }

    /// Tokens needed for `word_count` words, rounded up
    pub fn tokens_in_words(&self, word_count: usize) -> usize {
        (word_count as f64 * self.tokens_per_word).ceil() as usize
    }

    /// Estimate token count for a string
    pub fn count(&self, text: &str) -> usize {
        let by_words = self.tokens_in_words(text.split_whitespace().count());
        let by_chars = text.chars().count().div_ceil(CHARS_PER_TOKEN);
        by_words.max(by_chars)
    }

    /// Check if content fits within token budget
    pub fn fits_budget(&self, text: &str, budget: i64) -> bool {
        budget >= 0 && self.count(text) as i64 <= budget
    }

    /// Tokens left for content once the expected output and prompt wrapper
    /// are taken out of the provider window. May be negative.
    pub fn content_budget(&self, max_tokens: usize, expected_output_words: usize) -> i64 {
        max_tokens as i64 - self.tokens_in_words(expected_output_words) as i64 - PROMPT_RESERVE_TOKENS
    }

    /// Shorten `text` to its longest whole-word prefix whose estimate fits
    /// `max_tokens`.
    ///
    /// A non-positive budget yields an empty string; text that already fits
    /// is returned unchanged, which makes the operation idempotent.
    pub fn trim_content(&self, text: &str, max_tokens: i64) -> String {
        if max_tokens <= 0 {
            return String::new();
        }
        if self.fits_budget(text, max_tokens) {
            return text.to_string();
        }

        let word_ends = word_end_offsets(text);

        // The estimate grows monotonically with the prefix length, so binary
        // search for the longest fitting prefix.
        let (mut lo, mut hi) = (0usize, word_ends.len());
        while lo < hi {
            let mid = (lo + hi).div_ceil(2);
            if self.fits_budget(&text[..word_ends[mid - 1]], max_tokens) {
                lo = mid;
            } else {
                hi = mid - 1;
            }
        }

        let trimmed = if lo == 0 {
            String::new()
        } else {
            text[..word_ends[lo - 1]].to_string()
        };

        debug!(
            "Trimmed content from {} to {} words (budget {})",
            word_ends.len(),
            lo,
            max_tokens
        );
        trimmed
    }
}

/// Byte offsets just past the end of each whitespace-separated word
fn word_end_offsets(text: &str) -> Vec<usize> {
    let mut ends = Vec::new();
    let mut in_word = false;

    for (idx, ch) in text.char_indices() {
        if ch.is_whitespace() {
            if in_word {
                ends.push(idx);
                in_word = false;
            }
        } else {
            in_word = true;
        }
    }
    if in_word {
        ends.push(text.len());
    }
    ends
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_tokens_in_words_rounds_up() {
        let counter = TokenCounter::new(1.3);
        assert_eq!(counter.tokens_in_words(0), 0);
        assert_eq!(counter.tokens_in_words(1), 2);
        assert_eq!(counter.tokens_in_words(10), 13);
        assert_eq!(counter.tokens_in_words(45), 59);
    }

    #[test]
    fn test_count_prefers_larger_estimate() {
        let counter = TokenCounter::new(1.0);
        // 1 word, 40 chars -> char estimate dominates
        let long_word = "a".repeat(40);
        assert_eq!(counter.count(&long_word), 10);
        // 4 short words -> word estimate dominates
        assert_eq!(counter.count("a b c d"), 4);
    }

    #[test]
    fn test_content_budget() {
        let counter = TokenCounter::new(1.3);
        assert_eq!(counter.content_budget(131072, 45), 131072 - 59 - 50);
        assert!(counter.content_budget(10, 100) < 0);
    }

    #[test]
    fn test_trim_non_positive_budget() {
        let counter = TokenCounter::default();
        assert_eq!(counter.trim_content("hello world", 0), "");
        assert_eq!(counter.trim_content("hello world", -5), "");
    }

    #[test]
    fn test_trim_keeps_fitting_text() {
        let counter = TokenCounter::default();
        let text = "  already short enough ";
        assert_eq!(counter.trim_content(text, 100), text);
    }

    #[test]
    fn test_trim_whole_words() {
        let counter = TokenCounter::new(1.0);
        let text = "one two three four five six";
        // "one two three" is 13 chars, so the char estimate (4) governs
        let trimmed = counter.trim_content(text, 4);
        assert_eq!(trimmed, "one two three");
    }

    #[test]
    fn test_trim_multibyte() {
        let counter = TokenCounter::new(1.0);
        let text = "café naïve résumé déjà vu";
        let trimmed = counter.trim_content(text, 3);
        assert_eq!(trimmed, "café naïve");
    }

    #[test]
    fn test_trim_single_oversized_word() {
        let counter = TokenCounter::new(1.0);
        let word = "x".repeat(100);
        assert_eq!(counter.trim_content(&word, 5), "");
    }

    proptest! {
        #[test]
        fn prop_trim_is_idempotent(text in "[a-zA-Z ,.\n]{0,400}", budget in -10i64..200) {
            let counter = TokenCounter::new(1.3);
            let once = counter.trim_content(&text, budget);
            let twice = counter.trim_content(&once, budget);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_trim_respects_budget(text in "[a-zA-Z ]{0,400}", budget in -10i64..200) {
            let counter = TokenCounter::new(1.25);
            let trimmed = counter.trim_content(&text, budget);
            if budget <= 0 {
                prop_assert_eq!(trimmed.as_str(), "");
            } else {
                prop_assert!(counter.count(&trimmed) as i64 <= budget);
                prop_assert!(text.starts_with(trimmed.as_str()));
            }
        }
    }
}
