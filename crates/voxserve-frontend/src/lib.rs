//! # voxserve-frontend
//!
//! Text normalization frontend for the voxserve speech-synthesis server.
//!
//! This crate provides rules-based text normalization for English and
//! Chinese, handling:
//! - Numbers (cardinals, decimals, percentages, digit sequences)
//! - Abbreviations
//! - Brackets and CJK corner marks
//! - Whitespace and terminal punctuation
//!
//! # Example
//!
//! ```ignore
//! use voxserve_frontend::Normalizer;
//! use voxserve_core::{Locale, TextFrontend};
//!
//! let normalizer = Normalizer::new();
//! let utterance = normalizer.normalize("123", Locale::En)?;
//! assert_eq!(utterance.text(), "one hundred twenty-three");
//! ```

mod num2words;
mod rules;

use tracing::instrument;
use voxserve_core::{Locale, NormalizedUtterance, SynthError, SynthResult, TextFrontend};

pub use num2words::{num_to_words, num_to_words_en, num_to_words_zh};
pub use rules::Rule;

/// Text normalizer with a configurable rule pipeline.
#[derive(Debug)]
pub struct Normalizer {
    rules: Vec<Box<dyn Rule>>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Normalizer {
    /// Create a new normalizer with default rules.
    pub fn new() -> Self {
        Self {
            rules: rules::default_rules(),
        }
    }

    /// Create a normalizer with custom rules.
    pub fn with_rules(rules: Vec<Box<dyn Rule>>) -> Self {
        Self { rules }
    }

    /// Add a rule to the end of the pipeline.
    pub fn add_rule(&mut self, rule: Box<dyn Rule>) {
        self.rules.push(rule);
    }
}

impl TextFrontend for Normalizer {
    #[instrument(skip(self, input), fields(input_len = input.len(), %locale))]
    fn normalize(&self, input: &str, locale: Locale) -> SynthResult<NormalizedUtterance> {
        if input.chars().all(|c| c.is_whitespace() || c.is_control()) {
            return Err(SynthError::malformed("empty input text"));
        }

        let mut text = input.to_string();
        for rule in &self.rules {
            if rule.applies_to(locale) {
                text = rule.apply(&text, locale)?;
            }
        }

        let tokens = segment(&text, locale);
        if tokens.is_empty() {
            return Err(SynthError::malformed("input contains no speakable content"));
        }

        Ok(NormalizedUtterance::new(tokens, locale))
    }
}

/// Split normalized text into pronounceable tokens.
///
/// English splits on whitespace and strips surrounding punctuation.
/// Chinese yields one token per CJK character, with embedded Latin
/// runs kept whole.
fn segment(text: &str, locale: Locale) -> Vec<String> {
    match locale {
        Locale::En => text
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric() && c != '\''))
            .filter(|w| !w.is_empty())
            .map(|w| w.to_string())
            .collect(),
        Locale::Zh => {
            let mut tokens = Vec::new();
            let mut latin_run = String::new();
            for c in text.chars() {
                if rules::is_cjk(c) {
                    if !latin_run.is_empty() {
                        tokens.push(std::mem::take(&mut latin_run));
                    }
                    tokens.push(c.to_string());
                } else if c.is_alphanumeric() {
                    latin_run.push(c);
                } else {
                    // Punctuation and whitespace end any pending run.
                    if !latin_run.is_empty() {
                        tokens.push(std::mem::take(&mut latin_run));
                    }
                }
            }
            if !latin_run.is_empty() {
                tokens.push(latin_run);
            }
            tokens
        }
    }
}
