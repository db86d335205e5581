//! Normalization rules.

use voxserve_core::{Locale, SynthResult};

use crate::num2words;

/// A text normalization rule.
pub trait Rule: Send + Sync + std::fmt::Debug {
    /// Get the rule name.
    fn name(&self) -> &str;

    /// Check if this rule applies to the given locale.
    fn applies_to(&self, locale: Locale) -> bool;

    /// Apply the rule to the input text.
    fn apply(&self, input: &str, locale: Locale) -> SynthResult<String>;
}

/// Create the default set of normalization rules, in application order.
pub fn default_rules() -> Vec<Box<dyn Rule>> {
    vec![
        Box::new(UnicodeCleanupRule),
        Box::new(BracketRule),
        Box::new(NumberRule),
        Box::new(AbbreviationRule),
        Box::new(CjkBlankRule),
        Box::new(WhitespaceRule),
        Box::new(TerminalPunctuationRule),
    ]
}

/// Check if a character is in the CJK unified ideograph ranges.
pub fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FFF}'
        | '\u{3400}'..='\u{4DBF}'
        | '\u{F900}'..='\u{FAFF}')
}

/// Unicode cleanup (smart quotes, dashes, fullwidth punctuation).
#[derive(Debug)]
pub struct UnicodeCleanupRule;

impl Rule for UnicodeCleanupRule {
    fn name(&self) -> &str {
        "unicode_cleanup"
    }

    fn applies_to(&self, _locale: Locale) -> bool {
        true
    }

    fn apply(&self, input: &str, locale: Locale) -> SynthResult<String> {
        let mut result = input
            .replace('\u{00A0}', " ")
            .replace(['\u{2019}', '\u{2018}'], "'")
            .replace(['\u{201C}', '\u{201D}'], "\"")
            .replace('\u{2014}', " - ")
            .replace('\u{2013}', "-")
            .replace('\u{2026}', "...");

        // Superscripts read as words.
        result = match locale {
            Locale::En => result.replace('²', " squared ").replace('³', " cubed "),
            Locale::Zh => result.replace('²', "平方").replace('³', "立方"),
        };

        if locale == Locale::En {
            // Fullwidth punctuation reads as its ASCII counterpart.
            result = result
                .replace('，', ",")
                .replace('。', ".")
                .replace('！', "!")
                .replace('？', "?")
                .replace('：', ":")
                .replace('；', ";");
        }

        Ok(result)
    }
}

/// Replace bracketed asides and CJK corner marks with comma pauses.
#[derive(Debug)]
pub struct BracketRule;

impl Rule for BracketRule {
    fn name(&self) -> &str {
        "bracket"
    }

    fn applies_to(&self, _locale: Locale) -> bool {
        true
    }

    fn apply(&self, input: &str, locale: Locale) -> SynthResult<String> {
        let pause = match locale {
            Locale::En => ", ",
            Locale::Zh => "，",
        };
        let mut result = String::with_capacity(input.len());
        for c in input.chars() {
            match c {
                '(' | ')' | '[' | ']' | '{' | '}' => result.push_str(pause),
                '（' | '）' | '【' | '】' | '「' | '」' | '『' | '』' | '《' | '》'
                | '〈' | '〉' => result.push_str(pause),
                _ => result.push(c),
            }
        }
        Ok(result)
    }
}

/// Expand digit sequences into spoken words.
///
/// Handles decimals, percent signs, and falls back to digit-by-digit
/// reading for sequences too long to treat as a single number.
#[derive(Debug)]
pub struct NumberRule;

/// Digit runs longer than this read digit by digit (phone numbers, ids).
const MAX_CARDINAL_DIGITS: usize = 12;

impl Rule for NumberRule {
    fn name(&self) -> &str {
        "number"
    }

    fn applies_to(&self, _locale: Locale) -> bool {
        true
    }

    fn apply(&self, input: &str, locale: Locale) -> SynthResult<String> {
        let chars: Vec<char> = input.chars().collect();
        let mut out = String::with_capacity(input.len());
        let mut i = 0;

        while i < chars.len() {
            if !chars[i].is_ascii_digit() {
                out.push(chars[i]);
                i += 1;
                continue;
            }

            let start = i;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
            let int_part: String = chars[start..i].iter().collect();

            let mut frac_part: Option<String> = None;
            if i + 1 < chars.len() && chars[i] == '.' && chars[i + 1].is_ascii_digit() {
                i += 1;
                let fs = i;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                frac_part = Some(chars[fs..i].iter().collect());
            }

            let percent = i < chars.len() && (chars[i] == '%' || chars[i] == '％');
            if percent {
                i += 1;
            }

            let words = render_number(&int_part, frac_part.as_deref(), percent, locale);
            match locale {
                Locale::En => {
                    if !out.is_empty() && !out.ends_with(char::is_whitespace) {
                        out.push(' ');
                    }
                    out.push_str(&words);
                    if i < chars.len() && !chars[i].is_whitespace() {
                        out.push(' ');
                    }
                }
                Locale::Zh => out.push_str(&words),
            }
        }

        Ok(out)
    }
}

fn render_number(int_part: &str, frac_part: Option<&str>, percent: bool, locale: Locale) -> String {
    let cardinal = if int_part.len() > MAX_CARDINAL_DIGITS {
        num2words::digits_to_words(int_part, locale)
    } else {
        match int_part.parse::<i64>() {
            Ok(n) => num2words::num_to_words(n, locale),
            Err(_) => num2words::digits_to_words(int_part, locale),
        }
    };

    match locale {
        Locale::En => {
            let mut words = cardinal;
            if let Some(frac) = frac_part {
                words.push_str(" point ");
                words.push_str(&num2words::digits_to_words(frac, locale));
            }
            if percent {
                words.push_str(" percent");
            }
            words
        }
        Locale::Zh => {
            let mut words = String::new();
            if percent {
                words.push_str("百分之");
            }
            words.push_str(&cardinal);
            if let Some(frac) = frac_part {
                words.push_str("点");
                words.push_str(&num2words::digits_to_words(frac, locale));
            }
            words
        }
    }
}

/// Expand common English abbreviations.
#[derive(Debug)]
pub struct AbbreviationRule;

const EN_ABBREVIATIONS: [(&str, &str); 8] = [
    ("Mr.", "mister"),
    ("Mrs.", "missus"),
    ("Ms.", "miss"),
    ("Dr.", "doctor"),
    ("Prof.", "professor"),
    ("vs.", "versus"),
    ("etc.", "et cetera"),
    ("No.", "number"),
];

impl Rule for AbbreviationRule {
    fn name(&self) -> &str {
        "abbreviation"
    }

    fn applies_to(&self, locale: Locale) -> bool {
        locale == Locale::En
    }

    fn apply(&self, input: &str, _locale: Locale) -> SynthResult<String> {
        let mut result = String::with_capacity(input.len());
        for word in input.split_inclusive(char::is_whitespace) {
            let (token, trailing_ws) = match word.find(char::is_whitespace) {
                Some(idx) => word.split_at(idx),
                None => (word, ""),
            };
            match EN_ABBREVIATIONS.iter().find(|(abbr, _)| *abbr == token) {
                Some((_, expansion)) => result.push_str(expansion),
                None => result.push_str(token),
            }
            result.push_str(trailing_ws);
        }
        Ok(result)
    }
}

/// Remove whitespace between adjacent CJK characters.
#[derive(Debug)]
pub struct CjkBlankRule;

impl Rule for CjkBlankRule {
    fn name(&self) -> &str {
        "cjk_blank"
    }

    fn applies_to(&self, locale: Locale) -> bool {
        locale == Locale::Zh
    }

    fn apply(&self, input: &str, _locale: Locale) -> SynthResult<String> {
        let chars: Vec<char> = input.chars().collect();
        let mut out = String::with_capacity(input.len());
        let mut i = 0;
        while i < chars.len() {
            if chars[i].is_whitespace() {
                let prev_cjk = out.chars().last().map(is_cjk).unwrap_or(false);
                let mut j = i;
                while j < chars.len() && chars[j].is_whitespace() {
                    j += 1;
                }
                let next_cjk = j < chars.len() && is_cjk(chars[j]);
                if !(prev_cjk && next_cjk) {
                    out.push(' ');
                }
                i = j;
            } else {
                out.push(chars[i]);
                i += 1;
            }
        }
        Ok(out)
    }
}

/// Normalize whitespace (collapse runs, trim).
#[derive(Debug)]
pub struct WhitespaceRule;

impl Rule for WhitespaceRule {
    fn name(&self) -> &str {
        "whitespace"
    }

    fn applies_to(&self, _locale: Locale) -> bool {
        true
    }

    fn apply(&self, input: &str, _locale: Locale) -> SynthResult<String> {
        Ok(input.split_whitespace().collect::<Vec<_>>().join(" "))
    }
}

/// Ensure the utterance ends with terminal punctuation so the model
/// produces a natural sentence-final contour.
#[derive(Debug)]
pub struct TerminalPunctuationRule;

impl Rule for TerminalPunctuationRule {
    fn name(&self) -> &str {
        "terminal_punctuation"
    }

    fn applies_to(&self, _locale: Locale) -> bool {
        true
    }

    fn apply(&self, input: &str, locale: Locale) -> SynthResult<String> {
        let trimmed = input.trim_end();
        if trimmed.is_empty() {
            return Ok(trimmed.to_string());
        }
        let terminal = ['.', '!', '?', '。', '！', '？'];
        if trimmed.ends_with(terminal) {
            return Ok(trimmed.to_string());
        }
        let mut result = trimmed.to_string();
        match locale {
            Locale::En => result.push('.'),
            Locale::Zh => result.push('。'),
        }
        Ok(result)
    }
}
