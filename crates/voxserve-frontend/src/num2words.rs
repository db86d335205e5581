//! Number to words conversion for English and Chinese.

use voxserve_core::Locale;

/// Convert a number to words.
pub fn num_to_words(num: i64, locale: Locale) -> String {
    match locale {
        Locale::En => num_to_words_en(num),
        Locale::Zh => num_to_words_zh(num),
    }
}

/// Read a digit string one digit at a time (phone numbers, long ids).
pub fn digits_to_words(digits: &str, locale: Locale) -> String {
    match locale {
        Locale::En => digits
            .chars()
            .filter_map(|c| c.to_digit(10))
            .map(|d| EN_ONES[d as usize].to_string())
            .map(|w| if w.is_empty() { "zero".to_string() } else { w })
            .collect::<Vec<_>>()
            .join(" "),
        Locale::Zh => digits
            .chars()
            .filter_map(|c| c.to_digit(10))
            .map(|d| ZH_DIGITS[d as usize])
            .collect(),
    }
}

// ============================================================================
// English number conversion
// ============================================================================

const EN_ONES: [&str; 20] = [
    "",
    "one",
    "two",
    "three",
    "four",
    "five",
    "six",
    "seven",
    "eight",
    "nine",
    "ten",
    "eleven",
    "twelve",
    "thirteen",
    "fourteen",
    "fifteen",
    "sixteen",
    "seventeen",
    "eighteen",
    "nineteen",
];

const EN_TENS: [&str; 10] = [
    "", "", "twenty", "thirty", "forty", "fifty", "sixty", "seventy", "eighty", "ninety",
];

/// Convert hundreds part (0-999) to English words.
fn hundreds_to_words_en(n: i64) -> String {
    let n = n.unsigned_abs() as usize;
    if n == 0 {
        return String::new();
    }

    let mut parts = Vec::new();

    let h = n / 100;
    if h > 0 {
        parts.push(format!("{} hundred", EN_ONES[h]));
    }

    let remainder = n % 100;
    if remainder > 0 {
        if remainder < 20 {
            parts.push(EN_ONES[remainder].to_string());
        } else {
            let tens = remainder / 10;
            let ones = remainder % 10;
            if ones > 0 {
                parts.push(format!("{}-{}", EN_TENS[tens], EN_ONES[ones]));
            } else {
                parts.push(EN_TENS[tens].to_string());
            }
        }
    }

    parts.join(" ")
}

/// Convert a number to English words.
pub fn num_to_words_en(num: i64) -> String {
    if num == 0 {
        return "zero".to_string();
    }

    let mut parts = Vec::new();
    let mut n = num;

    if n < 0 {
        parts.push("minus".to_string());
        n = -n;
    }

    let billions = n / 1_000_000_000;
    if billions > 0 {
        parts.push(hundreds_to_words_en(billions));
        parts.push("billion".to_string());
    }
    n %= 1_000_000_000;

    let millions = n / 1_000_000;
    if millions > 0 {
        parts.push(hundreds_to_words_en(millions));
        parts.push("million".to_string());
    }
    n %= 1_000_000;

    let thousands = n / 1_000;
    if thousands > 0 {
        parts.push(hundreds_to_words_en(thousands));
        parts.push("thousand".to_string());
    }
    n %= 1_000;

    if n > 0 || parts.is_empty() {
        parts.push(hundreds_to_words_en(n));
    }

    parts
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

// ============================================================================
// Chinese number conversion
// ============================================================================

const ZH_DIGITS: [&str; 10] = ["零", "一", "二", "三", "四", "五", "六", "七", "八", "九"];

const ZH_UNITS: [&str; 4] = ["", "十", "百", "千"];

/// Convert a section (0-9999) to Chinese words, without the leading
/// zero marker. `elide_one_ten` drops the leading 一 of 10-19 when the
/// section stands alone (十三 rather than 一十三).
fn section_to_words_zh(n: i64, elide_one_ten: bool) -> String {
    let n = n.unsigned_abs() as usize;
    if n == 0 {
        return String::new();
    }
    if elide_one_ten && (10..20).contains(&n) {
        let ones = n % 10;
        if ones == 0 {
            return "十".to_string();
        }
        return format!("十{}", ZH_DIGITS[ones]);
    }

    let digits = [n / 1000, (n / 100) % 10, (n / 10) % 10, n % 10];
    let mut out = String::new();
    let mut zero_pending = false;
    for (pos, &d) in digits.iter().enumerate() {
        if d == 0 {
            if !out.is_empty() {
                zero_pending = true;
            }
            continue;
        }
        if zero_pending {
            out.push_str("零");
            zero_pending = false;
        }
        out.push_str(ZH_DIGITS[d]);
        out.push_str(ZH_UNITS[3 - pos]);
    }
    out
}

/// Convert a number to Chinese words.
pub fn num_to_words_zh(num: i64) -> String {
    if num == 0 {
        return "零".to_string();
    }

    let mut out = String::new();
    let mut n = num;

    if n < 0 {
        out.push_str("负");
        n = -n;
    }

    if n >= 100_000_000 {
        out.push_str(&num_to_words_zh(n / 100_000_000));
        out.push_str("亿");
        let rest = n % 100_000_000;
        if rest == 0 {
            return out;
        }
        if rest < 10_000_000 {
            out.push_str("零");
        }
        n = rest;
    }

    if n >= 10_000 {
        out.push_str(&section_to_words_zh(n / 10_000, out.is_empty()));
        out.push_str("万");
        let rest = n % 10_000;
        if rest == 0 {
            return out;
        }
        if rest < 1_000 {
            out.push_str("零");
        }
        n = rest;
    }

    let standalone = out.is_empty() || out == "负";
    out.push_str(&section_to_words_zh(n, standalone));
    out
}
