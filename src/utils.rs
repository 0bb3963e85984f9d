use crate::error::{FinancialStructureError, Result};
use regex::Regex;

pub fn compile_patterns(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(p).map_err(|e| FinancialStructureError::InvalidPattern {
                pattern: p.clone(),
                details: e.to_string(),
            })
        })
        .collect()
}

/// Case-insensitive keyword lookup over header or label text.
///
/// Keywords made of CJK characters or symbols match anywhere in the text.
/// Keywords that begin or end with an ASCII letter/digit must sit on a word
/// boundary at that end, so `Mar` matches `Mar-24` but not `Market`.
#[derive(Debug, Clone, Default)]
pub struct KeywordMatcher {
    keywords: Vec<String>,
}

impl KeywordMatcher {
    pub fn new(keywords: &[String]) -> Self {
        Self {
            keywords: keywords
                .iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    /// Returns the first keyword found in `text`.
    pub fn find(&self, text: &str) -> Option<&str> {
        let haystack = text.to_lowercase();
        self.keywords
            .iter()
            .find(|k| contains_keyword(&haystack, k))
            .map(|k| k.as_str())
    }

    pub fn matches(&self, text: &str) -> bool {
        self.find(text).is_some()
    }
}

/// Both arguments are expected to be lowercased already.
pub fn contains_keyword(haystack: &str, keyword: &str) -> bool {
    let needs_left = keyword
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphanumeric());
    let needs_right = keyword
        .chars()
        .last()
        .is_some_and(|c| c.is_ascii_alphanumeric());

    haystack.match_indices(keyword).any(|(start, found)| {
        let end = start + found.len();
        let left_ok = !needs_left
            || haystack[..start]
                .chars()
                .next_back()
                .map_or(true, |c| !c.is_ascii_alphanumeric());
        let right_ok = !needs_right
            || haystack[end..]
                .chars()
                .next()
                .map_or(true, |c| !c.is_ascii_alphanumeric());
        left_ok && right_ok
    })
}

/// Number of leading whitespace characters (ASCII or full-width).
pub fn leading_indentation(label: &str) -> usize {
    label.chars().take_while(|c| c.is_whitespace()).count()
}

/// Formats an amount with thousands separators and two decimals, e.g. `-1,234.50`.
pub fn format_amount(value: f64) -> String {
    let formatted = format!("{:.2}", value.abs());
    let (int_part, frac_part) = formatted.split_once('.').unwrap_or((&formatted, "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if value < 0.0 && formatted != "0.00" { "-" } else { "" };
    format!("{}{}.{}", sign, grouped, frac_part)
}

/// Tolerance used for parent/children sum checks: `max(expected * pct, abs)`.
pub fn sum_tolerance(expected: f64, pct: f64, abs: f64) -> f64 {
    (expected * pct).max(abs)
}

pub fn share(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher(words: &[&str]) -> KeywordMatcher {
        let owned: Vec<String> = words.iter().map(|w| w.to_string()).collect();
        KeywordMatcher::new(&owned)
    }

    #[test]
    fn test_cjk_keywords_match_as_substrings() {
        let m = matcher(&["合计", "率"]);
        assert_eq!(m.find("本期合计"), Some("合计"));
        assert_eq!(m.find("毛利率"), Some("率"));
        assert!(!m.matches("营业收入"));
    }

    #[test]
    fn test_ascii_keywords_respect_word_boundaries() {
        let m = matcher(&["Mar", "Sum", "Total"]);
        assert!(m.matches("Mar-24"));
        assert!(m.matches("Q1 SUM"));
        assert!(m.matches("Grand Total"));
        assert!(!m.matches("Market"));
        assert!(!m.matches("Summary"));
        assert!(!m.matches("Subtotals"));
    }

    #[test]
    fn test_symbol_keywords() {
        let m = matcher(&["%"]);
        assert!(m.matches("Total %"));
        assert!(m.matches("占比%"));
    }

    #[test]
    fn test_leading_indentation() {
        assert_eq!(leading_indentation("现金"), 0);
        assert_eq!(leading_indentation("  设施设备"), 2);
        assert_eq!(leading_indentation("\u{3000}\u{3000}新店装修"), 2);
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(73906.01), "73,906.01");
        assert_eq!(format_amount(1_234_567.0), "1,234,567.00");
        assert_eq!(format_amount(-4613.0), "-4,613.00");
        assert_eq!(format_amount(12.5), "12.50");
        assert_eq!(format_amount(-0.001), "0.00");
    }

    #[test]
    fn test_sum_tolerance() {
        assert_eq!(sum_tolerance(50.0, 0.01, 1.0), 1.0);
        assert_eq!(sum_tolerance(100_000.0, 0.01, 1.0), 1000.0);
        assert_eq!(sum_tolerance(-5000.0, 0.01, 1.0), 1.0);
    }

    #[test]
    fn test_compile_patterns_reports_bad_pattern() {
        let ok = compile_patterns(&["^a".to_string()]);
        assert!(ok.is_ok());

        let bad = compile_patterns(&["(".to_string()]);
        assert!(matches!(
            bad,
            Err(FinancialStructureError::InvalidPattern { .. })
        ));
    }
}
