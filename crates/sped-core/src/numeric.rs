//! Numeric and date helpers shared by the rules and the comparator.
//!
//! SPED files mix Brazilian (`1.234,56`) and plain (`1234.56`) decimal
//! notation. Every parse here is a total function: malformed input yields
//! `None` (or `0.0` for the lenient comparator parse), never a panic.

use chrono::NaiveDate;

/// Decimal separator used when formatting a repaired value back into a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecimalSeparator {
    Dot,
    Comma,
}

/// Strip every non-digit character.
pub fn only_digits(s: &str) -> String {
    s.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// True when `s` is non-empty and made of digits only.
pub fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

/// Parse a decimal in either notation.
///
/// When both `.` and `,` are present the dot is taken as a thousands
/// separator (`1.234,56` → 1234.56); a lone comma is the decimal separator.
pub fn parse_decimal(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    let normalized = if s.contains('.') && s.contains(',') {
        s.replace('.', "").replace(',', ".")
    } else {
        s.replace(',', ".")
    };
    normalized.parse::<f64>().ok()
}

/// Parse a decimal, treating an empty or malformed field as zero.
pub fn parse_decimal_or_zero(s: &str) -> f64 {
    parse_decimal(s).unwrap_or(0.0)
}

/// The comparator's parse: keep digits, comma, dot and minus, replace every
/// comma with a dot, and fall back to zero on failure.
///
/// Unlike [`parse_decimal`] this does not treat the dot as a thousands
/// separator, so `1.234,56` fails and yields `0.0`: the behaviour the
/// comparison summary counters are defined against.
pub fn parse_decimal_lenient(s: &str) -> f64 {
    let cleaned: String = s
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, ',' | '.' | '-'))
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    cleaned.parse::<f64>().unwrap_or(0.0)
}

/// Canonical text form of a numeric field for use inside composite keys:
/// `"1.234,56"` → `"1234.56"`, `"26,24"` → `"26.24"`.
pub fn normalize_decimal_key(s: &str) -> String {
    let s = s.trim();
    if s.contains('.') && s.contains(',') {
        s.replace('.', "").replace(',', ".")
    } else {
        s.replace(',', ".")
    }
}

/// Format `value` with `decimals` places and the requested separator.
pub fn format_amount(value: f64, decimals: usize, sep: DecimalSeparator) -> String {
    let s = format!("{:.*}", decimals, value);
    match sep {
        DecimalSeparator::Dot => s,
        DecimalSeparator::Comma => s.replace('.', ","),
    }
}

/// Parse a `ddMMyyyy` date field.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%d%m%Y").ok()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
