//! Money helpers shared by the parser and the reconciliation engine

use bigdecimal::{BigDecimal, RoundingMode};
use std::str::FromStr;

/// Round to whole cents, ties to the even cent.
///
/// A residual of exactly half a cent rounds to zero, so an adjustment and
/// the difference left after it never both round away from zero.
pub fn round2(amount: &BigDecimal) -> BigDecimal {
    amount.with_scale_round(2, RoundingMode::HalfEven)
}

/// Smallest difference treated as a real discrepancy (0.01)
pub fn cent() -> BigDecimal {
    BigDecimal::new(1.into(), 2)
}

/// Whether `amount` is below one cent in magnitude
pub fn is_negligible(amount: &BigDecimal) -> bool {
    amount.abs() < cent()
}

/// Parse an amount as printed on a statement.
///
/// Accepts thousands separators, currency symbols, a leading or trailing
/// minus sign, a leading plus sign and accounting-style parentheses.
/// Returns `None` for anything else, including empty input.
pub fn parse_amount(raw: &str) -> Option<BigDecimal> {
    let mut text = raw.trim();
    if text.is_empty() {
        return None;
    }

    let mut negative = false;
    if text.starts_with('(') && text.ends_with(')') {
        negative = true;
        text = text[1..text.len() - 1].trim();
    }
    if let Some(rest) = text.strip_suffix('-') {
        negative = !negative;
        text = rest.trim();
    }
    if let Some(rest) = text.strip_prefix('-') {
        negative = !negative;
        text = rest.trim();
    } else if let Some(rest) = text.strip_prefix('+') {
        text = rest.trim();
    }

    let cleaned: String = text
        .chars()
        .filter(|c| !matches!(c, ',' | '$' | '€' | '£' | '₹' | '¥' | ' '))
        .collect();
    // A sign may follow the currency symbol, as in "$-12.00"
    let (cleaned, inner_negative) = match cleaned.strip_prefix('-') {
        Some(rest) => (rest.to_string(), true),
        None => (cleaned, false),
    };
    if cleaned.is_empty() || !cleaned.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }

    let value = BigDecimal::from_str(&cleaned).ok()?;
    if negative ^ inner_negative {
        Some(-value)
    } else {
        Some(value)
    }
}
