use rust_decimal::Decimal;
use std::str::FromStr;

/// One price found while scanning text.
///
/// `whole` and `fractional` are the captured digit strings, kept verbatim so
/// that leading zeros survive; `value` is always exactly `whole.fractional`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceMatch {
    /// Byte offset of the match start (includes the lead character).
    pub start: usize,
    /// Exclusive byte offset of the match end.
    pub end: usize,
    pub value: Decimal,
    pub whole: String,
    pub fractional: String,
}

impl PriceMatch {
    /// Returns `None` when the digits do not fit a decimal.
    pub fn new(start: usize, end: usize, whole: &str, fractional: &str) -> Option<Self> {
        let value = Decimal::from_str(&format!("{whole}.{fractional}")).ok()?;
        Some(Self {
            start,
            end,
            value,
            whole: whole.to_string(),
            fractional: fractional.to_string(),
        })
    }
}

/// Day, month and year exactly as captured; no calendar validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DateParts {
    pub day: String,
    pub month: String,
    pub year: String,
}
