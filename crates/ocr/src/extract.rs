use regex::Regex;
use serde::{Deserialize, Serialize};
use tally_core::{Item, Receipt};
use thiserror::Error;

use crate::config::{ItemConfig, PatternConfig, PipelineConfig};
use crate::types::{DateParts, PriceMatch};

/// A non-digit lead character, then whole part `w`, a dot, fractional part `f`.
/// The lead character keeps the pattern from starting inside a longer number.
pub const DEFAULT_PRICE_PATTERN: &str = r".(?P<w>\b[0-9]+)\.(?P<f>[0-9]+)\b";

/// Day `d`, month `m`, year `y`, slash separated, in that order.
pub const DEFAULT_DATE_PATTERN: &str = r"(?P<d>[0-9]+)/(?P<m>[0-9]+)/(?P<y>[0-9]+)";

/// Lines containing this word end the item listing.
const ITEM_TERMINATOR: &str = "total";

#[derive(Debug, Error)]
pub enum PatternError {
    #[error("Invalid {kind} pattern: {source}")]
    Invalid {
        kind: &'static str,
        #[source]
        source: regex::Error,
    },
    #[error("{kind} pattern is missing named group `{group}`")]
    MissingGroup {
        kind: &'static str,
        group: &'static str,
    },
}

fn compile(kind: &'static str, pattern: &str, groups: &[&'static str]) -> Result<Regex, PatternError> {
    let re = Regex::new(pattern).map_err(|source| PatternError::Invalid { kind, source })?;
    for &group in groups {
        if !re.capture_names().flatten().any(|n| n == group) {
            return Err(PatternError::MissingGroup { kind, group });
        }
    }
    Ok(re)
}

// ── Patterns ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PricePattern(Regex);

impl PricePattern {
    pub fn new(pattern: &str) -> Result<Self, PatternError> {
        compile("price", pattern, &["w", "f"]).map(Self)
    }

    /// Every non-overlapping price in `text`, in order of appearance.
    pub fn find_all(&self, text: &str) -> Vec<PriceMatch> {
        self.0
            .captures_iter(text)
            .filter_map(|c| {
                let m = c.get(0)?;
                PriceMatch::new(m.start(), m.end(), c.name("w")?.as_str(), c.name("f")?.as_str())
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct DatePattern(Regex);

impl DatePattern {
    pub fn new(pattern: &str) -> Result<Self, PatternError> {
        compile("date", pattern, &["d", "m", "y"]).map(Self)
    }

    pub fn find_first(&self, text: &str) -> Option<DateParts> {
        let c = self.0.captures(text)?;
        Some(DateParts {
            day: c.name("d")?.as_str().to_string(),
            month: c.name("m")?.as_str().to_string(),
            year: c.name("y")?.as_str().to_string(),
        })
    }
}

/// Where item scanning begins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemScanStart {
    /// Line zero; a `total` line before any item stops the scan.
    #[default]
    FirstLine,
    /// The line holding the first detected price.
    FirstPriceLine,
}

// ── Extraction ────────────────────────────────────────────────────────────────

/// Turns recognized text into a structured receipt.
pub trait ReceiptExtractor: Send + Sync {
    fn extract(&self, ocr_text: &str) -> Receipt;
}

#[derive(Debug, Clone)]
pub struct ReceiptParser {
    price: PricePattern,
    date: DatePattern,
    scan_start: ItemScanStart,
}

impl Default for ReceiptParser {
    fn default() -> Self {
        Self::new(&PatternConfig::default(), &ItemConfig::default())
            .expect("built-in patterns are valid")
    }
}

impl ReceiptParser {
    pub fn new(patterns: &PatternConfig, items: &ItemConfig) -> Result<Self, PatternError> {
        Ok(Self {
            price: PricePattern::new(&patterns.price)?,
            date: DatePattern::new(&patterns.date)?,
            scan_start: items.scan_start,
        })
    }

    pub fn from_config(config: &PipelineConfig) -> Result<Self, PatternError> {
        Self::new(&config.patterns, &config.items)
    }

    pub fn normalize_text(text: &str) -> String {
        text.to_lowercase()
    }

    pub fn find_prices(&self, text: &str) -> Vec<PriceMatch> {
        self.price.find_all(text)
    }

    /// The largest price in the text; the first one wins ties.
    pub fn parse_total(&self, text: &str) -> Option<PriceMatch> {
        self.find_prices(text)
            .into_iter()
            .reduce(|best, m| if m.value > best.value { m } else { best })
    }

    pub fn parse_date(&self, text: &str) -> Option<DateParts> {
        self.date.find_first(text)
    }

    /// Line-oriented item scan. `None` when the text holds no price at all.
    ///
    /// Scanning stops at the first line containing `total`. Lines without a
    /// price are skipped. The last price on a line is the item price and the
    /// rest of the line, trimmed, is its name.
    pub fn parse_items(&self, text: &str) -> Option<Vec<Item>> {
        let first = self.find_prices(text).into_iter().next()?;
        let skip = match self.scan_start {
            ItemScanStart::FirstLine => 0,
            ItemScanStart::FirstPriceLine => line_at_offset(text, first.start).unwrap_or(0),
        };

        let mut items = Vec::new();
        for line in text.lines().skip(skip) {
            if line.to_lowercase().contains(ITEM_TERMINATOR) {
                break;
            }
            let Some(price) = self.find_prices(line).pop() else {
                continue;
            };
            let name = format!("{}{}", &line[..price.start], &line[price.end..]);
            items.push(Item::new(name.trim(), price.whole, price.fractional));
        }
        Some(items)
    }
}

impl ReceiptExtractor for ReceiptParser {
    fn extract(&self, ocr_text: &str) -> Receipt {
        let text = Self::normalize_text(ocr_text);

        let (total_whole_part, total_fractional_part) = self
            .parse_total(&text)
            .map(|m| (m.whole, m.fractional))
            .unwrap_or_default();
        let date = self.parse_date(&text).unwrap_or_default();
        let items = self.parse_items(&text).unwrap_or_default();

        tracing::debug!(
            has_total = !total_whole_part.is_empty(),
            has_date = !date.day.is_empty(),
            items = items.len(),
            "Extracted receipt fields"
        );

        Receipt {
            day: date.day,
            month: date.month,
            year: date.year,
            total_whole_part,
            total_fractional_part,
            items,
        }
    }
}

/// Zero-based line number containing byte `offset`, or `None` past the end.
pub fn line_at_offset(text: &str, offset: usize) -> Option<usize> {
    let prefix = text.as_bytes().get(..offset)?;
    Some(prefix.iter().filter(|&&b| b == b'\n').count())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
