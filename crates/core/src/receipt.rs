use serde::{Deserialize, Deserializer, Serialize};
use std::io::Write;
use thiserror::Error;

/// A single purchased line. Absent values are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub price_whole_part: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub price_fractional_part: String,
}

impl Item {
    pub fn new(
        name: impl Into<String>,
        price_whole_part: impl Into<String>,
        price_fractional_part: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            price_whole_part: price_whole_part.into(),
            price_fractional_part: price_fractional_part.into(),
        }
    }

    /// Characters across name and both price parts.
    pub fn char_len(&self) -> usize {
        self.name.chars().count()
            + self.price_whole_part.chars().count()
            + self.price_fractional_part.chars().count()
    }
}

/// Structured record recovered from one receipt.
///
/// Every leaf is kept as a string so that digit strings such as `"05"` survive
/// untouched into the interchange document. Fields that could not be found are
/// empty strings, never `null`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub day: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub month: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub year: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub total_whole_part: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub total_fractional_part: String,
    #[serde(default)]
    pub items: Vec<Item>,
}

impl Receipt {
    /// All leaf values in document order.
    pub fn leaf_strings(&self) -> impl Iterator<Item = &str> {
        [
            self.day.as_str(),
            self.month.as_str(),
            self.year.as_str(),
            self.total_whole_part.as_str(),
            self.total_fractional_part.as_str(),
        ]
        .into_iter()
        .chain(self.items.iter().flat_map(|i| {
            [
                i.name.as_str(),
                i.price_whole_part.as_str(),
                i.price_fractional_part.as_str(),
            ]
        }))
    }

    /// Total number of characters across every leaf value.
    pub fn label_characters(&self) -> usize {
        self.leaf_strings().map(|s| s.chars().count()).sum()
    }

    pub fn has_date(&self) -> bool {
        !(self.day.is_empty() && self.month.is_empty() && self.year.is_empty())
    }

    pub fn has_total(&self) -> bool {
        !(self.total_whole_part.is_empty() && self.total_fractional_part.is_empty())
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

// ── Serialization ─────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Renders a receipt into an interchange document.
pub trait ReceiptWriter: Send + Sync {
    fn write(&self, receipt: &Receipt, sink: &mut dyn Write) -> Result<(), WriteError>;
}

/// Pretty-printed JSON with a four-space indent.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonReceiptWriter;

impl ReceiptWriter for JsonReceiptWriter {
    fn write(&self, receipt: &Receipt, sink: &mut dyn Write) -> Result<(), WriteError> {
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(sink, formatter);
        receipt.serialize(&mut ser)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Receipt {
        Receipt {
            day: "05".into(),
            month: "11".into(),
            year: "2021".into(),
            total_whole_part: "4".into(),
            total_fractional_part: "49".into(),
            items: vec![Item::new("milk", "2", "50"), Item::new("bread", "1", "99")],
        }
    }

    #[test]
    fn label_characters_counts_every_leaf() {
        // 2+2+4 date, 1+2 total, 4+1+2 milk, 5+1+2 bread
        assert_eq!(sample().label_characters(), 26);
        assert_eq!(Receipt::default().label_characters(), 0);
    }

    #[test]
    fn item_char_len() {
        assert_eq!(Item::new("bread", "1", "99").char_len(), 8);
    }

    #[test]
    fn json_writer_uses_document_field_names() {
        let mut buf = Vec::new();
        JsonReceiptWriter.write(&sample(), &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        for key in [
            "\"day\"",
            "\"month\"",
            "\"year\"",
            "\"total_whole_part\"",
            "\"total_fractional_part\"",
            "\"price_whole_part\"",
            "\"price_fractional_part\"",
        ] {
            assert!(text.contains(key), "missing {key} in {text}");
        }
        assert!(text.contains("\n    \"day\": \"05\""));
    }

    #[test]
    fn absent_fields_serialize_as_empty_strings() {
        let value = serde_json::to_value(Receipt::default()).unwrap();
        assert_eq!(value["day"], "");
        assert_eq!(value["total_whole_part"], "");
        assert_eq!(value["items"], serde_json::json!([]));
    }

    #[test]
    fn null_leaves_deserialize_as_empty() {
        let json = r#"{"day": null, "month": "1", "year": "2020",
            "total_whole_part": "3", "total_fractional_part": null,
            "items": [{"name": null, "price_whole_part": "1", "price_fractional_part": "00"}]}"#;
        let r: Receipt = serde_json::from_str(json).unwrap();
        assert_eq!(r.day, "");
        assert_eq!(r.total_fractional_part, "");
        assert_eq!(r.items[0].name, "");
        assert!(r.has_date());
    }
}
