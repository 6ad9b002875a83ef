use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};

/// Title values the product worker emits when it could not read the page
const TITLE_SENTINELS: [&str; 3] = ["n/a", "unknown", "none"];

static FIRST_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+(?:[.,]\d+)?)").expect("static regex is valid"));

/// Product data as emitted by the product worker.
///
/// Numeric fields arrive as display strings (`"$19.99"`, `"4.5"`, `"1,204"`);
/// the `*_value` accessors parse them on demand.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProductSnapshot {
    #[serde(default, deserialize_with = "lenient_string")]
    pub asin: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub price: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub original_price: Option<String>,
    #[serde(default, alias = "discount", deserialize_with = "lenient_string")]
    pub discount_percentage: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub rating: Option<String>,
    #[serde(
        default,
        rename = "reviewCount",
        alias = "review_count",
        deserialize_with = "lenient_string"
    )]
    pub review_count: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub availability: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: Option<String>,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub images: Vec<String>,
}

impl ProductSnapshot {
    /// Decodes a worker payload, accepting both the `{"data": {...}}`
    /// envelope and a bare product object.
    ///
    /// Only JSON objects are accepted. Derived struct decoding would also
    /// fill fields by position from an array.
    pub fn from_payload(payload: serde_json::Value) -> Result<Self, serde_json::Error> {
        let inner = match payload {
            serde_json::Value::Object(mut map) if map.contains_key("data") => {
                map.remove("data").unwrap_or_default()
            }
            other => other,
        };
        match inner {
            serde_json::Value::Object(_) => serde_json::from_value(inner),
            other => Err(serde::de::Error::custom(format!(
                "expected a product object, found {}",
                json_type_name(&other)
            ))),
        }
    }

    /// A snapshot is usable only with a real title
    pub fn has_usable_title(&self) -> bool {
        self.title
            .as_deref()
            .map(str::trim)
            .is_some_and(|t| !t.is_empty() && !is_sentinel(t))
    }

    pub fn price_value(&self) -> Option<f64> {
        self.price.as_deref().and_then(parse_money)
    }

    pub fn original_price_value(&self) -> Option<f64> {
        self.original_price.as_deref().and_then(parse_money)
    }

    pub fn discount_value(&self) -> Option<f64> {
        self.discount_percentage
            .as_deref()
            .and_then(first_number)
            .filter(|d| *d > 0.0)
    }

    pub fn rating_value(&self) -> Option<f32> {
        self.rating
            .as_deref()
            .and_then(first_number)
            .map(|r| r as f32)
            .filter(|r| *r > 0.0)
    }

    pub fn review_count_value(&self) -> Option<u64> {
        let raw = self.review_count.as_deref()?;
        let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
        digits.parse().ok()
    }

    /// Returns a display field unless the worker left it as a sentinel
    pub fn known(field: Option<&str>) -> Option<String> {
        field
            .map(str::trim)
            .filter(|v| !v.is_empty() && !is_sentinel(v))
            .map(String::from)
    }
}

/// One customer review
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewRecord {
    pub body: String,
    /// Star rating out of 5, absent if the worker's text could not be read
    pub stars: Option<f32>,
}

#[derive(Deserialize)]
struct RawReview {
    #[serde(alias = "Description", alias = "text", alias = "description")]
    body: String,
    #[serde(default, alias = "Stars", alias = "rating", deserialize_with = "lenient_string")]
    stars: Option<String>,
}

/// Decodes the reviews worker payload.
///
/// The payload must be a JSON array; malformed items are skipped.
pub fn parse_reviews(payload: serde_json::Value) -> Result<Vec<ReviewRecord>, String> {
    let items = match payload {
        serde_json::Value::Array(items) => items,
        other => {
            return Err(format!(
                "expected a review array, got {}",
                json_type_name(&other)
            ))
        }
    };

    let mut reviews = Vec::with_capacity(items.len());
    for item in items {
        match serde_json::from_value::<RawReview>(item) {
            Ok(raw) => {
                let body = raw.body.trim().to_string();
                if body.is_empty() {
                    continue;
                }
                let stars = raw
                    .stars
                    .as_deref()
                    .and_then(first_number)
                    .map(|s| s as f32)
                    .filter(|s| (0.0..=5.0).contains(s));
                reviews.push(ReviewRecord { body, stars });
            }
            Err(e) => debug!("skipping malformed review item: {}", e),
        }
    }
    Ok(reviews)
}

fn is_sentinel(value: &str) -> bool {
    let lowered = value.to_lowercase();
    TITLE_SENTINELS.contains(&lowered.as_str())
}

/// Parses a display price such as `"$1,299.99"` or `"€15,50"`
pub fn parse_money(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || is_sentinel(trimmed) {
        return None;
    }
    let cleaned: String = trimmed
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();
    // A lone comma followed by two digits is a decimal separator
    let normalized = match (cleaned.rfind(','), cleaned.rfind('.')) {
        (Some(comma), None) if cleaned.len() - comma == 3 => cleaned.replace(',', "."),
        _ => cleaned.replace(',', ""),
    };
    normalized.parse::<f64>().ok().filter(|v| *v > 0.0)
}

fn first_number(raw: &str) -> Option<f64> {
    FIRST_NUMBER
        .captures(raw)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().replace(',', ".").parse().ok())
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// Accepts strings, numbers or null for display fields
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        Some(serde_json::Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_snapshot_from_envelope() {
        let payload = json!({
            "data": {
                "asin": "B0TEST1234",
                "title": "Wireless Mouse",
                "price": "$1,299.99",
                "original_price": null,
                "rating": "4.5",
                "reviewCount": "1,204",
                "features": ["Quiet clicks"],
                "images": []
            }
        });
        let snapshot = ProductSnapshot::from_payload(payload).unwrap();
        assert_eq!(snapshot.asin.as_deref(), Some("B0TEST1234"));
        assert!(snapshot.has_usable_title());
        assert_eq!(snapshot.price_value(), Some(1299.99));
        assert_eq!(snapshot.original_price_value(), None);
        assert_eq!(snapshot.rating_value(), Some(4.5));
        assert_eq!(snapshot.review_count_value(), Some(1204));
    }

    #[test]
    fn test_snapshot_bare_object_with_numbers() {
        let payload = json!({"title": "Kettle", "rating": 3.9, "reviewCount": 12});
        let snapshot = ProductSnapshot::from_payload(payload).unwrap();
        assert_eq!(snapshot.rating_value(), Some(3.9));
        assert_eq!(snapshot.review_count_value(), Some(12));
    }

    #[test]
    fn test_snapshot_rejects_non_objects() {
        for payload in [
            json!(["B0ABCDEF12", "Desk Lamp", "$24.99"]),
            json!({"data": ["B0ABCDEF12", "Desk Lamp"]}),
            json!("Desk Lamp"),
            json!(null),
        ] {
            let err = ProductSnapshot::from_payload(payload.clone()).unwrap_err();
            assert!(err.to_string().contains("expected a product object"), "{}", payload);
        }
    }

    #[test]
    fn test_sentinel_titles_are_unusable() {
        for title in ["N/A", "unknown", "  ", "Unknown"] {
            let snapshot = ProductSnapshot {
                title: Some(title.to_string()),
                ..Default::default()
            };
            assert!(!snapshot.has_usable_title(), "{:?} should be rejected", title);
        }
        assert!(!ProductSnapshot::default().has_usable_title());
    }

    #[test]
    fn test_parse_money_formats() {
        assert_eq!(parse_money("$19.99"), Some(19.99));
        assert_eq!(parse_money("₹2,699"), Some(2699.0));
        assert_eq!(parse_money("€15,50"), Some(15.5));
        assert_eq!(parse_money("N/A"), None);
        assert_eq!(parse_money(""), None);
    }

    #[test]
    fn test_parse_reviews() {
        let payload = json!([
            {"Description": "Great value", "Stars": "5.0 out of 5 stars"},
            {"Description": "Broke after a week", "Stars": "1,0 von 5 Sternen"},
            {"Description": "   ", "Stars": "3.0 out of 5 stars"},
            {"unexpected": true}
        ]);
        let reviews = parse_reviews(payload).unwrap();
        assert_eq!(reviews.len(), 2);
        assert_eq!(reviews[0].stars, Some(5.0));
        assert_eq!(reviews[1].stars, Some(1.0));
    }

    #[test]
    fn test_parse_reviews_rejects_non_array() {
        let err = parse_reviews(json!({"error": "No data retrieved"})).unwrap_err();
        assert!(err.contains("an object"));
    }
}
