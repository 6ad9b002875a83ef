use chrono::{DateTime, Utc};
use serde::Serialize;

use super::product::ReviewRecord;

/// The composed analysis for one product URL.
///
/// Immutable once stored in the cache; every reader gets its own clone.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub url: String,
    pub asin: Option<String>,
    pub title: String,
    pub price: PriceBlock,
    pub rating: Option<f32>,
    pub review_count: Option<u64>,
    pub availability: Option<String>,
    pub images: Vec<String>,
    pub features: Vec<String>,
    pub description: Option<String>,
    /// Bounded excerpt of the reviews the analysis was computed from
    pub reviews: Vec<ReviewRecord>,
    pub analysis: Analysis,
    pub last_updated: DateTime<Utc>,
    /// Time spent serving this request, a cache hit included
    pub processing_time_ms: u64,
    pub cached: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceBlock {
    pub current: Option<String>,
    pub original: Option<String>,
    pub discount_percentage: Option<f64>,
    pub comparison: Option<PriceComparison>,
    pub history: PriceHistory,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceComparison {
    pub savings: f64,
    pub savings_percentage: f64,
}

/// Illustrative price series. Not observed data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceHistory {
    /// Always true: the points are generated, not recorded
    pub estimated: bool,
    pub points: Vec<PricePoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PricePoint {
    /// `YYYY-MM`
    pub month: String,
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analysis {
    pub sentiment: Sentiment,
    pub insights: Vec<String>,
    pub pros: Vec<String>,
    pub cons: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sentiment {
    pub label: SentimentLabel,
    /// 0 to 100
    pub score: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Negative,
    Unknown,
}
