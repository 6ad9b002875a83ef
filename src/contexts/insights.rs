//! Derived fields for an analysis report.
//!
//! Everything here is a pure function of the snapshot and reviews and never
//! fails: sparse input produces neutral defaults.

use crate::data::{
    Analysis, PriceBlock, PriceComparison, PriceHistory, PricePoint, ProductSnapshot,
    ReviewRecord, Sentiment, SentimentLabel,
};
use chrono::{Months, NaiveDate};
use sha2::{Digest, Sha256};

const MAX_HIGHLIGHTS: usize = 5;
const HISTORY_MONTHS: u32 = 6;

/// (keywords, label) pairs looked for in favourable reviews
const PRO_KEYWORDS: &[(&[&str], &str)] = &[
    (&["quality", "well made", "sturdy"], "Good build quality"),
    (&["easy to use", "easy to set", "simple"], "Easy to use"),
    (&["value", "worth", "price"], "Good value for money"),
    (&["comfortable", "comfy"], "Comfortable"),
    (&["fast", "quick"], "Fast"),
    (&["durable", "lasts", "long lasting"], "Durable"),
    (&["battery"], "Good battery life"),
    (&["recommend"], "Recommended by buyers"),
];

/// (keywords, label) pairs looked for in unfavourable reviews
const CON_KEYWORDS: &[(&[&str], &str)] = &[
    (&["broke", "broken", "stopped working"], "Durability concerns"),
    (&["cheap", "flimsy"], "Feels cheaply made"),
    (&["expensive", "overpriced"], "Considered overpriced"),
    (&["small", "tight"], "Runs small"),
    (&["slow"], "Slow"),
    (&["return", "refund"], "Some buyers returned it"),
    (&["noise", "noisy", "loud"], "Noisy"),
    (&["battery"], "Battery complaints"),
];

/// Computes the analysis block
pub fn analyze(snapshot: &ProductSnapshot, reviews: &[ReviewRecord]) -> Analysis {
    let (pros, cons) = pros_and_cons(reviews);
    Analysis {
        sentiment: sentiment(snapshot, reviews),
        insights: insights(snapshot, reviews),
        pros,
        cons,
    }
}

/// Mean review stars, falling back to the product rating
pub fn sentiment(snapshot: &ProductSnapshot, reviews: &[ReviewRecord]) -> Sentiment {
    let stars: Vec<f32> = reviews.iter().filter_map(|r| r.stars).collect();
    let average = if stars.is_empty() {
        snapshot.rating_value()
    } else {
        Some(stars.iter().sum::<f32>() / stars.len() as f32)
    };

    let Some(average) = average else {
        return Sentiment {
            label: SentimentLabel::Unknown,
            score: 50,
        };
    };

    let label = if average >= 4.0 {
        SentimentLabel::Positive
    } else if average >= 3.0 {
        SentimentLabel::Neutral
    } else {
        SentimentLabel::Negative
    };
    let score = (((average - 1.0) / 4.0) * 100.0).round().clamp(0.0, 100.0) as u8;

    Sentiment { label, score }
}

pub fn insights(snapshot: &ProductSnapshot, reviews: &[ReviewRecord]) -> Vec<String> {
    let mut out = Vec::new();

    match snapshot.rating_value() {
        Some(r) if r >= 4.5 => out.push(format!("Highly rated by customers ({:.1}/5)", r)),
        Some(r) if r >= 4.0 => out.push(format!("Well rated by customers ({:.1}/5)", r)),
        Some(r) if r < 3.0 => out.push(format!("Below-average customer rating ({:.1}/5)", r)),
        _ => {}
    }

    match snapshot.review_count_value() {
        Some(n) if n >= 1000 => out.push(format!("Popular product with {} ratings", n)),
        Some(n) if n < 10 => out.push("Few ratings so far; the score may shift".to_string()),
        _ => {}
    }

    if let Some(discount) = discount_percentage(snapshot) {
        out.push(format!("Currently discounted by {:.0}%", discount));
    }

    if let Some(availability) = ProductSnapshot::known(snapshot.availability.as_deref()) {
        let lowered = availability.to_lowercase();
        if lowered.contains("unavailable") || lowered.contains("out of stock") {
            out.push("Currently unavailable".to_string());
        } else if lowered.contains("only") && lowered.contains("left") {
            out.push("Limited stock remaining".to_string());
        } else if lowered.contains("in stock") {
            out.push("In stock".to_string());
        }
    }

    if !reviews.is_empty() {
        out.push(format!("Based on {} sampled reviews", reviews.len()));
    }

    if out.is_empty() {
        out.push("Not enough data for detailed insights".to_string());
    }
    out
}

/// Keyword scan of favourable (4+ stars) and unfavourable (2 or fewer) reviews.
/// Reviews without stars count toward both.
pub fn pros_and_cons(reviews: &[ReviewRecord]) -> (Vec<String>, Vec<String>) {
    let favourable: Vec<String> = reviews
        .iter()
        .filter(|r| r.stars.is_none_or(|s| s >= 4.0))
        .map(|r| r.body.to_lowercase())
        .collect();
    let unfavourable: Vec<String> = reviews
        .iter()
        .filter(|r| r.stars.is_none_or(|s| s <= 2.0))
        .map(|r| r.body.to_lowercase())
        .collect();

    let mut pros = ranked_highlights(&favourable, PRO_KEYWORDS);
    let mut cons = ranked_highlights(&unfavourable, CON_KEYWORDS);

    if pros.is_empty() {
        pros.push("No standout strengths mentioned in reviews".to_string());
    }
    if cons.is_empty() {
        cons.push("No common complaints found".to_string());
    }
    (pros, cons)
}

/// Labels ordered by how many bodies mention them, then by table order
fn ranked_highlights(bodies: &[String], table: &[(&[&str], &str)]) -> Vec<String> {
    let mut counted: Vec<(usize, usize, &str)> = table
        .iter()
        .enumerate()
        .map(|(idx, (keywords, label))| {
            let hits = bodies
                .iter()
                .filter(|body| keywords.iter().any(|k| body.contains(k)))
                .count();
            (hits, idx, *label)
        })
        .filter(|(hits, _, _)| *hits > 0)
        .collect();

    counted.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    counted
        .into_iter()
        .take(MAX_HIGHLIGHTS)
        .map(|(_, _, label)| label.to_string())
        .collect()
}

fn discount_percentage(snapshot: &ProductSnapshot) -> Option<f64> {
    snapshot
        .discount_value()
        .or_else(|| comparison(snapshot).map(|c| c.savings_percentage))
}

fn comparison(snapshot: &ProductSnapshot) -> Option<PriceComparison> {
    let current = snapshot.price_value()?;
    let original = snapshot.original_price_value()?;
    if original <= current {
        return None;
    }
    let savings = round2(original - current);
    Some(PriceComparison {
        savings,
        savings_percentage: (savings / original * 1000.0).round() / 10.0,
    })
}

/// Builds the price block. `seed_key` keys the illustrative history.
pub fn price_block(snapshot: &ProductSnapshot, seed_key: &str, today: NaiveDate) -> PriceBlock {
    PriceBlock {
        current: ProductSnapshot::known(snapshot.price.as_deref()),
        original: ProductSnapshot::known(snapshot.original_price.as_deref()),
        discount_percentage: discount_percentage(snapshot),
        comparison: comparison(snapshot),
        history: estimated_history(snapshot.price_value(), seed_key, today),
    }
}

/// Monthly points within ±10% of the current price, derived from a hash of
/// `seed_key`. The same key and month always give the same series. The last
/// point is the current price.
pub fn estimated_history(current: Option<f64>, seed_key: &str, today: NaiveDate) -> PriceHistory {
    let Some(current) = current else {
        return PriceHistory {
            estimated: true,
            points: Vec::new(),
        };
    };

    let digest = Sha256::digest(seed_key.as_bytes());
    let points = (0..HISTORY_MONTHS)
        .rev()
        .filter_map(|months_ago| {
            let month = today.checked_sub_months(Months::new(months_ago))?;
            let price = if months_ago == 0 {
                current
            } else {
                let byte = f64::from(digest[months_ago as usize]);
                round2(current * (1.0 + (byte / 255.0 - 0.5) * 0.2))
            };
            Some(PricePoint {
                month: month.format("%Y-%m").to_string(),
                price,
            })
        })
        .collect();

    PriceHistory {
        estimated: true,
        points,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
