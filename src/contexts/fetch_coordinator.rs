use super::producer::ExternalProducer;
use crate::data::product::parse_reviews;
use crate::data::{FailureKind, FetchFailure, FetchKind, FetchOutcome, ProductSnapshot, ReviewRecord};
use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tokio::task::JoinError;
use url::Url;

static ASIN_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/(?:dp|gp/product|product-reviews|ASIN)/([A-Z0-9]{10})(?:[/?]|$)")
        .expect("static regex is valid")
});

/// What both sources produced for one URL
#[derive(Debug, Clone, PartialEq)]
pub struct FetchReport {
    /// Required source. An error here fails the request.
    pub primary: Result<ProductSnapshot, FetchFailure>,
    /// Optional source. Empty when the reviews fetch failed.
    pub reviews: Vec<ReviewRecord>,
}

/// Fans out the product and reviews fetches and settles both
#[derive(Clone)]
pub struct FetchCoordinator {
    producer: Arc<ExternalProducer>,
}

impl FetchCoordinator {
    pub fn new(producer: Arc<ExternalProducer>) -> Self {
        Self { producer }
    }

    /// Runs both fetches on their own tasks and waits for both to finish,
    /// whatever the other one does.
    pub async fn fetch_all(&self, url: &str) -> FetchReport {
        let secondary_url = reviews_url(url);
        debug!("fetching product {} and reviews {}", url, secondary_url);

        let primary_task = {
            let producer = Arc::clone(&self.producer);
            let url = url.to_string();
            tokio::spawn(async move { producer.fetch(FetchKind::Product, &url).await })
        };
        let secondary_task = {
            let producer = Arc::clone(&self.producer);
            tokio::spawn(async move { producer.fetch(FetchKind::Reviews, &secondary_url).await })
        };

        let (primary, secondary) = tokio::join!(primary_task, secondary_task);

        FetchReport {
            primary: usable_snapshot(settle(FetchKind::Product, primary)),
            reviews: usable_reviews(url, settle(FetchKind::Reviews, secondary)),
        }
    }
}

/// Derives the reviews page for a product URL.
///
/// `/dp/<ASIN>` and `/gp/product/<ASIN>` become `/product-reviews/<ASIN>` on
/// the same host, without query or fragment. URLs without an ASIN are
/// returned unchanged.
pub fn reviews_url(product_url: &str) -> String {
    let Ok(mut parsed) = Url::parse(product_url) else {
        return product_url.to_string();
    };
    let Some(asin) = ASIN_PATH
        .captures(parsed.path())
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
    else {
        return product_url.to_string();
    };

    parsed.set_path(&format!("/product-reviews/{}", asin));
    parsed.set_query(None);
    parsed.set_fragment(None);
    parsed.to_string()
}

fn settle(kind: FetchKind, joined: Result<FetchOutcome, JoinError>) -> FetchOutcome {
    joined.unwrap_or_else(|e| {
        Err(FetchFailure::new(
            FailureKind::ProcessError,
            format!("{} fetch task did not complete: {}", kind, e),
        ))
    })
}

/// The primary is usable only as a decodable snapshot with a real title
fn usable_snapshot(outcome: FetchOutcome) -> Result<ProductSnapshot, FetchFailure> {
    let payload = outcome?;
    let snapshot = ProductSnapshot::from_payload(payload).map_err(|e| {
        FetchFailure::new(
            FailureKind::ParseError,
            format!("product payload has unexpected shape: {}", e),
        )
    })?;

    if !snapshot.has_usable_title() {
        return Err(FetchFailure::new(
            FailureKind::ProcessError,
            format!(
                "product worker returned no usable title ({})",
                snapshot.title.as_deref().unwrap_or("missing")
            ),
        ));
    }
    Ok(snapshot)
}

/// Any reviews failure degrades to an empty list
fn usable_reviews(url: &str, outcome: FetchOutcome) -> Vec<ReviewRecord> {
    let parsed = outcome.map_err(|f| f.to_string()).and_then(parse_reviews);
    match parsed {
        Ok(reviews) => {
            debug!("received {} reviews for {}", reviews.len(), url);
            reviews
        }
        Err(reason) => {
            warn!("continuing without reviews for {}: {}", url, reason);
            Vec::new()
        }
    }
}
