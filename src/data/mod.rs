mod cache;
pub mod outcome;
pub mod product;
pub mod report;

pub use cache::Cache;
pub use outcome::{FailureKind, FetchFailure, FetchKind, FetchOutcome};
pub use product::{ProductSnapshot, ReviewRecord};
pub use report::{
    Analysis, AnalysisResult, PriceBlock, PriceComparison, PriceHistory, PricePoint, Sentiment,
    SentimentLabel,
};
