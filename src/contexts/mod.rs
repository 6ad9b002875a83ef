mod analyzer;
mod fetch_coordinator;
pub mod insights;
mod memory_cache;
mod producer;

#[cfg(test)]
mod test_support;

pub use analyzer::{AnalysisError, Analyzer, AnalyzerOptions, ErrorBody};
pub use fetch_coordinator::{reviews_url, FetchCoordinator, FetchReport};
pub use memory_cache::{MemoryCache, DEFAULT_TTL};
pub use producer::{ExternalProducer, RetryPolicy, Worker};
