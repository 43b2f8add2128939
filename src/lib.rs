// Gratte - boolean literature search across heterogeneous bibliographic backends

pub mod backends;
pub mod config;
pub mod engine;
pub mod export;
pub mod query;
pub mod types;
pub mod utils;

// Re-exports for convenience
pub use config::Config;
pub use engine::{JobOutcome, JobState, ProgressSnapshot, Scraper, SearchIntent};
pub use types::{BackendId, LabeledUrl, Paper, ScrapeError, ScrapeResult};
