use anyhow::Result;
use serde::Deserialize;
use std::env;

pub const ARXIV_API_URL: &str = "http://export.arxiv.org/api/query";
pub const SCOPUS_API_URL: &str = "https://api.elsevier.com/content/search/scopus";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub pacing: PacingConfig,
    pub backends: BackendsConfig,
}

/// Throttling discipline for backend retrieval.
///
/// After every `batch_results` records the engine emits a progress
/// snapshot and sleeps `cooldown_secs` so the backends do not flag us
/// as a scraper.
#[derive(Debug, Clone, Deserialize)]
pub struct PacingConfig {
    pub cooldown_secs: u64,
    pub batch_results: usize,
    pub num_retries: u32,
    /// Default per-backend result cap when the caller does not give one.
    pub max_results: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendsConfig {
    /// SerpAPI key for the Google Scholar backend. Empty disables Scholar.
    pub serpapi_key: String,
    /// Elsevier API key for the Scopus backend. Empty disables Scopus.
    pub scopus_api_key: String,
    pub arxiv_base_url: String,
    pub scopus_base_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            pacing: PacingConfig {
                cooldown_secs: env::var("SCRAPE_COOLDOWN_SECS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()?,
                batch_results: env::var("SCRAPE_BATCH_RESULTS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()?,
                num_retries: env::var("SCRAPE_NUM_RETRIES")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()?,
                max_results: env::var("SCRAPE_MAX_RESULTS")
                    .unwrap_or_else(|_| "100".to_string())
                    .parse()?,
            },
            backends: BackendsConfig {
                serpapi_key: env::var("SERPAPI_KEY").unwrap_or_default(),
                scopus_api_key: env::var("SCOPUS_API_KEY").unwrap_or_default(),
                arxiv_base_url: env::var("ARXIV_BASE_URL")
                    .unwrap_or_else(|_| ARXIV_API_URL.to_string()),
                scopus_base_url: env::var("SCOPUS_BASE_URL")
                    .unwrap_or_else(|_| SCOPUS_API_URL.to_string()),
            },
        })
    }
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: 5,
            batch_results: 10,
            num_retries: 10,
            max_results: 100,
        }
    }
}
