//! Backend adapters.
//!
//! One adapter per bibliographic service, behind a capability contract
//! the retrieval engine drives without knowing anything about the wire:
//!
//! - `open` establishes a lazily paginated cursor for a rendered query,
//! - `advance` yields the next raw record (`None` on exhaustion) and
//!   retries transient failures internally before surfacing
//!   `BackendUnavailable`,
//! - `normalize` deterministically maps a raw record into [`Paper`].
//!
//! Raw records travel as JSON values so the engine stays agnostic to
//! each backend's response shape.

pub mod arxiv;
pub mod scholar;
pub mod scopus;

use crate::config::Config;
use crate::query::render;
use crate::query::{Expr, Op};
use crate::types::{BackendId, Paper, ScrapeError, ScrapeResult};
use async_trait::async_trait;
use std::sync::Arc;

pub use arxiv::ArxivAdapter;
pub use scholar::ScholarAdapter;
pub use scopus::ScopusAdapter;

/// One raw backend record, as parsed off the wire.
pub type RawRecord = serde_json::Value;

/// A lazily advancing cursor over one backend's result stream.
#[async_trait]
pub trait ResultCursor: Send {
    /// Next raw record, or `Ok(None)` once the stream is exhausted.
    /// Transient fetch failures are retried internally; an error here
    /// means the retry budget ran out.
    async fn advance(&mut self) -> ScrapeResult<Option<RawRecord>>;
}

#[async_trait]
pub trait BackendAdapter: Send + Sync {
    fn id(&self) -> BackendId;

    /// Open a cursor for a query already rendered in this backend's
    /// grammar. Fetches at most one page per advance, never eagerly.
    async fn open(&self, query: &str, max_results: usize) -> ScrapeResult<Box<dyn ResultCursor>>;

    /// Map one raw record into the unified schema. Missing optional
    /// fields become `None`, never placeholder text.
    fn normalize(&self, raw: &RawRecord, query: &str, intent: &str) -> ScrapeResult<Paper>;
}

pub const ALL_OPS: &[Op] = &[Op::And, Op::Or, Op::Not];

/// Capability bundle for one registered backend.
pub struct BackendEntry {
    pub id: BackendId,
    pub display_name: &'static str,
    /// Operators this backend's grammar can represent. Checked before
    /// a job starts; an unrepresentable operator is a declared
    /// limitation, not a runtime failure.
    pub supported_ops: &'static [Op],
    pub renderer: fn(&Expr) -> String,
    pub adapter: Arc<dyn BackendAdapter>,
}

impl BackendEntry {
    pub fn render(&self, expr: &Expr) -> String {
        (self.renderer)(expr)
    }
}

/// Typed registry mapping backend ids to their capability bundles.
///
/// Iteration order is fixed (registration order), which keeps the
/// engine's sequential backend visits and its pacing deterministic.
pub struct BackendRegistry {
    entries: Vec<BackendEntry>,
}

impl BackendRegistry {
    pub fn new(entries: Vec<BackendEntry>) -> Self {
        Self { entries }
    }

    /// Build the registry from configuration. Backends whose
    /// credentials are missing refuse registration and come back as
    /// `BackendUnsupported` warnings; they never fail mid-job.
    pub fn from_config(config: &Config) -> (Self, Vec<ScrapeError>) {
        let mut entries = Vec::new();
        let mut refused = Vec::new();

        entries.push(BackendEntry {
            id: BackendId::Arxiv,
            display_name: BackendId::Arxiv.display_name(),
            supported_ops: ALL_OPS,
            renderer: render::arxiv_query,
            adapter: Arc::new(ArxivAdapter::new(
                config.backends.arxiv_base_url.clone(),
                config.pacing.num_retries,
            )),
        });

        match ScholarAdapter::from_config(&config.backends, config.pacing.num_retries) {
            Some(adapter) => entries.push(BackendEntry {
                id: BackendId::Scholar,
                display_name: BackendId::Scholar.display_name(),
                supported_ops: ALL_OPS,
                renderer: render::scholar_query,
                adapter: Arc::new(adapter),
            }),
            None => refused.push(ScrapeError::unsupported(
                BackendId::Scholar,
                "SERPAPI_KEY is not set",
            )),
        }

        match ScopusAdapter::from_config(&config.backends, config.pacing.num_retries) {
            Some(adapter) => entries.push(BackendEntry {
                id: BackendId::Scopus,
                display_name: BackendId::Scopus.display_name(),
                supported_ops: ALL_OPS,
                renderer: render::scopus_query,
                adapter: Arc::new(adapter),
            }),
            None => refused.push(ScrapeError::unsupported(
                BackendId::Scopus,
                "SCOPUS_API_KEY is not set",
            )),
        }

        (Self { entries }, refused)
    }

    pub fn get(&self, id: BackendId) -> Option<&BackendEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn ids(&self) -> impl Iterator<Item = BackendId> + '_ {
        self.entries.iter().map(|e| e.id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackendsConfig, PacingConfig, ARXIV_API_URL, SCOPUS_API_URL};

    fn config(serpapi_key: &str, scopus_key: &str) -> Config {
        Config {
            pacing: PacingConfig::default(),
            backends: BackendsConfig {
                serpapi_key: serpapi_key.to_string(),
                scopus_api_key: scopus_key.to_string(),
                arxiv_base_url: ARXIV_API_URL.to_string(),
                scopus_base_url: SCOPUS_API_URL.to_string(),
            },
        }
    }

    #[test]
    fn test_missing_credentials_refuse_registration() {
        let (registry, refused) = BackendRegistry::from_config(&config("", ""));
        assert_eq!(registry.ids().collect::<Vec<_>>(), vec![BackendId::Arxiv]);
        assert_eq!(refused.len(), 2);
        assert!(matches!(refused[0], ScrapeError::BackendUnsupported { backend: BackendId::Scholar, .. }));
        assert!(matches!(refused[1], ScrapeError::BackendUnsupported { backend: BackendId::Scopus, .. }));
    }

    #[test]
    fn test_credentials_enable_backends_independently() {
        let (registry, refused) = BackendRegistry::from_config(&config("serp-key", ""));
        assert_eq!(
            registry.ids().collect::<Vec<_>>(),
            vec![BackendId::Arxiv, BackendId::Scholar]
        );
        assert_eq!(refused.len(), 1);
    }
}
