//! Retrieval engine.
//!
//! Orchestrates one retrieval job across the selected backends:
//! validates and compiles the intent (`prepare`), then drives each
//! backend's cursor sequentially (`run`), batching advances into pacing
//! windows with a cooldown sleep in between so the backends do not
//! throttle us. Progress snapshots go out over an mpsc channel and a
//! watch channel carries the cooperative cancel signal; both ends
//! belong to whatever background-task facility hosts the job.
//!
//! Backends are visited one at a time by design — sequential visits
//! keep the cooldown discipline deterministic.

pub mod progress;

pub use progress::{human_time, ProgressSnapshot};

use crate::backends::BackendRegistry;
use crate::config::PacingConfig;
use crate::query::{normalize_intent, parse};
use crate::types::{BackendId, Paper, ScrapeError, ScrapeResult};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;
use tracing::{info, warn};
use uuid::Uuid;

/// One user search request. Immutable once a job starts.
#[derive(Debug, Clone)]
pub struct SearchIntent {
    pub include_text: String,
    pub exclude_text: String,
    pub backends: Vec<BackendId>,
    pub max_results_per_backend: usize,
}

impl SearchIntent {
    /// The raw intent text, carried along to normalizers for tracing.
    pub fn intent_text(&self) -> String {
        format!("{} {}", self.include_text, self.exclude_text)
            .trim()
            .to_string()
    }
}

/// Validation output: the canonical expression, one rendered query per
/// usable backend, and the upfront duration estimate. No retrieval has
/// happened yet.
#[derive(Debug)]
pub struct PreparedSearch {
    pub intent: SearchIntent,
    pub canonical: String,
    /// Rendered queries in the fixed order the engine will visit them.
    pub queries: Vec<(BackendId, String)>,
    /// Selected backends excluded before the run, with the reason.
    pub skipped: Vec<(BackendId, String)>,
    pub estimated_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Cancelled,
    Failed,
}

/// A per-backend failure note. The job keeps running; the note is the
/// caller-visible record of what went missing.
#[derive(Debug, Clone)]
pub struct BackendFailure {
    pub backend: BackendId,
    pub reason: String,
}

/// Terminal result of one retrieval job. Every terminal state carries
/// whatever papers had been accumulated — cancellation and partial
/// failure are not data-destructive.
#[derive(Debug)]
pub struct JobOutcome {
    pub job_id: Uuid,
    pub state: JobState,
    pub papers: Vec<Paper>,
    pub failures: Vec<BackendFailure>,
}

pub struct Scraper {
    registry: BackendRegistry,
    pacing: PacingConfig,
}

impl Scraper {
    pub fn new(registry: BackendRegistry, pacing: PacingConfig) -> Self {
        Self { registry, pacing }
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    /// Validate an intent and compile it into per-backend queries.
    ///
    /// Fails fast with `Validation`/`Syntax` before any job state
    /// exists. Selected backends that refuse (unregistered, or an
    /// operator their grammar cannot represent) land in `skipped`; the
    /// search only fails when no backend remains.
    pub fn prepare(&self, intent: SearchIntent) -> ScrapeResult<PreparedSearch> {
        if intent.max_results_per_backend == 0 {
            return Err(ScrapeError::Validation(
                "max results per backend must be positive".to_string(),
            ));
        }
        if intent.backends.is_empty() {
            return Err(ScrapeError::Validation("no backends selected".to_string()));
        }

        let tokens = normalize_intent(&intent.include_text, &intent.exclude_text);
        if tokens.is_empty() {
            return Err(ScrapeError::Validation(
                "no search terms left after normalization".to_string(),
            ));
        }
        let expr = parse(&tokens)?;
        let canonical = expr.canonical();
        let ops = expr.ops_used();

        let mut queries = Vec::new();
        let mut skipped = Vec::new();
        for &backend in &intent.backends {
            match self.registry.get(backend) {
                None => skipped.push((
                    backend,
                    "not registered (missing credentials?)".to_string(),
                )),
                Some(entry) => {
                    if let Some(op) = ops.iter().find(|op| !entry.supported_ops.contains(*op)) {
                        skipped.push((backend, format!("operator {:?} not supported", op)));
                    } else {
                        queries.push((backend, entry.render(&expr)));
                    }
                }
            }
        }
        if queries.is_empty() {
            return Err(ScrapeError::Validation(
                "none of the selected backends can run this search".to_string(),
            ));
        }

        let windows = (intent.max_results_per_backend / self.pacing.batch_results) as u64;
        let estimated_secs = queries.len() as u64 * windows * self.pacing.cooldown_secs;

        Ok(PreparedSearch {
            intent,
            canonical,
            queries,
            skipped,
            estimated_secs,
        })
    }

    /// Execute a prepared search to completion.
    ///
    /// Emits a snapshot after every pacing window and once more at the
    /// end. The cancel signal is checked cooperatively at window
    /// boundaries and between backends, so cancellation latency is
    /// bounded by one window of backend calls. Results already
    /// collected always survive into the outcome.
    pub async fn run(
        &self,
        prepared: PreparedSearch,
        progress: mpsc::Sender<ProgressSnapshot>,
        cancel: watch::Receiver<bool>,
    ) -> JobOutcome {
        let job_id = Uuid::new_v4();
        let max = prepared.intent.max_results_per_backend;
        let intent_text = prepared.intent.intent_text();
        let n_backends = prepared.queries.len();

        let mut papers: Vec<Paper> = Vec::new();
        let mut failures: Vec<BackendFailure> = Vec::new();
        let mut remaining_secs = prepared.estimated_secs as i64;
        let mut state = JobState::Running;

        info!(
            %job_id,
            canonical = %prepared.canonical,
            backends = n_backends,
            max_per_backend = max,
            "retrieval job started"
        );

        'backends: for (index, (backend, query)) in prepared.queries.iter().enumerate() {
            if *cancel.borrow() {
                state = JobState::Cancelled;
                break;
            }

            // Collected so far plus full budgets for every backend not
            // yet started, this one included.
            let total_estimate = papers.len() + max * (n_backends - index);

            let Some(entry) = self.registry.get(*backend) else {
                failures.push(BackendFailure {
                    backend: *backend,
                    reason: "backend missing from registry".to_string(),
                });
                continue;
            };

            info!(backend = %backend, query = %query, "opening backend cursor");
            let mut cursor = match entry.adapter.open(query, max).await {
                Ok(cursor) => cursor,
                Err(e) => {
                    warn!(backend = %backend, error = %e, "backend failed to open, moving on");
                    failures.push(BackendFailure {
                        backend: *backend,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let mut taken = 0usize;
            while taken < max {
                match cursor.advance().await {
                    Ok(Some(raw)) => {
                        match entry.adapter.normalize(&raw, query, &intent_text) {
                            Ok(paper) => {
                                papers.push(paper);
                                taken += 1;
                            }
                            Err(e) => {
                                warn!(backend = %backend, error = %e, "skipping malformed record");
                                continue;
                            }
                        }
                        if taken >= max {
                            break;
                        }
                        if taken % self.pacing.batch_results == 0 {
                            let _ = progress
                                .send(ProgressSnapshot {
                                    found: papers.len(),
                                    total_estimate,
                                    time_remaining: human_time(remaining_secs),
                                })
                                .await;
                            sleep(Duration::from_secs(self.pacing.cooldown_secs)).await;
                            remaining_secs -= self.pacing.cooldown_secs as i64;
                            if *cancel.borrow() {
                                state = JobState::Cancelled;
                                break 'backends;
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!(
                            backend = %backend,
                            error = %e,
                            collected = taken,
                            "backend failed mid-stream, keeping its partial results"
                        );
                        failures.push(BackendFailure {
                            backend: *backend,
                            reason: e.to_string(),
                        });
                        continue 'backends;
                    }
                }
            }
            info!(backend = %backend, collected = taken, "backend finished");
        }

        if state != JobState::Cancelled {
            state = if failures.len() == n_backends {
                JobState::Failed
            } else {
                JobState::Completed
            };
        }

        let _ = progress
            .send(ProgressSnapshot {
                found: papers.len(),
                total_estimate: papers.len(),
                time_remaining: human_time(0),
            })
            .await;

        info!(
            %job_id,
            state = ?state,
            papers = papers.len(),
            failed_backends = failures.len(),
            "retrieval job finished"
        );

        JobOutcome {
            job_id,
            state,
            papers,
            failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{
        BackendAdapter, BackendEntry, RawRecord, ResultCursor, ALL_OPS,
    };
    use crate::query::render;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Arc;

    /// In-memory adapter yielding `count` records, optionally failing
    /// after `fail_after` of them, optionally requesting cancellation
    /// the moment its cursor opens.
    struct MockAdapter {
        id: BackendId,
        count: usize,
        fail_after: Option<usize>,
        cancel_on_open: Option<watch::Sender<bool>>,
    }

    impl MockAdapter {
        fn yielding(id: BackendId, count: usize) -> Self {
            Self { id, count, fail_after: None, cancel_on_open: None }
        }

        fn failing_after(id: BackendId, fail_after: usize) -> Self {
            Self { id, count: usize::MAX, fail_after: Some(fail_after), cancel_on_open: None }
        }
    }

    struct MockCursor {
        records: VecDeque<RawRecord>,
        fail_after: Option<usize>,
        yielded: usize,
        id: BackendId,
    }

    #[async_trait]
    impl ResultCursor for MockCursor {
        async fn advance(&mut self) -> ScrapeResult<Option<RawRecord>> {
            if self.fail_after == Some(self.yielded) {
                return Err(ScrapeError::unavailable(self.id, "mock outage"));
            }
            self.yielded += 1;
            Ok(self.records.pop_front())
        }
    }

    #[async_trait]
    impl BackendAdapter for MockAdapter {
        fn id(&self) -> BackendId {
            self.id
        }

        async fn open(&self, _query: &str, max_results: usize) -> ScrapeResult<Box<dyn ResultCursor>> {
            if let Some(tx) = &self.cancel_on_open {
                let _ = tx.send(true);
            }
            let records = (0..self.count.min(max_results.saturating_mul(2)))
                .map(|i| json!({"title": format!("{} paper {}", self.id, i)}))
                .collect();
            Ok(Box::new(MockCursor {
                records,
                fail_after: self.fail_after,
                yielded: 0,
                id: self.id,
            }))
        }

        fn normalize(&self, raw: &RawRecord, _query: &str, _intent: &str) -> ScrapeResult<Paper> {
            Ok(Paper {
                doi: None,
                year: None,
                title: raw.get("title").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                authors: vec![],
                abstract_text: None,
                journal: None,
                pdf_url: None,
                other_urls: vec![],
                source: self.id,
            })
        }
    }

    fn entry(adapter: MockAdapter) -> BackendEntry {
        BackendEntry {
            id: adapter.id,
            display_name: adapter.id.display_name(),
            supported_ops: ALL_OPS,
            renderer: render::arxiv_query,
            adapter: Arc::new(adapter),
        }
    }

    fn fast_pacing() -> PacingConfig {
        PacingConfig { cooldown_secs: 0, batch_results: 1, num_retries: 1, max_results: 100 }
    }

    fn intent(backends: Vec<BackendId>, max: usize) -> SearchIntent {
        SearchIntent {
            include_text: "electron transport".to_string(),
            exclude_text: "survey".to_string(),
            backends,
            max_results_per_backend: max,
        }
    }

    fn channels() -> (mpsc::Sender<ProgressSnapshot>, mpsc::Receiver<ProgressSnapshot>, watch::Sender<bool>, watch::Receiver<bool>) {
        let (tx, rx) = mpsc::channel(256);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        (tx, rx, cancel_tx, cancel_rx)
    }

    #[test]
    fn test_prepare_rejects_invalid_intents() {
        let scraper = Scraper::new(
            BackendRegistry::new(vec![entry(MockAdapter::yielding(BackendId::Arxiv, 5))]),
            fast_pacing(),
        );

        let no_backends = scraper.prepare(intent(vec![], 10));
        assert!(matches!(no_backends, Err(ScrapeError::Validation(_))));

        let zero_max = scraper.prepare(intent(vec![BackendId::Arxiv], 0));
        assert!(matches!(zero_max, Err(ScrapeError::Validation(_))));

        let mut empty = intent(vec![BackendId::Arxiv], 10);
        empty.include_text = String::new();
        empty.exclude_text = String::new();
        assert!(matches!(scraper.prepare(empty), Err(ScrapeError::Validation(_))));
    }

    #[test]
    fn test_prepare_surfaces_syntax_errors() {
        let scraper = Scraper::new(
            BackendRegistry::new(vec![entry(MockAdapter::yielding(BackendId::Arxiv, 5))]),
            fast_pacing(),
        );
        let mut bad = intent(vec![BackendId::Arxiv], 10);
        bad.include_text = "(electron or".to_string();
        bad.exclude_text = String::new();
        assert!(matches!(scraper.prepare(bad), Err(ScrapeError::Syntax { .. })));
    }

    #[test]
    fn test_prepare_skips_unregistered_backends() {
        let scraper = Scraper::new(
            BackendRegistry::new(vec![entry(MockAdapter::yielding(BackendId::Arxiv, 5))]),
            fast_pacing(),
        );
        let prepared = scraper
            .prepare(intent(vec![BackendId::Arxiv, BackendId::Scholar], 10))
            .unwrap();
        assert_eq!(prepared.queries.len(), 1);
        assert_eq!(prepared.queries[0].0, BackendId::Arxiv);
        assert_eq!(prepared.skipped.len(), 1);
        assert_eq!(prepared.skipped[0].0, BackendId::Scholar);

        // Only unusable backends selected: that is a validation failure.
        let none_left = scraper.prepare(intent(vec![BackendId::Scholar], 10));
        assert!(matches!(none_left, Err(ScrapeError::Validation(_))));
    }

    #[test]
    fn test_prepare_estimates_duration() {
        let scraper = Scraper::new(
            BackendRegistry::new(vec![
                entry(MockAdapter::yielding(BackendId::Arxiv, 5)),
                entry(MockAdapter::yielding(BackendId::Scholar, 5)),
            ]),
            PacingConfig { cooldown_secs: 5, batch_results: 10, num_retries: 1, max_results: 100 },
        );
        let prepared = scraper
            .prepare(intent(vec![BackendId::Arxiv, BackendId::Scholar], 100))
            .unwrap();
        // 2 backends x (100 / 10) windows x 5s cooldown
        assert_eq!(prepared.estimated_secs, 100);
        assert_eq!(prepared.canonical, "electron&transport&~survey");
    }

    #[tokio::test]
    async fn test_per_backend_cap_is_enforced() {
        let scraper = Scraper::new(
            BackendRegistry::new(vec![entry(MockAdapter::yielding(BackendId::Arxiv, 50))]),
            fast_pacing(),
        );
        let prepared = scraper.prepare(intent(vec![BackendId::Arxiv], 3)).unwrap();
        let (tx, _rx, _cancel_tx, cancel_rx) = channels();

        let outcome = scraper.run(prepared, tx, cancel_rx).await;
        assert_eq!(outcome.state, JobState::Completed);
        assert_eq!(outcome.papers.len(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_backend_completes_below_cap() {
        let scraper = Scraper::new(
            BackendRegistry::new(vec![entry(MockAdapter::yielding(BackendId::Arxiv, 4))]),
            fast_pacing(),
        );
        let prepared = scraper.prepare(intent(vec![BackendId::Arxiv], 10)).unwrap();
        let (tx, mut rx, _cancel_tx, cancel_rx) = channels();

        let outcome = scraper.run(prepared, tx, cancel_rx).await;
        assert_eq!(outcome.state, JobState::Completed);
        assert_eq!(outcome.papers.len(), 4);

        let mut last = None;
        while let Ok(snapshot) = rx.try_recv() {
            last = Some(snapshot);
        }
        let last = last.expect("at least the final snapshot");
        assert_eq!(last.found, 4);
        assert_eq!(last.total_estimate, 4);
        assert_eq!(last.time_remaining, "Done!");
    }

    #[tokio::test]
    async fn test_cancellation_keeps_earlier_results_and_skips_later_backends() {
        let (_tx_unused, _rx_unused, cancel_tx, cancel_rx) = channels();
        let second = MockAdapter {
            id: BackendId::Scholar,
            count: 10,
            fail_after: None,
            cancel_on_open: Some(cancel_tx),
        };
        let scraper = Scraper::new(
            BackendRegistry::new(vec![
                entry(MockAdapter::yielding(BackendId::Arxiv, 2)),
                entry(second),
                entry(MockAdapter::yielding(BackendId::Scopus, 10)),
            ]),
            fast_pacing(),
        );
        let prepared = scraper
            .prepare(intent(
                vec![BackendId::Arxiv, BackendId::Scholar, BackendId::Scopus],
                5,
            ))
            .unwrap();
        let (tx, _rx, _keep, _) = channels();

        let outcome = scraper.run(prepared, tx, cancel_rx).await;
        assert_eq!(outcome.state, JobState::Cancelled);

        // Backend 1 fully collected, backend 3 never touched.
        let arxiv = outcome.papers.iter().filter(|p| p.source == BackendId::Arxiv).count();
        let scopus = outcome.papers.iter().filter(|p| p.source == BackendId::Scopus).count();
        assert_eq!(arxiv, 2);
        assert_eq!(scopus, 0);
    }

    #[tokio::test]
    async fn test_partial_failure_is_isolated() {
        let scraper = Scraper::new(
            BackendRegistry::new(vec![
                entry(MockAdapter::failing_after(BackendId::Arxiv, 3)),
                entry(MockAdapter::yielding(BackendId::Scholar, 5)),
            ]),
            fast_pacing(),
        );
        let prepared = scraper
            .prepare(intent(vec![BackendId::Arxiv, BackendId::Scholar], 10))
            .unwrap();
        let (tx, _rx, _cancel_tx, cancel_rx) = channels();

        let outcome = scraper.run(prepared, tx, cancel_rx).await;
        assert_eq!(outcome.state, JobState::Completed);
        assert_eq!(outcome.papers.len(), 8);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].backend, BackendId::Arxiv);
    }

    #[tokio::test]
    async fn test_all_backends_failing_fails_the_job() {
        let scraper = Scraper::new(
            BackendRegistry::new(vec![
                entry(MockAdapter::failing_after(BackendId::Arxiv, 1)),
                entry(MockAdapter::failing_after(BackendId::Scholar, 0)),
            ]),
            fast_pacing(),
        );
        let prepared = scraper
            .prepare(intent(vec![BackendId::Arxiv, BackendId::Scholar], 10))
            .unwrap();
        let (tx, _rx, _cancel_tx, cancel_rx) = channels();

        let outcome = scraper.run(prepared, tx, cancel_rx).await;
        assert_eq!(outcome.state, JobState::Failed);
        assert_eq!(outcome.failures.len(), 2);
        // The record collected before the outage still comes back.
        assert_eq!(outcome.papers.len(), 1);
    }
}
