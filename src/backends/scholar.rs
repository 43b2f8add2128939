//! Google Scholar backend adapter, via SerpAPI.
//!
//! Scholar has no official API; SerpAPI's `google_scholar` engine is
//! the stable way in. Requires `SERPAPI_KEY` — without it the backend
//! refuses registration instead of failing mid-job.
//!
//! Scholar records carry no DOI field; a DOI is recovered from the
//! link or snippet text when one is visible, otherwise left absent.
//! Authors, year and venue are folded into the
//! `publication_info.summary` string ("Authors - Venue, Year - site")
//! and parsed back out of it.

use crate::backends::{BackendAdapter, RawRecord, ResultCursor};
use crate::config::BackendsConfig;
use crate::types::{BackendId, LabeledUrl, Paper, ScrapeError, ScrapeResult};
use crate::utils::retry::with_retry;
use async_trait::async_trait;
use futures::FutureExt;
use serpapi_search_rust::serp_api_search::SerpApiSearch;
use std::collections::{HashMap, VecDeque};
use tracing::debug;

/// SerpAPI caps `num` for the Scholar engine at 20 per page.
const PAGE_SIZE: usize = 20;

pub struct ScholarAdapter {
    api_key: String,
    num_retries: u32,
}

impl ScholarAdapter {
    pub fn new(api_key: String, num_retries: u32) -> Self {
        Self { api_key, num_retries }
    }

    /// `None` when no SerpAPI key is configured.
    pub fn from_config(config: &BackendsConfig, num_retries: u32) -> Option<Self> {
        if config.serpapi_key.is_empty() {
            return None;
        }
        Some(Self::new(config.serpapi_key.clone(), num_retries))
    }
}

#[async_trait]
impl BackendAdapter for ScholarAdapter {
    fn id(&self) -> BackendId {
        BackendId::Scholar
    }

    async fn open(&self, query: &str, max_results: usize) -> ScrapeResult<Box<dyn ResultCursor>> {
        Ok(Box::new(ScholarCursor {
            api_key: self.api_key.clone(),
            query: query.to_string(),
            num_retries: self.num_retries,
            offset: 0,
            max_results,
            buffer: VecDeque::new(),
            exhausted: false,
        }))
    }

    fn normalize(&self, raw: &RawRecord, query: &str, intent: &str) -> ScrapeResult<Paper> {
        debug!(query = %query, intent = %intent, "normalizing Scholar record");

        let title = raw
            .get("title")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let snippet = raw.get("snippet").and_then(|v| v.as_str()).unwrap_or_default();
        let link = raw.get("link").and_then(|v| v.as_str()).map(String::from);

        let summary = raw
            .get("publication_info")
            .and_then(|p| p.get("summary"))
            .and_then(|v| v.as_str());
        let (authors, year, journal) = summary.map(parse_publication_summary).unwrap_or_default();

        let pdf_url = raw
            .get("resources")
            .and_then(|r| r.as_array())
            .and_then(|arr| arr.first())
            .and_then(|res| res.get("link"))
            .and_then(|v| v.as_str())
            .map(String::from);

        let mut other_urls = Vec::new();
        if let Some(link) = &link {
            other_urls.push(LabeledUrl::new("canonical", link.clone()));
        }
        if let Some(cited_by) = raw
            .get("inline_links")
            .and_then(|links| links.get("cited_by"))
            .and_then(|cited| cited.get("link"))
            .and_then(|v| v.as_str())
        {
            other_urls.push(LabeledUrl::new("citations", cited_by));
        }

        // No DOI field on Scholar; try to spot one in the visible text.
        let doi = link
            .as_deref()
            .and_then(extract_doi)
            .or_else(|| extract_doi(snippet));

        Ok(Paper {
            doi,
            year,
            title,
            authors,
            abstract_text: if snippet.is_empty() { None } else { Some(snippet.to_string()) },
            journal,
            pdf_url,
            other_urls,
            source: BackendId::Scholar,
        })
    }
}

struct ScholarCursor {
    api_key: String,
    query: String,
    num_retries: u32,
    offset: usize,
    max_results: usize,
    buffer: VecDeque<RawRecord>,
    exhausted: bool,
}

#[async_trait]
impl ResultCursor for ScholarCursor {
    async fn advance(&mut self) -> ScrapeResult<Option<RawRecord>> {
        if self.buffer.is_empty() && !self.exhausted {
            self.fill_buffer().await?;
        }
        Ok(self.buffer.pop_front())
    }
}

impl ScholarCursor {
    async fn fill_buffer(&mut self) -> ScrapeResult<()> {
        if self.offset >= self.max_results {
            self.exhausted = true;
            return Ok(());
        }
        let page_size = PAGE_SIZE.min(self.max_results - self.offset);

        let api_key = self.api_key.clone();
        let query = self.query.clone();
        let start = self.offset;
        let records = with_retry(
            move || {
                let api_key = api_key.clone();
                let query = query.clone();
                async move { fetch_page(api_key, query, start, page_size).await }.boxed()
            },
            self.num_retries,
        )
        .await?;

        if records.len() < page_size {
            self.exhausted = true;
        }
        self.offset += records.len();
        self.buffer.extend(records);
        Ok(())
    }
}

async fn fetch_page(
    api_key: String,
    query: String,
    start: usize,
    count: usize,
) -> ScrapeResult<Vec<RawRecord>> {
    debug!(start, count, "fetching Scholar page via SerpAPI");

    let mut params = HashMap::<String, String>::new();
    params.insert("engine".to_string(), "google_scholar".to_string());
    params.insert("q".to_string(), query);
    params.insert("hl".to_string(), "en".to_string());
    params.insert("start".to_string(), start.to_string());
    params.insert("num".to_string(), count.to_string());

    let search = SerpApiSearch::google(params, api_key);
    let results = search
        .json()
        .await
        .map_err(|e| ScrapeError::unavailable(BackendId::Scholar, e.to_string()))?;

    // A page past the end simply has no organic results.
    Ok(results
        .get("organic_results")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default())
}

/// Split "Authors - Venue, Year - site" into its parts. Each part may
/// be missing; whatever cannot be recovered stays absent.
fn parse_publication_summary(summary: &str) -> (Vec<String>, Option<i32>, Option<String>) {
    let mut parts = summary.split(" - ");

    let authors = parts
        .next()
        .map(|names| {
            names
                .split(',')
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty())
                .collect()
        })
        .unwrap_or_default();

    let journal = parts.next().map(|venue| {
        // The venue segment usually ends in ", 2021"; keep the venue only.
        venue
            .rsplit_once(',')
            .filter(|(_, tail)| tail.trim().chars().all(|c| c.is_ascii_digit()))
            .map(|(head, _)| head.trim().to_string())
            .unwrap_or_else(|| venue.trim().to_string())
    });
    let journal = journal.filter(|j| !j.is_empty());

    let year = summary
        .split(|c: char| !c.is_ascii_digit())
        .find(|part| part.len() == 4)
        .and_then(|y| y.parse::<i32>().ok())
        .filter(|&y| (1800..=2100).contains(&y));

    (authors, year, journal)
}

/// Find a DOI (`10.xxxx/...`) in free text or a URL.
fn extract_doi(text: &str) -> Option<String> {
    let pos = text.find("10.")?;
    let candidate: String = text[pos..]
        .chars()
        .take_while(|c| c.is_alphanumeric() || matches!(c, '.' | '/' | '-' | '_'))
        .collect();
    if candidate.len() > 7 && candidate.contains('/') {
        Some(candidate)
    } else {
        None
    }
}
