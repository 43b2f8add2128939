//! Scopus backend adapter (Elsevier Scopus Search API).
//!
//! JSON over HTTP with `start`/`count` offset pagination. Requires
//! `SCOPUS_API_KEY`; without it the backend refuses registration.
//! Scopus signals an empty result set with a sentinel `error` entry
//! rather than an empty list, which the cursor treats as exhaustion.

use crate::backends::{BackendAdapter, RawRecord, ResultCursor};
use crate::config::BackendsConfig;
use crate::types::{BackendId, LabeledUrl, Paper, ScrapeError, ScrapeResult};
use crate::utils::retry::with_retry;
use async_trait::async_trait;
use futures::FutureExt;
use std::collections::VecDeque;
use tracing::debug;

/// Scopus caps a standard-view page at 25 entries.
const PAGE_SIZE: usize = 25;

pub struct ScopusAdapter {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
    num_retries: u32,
}

impl ScopusAdapter {
    pub fn new(api_key: String, base_url: String, num_retries: u32) -> Self {
        Self {
            api_key,
            base_url,
            client: reqwest::Client::new(),
            num_retries,
        }
    }

    /// `None` when no Elsevier API key is configured.
    pub fn from_config(config: &BackendsConfig, num_retries: u32) -> Option<Self> {
        if config.scopus_api_key.is_empty() {
            return None;
        }
        Some(Self::new(
            config.scopus_api_key.clone(),
            config.scopus_base_url.clone(),
            num_retries,
        ))
    }
}

#[async_trait]
impl BackendAdapter for ScopusAdapter {
    fn id(&self) -> BackendId {
        BackendId::Scopus
    }

    async fn open(&self, query: &str, max_results: usize) -> ScrapeResult<Box<dyn ResultCursor>> {
        Ok(Box::new(ScopusCursor {
            client: self.client.clone(),
            api_key: self.api_key.clone(),
            base_url: self.base_url.clone(),
            query: query.to_string(),
            num_retries: self.num_retries,
            offset: 0,
            max_results,
            buffer: VecDeque::new(),
            exhausted: false,
        }))
    }

    fn normalize(&self, raw: &RawRecord, query: &str, intent: &str) -> ScrapeResult<Paper> {
        debug!(query = %query, intent = %intent, "normalizing Scopus record");

        let field = |name: &str| raw.get(name).and_then(|v| v.as_str()).map(String::from);

        let year = field("prism:coverDate")
            .and_then(|date| date.get(..4).and_then(|y| y.parse::<i32>().ok()));

        let mut pdf_url = None;
        let mut other_urls = Vec::new();
        if let Some(links) = raw.get("link").and_then(|v| v.as_array()) {
            for link in links {
                let href = link.get("@href").and_then(|v| v.as_str());
                let reference = link.get("@ref").and_then(|v| v.as_str());
                let (Some(href), Some(reference)) = (href, reference) else {
                    continue;
                };
                match reference {
                    "full-text" => pdf_url = Some(href.to_string()),
                    "self" => {}
                    "scopus" => other_urls.push(LabeledUrl::new("canonical", href)),
                    "scopus-citedby" => other_urls.push(LabeledUrl::new("citations", href)),
                    other => other_urls.push(LabeledUrl::new(other, href)),
                }
            }
        }

        Ok(Paper {
            doi: field("prism:doi"),
            year,
            title: field("dc:title").unwrap_or_default(),
            authors: field("dc:creator").into_iter().collect(),
            abstract_text: field("dc:description"),
            journal: field("prism:publicationName"),
            pdf_url,
            other_urls,
            source: BackendId::Scopus,
        })
    }
}

struct ScopusCursor {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    query: String,
    num_retries: u32,
    offset: usize,
    max_results: usize,
    buffer: VecDeque<RawRecord>,
    exhausted: bool,
}

#[async_trait]
impl ResultCursor for ScopusCursor {
    async fn advance(&mut self) -> ScrapeResult<Option<RawRecord>> {
        if self.buffer.is_empty() && !self.exhausted {
            self.fill_buffer().await?;
        }
        Ok(self.buffer.pop_front())
    }
}

impl ScopusCursor {
    async fn fill_buffer(&mut self) -> ScrapeResult<()> {
        if self.offset >= self.max_results {
            self.exhausted = true;
            return Ok(());
        }
        let page_size = PAGE_SIZE.min(self.max_results - self.offset);

        let client = self.client.clone();
        let api_key = self.api_key.clone();
        let base_url = self.base_url.clone();
        let query = self.query.clone();
        let start = self.offset;
        let records = with_retry(
            move || {
                let client = client.clone();
                let api_key = api_key.clone();
                let base_url = base_url.clone();
                let query = query.clone();
                async move { fetch_page(client, api_key, base_url, query, start, page_size).await }
                    .boxed()
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
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    query: String,
    start: usize,
    count: usize,
) -> ScrapeResult<Vec<RawRecord>> {
    debug!(start, count, "fetching Scopus page");

    let start_param = start.to_string();
    let count_param = count.to_string();
    let body: serde_json::Value = client
        .get(&base_url)
        .header("X-ELS-APIKey", api_key)
        .header(reqwest::header::ACCEPT, "application/json")
        .query(&[
            ("query", query.as_str()),
            ("start", start_param.as_str()),
            ("count", count_param.as_str()),
        ])
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| ScrapeError::unavailable(BackendId::Scopus, e.to_string()))?
        .json()
        .await
        .map_err(|e| ScrapeError::unavailable(BackendId::Scopus, e.to_string()))?;

    let entries = body
        .get("search-results")
        .and_then(|r| r.get("entry"))
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();

    // An empty result set comes back as a single sentinel error entry.
    if entries.len() == 1 && entries[0].get("error").is_some() {
        return Ok(Vec::new());
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn adapter() -> ScopusAdapter {
        ScopusAdapter::new("key".to_string(), "http://unused".to_string(), 1)
    }

    #[test]
    fn test_normalize_full_record() {
        let raw = json!({
            "dc:title": "Graphene at scale",
            "dc:creator": "Novoselov K.",
            "prism:publicationName": "Carbon",
            "prism:coverDate": "2019-07-15",
            "prism:doi": "10.1016/j.carbon.2019.01.001",
            "dc:description": "We grow graphene.",
            "link": [
                {"@ref": "self", "@href": "https://api.elsevier.com/content/abstract/1"},
                {"@ref": "scopus", "@href": "https://www.scopus.com/record/1"},
                {"@ref": "scopus-citedby", "@href": "https://www.scopus.com/cited/1"},
                {"@ref": "full-text", "@href": "https://www.sciencedirect.com/1.pdf"}
            ]
        });

        let paper = adapter().normalize(&raw, "ALL(graphene)", "graphene").unwrap();
        assert_eq!(paper.doi.as_deref(), Some("10.1016/j.carbon.2019.01.001"));
        assert_eq!(paper.year, Some(2019));
        assert_eq!(paper.title, "Graphene at scale");
        assert_eq!(paper.authors, vec!["Novoselov K."]);
        assert_eq!(paper.journal.as_deref(), Some("Carbon"));
        assert_eq!(paper.pdf_url.as_deref(), Some("https://www.sciencedirect.com/1.pdf"));
        assert_eq!(paper.other_urls.len(), 2);
        assert_eq!(paper.source, BackendId::Scopus);
    }

    #[test]
    fn test_normalize_sparse_record() {
        let paper = adapter().normalize(&json!({"dc:title": "Bare"}), "q", "q").unwrap();
        assert!(paper.doi.is_none());
        assert!(paper.year.is_none());
        assert!(paper.authors.is_empty());
        assert!(paper.journal.is_none());
        assert!(paper.pdf_url.is_none());
    }

    #[tokio::test]
    async fn test_cursor_treats_error_entry_as_empty() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/")
            .match_query(mockito::Matcher::UrlEncoded("start".into(), "0".into()))
            .with_body(
                json!({"search-results": {"entry": [{"error": "Result set was empty"}]}}).to_string(),
            )
            .create_async()
            .await;

        let adapter = ScopusAdapter::new("key".to_string(), server.url(), 1);
        let mut cursor = adapter.open("ALL(nothing)", 10).await.unwrap();
        assert!(cursor.advance().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cursor_pages_until_short_page() {
        let mut server = mockito::Server::new_async().await;
        let page = json!({"search-results": {"entry": [
            {"dc:title": "One"},
            {"dc:title": "Two"}
        ]}});
        let mock = server
            .mock("GET", "/")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("query".into(), "ALL(x)".into()),
                mockito::Matcher::UrlEncoded("start".into(), "0".into()),
            ]))
            .with_body(page.to_string())
            .create_async()
            .await;

        let adapter = ScopusAdapter::new("key".to_string(), server.url(), 1);
        let mut cursor = adapter.open("ALL(x)", 50).await.unwrap();

        assert!(cursor.advance().await.unwrap().is_some());
        assert!(cursor.advance().await.unwrap().is_some());
        // Short page: exhausted without another request.
        assert!(cursor.advance().await.unwrap().is_none());
        mock.assert_async().await;
    }
}
