//! arXiv backend adapter.
//!
//! Talks to the public Atom export API (`/api/query`) with offset
//! pagination. No credentials required. DOIs are derived from the
//! entry id (`10.48550/arXiv.<id>` with the version suffix stripped),
//! the `pdf`-titled link becomes the PDF URL and every other link is
//! kept as a labeled URL.

use crate::backends::{BackendAdapter, RawRecord, ResultCursor};
use crate::types::{BackendId, LabeledUrl, Paper, ScrapeError, ScrapeResult};
use crate::utils::retry::with_retry;
use async_trait::async_trait;
use chrono::Datelike;
use futures::FutureExt;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

/// Records fetched per request; arXiv caps a single page well above this.
const PAGE_SIZE: usize = 100;

pub struct ArxivAdapter {
    base_url: String,
    client: reqwest::Client,
    num_retries: u32,
}

impl ArxivAdapter {
    pub fn new(base_url: String, num_retries: u32) -> Self {
        Self {
            base_url,
            client: reqwest::Client::new(),
            num_retries,
        }
    }
}

#[async_trait]
impl BackendAdapter for ArxivAdapter {
    fn id(&self) -> BackendId {
        BackendId::Arxiv
    }

    async fn open(&self, query: &str, max_results: usize) -> ScrapeResult<Box<dyn ResultCursor>> {
        Ok(Box::new(ArxivCursor {
            client: self.client.clone(),
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
        let entry: ArxivEntry = serde_json::from_value(raw.clone())
            .map_err(|e| ScrapeError::unavailable(BackendId::Arxiv, format!("malformed record: {}", e)))?;
        debug!(query = %query, intent = %intent, id = %entry.id, "normalizing arXiv record");

        // "http://arxiv.org/abs/2101.00001v2" -> "2101.00001"
        let short_id = entry
            .id
            .rsplit('/')
            .next()
            .and_then(|tail| tail.split('v').next())
            .unwrap_or_default();
        let doi = if short_id.is_empty() {
            None
        } else {
            Some(format!("10.48550/arXiv.{}", short_id))
        };

        let year = chrono::DateTime::parse_from_rfc3339(&entry.published)
            .ok()
            .map(|d| d.year());

        let pdf_url = entry
            .links
            .iter()
            .find(|l| l.title.as_deref() == Some("pdf"))
            .map(|l| l.href.clone());
        let other_urls = entry
            .links
            .iter()
            .filter(|l| l.title.as_deref() != Some("pdf"))
            .map(|l| LabeledUrl::new(l.title.as_deref().unwrap_or("canonical"), l.href.clone()))
            .collect();

        let abstract_text = collapse_ws(&entry.summary);

        Ok(Paper {
            doi,
            year,
            title: collapse_ws(&entry.title).unwrap_or_default(),
            authors: entry.authors,
            abstract_text,
            journal: entry.journal_ref,
            pdf_url,
            other_urls,
            source: BackendId::Arxiv,
        })
    }
}

struct ArxivCursor {
    client: reqwest::Client,
    base_url: String,
    query: String,
    num_retries: u32,
    offset: usize,
    max_results: usize,
    buffer: VecDeque<RawRecord>,
    exhausted: bool,
}

#[async_trait]
impl ResultCursor for ArxivCursor {
    async fn advance(&mut self) -> ScrapeResult<Option<RawRecord>> {
        if self.buffer.is_empty() && !self.exhausted {
            self.fill_buffer().await?;
        }
        Ok(self.buffer.pop_front())
    }
}

impl ArxivCursor {
    async fn fill_buffer(&mut self) -> ScrapeResult<()> {
        if self.offset >= self.max_results {
            self.exhausted = true;
            return Ok(());
        }
        let page_size = PAGE_SIZE.min(self.max_results - self.offset);

        let client = self.client.clone();
        let base_url = self.base_url.clone();
        let query = self.query.clone();
        let start = self.offset;
        let entries = with_retry(
            move || {
                let client = client.clone();
                let base_url = base_url.clone();
                let query = query.clone();
                async move { fetch_page(client, base_url, query, start, page_size).await }.boxed()
            },
            self.num_retries,
        )
        .await?;

        if entries.len() < page_size {
            self.exhausted = true;
        }
        self.offset += entries.len();

        for entry in entries {
            let value = serde_json::to_value(&entry)
                .map_err(|e| ScrapeError::unavailable(BackendId::Arxiv, e.to_string()))?;
            self.buffer.push_back(value);
        }
        Ok(())
    }
}

async fn fetch_page(
    client: reqwest::Client,
    base_url: String,
    query: String,
    start: usize,
    count: usize,
) -> ScrapeResult<Vec<ArxivEntry>> {
    debug!(start, count, "fetching arXiv page");

    let start_param = start.to_string();
    let count_param = count.to_string();
    let body = client
        .get(&base_url)
        .query(&[
            ("search_query", query.as_str()),
            ("start", start_param.as_str()),
            ("max_results", count_param.as_str()),
        ])
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| ScrapeError::unavailable(BackendId::Arxiv, e.to_string()))?
        .text()
        .await
        .map_err(|e| ScrapeError::unavailable(BackendId::Arxiv, e.to_string()))?;

    parse_feed(&body)
}

/// One `<entry>` of the arXiv Atom feed, in the shape we care about.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ArxivEntry {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub published: String,
    pub authors: Vec<String>,
    pub journal_ref: Option<String>,
    pub links: Vec<ArxivLink>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ArxivLink {
    pub href: String,
    pub title: Option<String>,
}

/// Pull the entries out of an Atom feed. Only the elements the
/// unified schema needs are read; everything else is skipped.
fn parse_feed(xml: &str) -> ScrapeResult<Vec<ArxivEntry>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut current: Option<ArxivEntry> = None;
    let mut in_author = false;
    let mut field: Option<Field> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| ScrapeError::unavailable(BackendId::Arxiv, format!("malformed feed: {}", e)))?;
        match event {
            Event::Start(ref e) => match e.name().as_ref() {
                b"entry" => current = Some(ArxivEntry::default()),
                b"author" => in_author = true,
                b"id" => field = Some(Field::Id),
                b"title" => field = Some(Field::Title),
                b"summary" => field = Some(Field::Summary),
                b"published" => field = Some(Field::Published),
                b"name" if in_author => field = Some(Field::AuthorName),
                b"arxiv:journal_ref" => field = Some(Field::JournalRef),
                b"link" => push_link(&mut current, e),
                _ => field = None,
            },
            Event::Empty(ref e) => {
                if e.name().as_ref() == b"link" {
                    push_link(&mut current, e);
                }
            }
            Event::Text(t) => {
                let text = t
                    .unescape()
                    .map_err(|e| ScrapeError::unavailable(BackendId::Arxiv, format!("malformed feed: {}", e)))?;
                if let (Some(entry), Some(field)) = (current.as_mut(), field) {
                    match field {
                        Field::Id => entry.id.push_str(&text),
                        Field::Title => entry.title.push_str(&text),
                        Field::Summary => entry.summary.push_str(&text),
                        Field::Published => entry.published.push_str(&text),
                        Field::AuthorName => entry.authors.push(text.into_owned()),
                        Field::JournalRef => entry.journal_ref = Some(text.into_owned()),
                    }
                }
            }
            Event::End(ref e) => {
                match e.name().as_ref() {
                    b"entry" => {
                        if let Some(entry) = current.take() {
                            entries.push(entry);
                        }
                    }
                    b"author" => in_author = false,
                    _ => {}
                }
                field = None;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(entries)
}

#[derive(Debug, Clone, Copy)]
enum Field {
    Id,
    Title,
    Summary,
    Published,
    AuthorName,
    JournalRef,
}

fn push_link(current: &mut Option<ArxivEntry>, e: &quick_xml::events::BytesStart<'_>) {
    let Some(entry) = current.as_mut() else {
        return;
    };
    let mut link = ArxivLink::default();
    for attr in e.attributes().flatten() {
        let Ok(value) = attr.unescape_value() else {
            continue;
        };
        match attr.key.as_ref() {
            b"href" => link.href = value.into_owned(),
            b"title" => link.title = Some(value.into_owned()),
            _ => {}
        }
    }
    if !link.href.is_empty() {
        entry.links.push(link);
    }
}

/// Atom text fields wrap across lines; fold the runs back to single
/// spaces. Returns `None` for effectively empty text.
fn collapse_ws(text: &str) -> Option<String> {
    let folded = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if folded.is_empty() {
        None
    } else {
        Some(folded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title type="html">ArXiv Query: search_query=all:electron</title>
  <entry>
    <id>http://arxiv.org/abs/2101.00001v2</id>
    <published>2021-01-04T18:30:00Z</published>
    <title>Electron Transport in
      Layered Materials</title>
    <summary>We study electron
      transport.</summary>
    <author><name>Ada Lovelace</name></author>
    <author><name>Charles Babbage</name></author>
    <arxiv:journal_ref xmlns:arxiv="http://arxiv.org/schemas/atom">Phys. Rev. B 103</arxiv:journal_ref>
    <link href="http://arxiv.org/abs/2101.00001v2" rel="alternate" type="text/html"/>
    <link title="pdf" href="http://arxiv.org/pdf/2101.00001v2" rel="related" type="application/pdf"/>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/2102.00002v1</id>
    <published>2021-02-01T00:00:00Z</published>
    <title>Second Paper</title>
    <summary>Another abstract.</summary>
    <author><name>Grace Hopper</name></author>
    <link href="http://arxiv.org/abs/2102.00002v1" rel="alternate" type="text/html"/>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_feed() {
        let entries = parse_feed(FEED).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].authors, vec!["Ada Lovelace", "Charles Babbage"]);
        assert_eq!(entries[0].journal_ref.as_deref(), Some("Phys. Rev. B 103"));
        assert_eq!(entries[0].links.len(), 2);
        assert_eq!(entries[1].authors, vec!["Grace Hopper"]);
        assert!(entries[1].journal_ref.is_none());
    }

    #[test]
    fn test_normalize_derives_doi_and_links() {
        let adapter = ArxivAdapter::new("http://unused".to_string(), 1);
        let entries = parse_feed(FEED).unwrap();
        let raw = serde_json::to_value(&entries[0]).unwrap();

        let paper = adapter.normalize(&raw, "all:electron", "electron").unwrap();
        assert_eq!(paper.doi.as_deref(), Some("10.48550/arXiv.2101.00001"));
        assert_eq!(paper.year, Some(2021));
        assert_eq!(paper.title, "Electron Transport in Layered Materials");
        assert_eq!(paper.abstract_text.as_deref(), Some("We study electron transport."));
        assert_eq!(paper.pdf_url.as_deref(), Some("http://arxiv.org/pdf/2101.00001v2"));
        assert_eq!(paper.other_urls.len(), 1);
        assert_eq!(paper.other_urls[0].label, "canonical");
        assert_eq!(paper.source, BackendId::Arxiv);
    }

    #[test]
    fn test_normalize_missing_optionals_stay_absent() {
        let adapter = ArxivAdapter::new("http://unused".to_string(), 1);
        let entries = parse_feed(FEED).unwrap();
        let raw = serde_json::to_value(&entries[1]).unwrap();

        let paper = adapter.normalize(&raw, "all:electron", "electron").unwrap();
        assert!(paper.journal.is_none());
        assert!(paper.pdf_url.is_none());
    }

    #[tokio::test]
    async fn test_cursor_pages_and_exhausts() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("search_query".into(), "all:electron".into()),
                mockito::Matcher::UrlEncoded("start".into(), "0".into()),
                mockito::Matcher::UrlEncoded("max_results".into(), "2".into()),
            ]))
            .with_body(FEED)
            .create_async()
            .await;

        let adapter = ArxivAdapter::new(server.url(), 1);
        let mut cursor = adapter.open("all:electron", 2).await.unwrap();

        assert!(cursor.advance().await.unwrap().is_some());
        assert!(cursor.advance().await.unwrap().is_some());
        // Cap reached: the cursor must not request another page.
        assert!(cursor.advance().await.unwrap().is_none());
        mock.assert_async().await;
    }
}
