// Core types: the unified bibliographic record, backend identifiers,
// and the crate-wide error taxonomy.

use std::str::FromStr;

/// Identifies one bibliographic search backend.
///
/// The set is closed on purpose: every id maps to a statically known
/// renderer/adapter pair in the registry, so there is no runtime
/// "missing key" failure mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendId {
    Arxiv,
    Scholar,
    Scopus,
}

impl BackendId {
    /// Human-readable name, used in logs and the export Source column.
    pub fn display_name(&self) -> &'static str {
        match self {
            BackendId::Arxiv => "arXiv",
            BackendId::Scholar => "Google Scholar",
            BackendId::Scopus => "Scopus",
        }
    }
}

impl std::fmt::Display for BackendId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendId::Arxiv => write!(f, "arxiv"),
            BackendId::Scholar => write!(f, "scholar"),
            BackendId::Scopus => write!(f, "scopus"),
        }
    }
}

impl FromStr for BackendId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "arxiv" => Ok(BackendId::Arxiv),
            "scholar" | "google-scholar" => Ok(BackendId::Scholar),
            "scopus" => Ok(BackendId::Scopus),
            other => Err(format!("unknown backend '{}' (expected arxiv, scholar or scopus)", other)),
        }
    }
}

/// A URL together with the label the backend gave it ("canonical",
/// "citations", "source", ...).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LabeledUrl {
    pub label: String,
    pub url: String,
}

impl LabeledUrl {
    pub fn new(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self { label: label.into(), url: url.into() }
    }
}

impl std::fmt::Display for LabeledUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.label, self.url)
    }
}

/// One bibliographic record in the unified schema.
///
/// Every backend adapter normalizes its raw records into this shape.
/// Fields the backend does not provide stay `None`; adapters never fill
/// in placeholder text.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Paper {
    pub doi: Option<String>,
    pub year: Option<i32>,
    pub title: String,
    /// Author names in the order the backend reported them.
    pub authors: Vec<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub journal: Option<String>,
    pub pdf_url: Option<String>,
    pub other_urls: Vec<LabeledUrl>,
    /// Which backend this record came from.
    pub source: BackendId,
}

/// Crate-wide error taxonomy.
///
/// Validation and syntax errors are raised before a job exists; the
/// backend variants are isolated per backend during retrieval and never
/// discard results already collected from other backends.
#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    #[error("invalid search request: {0}")]
    Validation(String),

    #[error("query syntax error at byte {position} ({message}): {fragment:?}")]
    Syntax {
        message: String,
        fragment: String,
        position: usize,
    },

    #[error("backend {backend} cannot run: {reason}")]
    BackendUnsupported { backend: BackendId, reason: String },

    #[error("backend {backend} failed: {reason}")]
    BackendUnavailable { backend: BackendId, reason: String },

    #[error("all selected backends failed")]
    AllBackendsFailed,
}

impl ScrapeError {
    pub fn unavailable(backend: BackendId, reason: impl Into<String>) -> Self {
        ScrapeError::BackendUnavailable { backend, reason: reason.into() }
    }

    pub fn unsupported(backend: BackendId, reason: impl Into<String>) -> Self {
        ScrapeError::BackendUnsupported { backend, reason: reason.into() }
    }
}

pub type ScrapeResult<T> = std::result::Result<T, ScrapeError>;
