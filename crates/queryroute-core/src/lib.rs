use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Fallback context when a URL was requested but nothing could be scraped.
pub const NO_INFORMATION: &str = "No relevant information found.";
/// Search context when the provider answered but had no organic results.
pub const NO_SEARCH_RESULTS: &str = "No relevant results found.";
/// Search context when the provider call failed.
pub const SEARCH_ERROR: &str = "Error fetching data from SERP API.";

/// Phrases that mark a model answer as uncertain.
pub const UNCERTAINTY_PHRASES: &[&str] = &["I don't know", "I'm not sure"];

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("fetch exhausted after {attempts} attempts: {url}")]
    FetchExhausted { url: String, attempts: u32 },
    #[error("persist failed: {0}")]
    Persist(String),
    #[error("search failed: {0}")]
    Search(String),
    #[error("search HTTP {0}")]
    SearchStatus(u16),
    #[error("llm failed: {0}")]
    Llm(String),
    #[error("classifier failed: {0}")]
    Classify(String),
    #[error("answer failed: {0}")]
    Answer(String),
    #[error("not configured: {0}")]
    NotConfigured(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A chat-completion backend: ordered messages in, free text out.
#[async_trait::async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

/// Retrieves raw HTML for a URL. `None` means every attempt failed.
#[async_trait::async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_html(&self, url: &str) -> Option<String>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    pub max_results: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub url: String,
    pub title: Option<String>,
    pub snippet: Option<String>,
    pub source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    pub provider: String,
    pub timings_ms: BTreeMap<String, u128>,
}

#[async_trait::async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &'static str;
    async fn search(&self, q: &SearchQuery) -> Result<SearchResponse>;
}

/// Plain-text page content tagged with the URL it came from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScrapedDocument {
    pub url: String,
    pub text: String,
}

impl ScrapedDocument {
    /// The on-disk (and prompt context) form: the body framed by `Source URL:` lines.
    pub fn render(&self) -> String {
        format!(
            "Source URL: {url}\n\n{text}\n\nSource URL: {url}\n",
            url = self.url,
            text = self.text
        )
    }
}

/// True if a model answer contains one of [`UNCERTAINTY_PHRASES`].
pub fn is_uncertain(answer: &str) -> bool {
    UNCERTAINTY_PHRASES.iter().any(|p| answer.contains(p))
}

/// Accept a classifier reply as a URL only if it is an http(s) URL.
///
/// The reply is trimmed first; anything else (the `None` sentinel, prose, other
/// schemes) maps to `None`.
pub fn accept_classified_url(reply: &str) -> Option<String> {
    let s = reply.trim();
    if s.starts_with("http://") || s.starts_with("https://") {
        Some(s.to_string())
    } else {
        None
    }
}

/// Validate a URL before it hits the network.
pub fn parse_http_url(raw: &str) -> Result<url::Url> {
    let u = url::Url::parse(raw.trim()).map_err(|e| Error::InvalidUrl(e.to_string()))?;
    match u.scheme() {
        "http" | "https" => Ok(u),
        other => Err(Error::InvalidUrl(format!("unsupported scheme: {other}"))),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationTurn {
    pub query: String,
    pub response: String,
}

/// Append-only, in-memory conversation history. Lives as long as its owner.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Session {
    turns: Vec<ConversationTurn>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(
        &mut self,
        query: impl Into<String>,
        response: impl Into<String>,
    ) -> &ConversationTurn {
        self.turns.push(ConversationTurn {
            query: query.into(),
            response: response.into(),
        });
        &self.turns[self.turns.len() - 1]
    }

    /// Oldest first.
    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
