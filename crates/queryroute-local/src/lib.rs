use queryroute_core::{parse_http_url, Error, PageFetcher, Result};
use std::time::Duration;
use tracing::{debug, warn};

pub mod answer;
pub mod classify;
pub mod config;
pub mod extract;
pub mod openai_compat;
pub mod router;
pub mod search;

pub use config::{BasicAuth, FetchSettings, Settings};

/// HTTP page fetcher with bounded retries and optional basic auth.
///
/// Every failure is retried the same way: transport errors, timeouts and any status other
/// than 200 (a 404 is retried just like a 503).
#[derive(Debug, Clone)]
pub struct LocalFetcher {
    client: reqwest::Client,
    settings: FetchSettings,
}

/// `charset` parameter of a `Content-Type` value, e.g. `text/html; charset="iso-8859-1"`.
fn charset_from_content_type(content_type: &str) -> Option<&str> {
    content_type.split(';').skip(1).find_map(|param| {
        let (k, v) = param.split_once('=')?;
        k.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| v.trim().trim_matches('"'))
            .filter(|v| !v.is_empty())
    })
}

enum Attempt {
    Body(String),
    Status(u16),
}

impl LocalFetcher {
    pub fn new(settings: FetchSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("queryroute/0.1")
            .redirect(reqwest::redirect::Policy::limited(10))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Fetch(e.to_string()))?;
        Ok(Self { client, settings })
    }

    pub fn settings(&self) -> &FetchSettings {
        &self.settings
    }

    async fn attempt(&self, url: &url::Url) -> Result<Attempt> {
        let mut rb = self
            .client
            .get(url.clone())
            .timeout(Duration::from_millis(self.settings.timeout_ms));
        if let Some(auth) = &self.settings.basic_auth {
            rb = rb.basic_auth(&auth.username, Some(&auth.password));
        }
        let resp = rb.send().await.map_err(|e| Error::Fetch(e.to_string()))?;
        let status = resp.status().as_u16();
        if status != 200 {
            return Ok(Attempt::Status(status));
        }
        let encoding = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(charset_from_content_type)
            .and_then(|label| encoding_rs::Encoding::for_label(label.as_bytes()))
            .unwrap_or(encoding_rs::UTF_8);

        let max_bytes = self.settings.max_bytes as usize;
        let mut bytes = Vec::new();
        let mut stream = resp.bytes_stream();
        use futures_util::StreamExt;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Error::Fetch(e.to_string()))?;
            if bytes.len().saturating_add(chunk.len()) > max_bytes {
                let can_take = max_bytes.saturating_sub(bytes.len());
                bytes.extend_from_slice(&chunk[..can_take]);
                debug!(url = %url, max_bytes, "response body truncated");
                break;
            }
            bytes.extend_from_slice(&chunk);
        }
        let (text, _, _) = encoding.decode(&bytes);
        Ok(Attempt::Body(text.into_owned()))
    }

    /// Fetch `url`, trying up to `retries` times with `delay_ms` between attempts.
    ///
    /// Returns the body of the first 200 response, or `FetchExhausted` once every attempt
    /// failed. An unparseable or non-http(s) URL fails immediately without any attempt.
    pub async fn fetch_with_retry(&self, url: &str) -> Result<String> {
        let parsed = parse_http_url(url)?;
        let attempts = self.settings.retries;
        for attempt in 1..=attempts {
            match self.attempt(&parsed).await {
                Ok(Attempt::Body(body)) => {
                    debug!(url, attempt, bytes = body.len(), "fetched");
                    return Ok(body);
                }
                Ok(Attempt::Status(status)) => {
                    warn!(url, attempt, status, "failed to fetch");
                }
                Err(e) => {
                    warn!(url, attempt, error = %e, "error fetching");
                }
            }
            if attempt < attempts {
                tokio::time::sleep(Duration::from_millis(self.settings.delay_ms)).await;
            }
        }
        Err(Error::FetchExhausted {
            url: url.to_string(),
            attempts,
        })
    }
}

#[async_trait::async_trait]
impl PageFetcher for LocalFetcher {
    async fn fetch_html(&self, url: &str) -> Option<String> {
        match self.fetch_with_retry(url).await {
            Ok(body) => Some(body),
            Err(e) => {
                warn!(error = %e, "giving up on page");
                None
            }
        }
    }
}
