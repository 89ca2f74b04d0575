use std::fmt;
use std::path::PathBuf;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_SERPAPI_ENDPOINT: &str = "https://serpapi.com/search.json";

fn env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn env_any(keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| env(k))
}

fn env_u64(key: &str, default: u64) -> u64 {
    env(key).and_then(|s| s.parse::<u64>().ok()).unwrap_or(default)
}

/// Basic-auth credentials for the page fetcher. Supplied at deployment time only.
#[derive(Clone, PartialEq, Eq)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct FetchSettings {
    /// Total attempts, not "retries after the first".
    pub retries: u32,
    pub delay_ms: u64,
    /// Per-attempt timeout.
    pub timeout_ms: u64,
    /// Hard cap on bytes read from a response body.
    pub max_bytes: u64,
    pub basic_auth: Option<BasicAuth>,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            retries: 5,
            delay_ms: 1_000,
            timeout_ms: 20_000,
            max_bytes: 5_000_000,
            basic_auth: None,
        }
    }
}

impl FetchSettings {
    pub fn from_env() -> Self {
        let d = Self::default();
        // Both halves must be present; a lone username is ignored.
        let basic_auth = match (
            env("QUERYROUTE_FETCH_USERNAME"),
            env("QUERYROUTE_FETCH_PASSWORD"),
        ) {
            (Some(username), Some(password)) => Some(BasicAuth { username, password }),
            _ => None,
        };
        Self {
            retries: env_u64("QUERYROUTE_FETCH_RETRIES", d.retries as u64).min(u32::MAX as u64)
                as u32,
            delay_ms: env_u64("QUERYROUTE_FETCH_DELAY_MS", d.delay_ms),
            timeout_ms: env_u64("QUERYROUTE_FETCH_TIMEOUT_MS", d.timeout_ms),
            max_bytes: env_u64("QUERYROUTE_FETCH_MAX_BYTES", d.max_bytes),
            basic_auth,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub model: String,
    /// Unset means the chat client waits as long as the HTTP client does.
    pub llm_timeout_ms: Option<u64>,
    pub serpapi_key: Option<String>,
    pub serpapi_endpoint: String,
    pub fetch: FetchSettings,
    /// When set, every scraped page is also written to a per-URL file here.
    pub scrape_dir: Option<PathBuf>,
}

impl Settings {
    pub fn from_env() -> Self {
        Self {
            openai_api_key: env_any(&["QUERYROUTE_OPENAI_API_KEY", "OPENAI_API_KEY"]),
            openai_base_url: env("QUERYROUTE_OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            model: env("QUERYROUTE_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            llm_timeout_ms: env("QUERYROUTE_LLM_TIMEOUT_MS").and_then(|s| s.parse().ok()),
            serpapi_key: env_any(&["QUERYROUTE_SERPAPI_KEY", "SERP_API_KEY"]),
            serpapi_endpoint: env("QUERYROUTE_SERPAPI_ENDPOINT")
                .unwrap_or_else(|| DEFAULT_SERPAPI_ENDPOINT.to_string()),
            fetch: FetchSettings::from_env(),
            scrape_dir: env("QUERYROUTE_SCRAPE_DIR").map(PathBuf::from),
        }
    }

    /// Non-secret view of the configuration (for `doctor`).
    pub fn redacted_json(&self) -> serde_json::Value {
        serde_json::json!({
            "openai_api_key_configured": self.openai_api_key.is_some(),
            "openai_base_url": self.openai_base_url,
            "model": self.model,
            "llm_timeout_ms": self.llm_timeout_ms,
            "serpapi_key_configured": self.serpapi_key.is_some(),
            "serpapi_endpoint": self.serpapi_endpoint,
            "fetch": {
                "retries": self.fetch.retries,
                "delay_ms": self.fetch.delay_ms,
                "timeout_ms": self.fetch.timeout_ms,
                "max_bytes": self.fetch.max_bytes,
                "basic_auth_configured": self.fetch.basic_auth.is_some(),
            },
            "scrape_dir": self.scrape_dir.as_ref().map(|p| p.display().to_string()),
        })
    }
}
