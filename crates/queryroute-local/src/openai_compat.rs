use crate::config::Settings;
use queryroute_core::{ChatMessage, ChatModel, Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Chat client for OpenAI and OpenAI-compatible `/v1/chat/completions` endpoints.
#[derive(Debug, Clone)]
pub struct OpenAiCompatClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    timeout_ms: Option<u64>,
}

impl OpenAiCompatClient {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        timeout_ms: Option<u64>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key,
            model: model.into(),
            timeout_ms,
        }
    }

    pub fn from_settings(client: reqwest::Client, settings: &Settings) -> Result<Self> {
        let api_key = settings.openai_api_key.clone().ok_or_else(|| {
            Error::NotConfigured(
                "missing QUERYROUTE_OPENAI_API_KEY (or OPENAI_API_KEY)".to_string(),
            )
        })?;
        Ok(Self::new(
            client,
            settings.openai_base_url.clone(),
            Some(api_key),
            settings.model.clone(),
            settings.llm_timeout_ms,
        ))
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint_chat_completions(&self) -> String {
        format!(
            "{}/v1/chat/completions",
            self.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait::async_trait]
impl ChatModel for OpenAiCompatClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let req = ChatCompletionsRequest {
            model: &self.model,
            messages,
            stream: Some(false),
        };

        let mut rb = self
            .client
            .post(self.endpoint_chat_completions())
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(ms) = self.timeout_ms {
            rb = rb.timeout(Duration::from_millis(ms));
        }
        if let Some(k) = &self.api_key {
            rb = rb.header(reqwest::header::AUTHORIZATION, format!("Bearer {k}"));
        }

        let resp = rb
            .json(&req)
            .send()
            .await
            .map_err(|e| Error::Llm(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Llm(format!("chat.completions HTTP {status}")));
        }

        let parsed: ChatCompletionsResponse =
            resp.json().await.map_err(|e| Error::Llm(e.to_string()))?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::Llm("chat.completions returned no choices".to_string()))?;
        let content = choice.message.content.ok_or_else(|| {
            Error::Llm("chat.completions first choice has no message content".to_string())
        })?;
        debug!(model = %self.model, chars = content.len(), "chat completion");
        Ok(content)
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionsRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionsResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}
