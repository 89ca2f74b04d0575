use queryroute_core::{accept_classified_url, ChatMessage, ChatModel, Error, Result};
use std::sync::Arc;
use tracing::debug;

pub const CLASSIFIER_SYSTEM_PROMPT: &str = "You are an intelligent assistant. Your task is to \
determine if a user query requires extracting content from a URL or if the URL is just being \
referenced. If the user asks to summarize, analyze, or extract information from the URL, return \
only the URL. Otherwise, return 'None'.";

/// Decides whether a query asks for a URL's content to be fetched.
#[derive(Clone)]
pub struct QueryClassifier {
    model: Arc<dyn ChatModel>,
}

impl QueryClassifier {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    /// The URL to fetch, if any. Model failures are returned as `Error::Classify`.
    pub async fn classify(&self, query: &str) -> Result<Option<String>> {
        let messages = [
            ChatMessage::system(CLASSIFIER_SYSTEM_PROMPT),
            ChatMessage::user(query),
        ];
        let reply = self
            .model
            .complete(&messages)
            .await
            .map_err(|e| Error::Classify(e.to_string()))?;
        let url = accept_classified_url(&reply);
        debug!(reply = reply.trim(), accepted = url.is_some(), "classified query");
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Canned {
        reply: Result<String>,
        seen: Mutex<Vec<ChatMessage>>,
    }

    #[async_trait::async_trait]
    impl ChatModel for Canned {
        async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
            self.seen.lock().unwrap().extend_from_slice(messages);
            match &self.reply {
                Ok(s) => Ok(s.clone()),
                Err(e) => Err(Error::Llm(e.to_string())),
            }
        }
    }

    fn classifier(reply: Result<String>) -> (QueryClassifier, Arc<Canned>) {
        let m = Arc::new(Canned {
            reply,
            seen: Mutex::new(Vec::new()),
        });
        (QueryClassifier::new(m.clone()), m)
    }

    #[tokio::test]
    async fn sentinel_reply_maps_to_none() {
        let (c, _) = classifier(Ok("None".to_string()));
        assert_eq!(c.classify("What is Rust?").await.unwrap(), None);
    }

    #[tokio::test]
    async fn url_reply_is_returned_trimmed() {
        let (c, m) = classifier(Ok(" https://example.com\n".to_string()));
        let got = c.classify("Summarize https://example.com").await.unwrap();
        assert_eq!(got.as_deref(), Some("https://example.com"));

        let seen = m.seen.lock().unwrap();
        assert_eq!(seen[0], ChatMessage::system(CLASSIFIER_SYSTEM_PROMPT));
        assert_eq!(seen[1], ChatMessage::user("Summarize https://example.com"));
    }

    #[tokio::test]
    async fn model_failure_is_a_classify_error() {
        let (c, _) = classifier(Err(Error::Llm("HTTP 500".to_string())));
        let err = c.classify("anything").await.unwrap_err();
        assert!(matches!(err, Error::Classify(_)));
    }
}
