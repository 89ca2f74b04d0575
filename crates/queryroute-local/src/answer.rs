use queryroute_core::{is_uncertain, ChatMessage, ChatModel, Error, Result};
use serde::Serialize;
use std::sync::Arc;

pub const ANSWER_SYSTEM_PROMPT: &str = "You are an intelligent assistant. Carefully analyze the \
user's query and respond accurately based on your knowledge. If you are uncertain or lack \
sufficient information to provide a reliable answer, append 'I don't know for sure' at the end \
of your response. Only add this statement if you genuinely do not have a confident answer; do \
not include it if you are certain about the response.";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ModelAnswer {
    pub text: String,
    pub uncertain: bool,
}

impl ModelAnswer {
    pub fn new(text: String) -> Self {
        let uncertain = is_uncertain(&text);
        Self { text, uncertain }
    }
}

/// The user message sent to the model: context first, then the query.
pub fn user_prompt(query: &str, context: &str) -> String {
    format!("{context} {query}")
}

#[derive(Clone)]
pub struct Answerer {
    model: Arc<dyn ChatModel>,
}

impl Answerer {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    pub async fn answer(&self, query: &str, context: &str) -> Result<ModelAnswer> {
        let messages = [
            ChatMessage::system(ANSWER_SYSTEM_PROMPT),
            ChatMessage::user(user_prompt(query, context)),
        ];
        let text = self
            .model
            .complete(&messages)
            .await
            .map_err(|e| Error::Answer(e.to_string()))?;
        Ok(ModelAnswer::new(text))
    }
}
