use crate::answer::Answerer;
use crate::classify::QueryClassifier;
use crate::extract::{self, DEFAULT_TEXT_WIDTH};
use crate::search::search_context;
use queryroute_core::{
    ChatModel, Error, PageFetcher, Result, SearchProvider, Session, NO_INFORMATION,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Characters of scraped context echoed into the logs.
const CONTEXT_PREVIEW_CHARS: usize = 500;

/// Which information source produced the response.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    /// The query named a URL; its scraped content was the context.
    Url,
    /// The model answered on its own with no uncertainty.
    Direct,
    /// The model was unsure; search results were injected and cited.
    SearchAugmented,
}

#[derive(Debug, Clone, Serialize)]
pub struct RouteOutcome {
    pub query: String,
    pub route: Route,
    pub url: Option<String>,
    /// Context injected into the final answer call, if any.
    pub context: Option<String>,
    pub response: String,
}

/// Turns one query into one response by picking scrape, direct answer or search.
pub struct Router {
    classifier: QueryClassifier,
    answerer: Answerer,
    fetcher: Arc<dyn PageFetcher>,
    search: Arc<dyn SearchProvider>,
    text_width: usize,
    scrape_dir: Option<PathBuf>,
}

fn preview(s: &str) -> String {
    s.chars().take(CONTEXT_PREVIEW_CHARS).collect()
}

impl Router {
    pub fn new(
        model: Arc<dyn ChatModel>,
        fetcher: Arc<dyn PageFetcher>,
        search: Arc<dyn SearchProvider>,
    ) -> Self {
        Self {
            classifier: QueryClassifier::new(model.clone()),
            answerer: Answerer::new(model),
            fetcher,
            search,
            text_width: DEFAULT_TEXT_WIDTH,
            scrape_dir: None,
        }
    }

    /// Also write every scraped page to a per-URL file under `dir`.
    pub fn with_scrape_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.scrape_dir = dir;
        self
    }

    /// Scrape `url` and return the rendered document, or [`NO_INFORMATION`].
    async fn scrape_context(&self, url: &str) -> Result<String> {
        let Some(html) = self.fetcher.fetch_html(url).await else {
            warn!(url, "failed to retrieve content");
            return Ok(NO_INFORMATION.to_string());
        };
        let doc = extract::extract_document(url, &html, self.text_width);

        if let Some(dir) = &self.scrape_dir {
            let path = extract::scrape_path_for(dir, url);
            let doc2 = doc.clone();
            let r = tokio::task::spawn_blocking(move || extract::persist_document(&path, &doc2))
                .await
                .map_err(|e| Error::Persist(format!("persist join failed: {e}")))?;
            // The answer does not depend on the copy on disk.
            if let Err(e) = r {
                warn!(url, error = %e, "could not persist scraped content");
            }
        }
        Ok(doc.render())
    }

    pub async fn route(&self, query: &str) -> Result<RouteOutcome> {
        let url = self.classifier.classify(query).await?;

        if let Some(url) = url {
            info!(url = url.as_str(), "url being used");
            let context = self.scrape_context(&url).await?;
            info!(preview = preview(&context).as_str(), "scraped content");
            let answer = self.answerer.answer(query, &context).await?;
            return Ok(RouteOutcome {
                query: query.to_string(),
                route: Route::Url,
                url: Some(url),
                context: Some(context),
                response: answer.text,
            });
        }

        info!("url not being used");
        let direct = self.answerer.answer(query, "").await?;
        if !direct.uncertain {
            return Ok(RouteOutcome {
                query: query.to_string(),
                route: Route::Direct,
                url: None,
                context: None,
                response: direct.text,
            });
        }

        info!(provider = self.search.name(), "model unsure; falling back to search");
        let results = search_context(self.search.as_ref(), query).await;
        let answer = self.answerer.answer(query, &results).await?;
        Ok(RouteOutcome {
            query: query.to_string(),
            route: Route::SearchAugmented,
            url: None,
            response: format!("{}\n\nSources: {results}", answer.text),
            context: Some(results),
        })
    }

    /// Route `query` and append the turn to `session`. A failed query leaves it untouched.
    pub async fn respond(&self, session: &mut Session, query: &str) -> Result<RouteOutcome> {
        let outcome = self.route(query).await?;
        session.push(outcome.query.clone(), outcome.response.clone());
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::answer::{user_prompt, ANSWER_SYSTEM_PROMPT};
    use crate::classify::CLASSIFIER_SYSTEM_PROMPT;
    use queryroute_core::{
        ChatMessage, ScrapedDocument, SearchQuery, SearchResponse, SearchResult,
    };
    use std::collections::{BTreeMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Replies by system prompt: one fixed classifier reply, a queue of answers.
    struct ScriptedModel {
        classifier_reply: std::result::Result<String, String>,
        answers: Mutex<VecDeque<String>>,
        answer_prompts: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        fn new(classifier_reply: &str, answers: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                classifier_reply: Ok(classifier_reply.to_string()),
                answers: Mutex::new(answers.iter().map(|s| s.to_string()).collect()),
                answer_prompts: Mutex::new(Vec::new()),
            })
        }

        fn failing_classifier() -> Arc<Self> {
            Arc::new(Self {
                classifier_reply: Err("HTTP 500".to_string()),
                answers: Mutex::new(VecDeque::new()),
                answer_prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait::async_trait]
    impl ChatModel for ScriptedModel {
        async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
            let system = messages.first().map(|m| m.content.as_str()).unwrap_or("");
            if system == CLASSIFIER_SYSTEM_PROMPT {
                return self.classifier_reply.clone().map_err(Error::Llm);
            }
            assert_eq!(system, ANSWER_SYSTEM_PROMPT);
            self.answer_prompts
                .lock()
                .unwrap()
                .push(messages[1].content.clone());
            self.answers
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| Error::Llm("no scripted answer left".to_string()))
        }
    }

    struct StubFetcher {
        html: Option<String>,
        calls: AtomicUsize,
    }

    impl StubFetcher {
        fn new(html: Option<&str>) -> Arc<Self> {
            Arc::new(Self {
                html: html.map(str::to_string),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait::async_trait]
    impl PageFetcher for StubFetcher {
        async fn fetch_html(&self, _url: &str) -> Option<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.html.clone()
        }
    }

    struct StubSearch {
        calls: AtomicUsize,
    }

    impl StubSearch {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait::async_trait]
    impl SearchProvider for StubSearch {
        fn name(&self) -> &'static str {
            "stub"
        }

        async fn search(&self, q: &SearchQuery) -> Result<SearchResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let results = (1..=5)
                .map(|i| SearchResult {
                    url: format!("https://news.example/{i}"),
                    title: None,
                    snippet: Some(format!("{} result {i}", q.query)),
                    source: "stub".to_string(),
                })
                .collect();
            Ok(SearchResponse {
                results,
                provider: "stub".to_string(),
                timings_ms: BTreeMap::new(),
            })
        }
    }

    const PAGE: &str = "<html><body><nav>Menu</nav><p>Example Domain body text.</p>\
                        <footer>Copyright</footer></body></html>";

    #[tokio::test]
    async fn url_query_uses_scraped_document_as_context() {
        let model = ScriptedModel::new("https://example.com", &["It is an example page."]);
        let fetcher = StubFetcher::new(Some(PAGE));
        let search = StubSearch::new();
        let router = Router::new(model.clone(), fetcher.clone(), search.clone());

        let out = router.route("Summarize https://example.com").await.unwrap();
        let expected = ScrapedDocument {
            url: "https://example.com".to_string(),
            text: extract::html_to_plain_text(PAGE, DEFAULT_TEXT_WIDTH),
        }
        .render();

        assert_eq!(out.route, Route::Url);
        assert_eq!(out.url.as_deref(), Some("https://example.com"));
        assert_eq!(out.context.as_deref(), Some(expected.as_str()));
        assert_eq!(out.response, "It is an example page.");
        assert!(!expected.contains("Menu"));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(search.calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            model.answer_prompts.lock().unwrap().as_slice(),
            [user_prompt("Summarize https://example.com", &expected)]
        );
    }

    #[tokio::test]
    async fn failed_fetch_degrades_to_no_information_context() {
        let model = ScriptedModel::new("https://down.example", &["Nothing to summarize."]);
        let fetcher = StubFetcher::new(None);
        let router = Router::new(model, fetcher.clone(), StubSearch::new());

        let out = router.route("Summarize https://down.example").await.unwrap();
        assert_eq!(out.route, Route::Url);
        assert_eq!(out.context.as_deref(), Some(NO_INFORMATION));
        assert_eq!(out.response, "Nothing to summarize.");
    }

    #[tokio::test]
    async fn confident_answer_skips_fetch_and_search() {
        let model = ScriptedModel::new("None", &["Paris."]);
        let fetcher = StubFetcher::new(Some(PAGE));
        let search = StubSearch::new();
        let router = Router::new(model.clone(), fetcher.clone(), search.clone());

        let out = router.route("What is the capital of France?").await.unwrap();
        assert_eq!(out.route, Route::Direct);
        assert_eq!(out.response, "Paris.");
        assert_eq!(out.context, None);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
        assert_eq!(search.calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            model.answer_prompts.lock().unwrap().as_slice(),
            [" What is the capital of France?"]
        );
    }

    #[tokio::test]
    async fn uncertain_answer_triggers_one_search_and_cites_sources() {
        let q = "Who will win the election in 2030?";
        let model = ScriptedModel::new(
            "None",
            &[
                "Polls are early. I don't know for sure",
                "Forecasts favour candidate A.",
            ],
        );
        let fetcher = StubFetcher::new(Some(PAGE));
        let search = StubSearch::new();
        let router = Router::new(model.clone(), fetcher.clone(), search.clone());

        let out = router.route(q).await.unwrap();
        assert_eq!(out.route, Route::SearchAugmented);
        assert_eq!(search.calls.load(Ordering::SeqCst), 1);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);

        let ctx = out.context.clone().unwrap();
        assert_eq!(ctx.lines().count(), 3);
        assert!(ctx.starts_with(&format!("{q} result 1 (Source: https://news.example/1)")));
        assert_eq!(
            out.response,
            format!("Forecasts favour candidate A.\n\nSources: {ctx}")
        );
        let prompts = model.answer_prompts.lock().unwrap();
        assert_eq!(prompts.len(), 2);
        assert_eq!(prompts[1], user_prompt(q, &ctx));
    }

    #[tokio::test]
    async fn classifier_failure_is_fatal_and_leaves_session_untouched() {
        let fetcher = StubFetcher::new(Some(PAGE));
        let search = StubSearch::new();
        let router = Router::new(
            ScriptedModel::failing_classifier(),
            fetcher.clone(),
            search.clone(),
        );

        let mut session = Session::new();
        let err = router.respond(&mut session, "anything").await.unwrap_err();
        assert!(matches!(err, Error::Classify(_)));
        assert!(session.is_empty());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
        assert_eq!(search.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn answer_failure_is_fatal() {
        let router = Router::new(
            ScriptedModel::new("None", &[]),
            StubFetcher::new(None),
            StubSearch::new(),
        );
        let err = router.route("hello").await.unwrap_err();
        assert!(matches!(err, Error::Answer(_)));
    }

    #[tokio::test]
    async fn respond_appends_turns_in_order() {
        let router = Router::new(
            ScriptedModel::new("None", &["one", "two"]),
            StubFetcher::new(None),
            StubSearch::new(),
        );
        let mut session = Session::new();
        router.respond(&mut session, "first").await.unwrap();
        router.respond(&mut session, "second").await.unwrap();

        let turns = session.turns();
        assert_eq!(turns.len(), 2);
        assert_eq!((turns[0].query.as_str(), turns[0].response.as_str()), ("first", "one"));
        assert_eq!((turns[1].query.as_str(), turns[1].response.as_str()), ("second", "two"));
    }

    #[tokio::test]
    async fn scrape_dir_persists_per_url_copy() {
        let tmp = tempfile::tempdir().unwrap();
        let router = Router::new(
            ScriptedModel::new("https://example.com", &["ok"]),
            StubFetcher::new(Some(PAGE)),
            StubSearch::new(),
        )
        .with_scrape_dir(Some(tmp.path().to_path_buf()));

        let out = router.route("Summarize https://example.com").await.unwrap();
        let path = extract::scrape_path_for(tmp.path(), "https://example.com");
        let on_disk = extract::read_persisted(&path);
        assert_eq!(Some(on_disk.as_str()), out.context.as_deref());
        assert!(on_disk.starts_with("Source URL: https://example.com\n"));
    }
}
