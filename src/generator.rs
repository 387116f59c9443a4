use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::{ModelRegistry, TokenEvent};
use crate::context::{ContextSnapshot, ContextStore};
use crate::error::{GeneratorError, Result};
use crate::events::{EventSink, StreamEvent};
use crate::extractor::{self, Action, GenerationResult};
use crate::intent;
use crate::prompts;

/// One generation request as submitted by the UI layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub prompt: String,
    pub session_id: String,
    #[serde(default)]
    pub reset_context: bool,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<ContextSnapshot>,
}

fn default_model() -> String {
    "groq".to_string()
}

/// Sequences one generation cycle: intent classification, prompt
/// assembly, streamed model call, extraction, and context commit,
/// reporting progress through an event sink.
pub struct WebsiteGenerator {
    registry: Arc<ModelRegistry>,
    store: Arc<ContextStore>,
}

impl WebsiteGenerator {
    pub fn new(registry: Arc<ModelRegistry>, store: Arc<ContextStore>) -> Self {
        Self { registry, store }
    }

    pub fn store(&self) -> &ContextStore {
        &self.store
    }

    /// Run one request end to end. Emits any number of status events and
    /// exactly one terminal event: `final_result` on any completed cycle
    /// (including unsuccessful extractions) or `error` if a step failed.
    /// A cancelled request emits no terminal event and commits nothing.
    pub async fn process_request(
        &self,
        request: &GenerateRequest,
        sink: &dyn EventSink,
        cancel: &CancellationToken,
    ) -> Result<GenerationResult> {
        match self.run(request, sink, cancel).await {
            Ok(result) => {
                let session_info = self.store.session_info(&request.session_id);
                sink.emit(StreamEvent::final_result(result.clone(), session_info));
                Ok(result)
            }
            Err(GeneratorError::Cancelled) => {
                debug!(session_id = %request.session_id, "request cancelled");
                Err(GeneratorError::Cancelled)
            }
            Err(err) => {
                warn!(session_id = %request.session_id, error = %err, "request failed");
                sink.emit(StreamEvent::error(err.to_string()));
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        request: &GenerateRequest,
        sink: &dyn EventSink,
        cancel: &CancellationToken,
    ) -> Result<GenerationResult> {
        if request.reset_context {
            self.store.reset(&request.session_id);
        }
        if let Some(snapshot) = &request.context {
            self.store.import(&request.session_id, snapshot.clone());
        }

        sink.emit(StreamEvent::status("Processing request..."));

        let context = self.store.get_or_create(&request.session_id);
        let classifier = self.registry.classifier()?;
        let action =
            intent::classify(classifier.as_ref(), context.has_code(), &request.prompt).await?;
        sink.emit(StreamEvent::status(format!("Detected intent: {}", action)));

        // Any non-create intent takes the modification path, which embeds
        // the current files and preserves them on a partial extraction.
        let (effective_action, user_prompt) = match action {
            Action::Create => (Action::Create, prompts::creation_prompt(&request.prompt)),
            _ => (
                Action::Modify,
                prompts::modification_prompt(
                    &request.prompt,
                    &context.current_files.html,
                    &context.current_files.css,
                    &context.current_files.js,
                ),
            ),
        };

        let backend = self.registry.resolve(&request.model)?;
        let mut rx = backend
            .stream(prompts::GENERATION_SYSTEM_PROMPT, &user_prompt)
            .await?;

        let mut full_response = String::new();
        let mut announced = false;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Err(GeneratorError::Cancelled),
                event = rx.recv() => match event {
                    Some(TokenEvent::Start) => {}
                    Some(TokenEvent::Chunk(chunk)) => {
                        if !announced {
                            sink.emit(StreamEvent::status("Generating code..."));
                            announced = true;
                        }
                        full_response.push_str(&chunk);
                    }
                    Some(TokenEvent::Error(message)) => {
                        return Err(GeneratorError::Provider { status: None, message });
                    }
                    Some(TokenEvent::End) | None => break,
                },
            }
        }

        sink.emit(StreamEvent::status("Parsing response..."));
        let result = extractor::extract(&full_response, effective_action, &context.current_files);

        if result.success {
            self.store.commit(&request.session_id, &request.prompt, &result);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockModelBackend;
    use crate::events::{ChannelSink, NullSink};
    use tokio::sync::mpsc;

    fn scripted_backend(intent_answer: &'static str, response: &'static str) -> MockModelBackend {
        let mut backend = MockModelBackend::new();
        backend.expect_name().return_const("mock");
        backend
            .expect_complete()
            .returning(move |_, _| Ok(intent_answer.to_string()));
        backend.expect_stream().returning(move |_, _| {
            let (tx, rx) = mpsc::unbounded_channel();
            let _ = tx.send(TokenEvent::Start);
            // Deliver in small chunks to exercise accumulation.
            for chunk in response.as_bytes().chunks(7) {
                let _ = tx.send(TokenEvent::Chunk(String::from_utf8_lossy(chunk).to_string()));
            }
            let _ = tx.send(TokenEvent::End);
            Ok(rx)
        });
        backend
    }

    // Tests insert their scripted backend under "groq", which is also the
    // classifier id.
    fn generator_with(backend: MockModelBackend, store: Arc<ContextStore>) -> WebsiteGenerator {
        let mut registry = ModelRegistry::empty();
        registry.insert("groq", Arc::new(backend));
        WebsiteGenerator::new(Arc::new(registry), store)
    }

    fn request(prompt: &str) -> GenerateRequest {
        GenerateRequest {
            prompt: prompt.to_string(),
            session_id: "test-session".to_string(),
            reset_context: false,
            model: "groq".to_string(),
            context: None,
        }
    }

    async fn drain(rx: &mut mpsc::UnboundedReceiver<StreamEvent>) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn create_flow_commits_and_emits_final_result() {
        let response = "[--FILE:index.html--]\n<html><body>bakery</body></html>\n\
                        [--FILE:styles.css--]\nbody { color: brown; }\n\
                        [--FILE:index.js--]\nconsole.log('bakery');";
        let generator = generator_with(
            scripted_backend("create", response),
            Arc::new(ContextStore::new()),
        );
        let (sink, mut rx) = ChannelSink::new();
        let cancel = CancellationToken::new();

        let result = generator
            .process_request(&request("Create a bakery page"), &sink, &cancel)
            .await
            .unwrap();

        assert!(result.success);
        assert!(result.files.html.contains("<html"));
        let context = generator.store().get("test-session").unwrap();
        assert_eq!(context.history.len(), 1);

        let events = drain(&mut rx).await;
        let finals: Vec<_> = events
            .iter()
            .filter(|event| matches!(event, StreamEvent::FinalResult { .. }))
            .collect();
        assert_eq!(finals.len(), 1);
        assert!(matches!(events.first(), Some(StreamEvent::Status { .. })));
    }

    #[tokio::test]
    async fn stream_failure_emits_single_error_and_no_commit() {
        let mut backend = MockModelBackend::new();
        backend.expect_name().return_const("mock");
        backend
            .expect_complete()
            .returning(|_, _| Ok("create".to_string()));
        backend.expect_stream().returning(|_, _| {
            Err(GeneratorError::from_status(429, "Groq", ""))
        });
        let generator = generator_with(backend, Arc::new(ContextStore::new()));
        let (sink, mut rx) = ChannelSink::new();
        let cancel = CancellationToken::new();

        let err = generator
            .process_request(&request("Create a page"), &sink, &cancel)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("rate limit"));
        assert!(generator.store().get("test-session").is_none());

        let events = drain(&mut rx).await;
        assert!(events
            .iter()
            .any(|event| matches!(event, StreamEvent::Error { .. })));
        assert!(!events
            .iter()
            .any(|event| matches!(event, StreamEvent::FinalResult { .. })));
    }

    #[tokio::test]
    async fn cancellation_emits_no_terminal_event() {
        let mut backend = MockModelBackend::new();
        backend.expect_name().return_const("mock");
        backend
            .expect_complete()
            .returning(|_, _| Ok("create".to_string()));
        backend.expect_stream().returning(|_, _| {
            let (tx, rx) = mpsc::unbounded_channel::<TokenEvent>();
            // Keep the stream open forever so cancellation is what ends it.
            std::mem::forget(tx);
            Ok(rx)
        });
        let generator = generator_with(backend, Arc::new(ContextStore::new()));
        let (sink, mut rx) = ChannelSink::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = generator
            .process_request(&request("Create a page"), &sink, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, GeneratorError::Cancelled));
        assert!(generator.store().get("test-session").is_none());

        let events = drain(&mut rx).await;
        assert!(!events.iter().any(|event| matches!(
            event,
            StreamEvent::FinalResult { .. } | StreamEvent::Error { .. }
        )));
    }

    #[tokio::test]
    async fn modify_flow_preserves_files_the_model_omitted() {
        let store = Arc::new(ContextStore::new());
        let first = "[--FILE:index.html--]\n<html><body><h1>hi</h1></body></html>\n\
                     [--FILE:styles.css--]\nh1 { color: black; }\n\
                     [--FILE:index.js--]\nlet clicks = 0;";
        let generator = generator_with(scripted_backend("create", first), Arc::clone(&store));
        let cancel = CancellationToken::new();
        generator
            .process_request(&request("Create a page"), &NullSink, &cancel)
            .await
            .unwrap();

        // Second turn: model omits the JS file.
        let second = "[--FILE:index.html--]\n<html><body><h1 class=\"blue\">hi</h1></body></html>\n\
                      [--FILE:styles.css--]\nh1 { color: blue; }";
        let generator = generator_with(scripted_backend("modify", second), Arc::clone(&store));

        let result = generator
            .process_request(&request("Make the header blue"), &NullSink, &cancel)
            .await
            .unwrap();

        assert_eq!(result.action, Action::Modify);
        assert_eq!(result.files.js, "let clicks = 0;");
        assert!(result.files.css.contains("blue"));
        let context = generator.store().get("test-session").unwrap();
        assert_eq!(context.history.len(), 2);
    }
}
