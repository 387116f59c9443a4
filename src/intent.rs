use tracing::debug;

use crate::api::ModelBackend;
use crate::error::{GeneratorError, Result};
use crate::extractor::Action;
use crate::prompts;

const CLASSIFIER_SYSTEM_PROMPT: &str =
    "You classify website editing requests. Answer with exactly one word.";

/// Decide whether a request is a create or a modify.
///
/// One short completion with a one-word instruction; any response
/// containing "create" classifies as create, everything else as modify.
/// Modify is the deliberate default since it preserves existing files on
/// a bad extraction while create does not. A failed call aborts the whole
/// request, no retry.
pub async fn classify(
    backend: &dyn ModelBackend,
    has_code: bool,
    prompt: &str,
) -> Result<Action> {
    let response = backend
        .complete(CLASSIFIER_SYSTEM_PROMPT, &prompts::intent_prompt(has_code, prompt))
        .await
        .map_err(|err| GeneratorError::Classifier(err.to_string()))?;

    let action = if response.to_lowercase().contains("create") {
        Action::Create
    } else {
        Action::Modify
    };
    debug!(%action, raw = %response.trim(), "intent classified");
    Ok(action)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockModelBackend;

    fn backend_answering(answer: &'static str) -> MockModelBackend {
        let mut backend = MockModelBackend::new();
        backend
            .expect_complete()
            .returning(move |_, _| Ok(answer.to_string()));
        backend
    }

    #[tokio::test]
    async fn create_keyword_classifies_as_create() {
        let backend = backend_answering("create");
        assert_eq!(classify(&backend, false, "build a site").await.unwrap(), Action::Create);
    }

    #[tokio::test]
    async fn anything_else_defaults_to_modify() {
        let backend = backend_answering("modify");
        assert_eq!(classify(&backend, true, "make header blue").await.unwrap(), Action::Modify);

        let backend = backend_answering("I am not sure what you mean");
        assert_eq!(classify(&backend, true, "???").await.unwrap(), Action::Modify);
    }

    #[tokio::test]
    async fn chatty_response_containing_create_still_matches() {
        let backend = backend_answering("Sure! The answer is: Create");
        assert_eq!(classify(&backend, false, "new page").await.unwrap(), Action::Create);
    }

    #[tokio::test]
    async fn backend_failure_aborts_classification() {
        let mut backend = MockModelBackend::new();
        backend.expect_complete().returning(|_, _| {
            Err(GeneratorError::Provider {
                status: Some(503),
                message: "unavailable".to_string(),
            })
        });
        let err = classify(&backend, false, "x").await.unwrap_err();
        assert!(matches!(err, GeneratorError::Classifier(_)));
    }
}
