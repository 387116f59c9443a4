use thiserror::Error;

/// Errors that can abort a generation request.
///
/// Parse failures are deliberately absent: the extractor never errors, it
/// downgrades to an unsuccessful `GenerationResult` instead.
#[derive(Debug, Error)]
pub enum GeneratorError {
    /// Missing or invalid local configuration. Raised before any network
    /// call is made.
    #[error("configuration error: {0}")]
    Config(String),

    /// The model provider rejected or failed the request.
    #[error("{message}")]
    Provider {
        status: Option<u16>,
        message: String,
    },

    /// The intent classification call failed. Treated like a provider
    /// error: the whole request aborts.
    #[error("intent classification failed: {0}")]
    Classifier(String),

    /// A session snapshot could not be parsed on import.
    #[error("invalid session snapshot: {0}")]
    ImportFormat(#[from] serde_json::Error),

    /// No context exists for the requested session.
    #[error("unknown session: {0}")]
    UnknownSession(String),

    /// The caller cancelled the request mid-stream.
    #[error("request cancelled")]
    Cancelled,
}

impl GeneratorError {
    /// Map a provider HTTP status to a user-readable message. Raw provider
    /// bodies are kept out of the chat surface.
    pub fn from_status(status: u16, provider: &str, body: &str) -> Self {
        let message = match status {
            401 => format!("Invalid API key for {}. Please check your configuration.", provider),
            429 => format!("{} rate limit exceeded. Please wait a moment and try again.", provider),
            503 => format!("{} is temporarily unavailable. Please try again in a few minutes.", provider),
            _ => {
                let detail = body.trim();
                if detail.is_empty() {
                    format!("{} request failed with status {}", provider, status)
                } else {
                    format!("{} request failed ({}): {}", provider, status, detail)
                }
            }
        };
        GeneratorError::Provider {
            status: Some(status),
            message,
        }
    }
}

pub type Result<T> = std::result::Result<T, GeneratorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_is_user_readable() {
        let err = GeneratorError::from_status(429, "Groq", "");
        assert!(err.to_string().contains("rate limit"));

        let err = GeneratorError::from_status(401, "Gemini", "");
        assert!(err.to_string().contains("API key"));

        let err = GeneratorError::from_status(500, "Groq", "boom");
        assert!(err.to_string().contains("500"));
        assert!(err.to_string().contains("boom"));
    }
}
