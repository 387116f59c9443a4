// Library exports for the sitesmith generation engine

pub mod api;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod extractor;
pub mod generator;
pub mod intent;
pub mod prompts;

// Re-export the types most callers need
pub use api::{GeminiClient, GroqClient, ModelBackend, ModelRegistry, TokenEvent};
pub use config::Config;
pub use context::{ContextSnapshot, ContextStore, SessionInfo, WebsiteContext};
pub use error::GeneratorError;
pub use events::{ChannelSink, EventSink, NullSink, StreamEvent};
pub use extractor::{Action, GenerationResult, WebsiteFiles};
pub use generator::{GenerateRequest, WebsiteGenerator};
