use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{GeneratorError, Result};
use crate::extractor::{Action, GenerationResult, WebsiteFiles};

/// History is capped at the most recent entries, oldest evicted first.
const HISTORY_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub prompt: String,
    pub action: Action,
    pub timestamp: DateTime<Utc>,
    pub changes: Vec<String>,
}

/// Per-session accumulated state: the current files plus bounded history
/// and website metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebsiteContext {
    #[serde(default)]
    pub current_files: WebsiteFiles,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    #[serde(default)]
    pub website_type: String,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl WebsiteContext {
    pub fn has_code(&self) -> bool {
        !self.current_files.is_empty()
    }

    fn session_info(&self) -> SessionInfo {
        SessionInfo {
            website_type: self.website_type.clone(),
            features: self.features.clone(),
            last_modified: self.history.last().map(|entry| entry.timestamp),
            total_history: self.history.len(),
        }
    }
}

/// Session metadata snapshot attached to terminal events and exports.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub website_type: String,
    pub features: Vec<String>,
    pub last_modified: Option<DateTime<Utc>>,
    pub total_history: usize,
}

/// Transportable session document used by export/import.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSnapshot {
    pub session_id: String,
    pub files: WebsiteFiles,
    pub session_info: SessionInfo,
    pub history: Vec<HistoryEntry>,
}

/// In-process owner of every session's `WebsiteContext`, keyed by session
/// id. Constructed once per process and injected where needed.
///
/// No per-session locking: two in-flight requests for the same session
/// race and the later commit wins.
#[derive(Debug, Default)]
pub struct ContextStore {
    sessions: Mutex<HashMap<String, WebsiteContext>>,
}

impl ContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current context for a session, if one exists.
    pub fn get(&self, session_id: &str) -> Option<WebsiteContext> {
        self.sessions.lock().unwrap().get(session_id).cloned()
    }

    /// Context for a session, creating an empty one if absent.
    pub fn get_or_create(&self, session_id: &str) -> WebsiteContext {
        self.sessions
            .lock()
            .unwrap()
            .entry(session_id.to_string())
            .or_default()
            .clone()
    }

    /// Record a successful generation: files are replaced wholesale,
    /// metadata overwrites when supplied, and the prompt is appended to
    /// the bounded history.
    pub fn commit(&self, session_id: &str, prompt: &str, result: &GenerationResult) {
        let mut sessions = self.sessions.lock().unwrap();
        let context = sessions.entry(session_id.to_string()).or_default();

        context.current_files = result.files.clone();
        if let Some(metadata) = &result.metadata {
            if let Some(website_type) = &metadata.website_type {
                context.website_type = website_type.clone();
            }
            if let Some(features) = &metadata.features {
                context.features = features.clone();
            }
            if let Some(dependencies) = &metadata.dependencies {
                context.dependencies = dependencies.clone();
            }
        }

        context.history.push(HistoryEntry {
            prompt: prompt.to_string(),
            action: result.action,
            timestamp: Utc::now(),
            changes: result.changes.clone(),
        });
        if context.history.len() > HISTORY_LIMIT {
            let excess = context.history.len() - HISTORY_LIMIT;
            context.history.drain(..excess);
        }
        debug!(session_id, history = context.history.len(), "context committed");
    }

    /// Replace a session wholesale from a serialized snapshot. Malformed
    /// input errors out without touching the existing context.
    pub fn import_snapshot(&self, session_id: &str, json: &str) -> Result<()> {
        let snapshot: ContextSnapshot = serde_json::from_str(json)?;
        self.import(session_id, snapshot);
        Ok(())
    }

    /// Replace a session from an already-parsed snapshot.
    pub fn import(&self, session_id: &str, snapshot: ContextSnapshot) {
        let context = WebsiteContext {
            current_files: snapshot.files,
            history: snapshot.history,
            website_type: snapshot.session_info.website_type,
            features: snapshot.session_info.features,
            dependencies: Vec::new(),
        };
        self.sessions
            .lock()
            .unwrap()
            .insert(session_id.to_string(), context);
        debug!(session_id, "context imported");
    }

    /// Serialize a session to the transportable snapshot form.
    pub fn export_snapshot(&self, session_id: &str) -> Result<ContextSnapshot> {
        let sessions = self.sessions.lock().unwrap();
        let context = sessions
            .get(session_id)
            .ok_or_else(|| GeneratorError::UnknownSession(session_id.to_string()))?;
        Ok(ContextSnapshot {
            session_id: session_id.to_string(),
            files: context.current_files.clone(),
            session_info: context.session_info(),
            history: context.history.clone(),
        })
    }

    /// Replace a session with a fresh empty context.
    pub fn reset(&self, session_id: &str) {
        self.sessions
            .lock()
            .unwrap()
            .insert(session_id.to_string(), WebsiteContext::default());
    }

    /// Metadata snapshot for terminal events. An unknown session yields
    /// the empty snapshot rather than an error.
    pub fn session_info(&self, session_id: &str) -> SessionInfo {
        self.sessions
            .lock()
            .unwrap()
            .get(session_id)
            .map(|context| context.session_info())
            .unwrap_or_default()
    }
}
