use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Classification of a user request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Modify,
    Add,
    Remove,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Create => write!(f, "create"),
            Action::Modify => write!(f, "modify"),
            Action::Add => write!(f, "add"),
            Action::Remove => write!(f, "remove"),
        }
    }
}

/// The three artifacts of one generated website. All keys are always
/// present; a missing file is an empty string, never a null.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebsiteFiles {
    #[serde(default)]
    pub html: String,
    #[serde(default)]
    pub css: String,
    #[serde(default)]
    pub js: String,
}

impl WebsiteFiles {
    pub fn is_empty(&self) -> bool {
        self.html.is_empty() && self.css.is_empty() && self.js.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub features: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<Vec<String>>,
}

/// Outcome of one generation cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResult {
    pub action: Action,
    pub files: WebsiteFiles,
    pub changes: Vec<String>,
    pub explanation: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ResultMetadata>,
}

/// Partial extraction: each strategy fills only the files it found,
/// later strategies fill only what is still missing.
#[derive(Debug, Default)]
struct PartialFiles {
    html: Option<String>,
    css: Option<String>,
    js: Option<String>,
}

impl PartialFiles {
    fn merge_missing(&mut self, other: PartialFiles) {
        if self.html.is_none() {
            self.html = other.html;
        }
        if self.css.is_none() {
            self.css = other.css;
        }
        if self.js.is_none() {
            self.js = other.js;
        }
    }

    fn is_complete(&self) -> bool {
        self.html.is_some() && self.css.is_some() && self.js.is_some()
    }
}

/// Non-file fields recovered from an embedded JSON reply.
#[derive(Debug, Default)]
struct JsonExtras {
    changes: Option<Vec<String>>,
    explanation: Option<String>,
    metadata: Option<ResultMetadata>,
}

/// Shape of the JSON object the generation prompts ask the model for.
#[derive(Debug, Deserialize)]
struct LlmReply {
    summary: Option<LlmSummary>,
    changes: Option<Vec<String>>,
    explanation: Option<String>,
    files: Option<LlmReplyFiles>,
}

#[derive(Debug, Deserialize)]
struct LlmSummary {
    #[serde(rename = "type")]
    website_type: Option<String>,
    #[serde(default)]
    features: Vec<String>,
    #[serde(default)]
    dependencies: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct LlmReplyFiles {
    #[serde(default)]
    html: String,
    #[serde(default)]
    css: String,
    #[serde(default)]
    js: String,
}

static MARKER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[--FILE:([^\]]+)--\]").unwrap());

static FENCED_HTML_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)```html\s+(.*?)```").unwrap());
static FENCED_CSS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)```css\s+(.*?)```").unwrap());
static FENCED_JS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)```(?:javascript|js)\s+(.*?)```").unwrap());

static HTML_DOC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)(<!DOCTYPE html>.*</html>)").unwrap());
static STYLE_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<style[^>]*>(.*?)</style>").unwrap());
static SCRIPT_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script[^>]*>(.*?)</script>").unwrap());
static CSS_RULE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*[a-zA-Z.#*:@\[][^{}<>();\n]*\{[^{}]*\}").unwrap());
static JS_STMT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"function\s+\w+\s*\(|const\s+\w+\s*=|let\s+\w+\s*=|document\.|window\.").unwrap()
});

/// Which file a marker token names. Matching is forgiving: anything with
/// "js"/"script" is the script, "css"/"style" the stylesheet, "html" the
/// page. Unknown markers are dropped along with their content.
fn marker_target(name: &str) -> Option<FileSlot> {
    let name = name.trim().to_lowercase();
    if name.contains("script") || name.contains("js") {
        Some(FileSlot::Js)
    } else if name.contains("style") || name.contains("css") {
        Some(FileSlot::Css)
    } else if name.contains("html") {
        Some(FileSlot::Html)
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileSlot {
    Html,
    Css,
    Js,
}

fn clean(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Strategy 1: literal `[--FILE:name--]` delimiters. Content for a file
/// runs from its marker to the next marker or end of text. First
/// occurrence of a file wins.
fn extract_markers(text: &str) -> PartialFiles {
    let mut out = PartialFiles::default();
    let markers: Vec<_> = MARKER_RE.captures_iter(text).collect();

    for (i, cap) in markers.iter().enumerate() {
        let whole = cap.get(0).unwrap();
        let name = cap.get(1).unwrap().as_str();
        let end = markers
            .get(i + 1)
            .map(|next| next.get(0).unwrap().start())
            .unwrap_or(text.len());
        let content = &text[whole.end()..end];

        match marker_target(name) {
            Some(FileSlot::Html) if out.html.is_none() => out.html = clean(content),
            Some(FileSlot::Css) if out.css.is_none() => out.css = clean(content),
            Some(FileSlot::Js) if out.js.is_none() => out.js = clean(content),
            _ => {}
        }
    }
    out
}

/// Strategy 2: a top-level `{...}` block matching the prompted JSON reply
/// shape. Also recovers changes/explanation/metadata when present.
fn extract_json(text: &str) -> Option<(PartialFiles, JsonExtras)> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }

    let reply: LlmReply = match serde_json::from_str(&text[start..=end]) {
        Ok(reply) => reply,
        Err(err) => {
            debug!("embedded JSON parse failed, falling back: {}", err);
            return None;
        }
    };

    let mut files = PartialFiles::default();
    if let Some(reply_files) = reply.files {
        files.html = clean(&reply_files.html);
        files.css = clean(&reply_files.css);
        files.js = clean(&reply_files.js);
    }

    let metadata = reply.summary.map(|summary| ResultMetadata {
        website_type: summary.website_type,
        features: Some(summary.features),
        dependencies: Some(summary.dependencies),
    });

    Some((
        files,
        JsonExtras {
            changes: reply.changes,
            explanation: reply.explanation,
            metadata,
        },
    ))
}

/// Strategy 3: fenced code blocks, then structural tag/statement patterns.
fn extract_heuristic(text: &str) -> PartialFiles {
    let mut out = PartialFiles::default();

    out.html = FENCED_HTML_RE
        .captures(text)
        .and_then(|c| clean(c.get(1).unwrap().as_str()))
        .or_else(|| {
            HTML_DOC_RE
                .captures(text)
                .and_then(|c| clean(c.get(1).unwrap().as_str()))
        });

    out.css = FENCED_CSS_RE
        .captures(text)
        .and_then(|c| clean(c.get(1).unwrap().as_str()))
        .or_else(|| {
            STYLE_TAG_RE
                .captures(text)
                .and_then(|c| clean(c.get(1).unwrap().as_str()))
        })
        .or_else(|| {
            // Bare selector blocks, only when nothing tag-shaped is around
            // to make the match ambiguous.
            if text.contains('<') {
                return None;
            }
            let rules: Vec<&str> = CSS_RULE_RE.find_iter(text).map(|m| m.as_str()).collect();
            if rules.is_empty() {
                None
            } else {
                clean(&rules.join("\n\n"))
            }
        });

    out.js = FENCED_JS_RE
        .captures(text)
        .and_then(|c| clean(c.get(1).unwrap().as_str()))
        .or_else(|| {
            SCRIPT_TAG_RE
                .captures(text)
                .and_then(|c| clean(c.get(1).unwrap().as_str()))
        })
        .or_else(|| {
            if text.contains('<') {
                return None;
            }
            // Statement-like text: take everything from the first
            // statement onward.
            JS_STMT_RE
                .find(text)
                .and_then(|m| clean(&text[m.start()..]))
        });

    out
}

const DEFAULT_CHANGES: &str = "Code updated based on request.";
const DEFAULT_EXPLANATION: &str = "The code has been updated. Review the changes in the editor.";
const EMPTY_CREATE_EXPLANATION: &str = "The AI responded, but no usable code could be extracted \
     from its response. Please try a more specific prompt.";

/// Parse one completed model response into a `GenerationResult`.
///
/// Never fails: strategies are tried in order (markers, embedded JSON,
/// tag/statement heuristics) and each fills only the files the previous
/// ones missed. On a `modify` a file no strategy produced keeps its prior
/// value; on a `create` that produced nothing at all the result is
/// downgraded to a failure with the files left empty.
pub fn extract(response: &str, action: Action, prior: &WebsiteFiles) -> GenerationResult {
    debug!(len = response.len(), %action, "parsing model response");

    let mut partial = extract_markers(response);
    let mut extras = JsonExtras::default();

    if !partial.is_complete() {
        if let Some((json_files, json_extras)) = extract_json(response) {
            partial.merge_missing(json_files);
            extras = json_extras;
        }
    }
    if !partial.is_complete() {
        partial.merge_missing(extract_heuristic(response));
    }

    let extracted_any =
        partial.html.is_some() || partial.css.is_some() || partial.js.is_some();

    if action == Action::Create && !extracted_any {
        warn!("create response contained no extractable code, downgrading to failure");
        return GenerationResult {
            action,
            files: WebsiteFiles::default(),
            changes: vec!["Failed to generate code.".to_string()],
            explanation: EMPTY_CREATE_EXPLANATION.to_string(),
            success: false,
            metadata: None,
        };
    }

    // A file no strategy produced: preserved on modify, empty on create.
    let fallback = |current: &str| -> String {
        if action == Action::Create {
            String::new()
        } else {
            current.to_string()
        }
    };

    let files = WebsiteFiles {
        html: partial.html.unwrap_or_else(|| fallback(&prior.html)),
        css: partial.css.unwrap_or_else(|| fallback(&prior.css)),
        js: partial.js.unwrap_or_else(|| fallback(&prior.js)),
    };

    GenerationResult {
        action,
        files,
        changes: extras
            .changes
            .unwrap_or_else(|| vec![DEFAULT_CHANGES.to_string()]),
        explanation: extras
            .explanation
            .unwrap_or_else(|| DEFAULT_EXPLANATION.to_string()),
        success: true,
        metadata: extras.metadata,
    }
}
