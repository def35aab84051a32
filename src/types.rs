use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// A message in the conversation history sent to the model provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// One browser action requested by the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Click,
    Input,
    Select,
    Navigate,
    Collect,
}

impl ActionKind {
    pub fn from_wire(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "click" => Some(Self::Click),
            "input" => Some(Self::Input),
            "select" => Some(Self::Select),
            "navigate" => Some(Self::Navigate),
            "collect" => Some(Self::Collect),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Click => "click",
            Self::Input => "input",
            Self::Select => "select",
            Self::Navigate => "navigate",
            Self::Collect => "collect",
        }
    }
}

/// Structured instruction extracted from one model turn.
///
/// `target` is required for every kind except `Collect`; the parser enforces
/// that before a directive reaches the executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionDirective {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl ActionDirective {
    pub fn collect() -> Self {
        Self {
            kind: ActionKind::Collect,
            target: None,
            value: None,
        }
    }

    pub fn describe(&self) -> String {
        let mut out = self.kind.as_str().to_string();
        if let Some(target) = &self.target {
            out.push_str(&format!(" on {target}"));
        }
        if let Some(value) = &self.value {
            out.push_str(&format!(" with value: {value}"));
        }
        out
    }
}

/// Outcome of one model turn, produced by trying the parser's extraction
/// rules in order and returning on the first that applies.
#[derive(Debug, Clone)]
pub enum ParsedResponse {
    /// The completion marker was present; carries the extracted result text.
    Completed { result: String },
    /// A well-formed directive was extracted.
    Directive(ActionDirective),
    /// Nothing actionable; the orchestrator re-prompts for a valid directive.
    Unparsed,
}

/// Result of executing one directive, fed back into the conversation.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionOutcome {
    pub succeeded: bool,
    pub error: Option<String>,
}

impl ExecutionOutcome {
    pub fn ok() -> Self {
        Self {
            succeeded: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            error: Some(error.into()),
        }
    }
}

static CONTENT_KEYWORDS: &[&str] = &[
    "write",
    "summarize",
    "summary",
    "generate",
    "create",
    "extract",
    "describe",
    "explain",
    "analyze",
    "report",
];

static SIMPLE_CONTENT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"summar(y|ize)",
        r"extract\s+information",
        r"describe\s+(the\s+)?(web)?site",
        r"(write|create)\s+a\s+summary",
        r"overview\s+of",
        r"(tell|write)\s+(me\s+)?about",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static pattern"))
    .collect()
});

/// Immutable task input, classified once at run start.
#[derive(Debug, Clone)]
pub struct Task {
    pub objective: String,
    pub url: String,
    pub is_content_generation: bool,
    pub is_simple_content: bool,
}

impl Task {
    pub fn classify(objective: impl Into<String>, url: impl Into<String>) -> Self {
        let objective = objective.into();
        let lowered = objective.to_lowercase();
        let is_content_generation = CONTENT_KEYWORDS.iter().any(|k| lowered.contains(k));
        let is_simple_content =
            is_content_generation && SIMPLE_CONTENT_PATTERNS.iter().any(|p| p.is_match(&lowered));
        Self {
            objective,
            url: url.into(),
            is_content_generation,
            is_simple_content,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summarize_task_is_simple_content_generation() {
        let task = Task::classify("Summarize this website", "https://example.com");
        assert!(task.is_content_generation);
        assert!(task.is_simple_content);
    }

    #[test]
    fn booking_task_is_not_content_generation() {
        let task = Task::classify(
            "Book a flight from Boston to Denver",
            "https://example.com",
        );
        assert!(!task.is_content_generation);
        assert!(!task.is_simple_content);
    }

    #[test]
    fn extract_without_simple_phrasing_still_needs_navigation() {
        let task = Task::classify(
            "Extract the cheapest listing and add it to the cart",
            "https://example.com",
        );
        assert!(task.is_content_generation);
        assert!(!task.is_simple_content);
    }

    #[test]
    fn directive_wire_shape_round_trips() {
        let json = r##"{"type":"input","target":"#q","value":"rust"}"##;
        let directive: ActionDirective = serde_json::from_str(json).unwrap();
        assert_eq!(directive.kind, ActionKind::Input);
        assert_eq!(directive.target.as_deref(), Some("#q"));
        assert_eq!(directive.value.as_deref(), Some("rust"));
    }
}
