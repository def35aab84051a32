use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::ActionDirective;

/// Saved copies truncate collected page content to keep metric files readable.
const SAVED_CONTENT_CAP: usize = 1000;

#[derive(Debug, Clone, Default, Serialize)]
pub struct TokenUsage {
    pub prompt: u64,
    pub completion: u64,
    pub total: u64,
}

impl TokenUsage {
    pub fn add(&mut self, prompt: u64, completion: u64) {
        self.prompt += prompt;
        self.completion += completion;
        self.total += prompt + completion;
    }
}

/// Telemetry about one resolved element, recorded per executed action.
#[derive(Debug, Clone, Serialize)]
pub struct ElementInspection {
    pub timestamp: DateTime<Utc>,
    pub action: ActionDirective,
    /// Name of the cascade strategy that located the element, or "unknown".
    pub strategy: String,
    pub element: serde_json::Value,
}

/// Mutable aggregate for one task run. Owned exclusively by the orchestrator;
/// finalized on either terminal state and handed to the caller for persistence.
#[derive(Debug, Clone, Serialize)]
pub struct RunMetrics {
    pub task: String,
    pub url: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub total_duration_secs: Option<f64>,
    pub steps_taken: u64,
    pub api_calls: u64,
    pub retries: u64,
    pub tokens: TokenUsage,
    pub errors: Vec<String>,
    pub success: bool,
    pub has_semantic_annotations: bool,
    pub page_load_secs: Option<f64>,
    pub detection_secs: Option<f64>,
    pub interactive_elements_count: usize,
    pub actions_performed: Vec<ActionDirective>,
    pub element_inspections: Vec<ElementInspection>,
    pub is_content_generation: bool,
    pub collected_content: String,
    pub generated_content: Option<String>,
    pub result: Option<String>,
}

impl RunMetrics {
    pub fn new(task: &str, url: &str, is_content_generation: bool) -> Self {
        Self {
            task: task.to_string(),
            url: url.to_string(),
            started_at: Utc::now(),
            finished_at: None,
            total_duration_secs: None,
            steps_taken: 0,
            api_calls: 0,
            retries: 0,
            tokens: TokenUsage::default(),
            errors: Vec::new(),
            success: false,
            has_semantic_annotations: false,
            page_load_secs: None,
            detection_secs: None,
            interactive_elements_count: 0,
            actions_performed: Vec::new(),
            element_inspections: Vec::new(),
            is_content_generation,
            collected_content: String::new(),
            generated_content: None,
            result: None,
        }
    }

    /// Record one attempted action. Increments `steps_taken` exactly once per
    /// call, regardless of how the action turns out.
    pub fn record_action(&mut self, directive: &ActionDirective) {
        self.steps_taken += 1;
        self.actions_performed.push(directive.clone());
    }

    pub fn record_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    /// Close the timestamps. Idempotent: the first call wins.
    pub fn finalize(&mut self) {
        if self.finished_at.is_some() {
            return;
        }
        let now = Utc::now();
        self.finished_at = Some(now);
        self.total_duration_secs = Some(
            (now - self.started_at)
                .to_std()
                .map(|d| d.as_secs_f64())
                .unwrap_or(0.0),
        );
    }

    /// Save the metrics record as JSON under `dir`, returning the file path.
    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        let timestamp = self.started_at.format("%Y%m%d_%H%M%S");
        let status = if self.has_semantic_annotations {
            "enhanced"
        } else {
            "regular"
        };
        let task_type = if self.is_content_generation {
            "content"
        } else {
            "task"
        };
        let path = dir.join(format!("metrics_{status}_{task_type}_{timestamp}.json"));

        let mut copy = self.clone();
        if copy.collected_content.len() > SAVED_CONTENT_CAP {
            let cut = truncate_boundary(&copy.collected_content, SAVED_CONTENT_CAP);
            copy.collected_content = format!("{cut}... [truncated]");
        }

        let file = std::fs::File::create(&path)
            .with_context(|| format!("creating metrics file {}", path.display()))?;
        serde_json::to_writer_pretty(file, &copy).context("serializing metrics")?;
        Ok(path)
    }

    /// Save generated content (content-generation runs only) next to the metrics.
    pub fn save_generated_content(&self, dir: &Path) -> Result<Option<PathBuf>> {
        let Some(content) = &self.generated_content else {
            return Ok(None);
        };
        let timestamp = self.started_at.format("%Y%m%d_%H%M%S");
        let path = dir.join(format!("generated_content_{timestamp}.txt"));
        std::fs::write(&path, content)
            .with_context(|| format!("writing generated content to {}", path.display()))?;
        Ok(Some(path))
    }
}

/// Cut `s` at the largest char boundary not exceeding `max` bytes.
fn truncate_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ActionDirective, ActionKind};

    fn click(target: &str) -> ActionDirective {
        ActionDirective {
            kind: ActionKind::Click,
            target: Some(target.to_string()),
            value: None,
        }
    }

    #[test]
    fn record_action_increments_steps_once_per_call() {
        let mut metrics = RunMetrics::new("t", "https://example.com", false);
        metrics.record_action(&click("#a"));
        metrics.record_action(&ActionDirective::collect());
        metrics.record_action(&click("#b"));
        assert_eq!(metrics.steps_taken, 3);
        assert_eq!(metrics.actions_performed.len(), 3);
    }

    #[test]
    fn finalize_is_idempotent() {
        let mut metrics = RunMetrics::new("t", "https://example.com", false);
        metrics.finalize();
        let first = metrics.finished_at;
        metrics.finalize();
        assert_eq!(metrics.finished_at, first);
        assert!(metrics.total_duration_secs.is_some());
    }

    #[test]
    fn token_usage_accumulates_totals() {
        let mut usage = TokenUsage::default();
        usage.add(100, 20);
        usage.add(50, 5);
        assert_eq!(usage.prompt, 150);
        assert_eq!(usage.completion, 25);
        assert_eq!(usage.total, 175);
    }

    #[test]
    fn save_truncates_collected_content() {
        let dir = tempfile::tempdir().unwrap();
        let mut metrics = RunMetrics::new("t", "https://example.com", true);
        metrics.collected_content = "x".repeat(5000);
        metrics.generated_content = Some("a summary".to_string());
        metrics.finalize();

        let path = metrics.save(dir.path()).unwrap();
        let saved: serde_json::Value =
            serde_json::from_reader(std::fs::File::open(&path).unwrap()).unwrap();
        let stored = saved["collected_content"].as_str().unwrap();
        assert!(stored.len() < 1100);
        assert!(stored.ends_with("... [truncated]"));

        let content_path = metrics.save_generated_content(dir.path()).unwrap().unwrap();
        assert_eq!(std::fs::read_to_string(content_path).unwrap(), "a summary");
    }
}
