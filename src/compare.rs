//! Two-run comparison: the same task executed against a semantically
//! annotated site and a baseline site, with efficiency deltas.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::metrics::RunMetrics;

#[derive(Debug, Serialize)]
pub struct ComparisonSummary {
    pub enhanced_success: bool,
    pub baseline_success: bool,
    pub enhanced_time_secs: f64,
    pub baseline_time_secs: f64,
    pub time_difference_secs: f64,
    pub time_difference_pct: f64,
    pub enhanced_steps: u64,
    pub baseline_steps: u64,
    pub steps_difference: i64,
    pub enhanced_api_calls: u64,
    pub baseline_api_calls: u64,
    pub enhanced_tokens: u64,
    pub baseline_tokens: u64,
    pub tokens_difference: i64,
    pub enhanced_errors: usize,
    pub baseline_errors: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enhanced_content_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline_content_length: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ComparisonReport {
    pub task: String,
    pub is_content_generation: bool,
    pub enhanced: RunMetrics,
    pub baseline: RunMetrics,
    pub comparison: ComparisonSummary,
}

impl ComparisonReport {
    pub fn build(task: &str, enhanced: RunMetrics, baseline: RunMetrics) -> Self {
        let enhanced_time = enhanced.total_duration_secs.unwrap_or(0.0);
        let baseline_time = baseline.total_duration_secs.unwrap_or(0.0);
        let is_content_generation = enhanced.is_content_generation;

        let content_len =
            |m: &RunMetrics| m.generated_content.as_ref().map(|c| c.len()).unwrap_or(0);
        let comparison = ComparisonSummary {
            enhanced_success: enhanced.success,
            baseline_success: baseline.success,
            enhanced_time_secs: enhanced_time,
            baseline_time_secs: baseline_time,
            time_difference_secs: enhanced_time - baseline_time,
            time_difference_pct: if baseline_time > 0.0 {
                (enhanced_time - baseline_time) / baseline_time * 100.0
            } else {
                0.0
            },
            enhanced_steps: enhanced.steps_taken,
            baseline_steps: baseline.steps_taken,
            steps_difference: enhanced.steps_taken as i64 - baseline.steps_taken as i64,
            enhanced_api_calls: enhanced.api_calls,
            baseline_api_calls: baseline.api_calls,
            enhanced_tokens: enhanced.tokens.total,
            baseline_tokens: baseline.tokens.total,
            tokens_difference: enhanced.tokens.total as i64 - baseline.tokens.total as i64,
            enhanced_errors: enhanced.errors.len(),
            baseline_errors: baseline.errors.len(),
            enhanced_content_length: is_content_generation.then(|| content_len(&enhanced)),
            baseline_content_length: is_content_generation.then(|| content_len(&baseline)),
        };

        Self {
            task: task.to_string(),
            is_content_generation,
            enhanced,
            baseline,
            comparison,
        }
    }

    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join("comparison_results.json");
        let file = std::fs::File::create(&path)
            .with_context(|| format!("creating {}", path.display()))?;
        serde_json::to_writer_pretty(file, self).context("serializing comparison report")?;
        Ok(path)
    }

    pub fn print_summary(&self) {
        let c = &self.comparison;
        println!("\n=== PERFORMANCE COMPARISON ===");
        println!("Task: {}", self.task);
        println!(
            "Task type: {}",
            if self.is_content_generation {
                "Content Generation"
            } else {
                "Task Execution"
            }
        );
        println!("Enhanced site success: {}", c.enhanced_success);
        println!("Baseline site success: {}", c.baseline_success);
        println!("Time (enhanced): {:.2}s", c.enhanced_time_secs);
        println!("Time (baseline): {:.2}s", c.baseline_time_secs);
        println!(
            "Time difference: {:.2}s ({:.1}%)",
            c.time_difference_secs, c.time_difference_pct
        );
        println!("Steps taken (enhanced): {}", c.enhanced_steps);
        println!("Steps taken (baseline): {}", c.baseline_steps);
        println!("API calls (enhanced): {}", c.enhanced_api_calls);
        println!("API calls (baseline): {}", c.baseline_api_calls);
        println!("Total tokens (enhanced): {}", c.enhanced_tokens);
        println!("Total tokens (baseline): {}", c.baseline_tokens);
        println!("Errors (enhanced): {}", c.enhanced_errors);
        println!("Errors (baseline): {}", c.baseline_errors);
        if let (Some(e), Some(b)) = (c.enhanced_content_length, c.baseline_content_length) {
            println!("Generated content length (enhanced): {e} chars");
            println!("Generated content length (baseline): {b} chars");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(success: bool, steps: u64, tokens: u64) -> RunMetrics {
        let mut m = RunMetrics::new("Summarize this website", "https://example.com", true);
        m.success = success;
        m.steps_taken = steps;
        m.tokens.add(tokens, 0);
        m.total_duration_secs = Some(10.0);
        m.generated_content = Some("abc".to_string());
        m
    }

    #[test]
    fn comparison_computes_differences() {
        let report = ComparisonReport::build(
            "Summarize this website",
            metrics(true, 3, 100),
            metrics(true, 5, 150),
        );
        assert_eq!(report.comparison.steps_difference, -2);
        assert_eq!(report.comparison.tokens_difference, -50);
        assert_eq!(report.comparison.enhanced_content_length, Some(3));
        assert!(report.is_content_generation);
    }

    #[test]
    fn zero_baseline_time_avoids_division() {
        let mut baseline = metrics(false, 0, 0);
        baseline.total_duration_secs = Some(0.0);
        let report =
            ComparisonReport::build("t", metrics(true, 1, 1), baseline);
        assert_eq!(report.comparison.time_difference_pct, 0.0);
    }
}
