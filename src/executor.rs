//! Execution of element-level directives (click, input, select) against a
//! resolved element. Collect and navigate directives are handled by the
//! orchestrator, which owns accumulated content and the navigation state.

use std::time::Duration;

use anyhow::{Result, anyhow};
use chrono::Utc;
use headless_chrome::{Element, Tab};
use serde_json::json;
use tracing::info;

use crate::browser::{BrowserSession, js_string};
use crate::error::AgentError;
use crate::metrics::{ElementInspection, RunMetrics};
use crate::resolve::{Cascade, Located, Resolution, clear_match_tag};
use crate::types::{ActionDirective, ActionKind, ExecutionOutcome};

pub struct ActionExecutor {
    cascade: Cascade<Tab>,
}

impl ActionExecutor {
    pub fn new(cascade: Cascade<Tab>) -> Self {
        Self { cascade }
    }

    /// Resolve the directive's target and perform the effect. Failures are
    /// absorbed into the outcome and the metrics error list; the run continues.
    pub fn execute(
        &self,
        session: &BrowserSession,
        directive: &ActionDirective,
        metrics: &mut RunMetrics,
    ) -> ExecutionOutcome {
        let target = match directive.target.as_deref() {
            Some(t) => t,
            None => return ExecutionOutcome::failed("directive has no target"),
        };

        if let Err(e) = clear_match_tag(&session.tab) {
            return ExecutionOutcome::failed(format!("match-tag reset failed: {e}"));
        }

        let located = match self.cascade.resolve(&session.tab, target) {
            Resolution::Found(located) => located,
            Resolution::NotFound => {
                let error = AgentError::Resolution(target.to_string()).to_string();
                metrics.record_error(error.clone());
                return ExecutionOutcome::failed(error);
            }
        };
        info!(
            query = target,
            strategy = located.strategy_name,
            action = directive.kind.as_str(),
            "element resolved"
        );

        match self.perform(session, directive, &located, metrics) {
            Ok(()) => ExecutionOutcome::ok(),
            Err(e) => {
                let error = AgentError::Execution {
                    action: directive.kind.as_str().to_string(),
                    target: target.to_string(),
                    reason: e.to_string(),
                }
                .to_string();
                metrics.record_error(error.clone());
                ExecutionOutcome::failed(error)
            }
        }
    }

    fn perform(
        &self,
        session: &BrowserSession,
        directive: &ActionDirective,
        located: &Located,
        metrics: &mut RunMetrics,
    ) -> Result<()> {
        let element = session.find(&located.selector)?;
        record_inspection(session, directive, located, &element, metrics);

        match directive.kind {
            ActionKind::Click => {
                element.click()?;
                // Pages are assumed to react to clicks; give them a beat.
                std::thread::sleep(Duration::from_millis(1500));
                Ok(())
            }
            ActionKind::Input => {
                let value = directive.value.as_deref().unwrap_or_default();
                element.click()?;
                clear_field(session, &located.selector)?;
                session.type_text(value)?;
                Ok(())
            }
            ActionKind::Select => {
                let value = directive.value.as_deref().unwrap_or_default();
                select_by_visible_text(session, &located.selector, value)
            }
            ActionKind::Navigate | ActionKind::Collect => {
                Err(anyhow!("{} is handled by the orchestrator", directive.kind.as_str()))
            }
        }
    }
}

/// Build a JS expression resolving the selector (CSS or `xpath=`) to a node.
fn lookup_expr(selector: &str) -> String {
    if let Some(xpath) = selector.strip_prefix(crate::browser::XPATH_MARKER) {
        format!(
            "document.evaluate({}, document, null, \
             XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue",
            js_string(xpath)
        )
    } else {
        format!("document.querySelector({})", js_string(selector))
    }
}

fn clear_field(session: &BrowserSession, selector: &str) -> Result<()> {
    let script = format!(
        "(() => {{ const el = {}; if (el) el.value = ''; }})()",
        lookup_expr(selector)
    );
    session.eval_string(&script)?;
    Ok(())
}

/// Select an option by its visible text and fire the events frameworks listen
/// for.
fn select_by_visible_text(session: &BrowserSession, selector: &str, value: &str) -> Result<()> {
    let script = format!(
        r#"(() => {{
  const el = {lookup};
  if (!el || el.tagName !== 'SELECT') return false;
  const wanted = {value};
  for (const option of el.options) {{
    if (option.text.trim() === wanted) {{
      el.value = option.value;
      el.dispatchEvent(new Event('input', {{ bubbles: true }}));
      el.dispatchEvent(new Event('change', {{ bubbles: true }}));
      return true;
    }}
  }}
  return false;
}})()"#,
        lookup = lookup_expr(selector),
        value = js_string(value),
    );
    if session.eval_bool(&script)? {
        Ok(())
    } else {
        Err(anyhow!("no option with visible text {value:?}"))
    }
}

/// Record telemetry about the element an action ran against.
fn record_inspection(
    session: &BrowserSession,
    directive: &ActionDirective,
    located: &Located,
    element: &Element<'_>,
    metrics: &mut RunMetrics,
) {
    let tag = element
        .get_description()
        .map(|d| d.node_name.to_lowercase())
        .unwrap_or_default();
    let text = element.get_inner_text().unwrap_or_default();
    let summary = json!({
        "tag": tag,
        "text": text.chars().take(120).collect::<String>(),
        "selector": located.selector,
        "url": session.current_url(),
    });
    metrics.element_inspections.push(ElementInspection {
        timestamp: Utc::now(),
        action: directive.clone(),
        strategy: located.strategy_name.to_string(),
        element: summary,
    });
}
