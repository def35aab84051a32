//! Page-state observation: what the orchestrator shows the model each turn,
//! plus detection of page-level semantic annotations (telemetry only).

use std::time::Instant;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::browser::BrowserSession;
use crate::config::ELEMENT_INVENTORY_CAP;

const META_DESCRIPTION_CAP: usize = 150;

/// JavaScript injected to inventory interactive elements. Prefers elements
/// carrying semantic annotations; falls back to standard interactive tags.
/// Each entry carries a selector computed by a fixed priority chain so the
/// model can address the element directly.
const INVENTORY_JS: &str = r#"
(() => {
  const cap = __CAP__;
  const pick = (el) => {
    const tag = el.tagName.toLowerCase();
    const sid = el.getAttribute('data-semantic-id');
    if (sid) return '[data-semantic-id="' + sid + '"]';
    const group = el.getAttribute('data-semantic-group');
    if (group) return tag + '[data-semantic-group="' + group + '"]';
    const sname = el.getAttribute('data-semantic-name');
    if (sname) return tag + '[data-semantic-name="' + sname + '"]';
    if (el.id) return '#' + el.id;
    if (el.getAttribute('name')) return tag + '[name="' + el.getAttribute('name') + '"]';
    if ((tag === 'button' || tag === 'a') && el.textContent.trim()) {
      return 'xpath=//' + tag + '[contains(text(), "' + el.textContent.trim().slice(0, 60).replace(/"/g, '') + '")]';
    }
    const aria = el.getAttribute('aria-label');
    if (aria) return tag + '[aria-label="' + aria + '"]';
    const placeholder = el.getAttribute('placeholder');
    if (placeholder) return tag + '[placeholder="' + placeholder + '"]';
    return tag;
  };

  const semantic = document.querySelectorAll(
    '[data-semantic-id], [data-semantic-name], [data-semantic-purpose], ' +
    '[data-semantic-description], [data-semantic-group]');
  const pool = semantic.length
    ? [...semantic]
    : [...document.querySelectorAll(
        'button, a, input, select, textarea, [role="button"], [tabindex]')];

  const entries = [];
  for (const el of pool) {
    const info = {
      tag: el.tagName.toLowerCase(),
      text: (el.textContent || '').trim().slice(0, 120),
      visible: el.offsetParent !== null,
      enabled: !el.disabled,
      selector: pick(el),
      attributes: {}
    };
    const names = ['id', 'class', 'name', 'type', 'value', 'href', 'placeholder',
      'aria-label', 'role', 'data-semantic', 'data-semantic-id', 'data-semantic-name',
      'data-semantic-purpose', 'data-semantic-description', 'data-semantic-group'];
    for (const name of names) {
      const v = el.getAttribute(name);
      if (v) info.attributes[name] = v;
    }
    entries.push(info);
  }
  return JSON.stringify({ total: entries.length, elements: entries.slice(0, cap) });
})()
"#;

const DETECT_JS: &str = r#"
(() => {
  if (document.documentElement.getAttribute('data-semantic') === 'true') return true;
  return document.querySelectorAll(
    '[data-semantic-id], [data-semantic-name], [data-semantic-purpose], ' +
    '[data-semantic-description], [data-semantic-group]').length > 0;
})()
"#;

/// One interactive element as shown to the model.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ElementSummary {
    pub tag: String,
    pub text: String,
    pub visible: bool,
    pub enabled: bool,
    pub selector: String,
    #[serde(default)]
    pub attributes: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct Inventory {
    total: usize,
    elements: Vec<ElementSummary>,
}

/// Snapshot of the current page state for one planning turn.
#[derive(Debug, Clone)]
pub struct PageObservation {
    pub title: String,
    pub url: String,
    pub meta_description: String,
    pub interactive_elements: Vec<ElementSummary>,
    pub interactive_elements_count: usize,
}

impl PageObservation {
    /// Render the observation as the user message appended each planning turn.
    pub fn to_message(&self) -> String {
        let description = if self.meta_description.len() > META_DESCRIPTION_CAP {
            let mut end = META_DESCRIPTION_CAP;
            while !self.meta_description.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}...", &self.meta_description[..end])
        } else {
            self.meta_description.clone()
        };
        let elements = serde_json::to_string_pretty(&self.interactive_elements)
            .unwrap_or_else(|_| "[]".to_string());
        format!(
            "Current page information:\n\
             - Title: {}\n\
             - URL: {}\n\
             - Description: {}\n\n\
             There are {} interactive elements on this page.\n\n\
             Here are the elements you can interact with:\n{}\n\n\
             What action should I take next to accomplish the task?",
            self.title, self.url, description, self.interactive_elements_count, elements
        )
    }
}

/// Capture the current page state: title, URL, meta description, and the
/// interactive-element inventory capped at 50 entries.
pub fn capture(session: &BrowserSession) -> Result<PageObservation> {
    let title = session.title();
    let url = session.current_url();
    let meta_description = session
        .eval_string(
            "(document.querySelector('meta[name=\"description\"]') || {}).content || ''",
        )
        .unwrap_or_default();

    let script = INVENTORY_JS.replace("__CAP__", &ELEMENT_INVENTORY_CAP.to_string());
    let raw = session.eval_string(&script)?;
    let inventory: Inventory = serde_json::from_str(&raw).unwrap_or(Inventory {
        total: 0,
        elements: Vec::new(),
    });
    debug!(url, total = inventory.total, "captured page observation");

    Ok(PageObservation {
        title,
        url,
        meta_description,
        interactive_elements: inventory.elements,
        interactive_elements_count: inventory.total,
    })
}

/// Check for the page-level semantic-annotation marker. Telemetry only; the
/// outcome never affects control flow. Returns the flag and the probe latency.
pub fn detect_semantic_annotations(session: &BrowserSession) -> (bool, f64) {
    let start = Instant::now();
    let enhanced = session.eval_bool(DETECT_JS).unwrap_or(false);
    (enhanced, start.elapsed().as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observation_message_truncates_long_descriptions() {
        let observation = PageObservation {
            title: "Shop".to_string(),
            url: "https://example.com".to_string(),
            meta_description: "d".repeat(400),
            interactive_elements: Vec::new(),
            interactive_elements_count: 3,
        };
        let message = observation.to_message();
        assert!(message.contains(&format!("{}...", "d".repeat(150))));
        assert!(message.contains("There are 3 interactive elements"));
    }

    #[test]
    fn inventory_json_decodes() {
        let raw = r##"{"total":2,"elements":[
            {"tag":"button","text":"Book","visible":true,"enabled":true,
             "selector":"#book","attributes":{"id":"book"}}]}"##;
        let inventory: Inventory = serde_json::from_str(raw).unwrap();
        assert_eq!(inventory.total, 2);
        assert_eq!(inventory.elements[0].selector, "#book");
    }
}
