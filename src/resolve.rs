//! Multi-strategy element resolution.
//!
//! Model-chosen targets are frequently prose fragments rather than selectors,
//! so a single lookup is brittle against arbitrary page structure. The cascade
//! tries an ordered list of independent strategies against the current page
//! and stops at the first that tags a match; there is no scoring or voting.

use std::time::{Duration, Instant};

use anyhow::Result;
use headless_chrome::Tab;
use tracing::{debug, warn};

use crate::browser::{XPATH_MARKER, js_string};

/// Attribute each JS-side strategy sets on its match so the executor can
/// re-query the element by a stable selector.
pub const MATCH_ATTR: &str = "data-pilot-match";
pub const MATCH_SELECTOR: &str = "[data-pilot-match]";

/// Semantic-annotation attributes embedded by enhanced pages. Used as an
/// additional resolution and telemetry signal, never required for correctness.
pub const SEMANTIC_ATTR: &str = "data-semantic";
pub const SEMANTIC_SUB_ATTRS: &[&str] = &[
    "data-semantic-id",
    "data-semantic-name",
    "data-semantic-purpose",
    "data-semantic-description",
    "data-semantic-group",
];

const DIRECT_SELECTOR_TIMEOUT: Duration = Duration::from_secs(5);
const DIRECT_SELECTOR_POLL: Duration = Duration::from_millis(250);

/// Tag types that commonly carry user-visible text.
const TEXT_TAGS: &str = "a, button, div, span, p, h1, h2, h3, h4, li";

/// Action phrases probed by the proximity strategy, in order.
const ACTION_PHRASES: &[&str] = &["View Details", "Book", "Select"];

/// One element-location strategy. Generic over the page type so the cascade
/// loop can be exercised with stub pages; production strategies run against a
/// live `Tab`.
pub trait LocateStrategy<P> {
    fn name(&self) -> &'static str;

    /// Try to locate `target` on the current page. `Ok(Some(selector))` hands
    /// back a selector the caller can re-query; `Ok(None)` means this strategy
    /// has nothing, and an error is isolated by the cascade.
    fn attempt(&self, page: &P, target: &str) -> Result<Option<String>>;
}

/// Successful resolution: a re-queryable selector plus which strategy won.
#[derive(Debug, Clone)]
pub struct Located {
    pub selector: String,
    pub strategy_index: usize,
    pub strategy_name: &'static str,
}

#[derive(Debug, Clone)]
pub enum Resolution {
    Found(Located),
    NotFound,
}

/// Ordered strategy list; first non-empty result is authoritative.
pub struct Cascade<P> {
    strategies: Vec<Box<dyn LocateStrategy<P>>>,
}

impl<P> Cascade<P> {
    pub fn new(strategies: Vec<Box<dyn LocateStrategy<P>>>) -> Self {
        Self { strategies }
    }

    /// Search the current page state only; the DOM may have mutated since the
    /// last call, so nothing is cached across calls.
    pub fn resolve(&self, page: &P, target: &str) -> Resolution {
        for (index, strategy) in self.strategies.iter().enumerate() {
            match strategy.attempt(page, target) {
                Ok(Some(selector)) => {
                    debug!(strategy = strategy.name(), query = target, "element resolved");
                    return Resolution::Found(Located {
                        selector,
                        strategy_index: index,
                        strategy_name: strategy.name(),
                    });
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(strategy = strategy.name(), query = target, error = %e, "strategy failed");
                }
            }
        }
        Resolution::NotFound
    }
}

/// The production cascade against a live tab, strategies in priority order.
pub fn element_cascade() -> Cascade<Tab> {
    Cascade::new(vec![
        Box::new(DirectSelector),
        Box::new(ExactText),
        Box::new(PartialText),
        Box::new(VisibleContent),
        Box::new(SemanticContainment),
        Box::new(ActionButtonNearLabel),
    ])
}

/// Remove any match tag left by a previous resolution.
pub fn clear_match_tag(tab: &Tab) -> Result<()> {
    tab.evaluate(
        &format!(
            "document.querySelectorAll('{MATCH_SELECTOR}')\
             .forEach(el => el.removeAttribute('{MATCH_ATTR}'))"
        ),
        false,
    )?;
    Ok(())
}

fn eval_probe(tab: &Tab, script: &str) -> Result<Option<String>> {
    let hit = tab
        .evaluate(script, false)?
        .value
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    Ok(hit.then(|| MATCH_SELECTOR.to_string()))
}

/// 1. Interpret the target literally as a CSS selector or (behind the
///    `xpath=` marker) an XPath expression, waiting briefly for it to become
///    present, visible, and enabled.
struct DirectSelector;

impl LocateStrategy<Tab> for DirectSelector {
    fn name(&self) -> &'static str {
        "direct-selector"
    }

    fn attempt(&self, tab: &Tab, target: &str) -> Result<Option<String>> {
        let deadline = Instant::now() + DIRECT_SELECTOR_TIMEOUT;
        loop {
            let found = if let Some(xpath) = target.strip_prefix(XPATH_MARKER) {
                tab.find_element_by_xpath(xpath).is_ok()
            } else {
                tab.find_element(target).is_ok()
            };
            if found && is_actionable(tab, target)? {
                return Ok(Some(target.to_string()));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            std::thread::sleep(DIRECT_SELECTOR_POLL);
        }
    }
}

/// Clickability check for the direct strategy: laid out and not disabled.
fn is_actionable(tab: &Tab, target: &str) -> Result<bool> {
    let lookup = if let Some(xpath) = target.strip_prefix(XPATH_MARKER) {
        format!(
            "document.evaluate({}, document, null, \
             XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue",
            js_string(xpath)
        )
    } else {
        format!("document.querySelector({})", js_string(target))
    };
    let script = format!(
        "(() => {{ const el = {lookup}; \
         return !!el && el.offsetParent !== null && !el.disabled; }})()"
    );
    Ok(tab
        .evaluate(&script, false)?
        .value
        .and_then(|v| v.as_bool())
        .unwrap_or(false))
}

/// 2. Exact match of an element's own (direct) text against the target, over
///    common text-bearing tags.
struct ExactText;

impl LocateStrategy<Tab> for ExactText {
    fn name(&self) -> &'static str {
        "exact-text"
    }

    fn attempt(&self, tab: &Tab, target: &str) -> Result<Option<String>> {
        let script = format!(
            r#"(() => {{
  const target = {target};
  for (const el of document.querySelectorAll('{TEXT_TAGS}')) {{
    if (el.offsetParent === null) continue;
    let own = '';
    for (const n of el.childNodes) if (n.nodeType === 3) own += n.textContent;
    if (own.trim() === target) {{
      el.setAttribute('{MATCH_ATTR}', '');
      return true;
    }}
  }}
  return false;
}})()"#,
            target = js_string(target),
        );
        eval_probe(tab, &script)
    }
}

/// 3. Partial text: for long targets retry with only the first three words;
///    otherwise try each word longer than five characters independently.
struct PartialText;

impl PartialText {
    fn needles(target: &str) -> Vec<String> {
        let words: Vec<&str> = target.split_whitespace().collect();
        if words.len() > 3 {
            vec![words[..3].join(" ")]
        } else {
            words
                .iter()
                .filter(|w| w.len() > 5)
                .map(|w| w.to_string())
                .collect()
        }
    }
}

impl LocateStrategy<Tab> for PartialText {
    fn name(&self) -> &'static str {
        "partial-text"
    }

    fn attempt(&self, tab: &Tab, target: &str) -> Result<Option<String>> {
        for needle in Self::needles(target) {
            let script = format!(
                r#"(() => {{
  const needle = {needle};
  for (const el of document.querySelectorAll('body *')) {{
    let own = '';
    for (const n of el.childNodes) if (n.nodeType === 3) own += n.textContent;
    if (own.includes(needle)) {{
      el.setAttribute('{MATCH_ATTR}', '');
      return true;
    }}
  }}
  return false;
}})()"#,
                needle = js_string(&needle),
            );
            if let Some(selector) = eval_probe(tab, &script)? {
                return Ok(Some(selector));
            }
        }
        Ok(None)
    }
}

/// 4. Case-insensitive substring match against the rendered text of visible
///    candidate elements.
struct VisibleContent;

impl LocateStrategy<Tab> for VisibleContent {
    fn name(&self) -> &'static str {
        "visible-content"
    }

    fn attempt(&self, tab: &Tab, target: &str) -> Result<Option<String>> {
        let script = format!(
            r#"(() => {{
  const needle = {target}.toLowerCase();
  for (const el of document.querySelectorAll('{TEXT_TAGS}')) {{
    if (el.offsetParent === null) continue;
    if (el.textContent.toLowerCase().includes(needle)) {{
      el.setAttribute('{MATCH_ATTR}', '');
      return true;
    }}
  }}
  return false;
}})()"#,
            target = js_string(target),
        );
        eval_probe(tab, &script)
    }
}

/// 5. Search semantically-annotated elements for one whose text (or a
///    descendant's text) contains the target; prefer the deepest match.
struct SemanticContainment;

impl LocateStrategy<Tab> for SemanticContainment {
    fn name(&self) -> &'static str {
        "semantic-containment"
    }

    fn attempt(&self, tab: &Tab, target: &str) -> Result<Option<String>> {
        let script = format!(
            r#"(() => {{
  const needle = {target}.toLowerCase();
  for (const root of document.querySelectorAll({roots})) {{
    if (!root.textContent.toLowerCase().includes(needle)) continue;
    let hit = root;
    for (const child of root.querySelectorAll('*')) {{
      if (child.textContent.toLowerCase().includes(needle)) {{
        hit = child;
        break;
      }}
    }}
    hit.setAttribute('{MATCH_ATTR}', '');
    return true;
  }}
  return false;
}})()"#,
            target = js_string(target),
            roots = js_string(&semantic_selector()),
        );
        eval_probe(tab, &script)
    }
}

/// CSS selector matching any element that carries a semantic annotation.
fn semantic_selector() -> String {
    let mut parts = vec![format!("[{SEMANTIC_ATTR}]")];
    parts.extend(SEMANTIC_SUB_ATTRS.iter().map(|attr| format!("[{attr}]")));
    parts.join(", ")
}

/// 6. Treat the target as a label and look for a clickable action button with
///    a known phrase near it, scanning the labelled container and up to three
///    ancestors.
struct ActionButtonNearLabel;

impl LocateStrategy<Tab> for ActionButtonNearLabel {
    fn name(&self) -> &'static str {
        "action-button-near-label"
    }

    fn attempt(&self, tab: &Tab, target: &str) -> Result<Option<String>> {
        for phrase in ACTION_PHRASES {
            let script = format!(
                r#"(() => {{
  const label = {label}.toLowerCase();
  const phrase = {phrase}.toLowerCase();
  const containers = [];
  for (const el of document.querySelectorAll('body *')) {{
    if (el.textContent.toLowerCase().includes(label)) containers.push(el);
  }}
  for (const container of containers) {{
    let scope = container;
    for (let hop = 0; hop <= 3 && scope; hop++) {{
      for (const btn of scope.querySelectorAll('button, a, [role="button"]')) {{
        if (btn.textContent.toLowerCase().includes(phrase)) {{
          btn.setAttribute('{MATCH_ATTR}', '');
          return true;
        }}
      }}
      scope = scope.parentElement;
    }}
  }}
  return false;
}})()"#,
                label = js_string(target),
                phrase = js_string(phrase),
            );
            if let Some(selector) = eval_probe(tab, &script)? {
                return Ok(Some(selector));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, Copy)]
    enum Reply {
        Miss,
        Hit,
        Fail,
    }

    /// Stub strategy over a unit page: counts attempts and replies per script.
    struct Stub {
        name: &'static str,
        calls: Arc<AtomicUsize>,
        reply: Reply,
    }

    impl Stub {
        fn new(name: &'static str, reply: Reply) -> (Box<Self>, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (
                Box::new(Self {
                    name,
                    calls: calls.clone(),
                    reply,
                }),
                calls,
            )
        }
    }

    impl LocateStrategy<()> for Stub {
        fn name(&self) -> &'static str {
            self.name
        }

        fn attempt(&self, _page: &(), _target: &str) -> Result<Option<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.reply {
                Reply::Miss => Ok(None),
                Reply::Hit => Ok(Some(MATCH_SELECTOR.to_string())),
                Reply::Fail => anyhow::bail!("strategy blew up"),
            }
        }
    }

    #[test]
    fn first_hit_stops_the_cascade() {
        let (first, first_calls) = Stub::new("first", Reply::Miss);
        let (second, second_calls) = Stub::new("second", Reply::Hit);
        let (third, third_calls) = Stub::new("third", Reply::Hit);

        let cascade = Cascade::new(vec![
            first as Box<dyn LocateStrategy<()>>,
            second,
            third,
        ]);
        match cascade.resolve(&(), "Book a flight") {
            Resolution::Found(located) => {
                assert_eq!(located.strategy_index, 1);
                assert_eq!(located.strategy_name, "second");
                assert_eq!(located.selector, MATCH_SELECTOR);
            }
            Resolution::NotFound => panic!("expected a match"),
        }
        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
        assert_eq!(second_calls.load(Ordering::SeqCst), 1);
        assert_eq!(third_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn exhaustion_yields_not_found() {
        let (a, a_calls) = Stub::new("a", Reply::Miss);
        let (b, b_calls) = Stub::new("b", Reply::Miss);
        let cascade = Cascade::new(vec![a as Box<dyn LocateStrategy<()>>, b]);
        assert!(matches!(
            cascade.resolve(&(), "nowhere"),
            Resolution::NotFound
        ));
        assert_eq!(a_calls.load(Ordering::SeqCst), 1);
        assert_eq!(b_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn strategy_error_is_isolated() {
        let (throws, _) = Stub::new("throws", Reply::Fail);
        let (hits, _) = Stub::new("hits", Reply::Hit);
        let cascade = Cascade::new(vec![throws as Box<dyn LocateStrategy<()>>, hits]);
        match cascade.resolve(&(), "target") {
            Resolution::Found(located) => assert_eq!(located.strategy_index, 1),
            Resolution::NotFound => panic!("error in one strategy must not abort the cascade"),
        }
    }

    #[test]
    fn semantic_selector_covers_all_annotation_attributes() {
        let selector = semantic_selector();
        assert!(selector.starts_with("[data-semantic]"));
        for attr in SEMANTIC_SUB_ATTRS {
            assert!(selector.contains(&format!("[{attr}]")));
        }
    }

    #[test]
    fn partial_text_uses_first_three_words_for_long_targets() {
        let needles = PartialText::needles("Grand Palace Hotel with ocean view");
        assert_eq!(needles, vec!["Grand Palace Hotel".to_string()]);
    }

    #[test]
    fn partial_text_uses_distinctive_keywords_for_short_targets() {
        let needles = PartialText::needles("the Bordeaux trip");
        assert_eq!(needles, vec!["Bordeaux".to_string()]);
    }

    #[test]
    fn partial_text_has_no_needles_for_short_generic_targets() {
        assert!(PartialText::needles("go now").is_empty());
    }
}
