use std::ffi::OsStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use headless_chrome::{Browser, Element, LaunchOptions, Tab};
use tracing::debug;

/// Marker used in model-chosen targets to request XPath resolution.
pub const XPATH_MARKER: &str = "xpath=";

/// How long to poll for `document.readyState === "complete"` after a load.
const PAGE_READY_TIMEOUT: Duration = Duration::from_secs(10);
const PAGE_READY_POLL: Duration = Duration::from_millis(250);

/// One headless Chrome session. Created once per run; owns the single tab the
/// whole run operates on.
pub struct BrowserSession {
    _browser: Browser,
    pub tab: Arc<Tab>,
}

impl BrowserSession {
    pub fn launch(timeout: Duration) -> Result<Self> {
        let options = LaunchOptions {
            headless: true,
            sandbox: false,
            window_size: Some((1920, 1080)),
            args: vec![
                OsStr::new("--disable-gpu"),
                OsStr::new("--disable-dev-shm-usage"),
            ],
            idle_browser_timeout: Duration::from_secs(600),
            ..Default::default()
        };

        let browser = Browser::new(options)
            .map_err(|e| anyhow!("browser launch failed: {e}"))?;
        let tab = browser.new_tab().context("opening tab")?;
        tab.set_default_timeout(timeout);

        Ok(Self {
            _browser: browser,
            tab,
        })
    }

    /// Load `url` and wait until the document reports itself complete.
    /// Returns the load latency.
    pub fn navigate(&self, url: &str) -> Result<f64> {
        debug!(url, "navigating");
        let start = Instant::now();
        self.tab
            .navigate_to(url)
            .map_err(|e| anyhow!("navigation to {url} failed: {e}"))?;
        self.tab
            .wait_until_navigated()
            .map_err(|e| anyhow!("navigation wait for {url} failed: {e}"))?;
        self.wait_page_ready()?;
        Ok(start.elapsed().as_secs_f64())
    }

    fn wait_page_ready(&self) -> Result<()> {
        let deadline = Instant::now() + PAGE_READY_TIMEOUT;
        loop {
            let state = self
                .eval_string("document.readyState")
                .unwrap_or_default();
            if state == "complete" {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(anyhow!("page readiness wait timed out"));
            }
            std::thread::sleep(PAGE_READY_POLL);
        }
    }

    /// Go back one history entry and let the previous page settle.
    pub fn go_back(&self) -> Result<()> {
        self.tab
            .evaluate("history.back()", false)
            .map_err(|e| anyhow!("history.back failed: {e}"))?;
        std::thread::sleep(Duration::from_secs(1));
        self.wait_page_ready()
    }

    /// Find an element by CSS selector, or by XPath when the target carries
    /// the `xpath=` marker.
    pub fn find(&self, target: &str) -> Result<Element<'_>> {
        if let Some(xpath) = target.strip_prefix(XPATH_MARKER) {
            self.tab
                .find_element_by_xpath(xpath)
                .map_err(|e| anyhow!("no element for xpath {xpath}: {e}"))
        } else {
            self.tab
                .find_element(target)
                .map_err(|e| anyhow!("no element for selector {target}: {e}"))
        }
    }

    /// Evaluate a JS expression and coerce the result to a string.
    pub fn eval_string(&self, expr: &str) -> Result<String> {
        let result = self
            .tab
            .evaluate(expr, false)
            .map_err(|e| anyhow!("script evaluation failed: {e}"))?;
        Ok(result
            .value
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_default())
    }

    /// Evaluate a JS expression and coerce the result to a bool.
    pub fn eval_bool(&self, expr: &str) -> Result<bool> {
        let result = self
            .tab
            .evaluate(expr, false)
            .map_err(|e| anyhow!("script evaluation failed: {e}"))?;
        Ok(result
            .value
            .and_then(|v| v.as_bool())
            .unwrap_or(false))
    }

    pub fn current_url(&self) -> String {
        self.eval_string("window.location.href")
            .unwrap_or_else(|_| "unknown".to_string())
    }

    pub fn title(&self) -> String {
        self.eval_string("document.title")
            .unwrap_or_else(|_| "untitled".to_string())
    }

    pub fn type_text(&self, text: &str) -> Result<()> {
        self.tab
            .type_str(text)
            .map_err(|e| anyhow!("typing failed: {e}"))?;
        Ok(())
    }
}

/// Encode a Rust string as a JS string literal for injection into scripts.
pub fn js_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn js_string_escapes_quotes_and_newlines() {
        assert_eq!(js_string(r#"it's "here""#), r#""it's \"here\"""#);
        assert_eq!(js_string("a\nb"), r#""a\nb""#);
    }

    #[test]
    fn xpath_marker_strips() {
        assert_eq!(
            "xpath=//button[1]".strip_prefix(XPATH_MARKER),
            Some("//button[1]")
        );
        assert_eq!("#submit".strip_prefix(XPATH_MARKER), None);
    }
}
