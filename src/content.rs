//! Content collection for content-generation tasks. A pure injected-JS
//! function extracts readable text from the current page: non-content tags
//! are stripped from a detached clone, a primary content region is picked
//! from a fixed selector priority list, and headings come back with
//! markdown-level prefixes.

use anyhow::Result;
use tracing::debug;

use crate::browser::BrowserSession;

const EXTRACT_JS: &str = r#"
(() => {
  const clone = document.body ? document.body.cloneNode(true) : null;
  if (!clone) return '';
  for (const el of clone.querySelectorAll('script, style, noscript, iframe, svg, nav, footer')) {
    el.remove();
  }

  let region = null;
  for (const sel of ['main', 'article', '#content', '.content', '#main', '.main']) {
    region = clone.querySelector(sel);
    if (region) break;
  }
  if (!region) region = clone;

  const parts = [];
  for (const el of region.querySelectorAll('h1, h2, h3, h4, p')) {
    const text = el.textContent.trim();
    if (!text) continue;
    const tag = el.tagName.toLowerCase();
    if (tag[0] === 'h') {
      parts.push('#'.repeat(Number(tag[1])) + ' ' + text);
    } else {
      parts.push(text);
    }
  }
  if (parts.length) return parts.join('\n\n');
  return region.textContent.replace(/\s+/g, ' ').trim();
})()
"#;

/// Collect the current page's readable content, prefixed with its title and
/// URL. Returns the block appended to the run's accumulated content.
pub fn collect(session: &BrowserSession) -> Result<String> {
    let title = session.title();
    let url = session.current_url();
    let body = session.eval_string(EXTRACT_JS)?;
    debug!(url, bytes = body.len(), "collected page content");
    Ok(format!("Title: {title}\nURL: {url}\n\n{body}"))
}

/// Separator between blocks collected from successive pages.
pub const BLOCK_SEPARATOR: &str = "\n\n---\n\n";
