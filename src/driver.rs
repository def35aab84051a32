//! The page surface the orchestrator drives. A trait seam so the run loop's
//! control flow can be exercised against stub pages; the production driver
//! wires a headless Chrome session to the resolution cascade.

use std::time::Duration;

use anyhow::Result;

use crate::browser::BrowserSession;
use crate::content;
use crate::executor::ActionExecutor;
use crate::metrics::RunMetrics;
use crate::observe::{self, PageObservation};
use crate::resolve::element_cascade;
use crate::types::{ActionDirective, ExecutionOutcome};

/// Everything the orchestrator needs from a page.
pub trait PageDriver {
    /// Load `url` and return the load latency in seconds.
    fn open(&mut self, url: &str) -> Result<f64>;

    /// Go back one history entry.
    fn back(&mut self) -> Result<()>;

    /// Snapshot the current page state for one planning turn.
    fn observe(&mut self) -> Result<PageObservation>;

    /// Probe for page-level semantic annotations; returns the flag and the
    /// probe latency.
    fn detect_annotations(&mut self) -> (bool, f64);

    /// Collect the current page's readable content.
    fn collect(&mut self) -> Result<String>;

    /// Run one element-level directive (click, input, select).
    fn execute(&mut self, directive: &ActionDirective, metrics: &mut RunMetrics)
    -> ExecutionOutcome;
}

/// Production driver: one headless Chrome session plus the element resolution
/// cascade behind the executor.
pub struct ChromeDriver {
    session: BrowserSession,
    executor: ActionExecutor,
}

impl ChromeDriver {
    pub fn launch(timeout: Duration) -> Result<Self> {
        Ok(Self {
            session: BrowserSession::launch(timeout)?,
            executor: ActionExecutor::new(element_cascade()),
        })
    }
}

impl PageDriver for ChromeDriver {
    fn open(&mut self, url: &str) -> Result<f64> {
        self.session.navigate(url)
    }

    fn back(&mut self) -> Result<()> {
        self.session.go_back()
    }

    fn observe(&mut self) -> Result<PageObservation> {
        observe::capture(&self.session)
    }

    fn detect_annotations(&mut self) -> (bool, f64) {
        observe::detect_semantic_annotations(&self.session)
    }

    fn collect(&mut self) -> Result<String> {
        content::collect(&self.session)
    }

    fn execute(
        &mut self,
        directive: &ActionDirective,
        metrics: &mut RunMetrics,
    ) -> ExecutionOutcome {
        self.executor.execute(&self.session, directive, metrics)
    }
}
