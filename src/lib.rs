//! pagepilot: an LLM-driven browser task agent.
//!
//! The engine alternates between observing page state, consulting a language
//! model, and executing the extracted action against a headless Chrome
//! session. A multi-strategy resolution cascade maps the model's loosely
//! specified targets onto concrete elements, and every run produces a
//! metrics record suitable for enhanced-vs-baseline site comparison.

pub mod browser;
pub mod compare;
pub mod config;
pub mod content;
pub mod driver;
pub mod error;
pub mod executor;
pub mod invoker;
pub mod metrics;
pub mod observe;
pub mod orchestrator;
pub mod parser;
pub mod provider;
pub mod resolve;
pub mod types;

pub use metrics::RunMetrics;
pub use orchestrator::TaskAgent;
pub use types::{ActionDirective, ActionKind, ParsedResponse, Task};
