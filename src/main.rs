use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use dotenvy::dotenv;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pagepilot::compare::ComparisonReport;
use pagepilot::config::{AgentConfig, ProviderKind};
use pagepilot::metrics::RunMetrics;
use pagepilot::orchestrator::TaskAgent;

/// Run one task against a semantically annotated site and a baseline site,
/// then report how efficiently the agent completed each.
#[derive(Debug, Parser)]
#[command(name = "pagepilot", version, about)]
struct Args {
    /// Task description, e.g. "Summarize this website"
    #[arg(long)]
    task: String,

    /// URL of the site with semantic annotations
    #[arg(long)]
    enhanced_url: String,

    /// URL of the site without annotations
    #[arg(long)]
    baseline_url: String,

    /// Model provider
    #[arg(long, value_enum, default_value = "gemini")]
    provider: ProviderKind,

    /// Model name (provider default when omitted)
    #[arg(long)]
    model: Option<String>,

    /// API key (falls back to the provider's environment variable)
    #[arg(long)]
    api_key: Option<String>,

    /// Browser timeout in seconds
    #[arg(long, default_value_t = 60)]
    timeout: u64,

    /// Maximum model-call retries per request
    #[arg(long, default_value_t = 3)]
    max_retries: u32,

    /// Directory for metric and report files
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pagepilot=info")),
        )
        .init();

    let args = Args::parse();
    std::fs::create_dir_all(&args.output_dir)?;

    let enhanced = run_one(&args, &args.enhanced_url).await?;
    let baseline = run_one(&args, &args.baseline_url).await?;

    let report = ComparisonReport::build(&args.task, enhanced, baseline);
    let path = report.save(&args.output_dir)?;
    report.print_summary();
    info!(path = %path.display(), "comparison report saved");

    Ok(())
}

/// Execute the task once against `url` with a fresh browser session, saving
/// the run's metrics (and generated content, when present) as a side effect.
async fn run_one(args: &Args, url: &str) -> Result<RunMetrics> {
    let config = AgentConfig::resolve(
        args.provider,
        args.model.clone(),
        args.api_key.clone(),
        args.timeout,
        args.max_retries,
    )?;
    info!(url, "starting run");
    let mut agent = TaskAgent::launch(config)?;
    let metrics = agent.execute_task(&args.task, url).await;

    let metrics_path = metrics.save(&args.output_dir)?;
    info!(path = %metrics_path.display(), success = metrics.success, "run finished");
    if let Some(content_path) = metrics.save_generated_content(&args.output_dir)? {
        info!(path = %content_path.display(), "generated content saved");
    }
    Ok(metrics)
}
