use anyhow::Result;
use pgscout::{config::AgentConfig, exposition, Agent, CollectorRegistry};
use tracing::info;

/// Scrape every service once and print the exposition to stdout
pub async fn execute(cfg: AgentConfig) -> Result<()> {
    let registry = CollectorRegistry::builtin();
    let agent = Agent::build(&cfg, &registry)?;

    let metrics = agent.scrape().await;
    info!(samples = metrics.len(), "scrape completed");
    print!("{}", exposition::render(&metrics));

    Ok(())
}
