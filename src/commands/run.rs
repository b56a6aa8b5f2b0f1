use anyhow::Result;
use pgscout::{config::AgentConfig, exposition, signals, Agent, CollectorRegistry};
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tracing::info;

/// Scrape every `scrape_interval_seconds` until SIGINT/SIGTERM.
///
/// A scrape in progress when the signal arrives is finished first.
pub async fn execute(cfg: AgentConfig) -> Result<()> {
    let registry = CollectorRegistry::builtin();
    let agent = Agent::build(&cfg, &registry)?;
    info!(
        services = ?agent.service_ids(),
        interval_seconds = cfg.scrape_interval_seconds,
        "pgscout started"
    );

    let (shutdown_tx, _signal_handle) = signals::setup_signal_handlers();
    let mut shutdown_rx = shutdown_tx.subscribe();

    let mut ticker = tokio::time::interval(Duration::from_secs(cfg.scrape_interval_seconds));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = ticker.tick() => {
                let started = Instant::now();
                let metrics = agent.scrape().await;
                info!(
                    samples = metrics.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "scrape completed"
                );
                print!("{}", exposition::render(&metrics));
            }
        }
    }

    // Dropping the agent stops the log tailers.
    drop(agent);
    info!("pgscout stopped");
    Ok(())
}
