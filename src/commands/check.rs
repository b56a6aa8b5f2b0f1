use anyhow::Result;
use colored::Colorize;
use pgscout::{config, CollectorRegistry};
use std::path::Path;

/// Execute the check command
///
/// This validates the configuration file without connecting to anything
pub fn execute(path: &Path) -> Result<()> {
    println!("{}", "Testing configuration...".yellow());

    // Load configuration (this will validate it)
    let cfg = config::load_config(path)?;
    let registry = CollectorRegistry::builtin();

    println!("{}", "✓ Configuration test successful".green());
    println!();

    println!("{}", "Configuration Summary:".bold());
    println!("  {}: {}", "Log Level".cyan(), cfg.log_level);
    println!("  {}: {}", "Log Format".cyan(), cfg.log_format);
    println!("  {}: {}s", "Scrape Interval".cyan(), cfg.scrape_interval_seconds);
    println!();

    println!("  {}: {}", "Services".cyan(), cfg.services.len());
    for (idx, service) in cfg.services.iter().enumerate() {
        let enabled = registry.enabled_for(service.kind, &cfg.disable_collectors);
        println!("    {}. {} ({})", idx + 1, service.id, service.kind);
        for key in registry.keys().into_iter().filter(|k| k.starts_with(&format!("{}/", service.kind))) {
            let status = if enabled.contains_key(key) {
                "enabled".green()
            } else {
                "disabled".red()
            };
            println!("       {} {}", key, status);
        }
    }
    println!();

    if !cfg.filters.is_empty() {
        println!("  {}: {}", "Filters".cyan(), cfg.filters.len());
        let mut names: Vec<_> = cfg.filters.keys().collect();
        names.sort();
        for name in names {
            let spec = &cfg.filters[name];
            println!(
                "    {} {} include={} exclude={}",
                name,
                "→".dimmed(),
                spec.include.as_deref().unwrap_or("-"),
                spec.exclude.as_deref().unwrap_or("-")
            );
        }
    }

    tracing::info!("Configuration validation completed successfully");
    Ok(())
}
