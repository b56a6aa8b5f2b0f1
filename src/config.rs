use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::collector::{CollectorSettings, ServiceKind};
use crate::filter::{FilterSpec, Filters};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AgentConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default = "default_scrape_interval")]
    pub scrape_interval_seconds: u64,
    /// Class names (`"system"`) or collector keys (`"system/filesystem"`)
    #[serde(default)]
    pub disable_collectors: Vec<String>,
    pub services: Vec<ServiceConfig>,
    #[serde(default)]
    pub filters: HashMap<String, FilterSpec>,
    #[serde(default)]
    pub collectors: HashMap<String, CollectorSettings>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    pub id: String,
    pub kind: ServiceKind,
    #[serde(default)]
    pub dsn: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_scrape_interval() -> u64 {
    15
}

/// Load the TOML file at `path`, then apply `PGSCOUT__*` environment overrides.
pub fn load_config(path: &Path) -> anyhow::Result<AgentConfig> {
    let config = config::Config::builder()
        .add_source(config::File::from(path))
        .add_source(config::Environment::with_prefix("PGSCOUT").separator("__"))
        .build()?;

    let cfg: AgentConfig = config.try_deserialize()?;
    validate_config(&cfg)?;

    Ok(cfg)
}

pub fn validate_config(cfg: &AgentConfig) -> anyhow::Result<()> {
    if cfg.services.is_empty() {
        anyhow::bail!("At least one service must be configured");
    }

    if cfg.scrape_interval_seconds == 0 {
        anyhow::bail!("scrape_interval_seconds must be greater than zero");
    }

    if !matches!(cfg.log_format.as_str(), "text" | "json") {
        anyhow::bail!("Invalid log_format '{}', expected 'text' or 'json'", cfg.log_format);
    }

    let mut ids = HashSet::new();
    for service in &cfg.services {
        if service.id.is_empty() {
            anyhow::bail!("Service id cannot be empty");
        }
        if !ids.insert(service.id.as_str()) {
            anyhow::bail!("Duplicate service id '{}'", service.id);
        }
        if service.kind == ServiceKind::Postgres && service.dsn.as_deref().map_or(true, str::is_empty) {
            anyhow::bail!("Postgres service '{}' requires a dsn", service.id);
        }
    }

    // Compiled again when the agent is built; this only surfaces bad patterns early.
    Filters::with_defaults(&cfg.filters)?;

    Ok(())
}
