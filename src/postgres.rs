//! PostgreSQL access shared by the postgres collectors.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::collector::{ConfigRefresher, ScrapeConfig};
use crate::error::AgentError;

/// First version with `pg_current_logfile()`
pub const PG10: i32 = 100_000;

/// Build a pool that connects on first use, so an unreachable server only
/// fails its own scrapes.
pub fn connect_lazy(service_id: &str, dsn: &str) -> Result<PgPool, AgentError> {
    PgPoolOptions::new()
        .max_connections(2)
        .acquire_timeout(Duration::from_secs(5))
        .connect_lazy(dsn)
        .map_err(|e| AgentError::Config(format!("invalid dsn for service {}: {}", service_id, e)))
}

fn require_pool(config: &ScrapeConfig) -> anyhow::Result<&PgPool> {
    config
        .pool
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("service {} has no database connection", config.service_id))
}

/// Re-reads server version and data directory before every scrape
pub struct PostgresRefresher;

#[async_trait]
impl ConfigRefresher for PostgresRefresher {
    async fn refresh(&self, config: &ScrapeConfig) -> anyhow::Result<ScrapeConfig> {
        let pool = require_pool(config)?;
        let (version, data_directory): (i32, String) = sqlx::query_as(
            "SELECT current_setting('server_version_num')::int, current_setting('data_directory')",
        )
        .fetch_one(pool)
        .await?;

        let mut refreshed = config.clone();
        refreshed.server_version_num = Some(version);
        refreshed.data_directory = Some(PathBuf::from(data_directory));
        Ok(refreshed)
    }
}

/// Path of the log file the server is currently writing.
///
/// Returns `Ok(None)` on servers without `pg_current_logfile()`.
pub async fn current_logfile(config: &ScrapeConfig) -> anyhow::Result<Option<PathBuf>> {
    if config.server_version_num.is_some_and(|v| v < PG10) {
        return Ok(None);
    }

    let pool = require_pool(config)?;
    let (data_directory, logfile): (String, Option<String>) =
        sqlx::query_as("SELECT current_setting('data_directory'), pg_current_logfile()")
            .fetch_one(pool)
            .await?;

    let logfile = logfile.ok_or_else(|| anyhow::anyhow!("logging collector is not enabled"))?;
    Ok(Some(resolve_logfile(Path::new(&data_directory), &logfile)))
}

/// Relative log paths are relative to the data directory
pub fn resolve_logfile(data_directory: &Path, logfile: &str) -> PathBuf {
    let logfile = Path::new(logfile);
    if logfile.is_absolute() {
        logfile.to_path_buf()
    } else {
        data_directory.join(logfile)
    }
}
