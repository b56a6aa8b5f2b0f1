use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::error::AgentError;
use crate::filter::Filters;
use crate::model::{Descriptor, Labels, Metric};

/// Class of monitored service; also the first half of every collector key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    System,
    Postgres,
}

impl ServiceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Postgres => "postgres",
        }
    }
}

impl std::fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-scrape, per-service configuration passed into every `update` call.
#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    pub service_id: String,
    pub kind: ServiceKind,
    /// Connection pool, present for database services
    pub pool: Option<PgPool>,
    /// `server_version_num`, filled in by the per-scrape refresh
    pub server_version_num: Option<i32>,
    /// `data_directory`, filled in by the per-scrape refresh
    pub data_directory: Option<PathBuf>,
    pub filters: Arc<Filters>,
}

impl ScrapeConfig {
    pub fn new(service_id: impl Into<String>, kind: ServiceKind, filters: Arc<Filters>) -> Self {
        Self {
            service_id: service_id.into(),
            kind,
            pool: None,
            server_version_num: None,
            data_directory: None,
            filters,
        }
    }

    pub fn with_pool(mut self, pool: PgPool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Constant labels attached to every metric of this service
    pub fn const_labels(&self) -> Labels {
        vec![("service_id".to_string(), self.service_id.clone())]
    }
}

/// Write side of the scrape funnel handed to collectors.
///
/// Collectors can only send through it; closing the funnel is the pipeline's job.
#[derive(Clone)]
pub struct MetricSink {
    tx: mpsc::Sender<Metric>,
}

impl MetricSink {
    pub fn new(tx: mpsc::Sender<Metric>) -> Self {
        Self { tx }
    }

    /// Send a sample, waiting until the funnel accepts it
    pub async fn send(&self, metric: Metric) {
        if self.tx.send(metric).await.is_err() {
            tracing::debug!("metric funnel closed, dropping sample");
        }
    }

    /// Build a sample from `desc` and send it
    pub async fn emit(
        &self,
        desc: &Arc<Descriptor>,
        value: f64,
        label_values: &[&str],
    ) -> Result<(), AgentError> {
        let metric = desc.metric(value, label_values)?;
        self.send(metric).await;
        Ok(())
    }
}

/// A metric producer for one subsystem.
///
/// Implementations are built once per service by a [`CollectorFactory`] and
/// invoked concurrently with their siblings on every scrape.
#[async_trait]
pub trait Collector: Send + Sync + 'static {
    /// Emit this scrape's samples into `out`.
    ///
    /// Returning `Ok(())` without emitting anything is a valid benign skip,
    /// e.g. when the feature is unavailable on this server version.
    async fn update(&self, config: &ScrapeConfig, out: &MetricSink) -> anyhow::Result<()>;
}

/// Optional per-collector tuning knobs from the `[collectors."<key>"]` config table
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct CollectorSettings {
    /// Timeout for a single blocking filesystem stat call
    #[serde(default)]
    pub stat_timeout_ms: Option<u64>,
    /// How often the log tailer polls an idle file for new data
    #[serde(default)]
    pub tail_poll_interval_ms: Option<u64>,
}

impl CollectorSettings {
    pub fn stat_timeout(&self) -> Duration {
        Duration::from_millis(self.stat_timeout_ms.unwrap_or(1000))
    }

    pub fn tail_poll_interval(&self) -> Duration {
        Duration::from_millis(self.tail_poll_interval_ms.unwrap_or(250))
    }
}

/// Builds one collector from the service's constant labels and its settings
pub type CollectorFactory =
    Arc<dyn Fn(&Labels, &CollectorSettings) -> anyhow::Result<Arc<dyn Collector>> + Send + Sync>;

/// Re-reads per-service facts (server version, data directory) before a scrape
#[async_trait]
pub trait ConfigRefresher: Send + Sync + 'static {
    async fn refresh(&self, config: &ScrapeConfig) -> anyhow::Result<ScrapeConfig>;
}
