use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

use crate::collector::{Collector, CollectorSettings, MetricSink, ScrapeConfig};
use crate::model::{Descriptor, Labels, ValueKind};

pub struct LoadAverageCollector {
    path: PathBuf,
    load1: Arc<Descriptor>,
    load5: Arc<Descriptor>,
    load15: Arc<Descriptor>,
}

impl LoadAverageCollector {
    pub fn new(const_labels: &Labels, _settings: &CollectorSettings) -> anyhow::Result<Arc<dyn Collector>> {
        Ok(Arc::new(Self::with_path(const_labels, "/proc/loadavg")))
    }

    pub fn with_path(const_labels: &Labels, path: impl Into<PathBuf>) -> Self {
        let desc = |name: &str, help: &str| {
            Descriptor::new(name, help, ValueKind::Gauge, &[], const_labels.clone())
        };

        Self {
            path: path.into(),
            load1: desc("node_load1", "1m load average."),
            load5: desc("node_load5", "5m load average."),
            load15: desc("node_load15", "15m load average."),
        }
    }
}

#[async_trait]
impl Collector for LoadAverageCollector {
    async fn update(&self, _config: &ScrapeConfig, out: &MetricSink) -> anyhow::Result<()> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        let (load1, load5, load15) = parse_loadavg(&content)?;

        out.emit(&self.load1, load1, &[]).await?;
        out.emit(&self.load5, load5, &[]).await?;
        out.emit(&self.load15, load15, &[]).await?;
        Ok(())
    }
}

/// Parse the first three fields of `/proc/loadavg`
pub fn parse_loadavg(content: &str) -> anyhow::Result<(f64, f64, f64)> {
    let fields: Vec<&str> = content.split_whitespace().collect();
    if fields.len() < 3 {
        anyhow::bail!("invalid load average content: {:?}", content.trim());
    }

    Ok((fields[0].parse()?, fields[1].parse()?, fields[2].parse()?))
}
