//! Per-collector duration/success instrumentation.
//!
//! Every collector invocation yields two auxiliary gauges labeled with the
//! collector key, whether or not the collector produced anything. A scraper
//! detects a collector going dark or slow from these alone.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use crate::collector::{Collector, MetricSink, ScrapeConfig};
use crate::model::{Descriptor, Labels, ValueKind};

pub const NAMESPACE: &str = "pgscout";

/// Descriptors of the two health metrics, built once per collector set
pub struct Instrumentation {
    duration: Arc<Descriptor>,
    success: Arc<Descriptor>,
}

impl Instrumentation {
    pub fn new(const_labels: Labels) -> Self {
        Self {
            duration: Descriptor::new(
                format!("{}_scrape_collector_duration_seconds", NAMESPACE),
                "Duration of a collector scrape.",
                ValueKind::Gauge,
                &["collector"],
                const_labels.clone(),
            ),
            success: Descriptor::new(
                format!("{}_scrape_collector_success", NAMESPACE),
                "Whether a collector succeeded.",
                ValueKind::Gauge,
                &["collector"],
                const_labels,
            ),
        }
    }

    /// Run one collector and emit its health metrics.
    ///
    /// Errors and panics are logged and reported as `success = 0`; they never
    /// reach the caller.
    pub async fn execute(
        &self,
        name: &str,
        collector: &dyn Collector,
        config: &ScrapeConfig,
        out: &MetricSink,
    ) {
        let start = Instant::now();
        let result = AssertUnwindSafe(collector.update(config, out))
            .catch_unwind()
            .await;
        let duration = start.elapsed();

        let success = match result {
            Ok(Ok(())) => {
                tracing::debug!(
                    collector = %name,
                    duration_seconds = duration.as_secs_f64(),
                    "collector succeeded"
                );
                1.0
            }
            Ok(Err(e)) => {
                tracing::error!(
                    collector = %name,
                    service = %config.service_id,
                    duration_seconds = duration.as_secs_f64(),
                    error = %e,
                    "collector failed"
                );
                0.0
            }
            Err(panic) => {
                tracing::error!(
                    collector = %name,
                    service = %config.service_id,
                    duration_seconds = duration.as_secs_f64(),
                    panic = ?panic,
                    "collector panicked"
                );
                0.0
            }
        };

        // Both descriptors declare exactly one variable label.
        if let Err(e) = out.emit(&self.duration, duration.as_secs_f64(), &[name]).await {
            tracing::error!(collector = %name, error = %e, "failed to emit duration metric");
        }
        if let Err(e) = out.emit(&self.success, success, &[name]).await {
            tracing::error!(collector = %name, error = %e, "failed to emit success metric");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Filters;
    use crate::collector::ServiceKind;
    use crate::model::Metric;
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    struct Fixed(anyhow::Result<()>);

    #[async_trait]
    impl Collector for Fixed {
        async fn update(&self, _config: &ScrapeConfig, out: &MetricSink) -> anyhow::Result<()> {
            let desc = Descriptor::new("test_value", "test", ValueKind::Gauge, &[], vec![]);
            out.emit(&desc, 42.0, &[]).await?;
            match &self.0 {
                Ok(()) => Ok(()),
                Err(e) => Err(anyhow::anyhow!("{}", e)),
            }
        }
    }

    struct Panicking;

    #[async_trait]
    impl Collector for Panicking {
        async fn update(&self, _config: &ScrapeConfig, _out: &MetricSink) -> anyhow::Result<()> {
            panic!("collector bug");
        }
    }

    fn config() -> ScrapeConfig {
        ScrapeConfig::new("system", ServiceKind::System, Arc::new(Filters::default()))
    }

    async fn run(collector: &dyn Collector) -> Vec<Metric> {
        let (tx, mut rx) = mpsc::channel(16);
        let sink = MetricSink::new(tx);
        let instrumentation = Instrumentation::new(vec![("service_id".into(), "system".into())]);
        instrumentation
            .execute("system/test", collector, &config(), &sink)
            .await;
        drop(sink);

        let mut metrics = Vec::new();
        while let Some(m) = rx.recv().await {
            metrics.push(m);
        }
        metrics
    }

    #[tokio::test]
    async fn test_success_is_one() {
        let metrics = run(&Fixed(Ok(()))).await;
        assert_eq!(metrics.len(), 3);

        // Own metric first, health pair last.
        assert_eq!(metrics[0].name(), "test_value");
        assert_eq!(metrics[1].name(), "pgscout_scrape_collector_duration_seconds");
        assert_eq!(metrics[2].name(), "pgscout_scrape_collector_success");
        assert_eq!(metrics[2].value(), 1.0);
        assert_eq!(metrics[2].label("collector"), Some("system/test"));
        assert_eq!(metrics[2].label("service_id"), Some("system"));
    }

    #[tokio::test]
    async fn test_error_is_zero() {
        let metrics = run(&Fixed(Err(anyhow::anyhow!("query failed")))).await;
        assert_eq!(metrics.len(), 3);
        assert_eq!(metrics[2].value(), 0.0);
        assert!(metrics[1].value() >= 0.0);
    }

    #[tokio::test]
    async fn test_panic_is_zero() {
        let metrics = run(&Panicking).await;
        assert_eq!(metrics.len(), 2);
        assert_eq!(metrics[1].name(), "pgscout_scrape_collector_success");
        assert_eq!(metrics[1].value(), 0.0);
    }
}
