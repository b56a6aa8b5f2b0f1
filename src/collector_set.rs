use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::collector::{Collector, CollectorFactory, CollectorSettings, ConfigRefresher, ScrapeConfig};
use crate::error::AgentError;
use crate::instrument::Instrumentation;
use crate::model::{Labels, Metric};
use crate::pipeline;

/// The fixed set of collectors for one monitored service.
///
/// The collector map is immutable after construction. Dropping the set drops
/// its collectors, which also stops any background work they own.
pub struct CollectorSet {
    service_id: String,
    collectors: BTreeMap<String, Arc<dyn Collector>>,
    instrumentation: Arc<Instrumentation>,
    refresher: Option<Arc<dyn ConfigRefresher>>,
}

impl CollectorSet {
    /// Invoke every factory; the first failure aborts construction.
    pub fn new(
        service_id: impl Into<String>,
        const_labels: Labels,
        factories: BTreeMap<String, CollectorFactory>,
        settings: &HashMap<String, CollectorSettings>,
    ) -> Result<Self, AgentError> {
        let service_id = service_id.into();
        let defaults = CollectorSettings::default();

        let mut collectors = BTreeMap::new();
        for (key, factory) in factories {
            let collector_settings = settings.get(&key).unwrap_or(&defaults);
            let collector = factory(&const_labels, collector_settings)
                .map_err(|e| AgentError::construction(key.clone(), e))?;
            collectors.insert(key, collector);
        }

        tracing::info!(
            service = %service_id,
            collectors = ?collectors.keys().collect::<Vec<_>>(),
            "collector set created"
        );

        Ok(Self {
            service_id,
            collectors,
            instrumentation: Arc::new(Instrumentation::new(const_labels)),
            refresher: None,
        })
    }

    /// Refresh the scrape config before every scrape
    pub fn with_refresher(mut self, refresher: Arc<dyn ConfigRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    pub fn len(&self) -> usize {
        self.collectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collectors.is_empty()
    }

    pub fn collector_keys(&self) -> Vec<&String> {
        self.collectors.keys().collect()
    }

    /// Run one scrape, sending every metric to `out` before returning.
    ///
    /// Collector failures only show up as `success = 0`. A failed config
    /// refresh aborts the scrape with no metrics emitted.
    pub async fn collect(&self, config: &ScrapeConfig, out: mpsc::Sender<Metric>) -> Result<(), AgentError> {
        let config = match &self.refresher {
            Some(refresher) => refresher
                .refresh(config)
                .await
                .map_err(|e| AgentError::refresh(self.service_id.clone(), e))?,
            None => config.clone(),
        };

        pipeline::execute(&self.collectors, &self.instrumentation, Arc::new(config), out).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::{MetricSink, ServiceKind};
    use crate::filter::Filters;
    use crate::model::{Descriptor, ValueKind};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Collector for Counting {
        async fn update(&self, _config: &ScrapeConfig, out: &MetricSink) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let desc = Descriptor::new("test_calls", "calls", ValueKind::Counter, &[], vec![]);
            out.emit(&desc, 1.0, &[]).await?;
            Ok(())
        }
    }

    struct FailingRefresher;

    #[async_trait]
    impl ConfigRefresher for FailingRefresher {
        async fn refresh(&self, _config: &ScrapeConfig) -> anyhow::Result<ScrapeConfig> {
            anyhow::bail!("connection refused")
        }
    }

    fn counting_factory(calls: Arc<AtomicUsize>) -> CollectorFactory {
        Arc::new(move |_labels: &Labels, _settings: &CollectorSettings| {
            Ok(Arc::new(Counting { calls: calls.clone() }) as Arc<dyn Collector>)
        })
    }

    fn config() -> ScrapeConfig {
        ScrapeConfig::new("pg", ServiceKind::Postgres, Arc::new(Filters::default()))
    }

    #[test]
    fn test_factory_error_fails_construction() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut factories = BTreeMap::new();
        factories.insert("postgres/a".to_string(), counting_factory(calls));
        let failing: CollectorFactory = Arc::new(|_labels: &Labels, _settings: &CollectorSettings| {
            anyhow::bail!("invalid settings")
        });
        factories.insert("postgres/b".to_string(), failing);

        let err = CollectorSet::new("pg", vec![], factories, &HashMap::new())
            .err()
            .expect("construction should fail");
        match err {
            AgentError::Construction { key, .. } => assert_eq!(key, "postgres/b"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_factory_receives_settings_for_its_key() {
        let seen = Arc::new(std::sync::Mutex::new(None));
        let seen_clone = seen.clone();
        let factory: CollectorFactory = Arc::new(move |labels: &Labels, settings: &CollectorSettings| {
            *seen_clone.lock().unwrap() = Some((labels.clone(), settings.clone()));
            Ok(Arc::new(Counting { calls: Arc::new(AtomicUsize::new(0)) }) as Arc<dyn Collector>)
        });
        let mut factories = BTreeMap::new();
        factories.insert("system/filesystem".to_string(), factory);

        let mut settings = HashMap::new();
        settings.insert(
            "system/filesystem".to_string(),
            CollectorSettings { stat_timeout_ms: Some(500), tail_poll_interval_ms: None },
        );
        let labels = vec![("service_id".to_string(), "system".to_string())];

        let set = CollectorSet::new("system", labels.clone(), factories, &settings).unwrap();
        assert_eq!(set.len(), 1);

        let (seen_labels, seen_settings) = seen.lock().unwrap().clone().unwrap();
        assert_eq!(seen_labels, labels);
        assert_eq!(seen_settings.stat_timeout_ms, Some(500));
    }

    #[tokio::test]
    async fn test_refresh_failure_aborts_scrape() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut factories = BTreeMap::new();
        factories.insert("postgres/a".to_string(), counting_factory(calls.clone()));

        let set = CollectorSet::new("pg", vec![], factories, &HashMap::new())
            .unwrap()
            .with_refresher(Arc::new(FailingRefresher));

        let (tx, mut rx) = mpsc::channel(16);
        let err = set.collect(&config(), tx).await.unwrap_err();
        assert!(matches!(err, AgentError::Refresh { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_collect_invokes_every_collector_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut factories = BTreeMap::new();
        for name in ["a", "b", "c"] {
            factories.insert(format!("postgres/{}", name), counting_factory(calls.clone()));
        }
        let set = CollectorSet::new("pg", vec![], factories, &HashMap::new()).unwrap();

        let (tx, mut rx) = mpsc::channel(64);
        set.collect(&config(), tx).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let mut total = 0;
        while rx.recv().await.is_some() {
            total += 1;
        }
        // One own metric plus two health metrics per collector.
        assert_eq!(total, 9);
    }

    #[tokio::test]
    async fn test_collect_with_dropped_output_completes() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut factories = BTreeMap::new();
        factories.insert("postgres/a".to_string(), counting_factory(calls.clone()));
        factories.insert("postgres/b".to_string(), counting_factory(calls.clone()));
        let set = CollectorSet::new("pg", vec![], factories, &HashMap::new()).unwrap();

        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        set.collect(&config(), tx).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
