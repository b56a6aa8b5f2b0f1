use std::sync::Arc;
use tokio::sync::mpsc;

use crate::collector::{ConfigRefresher, ScrapeConfig, ServiceKind};
use crate::collector_set::CollectorSet;
use crate::config::{AgentConfig, ServiceConfig};
use crate::error::AgentError;
use crate::filter::Filters;
use crate::model::Metric;
use crate::postgres::{self, PostgresRefresher};
use crate::registry::CollectorRegistry;

// Room for one burst per service before the collecting side has to wait.
const SCRAPE_BUFFER: usize = 256;

struct Service {
    set: CollectorSet,
    config: ScrapeConfig,
}

/// Every configured service, scraped together.
pub struct Agent {
    services: Vec<Service>,
}

impl Agent {
    /// Build a collector set per service.
    ///
    /// Must run inside a tokio runtime: collectors with background work
    /// spawn it here. Postgres pools connect lazily, so an unreachable
    /// server does not fail start-up.
    pub fn build(cfg: &AgentConfig, registry: &CollectorRegistry) -> Result<Self, AgentError> {
        Self::build_with_refreshers(cfg, registry, default_refresher)
    }

    /// Like [`build`](Self::build), with the per-scrape refresher of each
    /// service chosen by `refresher_for`.
    pub fn build_with_refreshers<F>(
        cfg: &AgentConfig,
        registry: &CollectorRegistry,
        refresher_for: F,
    ) -> Result<Self, AgentError>
    where
        F: Fn(&ServiceConfig) -> Option<Arc<dyn ConfigRefresher>>,
    {
        let filters = Arc::new(Filters::with_defaults(&cfg.filters)?);
        let mut services = Vec::with_capacity(cfg.services.len());

        for svc in &cfg.services {
            let mut config = ScrapeConfig::new(&svc.id, svc.kind, Arc::clone(&filters));
            let factories = registry.enabled_for(svc.kind, &cfg.disable_collectors);
            let mut set = CollectorSet::new(&svc.id, config.const_labels(), factories, &cfg.collectors)?;

            if svc.kind == ServiceKind::Postgres {
                let dsn = svc
                    .dsn
                    .as_deref()
                    .ok_or_else(|| AgentError::Config(format!("service {} has no dsn", svc.id)))?;
                config = config.with_pool(postgres::connect_lazy(&svc.id, dsn)?);
            }
            if let Some(refresher) = refresher_for(svc) {
                set = set.with_refresher(refresher);
            }

            if set.is_empty() {
                tracing::warn!(service = %svc.id, kind = %svc.kind, "service has no enabled collectors");
            }
            services.push(Service { set, config });
        }

        Ok(Self { services })
    }

    pub fn service_ids(&self) -> Vec<&str> {
        self.services.iter().map(|s| s.set.service_id()).collect()
    }

    /// Scrape every service concurrently and gather all samples.
    ///
    /// A service whose refresh fails contributes nothing this round; the
    /// failure is logged and the other services are unaffected.
    pub async fn scrape(&self) -> Vec<Metric> {
        let (tx, mut rx) = mpsc::channel(SCRAPE_BUFFER);

        let collect_all = async move {
            let scrapes = self.services.iter().map(|service| {
                let tx = tx.clone();
                async move {
                    if let Err(e) = service.set.collect(&service.config, tx).await {
                        tracing::warn!(
                            service = %service.set.service_id(),
                            kind = e.kind(),
                            error = %e,
                            "service scrape failed"
                        );
                    }
                }
            });
            futures::future::join_all(scrapes).await;
        };

        let gather = async {
            let mut metrics = Vec::new();
            while let Some(metric) = rx.recv().await {
                metrics.push(metric);
            }
            metrics
        };

        let ((), metrics) = tokio::join!(collect_all, gather);
        tracing::debug!(samples = metrics.len(), services = self.services.len(), "scrape finished");
        metrics
    }
}

/// Postgres services re-read their server facts before every scrape
pub fn default_refresher(service: &ServiceConfig) -> Option<Arc<dyn ConfigRefresher>> {
    match service.kind {
        ServiceKind::Postgres => Some(Arc::new(PostgresRefresher)),
        ServiceKind::System => None,
    }
}
