use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::collector::{Collector, CollectorSettings, MetricSink, ScrapeConfig};
use crate::logtail::{LineParser, LogTailState, LogTailer, Severity};
use crate::model::{Descriptor, Labels, ValueKind};
use crate::postgres;

/// Finds the file the server is currently logging to
#[async_trait]
pub trait LogfileLocator: Send + Sync + 'static {
    async fn current_logfile(&self, config: &ScrapeConfig) -> anyhow::Result<Option<PathBuf>>;
}

/// Asks the server through `pg_current_logfile()`
pub struct PgLogfileLocator;

#[async_trait]
impl LogfileLocator for PgLogfileLocator {
    async fn current_logfile(&self, config: &ScrapeConfig) -> anyhow::Result<Option<PathBuf>> {
        postgres::current_logfile(config).await
    }
}

/// Message counts parsed from the server log.
///
/// The collector owns a long-lived [`LogTailer`]; each scrape only looks up
/// the current log file, forwards a change to the tailer and reports the
/// accumulated counts. The tailer stops when the collector is dropped.
pub struct PostgresLogsCollector {
    tailer: LogTailer,
    state: Arc<LogTailState>,
    locator: Arc<dyn LogfileLocator>,
    last_notified: Mutex<Option<PathBuf>>,
    messages: Arc<Descriptor>,
    errors: Arc<Descriptor>,
}

impl PostgresLogsCollector {
    pub fn new(const_labels: &Labels, settings: &CollectorSettings) -> anyhow::Result<Arc<dyn Collector>> {
        let collector = Self::with_locator(
            const_labels,
            Arc::new(PgLogfileLocator),
            settings.tail_poll_interval(),
        )?;
        Ok(Arc::new(collector))
    }

    /// Build with a custom locator. Fails outside a tokio runtime, since the
    /// tailer is spawned here.
    pub fn with_locator(
        const_labels: &Labels,
        locator: Arc<dyn LogfileLocator>,
        poll_interval: Duration,
    ) -> anyhow::Result<Self> {
        if tokio::runtime::Handle::try_current().is_err() {
            anyhow::bail!("log tailer needs a running tokio runtime");
        }

        let state = LogTailState::new();
        let parser = Arc::new(LineParser::new()?);
        // The control loop exits once this collector's handle is dropped.
        let (tailer, _handle) = LogTailer::spawn(
            Arc::clone(&state),
            parser,
            poll_interval,
            CancellationToken::new(),
        );

        Ok(Self {
            tailer,
            state,
            locator,
            last_notified: Mutex::new(None),
            messages: Descriptor::new(
                "postgres_log_messages_total",
                "Number of log messages by severity.",
                ValueKind::Counter,
                &["type"],
                const_labels.clone(),
            ),
            errors: Descriptor::new(
                "postgres_log_errors_total",
                "Number of log messages by severity and normalized text.",
                ValueKind::Counter,
                &["type", "message"],
                const_labels.clone(),
            ),
        })
    }

    pub fn state(&self) -> &Arc<LogTailState> {
        &self.state
    }
}

#[async_trait]
impl Collector for PostgresLogsCollector {
    async fn update(&self, config: &ScrapeConfig, out: &MetricSink) -> anyhow::Result<()> {
        let Some(logfile) = self.locator.current_logfile(config).await? else {
            tracing::debug!(service = %config.service_id, "current log file unavailable, skipping");
            return Ok(());
        };

        {
            let mut last = self.last_notified.lock().await;
            if last.as_ref() != Some(&logfile) {
                tracing::debug!(service = %config.service_id, path = %logfile.display(), "notifying log tailer");
                self.tailer.notify(logfile.clone()).await?;
                *last = Some(logfile);
            }
        }

        for (severity, total) in self.state.totals().await {
            out.emit(&self.messages, total as f64, &[severity.as_str()]).await?;
        }

        for severity in Severity::ALL.into_iter().filter(|s| s.tracks_messages()) {
            for (message, count) in self.state.messages(severity).await {
                out.emit(&self.errors, count as f64, &[severity.as_str(), message.as_str()])
                    .await?;
            }
        }

        Ok(())
    }
}
