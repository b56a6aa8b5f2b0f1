//! Fan-out/fan-in execution of one scrape.
//!
//! One producer task per collector writes into a shared funnel; a single
//! consumer task forwards the funnel into the caller's output channel.
//! Producers are always joined before the funnel is closed, and the consumer
//! is joined last, so nothing is dropped and no task outlives the scrape.

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::collector::{Collector, MetricSink, ScrapeConfig};
use crate::instrument::Instrumentation;
use crate::model::Metric;

/// Funnel capacity; 1 is the closest tokio gets to an unbuffered channel
const FUNNEL_CAPACITY: usize = 1;

pub async fn execute(
    collectors: &BTreeMap<String, Arc<dyn Collector>>,
    instrumentation: &Arc<Instrumentation>,
    config: Arc<ScrapeConfig>,
    out: mpsc::Sender<Metric>,
) {
    let (funnel_tx, mut funnel_rx) = mpsc::channel::<Metric>(FUNNEL_CAPACITY);

    let consumer = tokio::spawn(async move {
        let mut forwarded: usize = 0;
        let mut out_open = true;
        while let Some(metric) = funnel_rx.recv().await {
            // Keep draining even when the output is gone so producers never block.
            if out_open {
                if out.send(metric).await.is_err() {
                    tracing::warn!("scrape output closed, discarding remaining metrics");
                    out_open = false;
                } else {
                    forwarded += 1;
                }
            }
        }
        forwarded
    });

    let mut producers = JoinSet::new();
    for (name, collector) in collectors {
        let name = name.clone();
        let collector = Arc::clone(collector);
        let instrumentation = Arc::clone(instrumentation);
        let config = Arc::clone(&config);
        let sink = MetricSink::new(funnel_tx.clone());

        producers.spawn(async move {
            instrumentation
                .execute(&name, collector.as_ref(), &config, &sink)
                .await;
        });
    }

    while let Some(res) = producers.join_next().await {
        if let Err(e) = res {
            tracing::error!(error = %e, "collector task failed to complete");
        }
    }

    // Last sender gone: the consumer sees the funnel close once it is drained.
    drop(funnel_tx);

    match consumer.await {
        Ok(forwarded) => tracing::debug!(
            service = %config.service_id,
            collectors = collectors.len(),
            metrics = forwarded,
            "scrape pipeline finished"
        ),
        Err(e) => tracing::error!(error = %e, "scrape consumer task failed"),
    }
}
