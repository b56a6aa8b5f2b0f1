//! Prometheus text rendering of one scrape.
//!
//! Every call installs a fresh local recorder, so a series that disappears
//! between scrapes (an unmounted filesystem, a removed service) is not
//! reported with its last value.

use metrics::{counter, describe_counter, describe_gauge, gauge, Label};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::collections::HashSet;

use crate::model::{Metric, ValueKind};

/// Render `metrics` in the Prometheus text format.
///
/// Counter values are exported as whole numbers.
pub fn render(metrics: &[Metric]) -> String {
    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();

    metrics::with_local_recorder(&recorder, || {
        let mut described = HashSet::new();

        for metric in metrics {
            let name = metric.name().to_string();
            let labels: Vec<Label> = metric
                .labels()
                .into_iter()
                .map(|(k, v)| Label::new(k, v))
                .collect();

            match metric.kind() {
                ValueKind::Gauge => {
                    if described.insert(name.clone()) {
                        describe_gauge!(name.clone(), metric.desc().help().to_string());
                    }
                    gauge!(name, labels).set(metric.value());
                }
                ValueKind::Counter => {
                    if described.insert(name.clone()) {
                        describe_counter!(name.clone(), metric.desc().help().to_string());
                    }
                    counter!(name, labels).absolute(metric.value().max(0.0) as u64);
                }
            }
        }
    });

    handle.render()
}
