pub mod agent;
pub mod collector;
pub mod collector_set;
pub mod config;
pub mod error;
pub mod exposition;
pub mod filter;
pub mod instrument;
pub mod logtail;
pub mod model;
pub mod pipeline;
pub mod postgres;
pub mod producers;
pub mod registry;
pub mod signals;

pub use agent::Agent;
pub use collector::{Collector, CollectorSettings, MetricSink, ScrapeConfig, ServiceKind};
pub use collector_set::CollectorSet;
pub use error::AgentError;
pub use registry::CollectorRegistry;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize tracing/logging
///
/// `RUST_LOG` takes precedence over `default_level`. Logs go to stderr so
/// stdout stays free for exposition output.
///
/// Note: This function can only be called once.
pub fn init_tracing(default_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_target(true).with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
