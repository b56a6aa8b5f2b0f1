//! Built-in collectors.

pub mod filesystem;
pub mod loadavg;
pub mod postgres_logs;

pub use filesystem::FilesystemCollector;
pub use loadavg::LoadAverageCollector;
pub use postgres_logs::{LogfileLocator, PgLogfileLocator, PostgresLogsCollector};

use crate::registry::CollectorRegistry;

/// Register every built-in collector
pub fn register_builtin(registry: &mut CollectorRegistry) {
    registry.register("system", "loadaverage", LoadAverageCollector::new);
    registry.register("system", "filesystem", FilesystemCollector::new);
    registry.register("postgres", "logs", PostgresLogsCollector::new);
}
