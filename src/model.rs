//! Metric samples and the static descriptors they are built from.

use std::sync::Arc;

use crate::error::AgentError;

/// Ordered `(name, value)` label pairs
pub type Labels = Vec<(String, String)>;

/// How a metric family's value behaves over time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Counter,
    Gauge,
}

/// Static per-family metadata, created once at collector construction.
#[derive(Debug)]
pub struct Descriptor {
    name: String,
    help: String,
    kind: ValueKind,
    variable_labels: Vec<String>,
    const_labels: Labels,
}

impl Descriptor {
    pub fn new(
        name: impl Into<String>,
        help: impl Into<String>,
        kind: ValueKind,
        variable_labels: &[&str],
        const_labels: Labels,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            help: help.into(),
            kind,
            variable_labels: variable_labels.iter().map(|l| l.to_string()).collect(),
            const_labels,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn help(&self) -> &str {
        &self.help
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn variable_labels(&self) -> &[String] {
        &self.variable_labels
    }

    pub fn const_labels(&self) -> &Labels {
        &self.const_labels
    }

    /// Build a sample of this family.
    ///
    /// Fails with [`AgentError::LabelCardinality`] if the number of label
    /// values differs from the number of declared variable labels.
    pub fn metric(self: &Arc<Self>, value: f64, label_values: &[&str]) -> Result<Metric, AgentError> {
        if label_values.len() != self.variable_labels.len() {
            return Err(AgentError::LabelCardinality {
                metric: self.name.clone(),
                expected: self.variable_labels.len(),
                got: label_values.len(),
            });
        }

        Ok(Metric {
            desc: Arc::clone(self),
            label_values: label_values.iter().map(|v| v.to_string()).collect(),
            value,
        })
    }
}

/// One observed value of a metric family
#[derive(Debug, Clone)]
pub struct Metric {
    desc: Arc<Descriptor>,
    label_values: Vec<String>,
    value: f64,
}

impl Metric {
    pub fn desc(&self) -> &Descriptor {
        &self.desc
    }

    pub fn name(&self) -> &str {
        self.desc.name()
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn kind(&self) -> ValueKind {
        self.desc.kind()
    }

    /// Value of a variable or constant label
    pub fn label(&self, name: &str) -> Option<&str> {
        self.desc
            .variable_labels
            .iter()
            .position(|l| l == name)
            .map(|idx| self.label_values[idx].as_str())
            .or_else(|| {
                self.desc
                    .const_labels
                    .iter()
                    .find(|(k, _)| k == name)
                    .map(|(_, v)| v.as_str())
            })
    }

    /// Full label set: constant labels first, then variable labels in declaration order
    pub fn labels(&self) -> Labels {
        let mut labels = self.desc.const_labels.clone();
        labels.extend(
            self.desc
                .variable_labels
                .iter()
                .cloned()
                .zip(self.label_values.iter().cloned()),
        );
        labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service_labels() -> Labels {
        vec![("service_id".to_string(), "postgres:5432".to_string())]
    }

    #[test]
    fn test_metric_carries_all_labels() {
        let desc = Descriptor::new(
            "node_filesystem_bytes",
            "Filesystem size in bytes",
            ValueKind::Gauge,
            &["mountpoint", "usage"],
            service_labels(),
        );

        let metric = desc.metric(1024.0, &["/", "total"]).unwrap();
        assert_eq!(metric.name(), "node_filesystem_bytes");
        assert_eq!(metric.value(), 1024.0);
        assert_eq!(metric.kind(), ValueKind::Gauge);
        assert_eq!(metric.label("usage"), Some("total"));
        assert_eq!(metric.label("service_id"), Some("postgres:5432"));
        assert_eq!(metric.label("missing"), None);
        assert_eq!(
            metric.labels(),
            vec![
                ("service_id".to_string(), "postgres:5432".to_string()),
                ("mountpoint".to_string(), "/".to_string()),
                ("usage".to_string(), "total".to_string()),
            ]
        );
    }

    #[test]
    fn test_label_cardinality_mismatch_is_rejected() {
        let desc = Descriptor::new("node_load1", "1m load average", ValueKind::Gauge, &[], vec![]);

        let err = desc.metric(0.5, &["extra"]).unwrap_err();
        assert!(matches!(
            err,
            AgentError::LabelCardinality { expected: 0, got: 1, .. }
        ));
    }

    #[test]
    fn test_samples_share_descriptor() {
        let desc = Descriptor::new("x_total", "x", ValueKind::Counter, &["type"], vec![]);
        let a = desc.metric(1.0, &["a"]).unwrap();
        let b = desc.metric(2.0, &["b"]).unwrap();
        assert!(std::ptr::eq(a.desc(), b.desc()));
    }
}
