//! Include/exclude matchers used by collectors to bound label cardinality.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::AgentError;

/// Uncompiled include/exclude pattern pair, as it appears in configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct FilterSpec {
    #[serde(default)]
    pub include: Option<String>,
    #[serde(default)]
    pub exclude: Option<String>,
}

/// Compiled include/exclude matcher
///
/// An unconfigured filter passes every candidate.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    include: Option<Regex>,
    exclude: Option<Regex>,
}

impl Filter {
    pub fn compile(spec: &FilterSpec) -> Result<Self, AgentError> {
        Ok(Self {
            include: compile_pattern(spec.include.as_deref())?,
            exclude: compile_pattern(spec.exclude.as_deref())?,
        })
    }

    /// Check a candidate: it must match the include pattern (if any) and must
    /// not match the exclude pattern (if any).
    pub fn pass(&self, candidate: &str) -> bool {
        if let Some(include) = &self.include {
            if !include.is_match(candidate) {
                return false;
            }
        }

        if let Some(exclude) = &self.exclude {
            if exclude.is_match(candidate) {
                return false;
            }
        }

        true
    }
}

fn compile_pattern(pattern: Option<&str>) -> Result<Option<Regex>, AgentError> {
    match pattern {
        None | Some("") => Ok(None),
        Some(p) => Regex::new(p)
            .map(Some)
            .map_err(|source| AgentError::InvalidPattern {
                pattern: p.to_string(),
                source,
            }),
    }
}

/// Named set of compiled filters, e.g. `filesystem/fstype`
#[derive(Debug, Clone, Default)]
pub struct Filters {
    filters: HashMap<String, Filter>,
}

impl Filters {
    /// Compile built-in defaults overlaid with user-provided specs.
    pub fn with_defaults(specs: &HashMap<String, FilterSpec>) -> Result<Self, AgentError> {
        let mut all = default_specs();
        for (name, spec) in specs {
            all.insert(name.clone(), spec.clone());
        }

        let mut filters = HashMap::with_capacity(all.len());
        for (name, spec) in all {
            filters.insert(name, Filter::compile(&spec)?);
        }

        Ok(Self { filters })
    }

    /// Check a candidate against the named filter; unknown names pass everything.
    pub fn pass(&self, name: &str, candidate: &str) -> bool {
        self.filters.get(name).map_or(true, |f| f.pass(candidate))
    }
}

fn default_specs() -> HashMap<String, FilterSpec> {
    let mut specs = HashMap::new();
    specs.insert(
        "filesystem/fstype".to_string(),
        FilterSpec {
            include: Some(r"^(ext3|ext4|xfs|btrfs)$".to_string()),
            exclude: None,
        },
    );
    specs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(include: Option<&str>, exclude: Option<&str>) -> FilterSpec {
        FilterSpec {
            include: include.map(String::from),
            exclude: exclude.map(String::from),
        }
    }

    #[test]
    fn test_unconfigured_filter_passes_everything() {
        let filter = Filter::compile(&FilterSpec::default()).unwrap();
        assert!(filter.pass(""));
        assert!(filter.pass("sda"));
    }

    #[test]
    fn test_include_only() {
        let filter = Filter::compile(&spec(Some("^sd[a-z]$"), None)).unwrap();
        assert!(filter.pass("sda"));
        assert!(!filter.pass("loop0"));
    }

    #[test]
    fn test_exclude_only() {
        let filter = Filter::compile(&spec(None, Some("^loop"))).unwrap();
        assert!(filter.pass("sda"));
        assert!(!filter.pass("loop0"));
    }

    #[test]
    fn test_include_and_exclude_combined() {
        let filter = Filter::compile(&spec(Some("^(sd|nvme)"), Some("p[0-9]+$"))).unwrap();
        assert!(filter.pass("sda"));
        assert!(filter.pass("nvme0n1"));
        assert!(!filter.pass("nvme0n1p1"));
        assert!(!filter.pass("dm-0"));
    }

    #[test]
    fn test_empty_pattern_is_unset() {
        let filter = Filter::compile(&spec(Some(""), Some(""))).unwrap();
        assert!(filter.pass("anything"));
    }

    #[test]
    fn test_invalid_pattern() {
        let err = Filter::compile(&spec(Some("(unclosed"), None)).unwrap_err();
        match err {
            AgentError::InvalidPattern { pattern, .. } => assert_eq!(pattern, "(unclosed"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_filters_defaults_and_overrides() {
        let filters = Filters::with_defaults(&HashMap::new()).unwrap();
        assert!(filters.pass("filesystem/fstype", "ext4"));
        assert!(!filters.pass("filesystem/fstype", "tmpfs"));
        assert!(filters.pass("unknown", "tmpfs"));

        let mut specs = HashMap::new();
        specs.insert("filesystem/fstype".to_string(), spec(None, Some("^tmpfs$")));
        let filters = Filters::with_defaults(&specs).unwrap();
        assert!(filters.pass("filesystem/fstype", "overlay"));
        assert!(!filters.pass("filesystem/fstype", "tmpfs"));
    }
}
