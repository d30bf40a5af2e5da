use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A known vulnerability as reported against one discovered package.
///
/// `vulnerable_range` and `fixed_range` are loose range strings as found in
/// the feed; they are normalized by the matcher before evaluation. An empty
/// `fixed_range` means no fix is known.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vulnerability {
    pub package: String,
    pub package_version: String,
    pub cve: String,
    pub cwe: String,
    pub title: String,
    pub description: String,
    pub vulnerable_range: String,
    pub fixed_range: String,
    pub references: String,
}

/// Findings of a full scan, grouped by the feed that reported them.
///
/// Built once per scan and consumed read-only for reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VulnerabilityReport {
    pub generated_at: DateTime<Utc>,
    pub findings: BTreeMap<String, Vec<Vulnerability>>,
}

impl VulnerabilityReport {
    pub fn new() -> Self {
        Self {
            generated_at: Utc::now(),
            findings: BTreeMap::new(),
        }
    }

    /// Records the findings of one feed under its name.
    pub fn insert(&mut self, feed: impl Into<String>, vulnerabilities: Vec<Vulnerability>) {
        self.findings.insert(feed.into(), vulnerabilities);
    }

    /// Total number of findings across all feeds.
    pub fn total(&self) -> usize {
        self.findings.values().map(Vec::len).sum()
    }

    pub fn is_clean(&self) -> bool {
        self.total() == 0
    }
}

impl Default for VulnerabilityReport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_total_spans_feeds() {
        let mut report = VulnerabilityReport::new();
        report.insert("a", vec![Vulnerability::default()]);
        report.insert("b", vec![Vulnerability::default(), Vulnerability::default()]);

        assert_eq!(report.total(), 3);
        assert!(!report.is_clean());
    }

    #[test]
    fn test_empty_report_is_clean() {
        let mut report = VulnerabilityReport::new();
        report.insert("a", Vec::new());

        assert_eq!(report.total(), 0);
        assert!(report.is_clean());
    }
}
