//! Vulnerability feeds and the impact matcher.
//!
//! A [`VulnerabilityFeed`] knows a source of vulnerability data and tests a
//! package list against it; every feed funnels its candidates through
//! [`is_impacted`], which owns the version-range matching and its fail-unsafe
//! policy.

mod advisories;
mod impact;
mod ossindex;

pub use advisories::AdvisoryDbFeed;
pub use impact::{is_impacted, range_contains, ImpactError, RangeEvalError};
pub use ossindex::{
    build_coordinate, parse_cve_from_title, OssIndexFeed, DEFAULT_URL as OSSINDEX_DEFAULT_URL,
};

use anyhow::Result;
use async_trait::async_trait;

use crate::config::Config;
use crate::model::{Package, Vulnerability};

#[async_trait]
pub trait VulnerabilityFeed: Send + Sync {
    fn name(&self) -> &'static str;

    /// Populates or syncs the feed's in-memory vulnerability list. A no-op
    /// for purely API-backed feeds.
    async fn fetch(&mut self) -> Result<()>;

    /// Tests every package against the feed and returns the findings.
    ///
    /// Matcher failures inside the feed do not abort the test: the package is
    /// kept or dropped according to the conservative verdict carried by the
    /// error, and the error is logged.
    async fn test_all(&self, packages: &[Package]) -> Result<Vec<Vulnerability>>;
}

/// Returns the feeds a scan consults, per configuration.
pub fn default_feeds(config: &Config) -> Vec<Box<dyn VulnerabilityFeed>> {
    let mut feeds: Vec<Box<dyn VulnerabilityFeed>> =
        vec![Box::new(OssIndexFeed::new(&config.ossindex_url))];
    if let Some(dir) = &config.advisory_db_dir {
        feeds.push(Box::new(AdvisoryDbFeed::new(dir)));
    }
    feeds
}
