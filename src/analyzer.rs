//! Scan orchestration: discovery chain, deduplication, feed checks.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::checker::{default_feeds, VulnerabilityFeed};
use crate::config::{Config, IgnoreConfig};
use crate::model::{Package, VulnerabilityReport, ANY_VERSION};
use crate::walker::{default_walkers, WalkError, Walker};

/// Every discovery strategy failed.
///
/// This is the only place multiple errors merge into one; the per-strategy
/// context stays available in `failures` and is logged as the chain runs.
#[derive(Debug, thiserror::Error)]
#[error("could not find any dependencies and all strategies to find them failed")]
pub struct DiscoveryError {
    pub failures: Vec<(String, WalkError)>,
}

/// Runs the discovery strategies in order and picks the result to trust.
///
/// A strategy returning more than one package found real dependency evidence
/// and wins immediately. A strategy returning exactly one package only saw
/// the project's own manifest; that is kept as a low-confidence fallback
/// while the remaining strategies get their chance. Strategies that error are
/// recorded and skipped.
///
/// # Errors
///
/// Fails with [`DiscoveryError`] only when every strategy errored. Strategies
/// succeeding with empty results are a legitimate empty project.
pub fn discover(dir: &Path, walkers: &[Box<dyn Walker>]) -> Result<Vec<Package>, DiscoveryError> {
    let mut failures = Vec::new();
    let mut fallback: Option<Vec<Package>> = None;

    for walker in walkers {
        match walker.walk(dir) {
            Ok(packages) => {
                if packages.len() > 1 {
                    info!(
                        strategy = walker.name(),
                        packages = packages.len(),
                        "dependency evidence found"
                    );
                    return Ok(packages);
                }
                if packages.len() == 1 {
                    // Only the project itself; can happen before any install
                    // has run. Keep looking for stronger evidence.
                    debug!(strategy = walker.name(), "found the project manifest only");
                    fallback = Some(packages);
                }
            }
            Err(err) => {
                let context = walker.error_context(&err);
                warn!("{context}: {err}");
                failures.push((context, err));
            }
        }
    }

    if let Some(packages) = fallback {
        return Ok(packages);
    }
    if failures.len() == walkers.len() {
        return Err(DiscoveryError { failures });
    }
    Ok(Vec::new())
}

/// Collapses a package list to one entry per `name@version`.
///
/// Entries with an empty name are dropped; an empty version becomes the
/// wildcard marker. Output order is unspecified.
pub fn dedupe(packages: Vec<Package>) -> Vec<Package> {
    let mut unique: HashMap<String, Package> = HashMap::new();
    for mut package in packages {
        if package.name.is_empty() {
            debug!("ignoring package with empty name");
            continue;
        }
        if package.version.is_empty() {
            package.version = ANY_VERSION.to_string();
        }
        unique.insert(package.key(), package);
    }
    unique.into_values().collect()
}

/// Discovers the packages of the project at `dir` without touching any feed.
pub fn discover_packages(dir: &Path, config: &Config) -> Result<Vec<Package>> {
    let walkers = default_walkers(config.parse_options());
    let discovered = discover(dir, &walkers)?;
    let mut packages = dedupe(discovered);
    packages.retain(|p| {
        let ignored = config.ignore.should_ignore_package(&p.name);
        if ignored {
            debug!(package = %p.name, "ignored by configuration");
        }
        !ignored
    });
    Ok(packages)
}

/// Scans the project at `dir` with the default strategy chain and feeds.
pub async fn analyze(dir: &Path, config: &Config) -> Result<VulnerabilityReport> {
    let walkers = default_walkers(config.parse_options());
    let mut feeds = default_feeds(config);
    analyze_with(dir, &walkers, &mut feeds, &config.ignore).await
}

/// Scans with explicit strategies and feeds.
///
/// Feed-level failures (syncing a feed, a dead endpoint) abort the scan;
/// per-package matcher failures inside a feed do not.
pub async fn analyze_with(
    dir: &Path,
    walkers: &[Box<dyn Walker>],
    feeds: &mut [Box<dyn VulnerabilityFeed>],
    ignore: &IgnoreConfig,
) -> Result<VulnerabilityReport> {
    info!(path = %dir.display(), "scanning project");

    let discovered = discover(dir, walkers)?;
    let mut packages = dedupe(discovered);
    packages.retain(|p| !ignore.should_ignore_package(&p.name));
    info!(packages = packages.len(), "packages to check");

    let mut report = VulnerabilityReport::new();
    for feed in feeds.iter_mut() {
        feed.fetch()
            .await
            .with_context(|| format!("syncing the {} feed", feed.name()))?;
        let mut findings = feed
            .test_all(&packages)
            .await
            .with_context(|| format!("checking packages against {}", feed.name()))?;
        findings.retain(|v| {
            let ignored = ignore.should_ignore_vulnerability(&v.cve);
            if ignored {
                debug!(cve = %v.cve, "finding ignored by configuration");
            }
            !ignored
        });
        if findings.is_empty() {
            info!(feed = feed.name(), "no vulnerability found");
        } else {
            warn!(
                feed = feed.name(),
                findings = findings.len(),
                "vulnerabilities found"
            );
        }
        report.insert(feed.name(), findings);
    }
    Ok(report)
}
