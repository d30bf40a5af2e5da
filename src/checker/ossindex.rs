use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{impact::is_impacted, VulnerabilityFeed};
use crate::model::{Package, Vulnerability};

/// Maximum number of coordinates per component-report request.
const BATCH_SIZE: usize = 128;

/// Default component-report endpoint.
pub const DEFAULT_URL: &str = "https://ossindex.sonatype.org/api/v3/component-report";

/// Queries the OSS Index component-report API for known vulnerabilities.
///
/// Packages are addressed by coordinate (`npm:<name>@<version>`); requests go
/// out in batches, one POST per [`BATCH_SIZE`] packages, dispatched
/// concurrently. The API reports vulnerabilities for the exact queried
/// version, so each finding's vulnerable range is that version itself and no
/// fixed range is known.
pub struct OssIndexFeed {
    url: String,
    client: reqwest::Client,
}

impl OssIndexFeed {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }
}

impl Default for OssIndexFeed {
    fn default() -> Self {
        Self::new(DEFAULT_URL)
    }
}

/// Builds the coordinate of an npm package, `npm:<name>@<version>`. The `@`
/// of a scope prefix is dropped, as the API expects.
pub fn build_coordinate(name: &str, version: &str) -> String {
    let namespace = name.replace('@', "");
    format!("npm:{namespace}@{version}")
}

/// Pulls a CVE identifier out of a `[CVE-…]`-prefixed title. Returns an empty
/// string when the title carries none.
pub fn parse_cve_from_title(title: &str) -> &str {
    let Some(rest) = title.trim_start().strip_prefix('[') else {
        return "";
    };
    let Some(end) = rest.find(']') else {
        return "";
    };
    let id = rest[..end].trim();
    if id.starts_with("CVE") {
        id
    } else {
        ""
    }
}

#[derive(Serialize)]
struct ComponentReportRequest {
    coordinates: Vec<String>,
}

#[derive(Deserialize)]
struct ComponentReport {
    #[serde(default)]
    vulnerabilities: Vec<ComponentVulnerability>,
}

#[derive(Deserialize)]
struct ComponentVulnerability {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    cwe: String,
    #[serde(default)]
    reference: String,
}

#[async_trait]
impl VulnerabilityFeed for OssIndexFeed {
    fn name(&self) -> &'static str {
        "OSS Index"
    }

    async fn fetch(&mut self) -> Result<()> {
        // Nothing to sync, the feed is API backed.
        Ok(())
    }

    async fn test_all(&self, packages: &[Package]) -> Result<Vec<Vulnerability>> {
        let candidates: Vec<&Package> = packages
            .iter()
            .filter(|p| !p.name.is_empty() && !p.version.is_empty())
            .collect();
        info!(
            packages = candidates.len(),
            "OSS Index vulnerability check"
        );

        let requests = candidates.chunks(BATCH_SIZE).map(|chunk| async move {
            let coordinates = chunk
                .iter()
                .map(|p| build_coordinate(&p.name, &p.version))
                .collect();
            let response = self
                .client
                .post(&self.url)
                .json(&ComponentReportRequest { coordinates })
                .send()
                .await
                .context("component report request failed")?;

            let status = response.status();
            if status.as_u16() == 429 {
                bail!("OSS Index is rate limiting requests (HTTP 429), retry later");
            }
            if !status.is_success() {
                bail!("OSS Index answered HTTP {status}");
            }
            let reports: Vec<ComponentReport> = response
                .json()
                .await
                .context("malformed component report response")?;
            anyhow::Ok((chunk, reports))
        });

        let mut vulnerabilities = Vec::new();
        for batch in join_all(requests).await {
            let (chunk, reports) = batch?;
            // Reports come back in request order.
            for (package, report) in chunk.iter().zip(reports) {
                for found in report.vulnerabilities {
                    let candidate = Vulnerability {
                        package: package.name.clone(),
                        package_version: package.version.clone(),
                        cve: parse_cve_from_title(&found.title).to_string(),
                        cwe: found.cwe,
                        title: found.title,
                        description: found.description,
                        vulnerable_range: package.version.clone(),
                        fixed_range: String::new(),
                        references: found.reference,
                    };
                    match is_impacted(&package.name, &package.version, &candidate) {
                        Ok(true) => vulnerabilities.push(candidate),
                        Ok(false) => {
                            debug!(package = %package.name, "reported vulnerability does not apply")
                        }
                        Err(err) => {
                            warn!("{err}");
                            if err.verdict {
                                vulnerabilities.push(candidate);
                            }
                        }
                    }
                }
            }
        }
        Ok(vulnerabilities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_coordinate() {
        assert_eq!(build_coordinate("lodash", "4.17.0"), "npm:lodash@4.17.0");
    }

    #[test]
    fn test_build_coordinate_drops_scope_marker() {
        assert_eq!(
            build_coordinate("@babel/code-frame", "7.0.0-beta.47"),
            "npm:babel/code-frame@7.0.0-beta.47"
        );
    }

    #[test]
    fn test_parse_cve_from_title() {
        assert_eq!(
            parse_cve_from_title("[CVE-2018-3728]  Improper Access Control"),
            "CVE-2018-3728"
        );
        assert_eq!(
            parse_cve_from_title("  [CVE-2014-7205]  Improper Control of Generation of Code"),
            "CVE-2014-7205"
        );
    }

    #[test]
    fn test_parse_cve_from_title_without_cve() {
        assert_eq!(parse_cve_from_title("Improper Access Control"), "");
        assert_eq!(parse_cve_from_title("[GHSA-abcd]  Something"), "");
        assert_eq!(parse_cve_from_title("[CVE-2018-3728 unterminated"), "");
    }

    #[test]
    fn test_feed_name() {
        assert_eq!(OssIndexFeed::default().name(), "OSS Index");
    }
}
