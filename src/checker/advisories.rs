use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::{impact::is_impacted, VulnerabilityFeed};
use crate::model::{Package, Vulnerability};

/// Matches packages against a local directory of advisory JSON files.
///
/// Each advisory describes one vulnerable module with its vulnerable and
/// patched version ranges, in the community security-wg schema:
///
/// ```json
/// {
///   "module_name": "bassmaster",
///   "cves": ["CVE-2014-7205"],
///   "vulnerable_versions": "<=1.5.1",
///   "patched_versions": ">=1.5.2",
///   "title": "Arbitrary JavaScript Execution",
///   "overview": "...",
///   "references": ["https://..."]
/// }
/// ```
///
/// Downloading and unpacking an advisory archive is left to the surrounding
/// program; this feed consumes the extracted directory.
pub struct AdvisoryDbFeed {
    dir: PathBuf,
    advisories: Vec<Advisory>,
}

#[derive(Debug, Deserialize)]
struct Advisory {
    #[serde(default)]
    module_name: String,
    #[serde(default)]
    cves: Vec<String>,
    #[serde(default)]
    vulnerable_versions: String,
    #[serde(default)]
    patched_versions: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    overview: String,
    #[serde(default)]
    references: Vec<String>,
}

impl AdvisoryDbFeed {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            advisories: Vec::new(),
        }
    }

    fn load_advisory(path: &Path) -> Result<Advisory> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading advisory {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("parsing advisory {}", path.display()))
    }
}

#[async_trait]
impl VulnerabilityFeed for AdvisoryDbFeed {
    fn name(&self) -> &'static str {
        "Advisory DB"
    }

    async fn fetch(&mut self) -> Result<()> {
        self.advisories.clear();
        for entry in WalkDir::new(&self.dir) {
            let entry = entry.with_context(|| {
                format!("walking the advisory database in {}", self.dir.display())
            })?;
            if !entry.file_type().is_file()
                || entry.path().extension().is_none_or(|ext| ext != "json")
            {
                continue;
            }
            debug!(path = %entry.path().display(), "loading advisory");
            self.advisories.push(Self::load_advisory(entry.path())?);
        }
        info!(advisories = self.advisories.len(), "advisory database loaded");
        Ok(())
    }

    async fn test_all(&self, packages: &[Package]) -> Result<Vec<Vulnerability>> {
        info!(packages = packages.len(), "advisory vulnerability check");
        let mut vulnerabilities = Vec::new();
        for package in packages {
            for advisory in self
                .advisories
                .iter()
                .filter(|a| a.module_name == package.name)
            {
                let candidate = Vulnerability {
                    package: package.name.clone(),
                    package_version: package.version.clone(),
                    cve: advisory.cves.join(" "),
                    cwe: String::new(),
                    title: advisory.title.clone(),
                    description: advisory.overview.clone(),
                    vulnerable_range: advisory.vulnerable_versions.clone(),
                    fixed_range: advisory.patched_versions.clone(),
                    references: advisory.references.join("\n\n"),
                };
                match is_impacted(&package.name, &package.version, &candidate) {
                    Ok(true) => {
                        info!(
                            package = %package.name,
                            version = %package.version,
                            vulnerable = %candidate.vulnerable_range,
                            fixed = %candidate.fixed_range,
                            "advisory matches"
                        );
                        vulnerabilities.push(candidate);
                    }
                    Ok(false) => {}
                    Err(err) => {
                        warn!("{err}");
                        if err.verdict {
                            vulnerabilities.push(candidate);
                        }
                    }
                }
            }
        }
        Ok(vulnerabilities)
    }
}
