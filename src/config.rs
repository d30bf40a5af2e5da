//! Configuration file handling.
//!
//! This module provides loading and saving of nodescan configuration from a
//! TOML file.
//!
//! # Configuration Location
//!
//! The configuration file is stored at:
//! - Linux: `~/.config/nodescan/config.toml`
//! - macOS: `~/Library/Application Support/nodescan/config.toml`
//! - Windows: `%APPDATA%\nodescan\config.toml`
//!
//! # Example Configuration
//!
//! ```toml
//! ossindex_url = "https://ossindex.sonatype.org/api/v3/component-report"
//! advisory_db_dir = "/var/lib/nodescan/advisories"
//! skip_vuln_check = false
//! default_format = "table"
//! max_parse_expressions = 0
//! lenient_utf8 = false
//!
//! [ignore]
//! packages = ["@types/*"]
//! vulnerabilities = ["CVE-2021-12345"]
//! ```

use std::fs;
use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::checker::OSSINDEX_DEFAULT_URL;
use crate::parse::ParseOptions;

/// Application configuration.
///
/// This struct represents all configurable options for nodescan. It can be
/// loaded from a TOML file or created with default values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Component-report endpoint of the OSS Index feed.
    pub ossindex_url: String,

    /// Directory holding an extracted advisory database. The advisory feed
    /// is skipped when unset.
    pub advisory_db_dir: Option<PathBuf>,

    /// Whether to skip vulnerability checking by default (discovery only).
    ///
    /// Default: false
    pub skip_vuln_check: bool,

    /// Default output format when no `--format` flag is provided.
    ///
    /// Valid values: "table", "json"
    /// Default: "table"
    pub default_format: String,

    /// Cap on grammar work per parse; `0` means unlimited. Exceeding the cap
    /// is reported as a budget error, distinct from a syntax error.
    pub max_parse_expressions: u64,

    /// Accept lockfiles with invalid UTF-8 by replacing the broken sequences.
    ///
    /// Default: false
    pub lenient_utf8: bool,

    /// Ignore list configuration for suppressing known issues.
    #[serde(default)]
    pub ignore: IgnoreConfig,
}

/// Configuration for ignoring specific packages or vulnerabilities.
///
/// Use this to suppress known false positives or accepted risks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IgnoreConfig {
    /// Package names to exclude from scanning.
    ///
    /// Packages matching these names will not appear in results.
    /// Supports glob patterns (e.g., "lodash*", "@types/*").
    pub packages: Vec<String>,

    /// Vulnerability IDs to ignore (e.g., "CVE-2021-12345").
    ///
    /// These vulnerabilities will not be reported even when found.
    pub vulnerabilities: Vec<String>,
}

impl IgnoreConfig {
    /// Check if a package should be ignored.
    pub fn should_ignore_package(&self, package_name: &str) -> bool {
        self.packages.iter().any(|pattern| {
            if pattern.contains('*') {
                glob_match(pattern, package_name)
            } else {
                pattern == package_name
            }
        })
    }

    /// Check if a vulnerability should be ignored.
    pub fn should_ignore_vulnerability(&self, vuln_id: &str) -> bool {
        !vuln_id.is_empty() && self.vulnerabilities.iter().any(|id| id == vuln_id)
    }
}

/// Simple glob matching (supports * as wildcard).
fn glob_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();

    if parts.len() == 1 {
        return pattern == text;
    }

    let mut remaining = text;

    // Check prefix (before first *)
    if !parts[0].is_empty() {
        if !remaining.starts_with(parts[0]) {
            return false;
        }
        remaining = &remaining[parts[0].len()..];
    }

    // Check suffix (after last *)
    let last_part = parts[parts.len() - 1];
    if !last_part.is_empty() {
        if !remaining.ends_with(last_part) {
            return false;
        }
        remaining = &remaining[..remaining.len() - last_part.len()];
    }

    // Check middle parts
    for part in &parts[1..parts.len() - 1] {
        if part.is_empty() {
            continue;
        }
        if let Some(pos) = remaining.find(part) {
            remaining = &remaining[pos + part.len()..];
        } else {
            return false;
        }
    }

    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ossindex_url: OSSINDEX_DEFAULT_URL.to_string(),
            advisory_db_dir: None,
            skip_vuln_check: false,
            default_format: "table".to_string(),
            max_parse_expressions: 0,
            lenient_utf8: false,
            ignore: IgnoreConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from the config file.
    ///
    /// If the config file doesn't exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be read or
    /// parsed.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Saves the configuration to the config file.
    ///
    /// Creates the parent directory if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path();

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(&path, content)?;
        Ok(())
    }

    /// Returns the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("nodescan")
            .join("config.toml")
    }

    /// Generates a string containing the default configuration.
    pub fn generate_default_config() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }

    /// Parser options derived from this configuration, handed to every
    /// grammar invocation of a scan.
    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            lenient_utf8: self.lenient_utf8,
            max_expressions: self.max_parse_expressions,
            ..Default::default()
        }
    }
}
