use std::fs;
use std::path::Path;

use tracing::warn;
use walkdir::WalkDir;

use super::{ensure_project_dir, WalkError, Walker};
use crate::model::Package;

/// Walks the project directory for installed `package.json` manifests.
///
/// Finds the project's own manifest plus everything under `node_modules`,
/// which is the strongest evidence available after an install has run.
/// Unreadable or malformed manifests are logged and skipped; they never fail
/// the whole walk.
pub struct ManifestWalker;

impl Walker for ManifestWalker {
    fn name(&self) -> &'static str {
        "installed manifests"
    }

    fn walk(&self, dir: &Path) -> Result<Vec<Package>, WalkError> {
        ensure_project_dir(dir)?;

        let mut packages = Vec::new();
        for entry in WalkDir::new(dir) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("skipping unreadable directory entry: {err}");
                    continue;
                }
            };
            if !entry.file_type().is_file() || entry.file_name() != "package.json" {
                continue;
            }

            let content = match fs::read_to_string(entry.path()) {
                Ok(content) => content,
                Err(err) => {
                    warn!(path = %entry.path().display(), "skipping unreadable package.json: {err}");
                    continue;
                }
            };
            match serde_json::from_str::<Package>(&content) {
                Ok(package) => packages.push(package),
                Err(err) => {
                    warn!(path = %entry.path().display(), "ignoring invalid package.json: {err}");
                }
            }
        }

        Ok(packages)
    }

    fn error_context(&self, _err: &WalkError) -> String {
        "while walking the project subdirectories for installed manifests".to_string()
    }
}
