//! Dependency discovery strategies.
//!
//! This module provides the [`Walker`] trait and implementations for finding
//! out which packages a project directory depends on, each from a different
//! kind of evidence.
//!
//! # Available Walkers
//!
//! | Walker | Evidence |
//! |--------|----------|
//! | [`ManifestWalker`] | installed `package.json` manifests on disk |
//! | [`PackageLockWalker`] | the resolved `package-lock.json` dependency tree |
//! | [`YarnLockWalker`] | a `yarn.lock` lockfile |
//!
//! The walkers are run as an ordered chain by
//! [`discover`](crate::analyzer::discover); see there for how results and
//! errors are weighed against each other.

mod manifests;
mod package_lock;
mod yarn_lock;

pub use manifests::ManifestWalker;
pub use package_lock::PackageLockWalker;
pub use yarn_lock::YarnLockWalker;

use std::path::Path;

use crate::model::Package;
use crate::parse::{ParseError, ParseOptions};

/// Why a single discovery strategy failed.
///
/// Grammar errors keep their position information and stay distinguishable
/// from I/O and schema errors, so callers can react differently to an
/// unreadable directory, a malformed lockfile, or a blown parse budget.
#[derive(Debug, thiserror::Error)]
pub enum WalkError {
    #[error("<{}> is not a directory, make sure to point at the project root", .0.display())]
    NotADirectory(std::path::PathBuf),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// A discovery backend that inspects one form of project evidence to produce
/// a package list.
pub trait Walker: Send + Sync {
    /// Short human-readable name of this strategy.
    fn name(&self) -> &'static str;

    /// Inspects `dir` and returns every package found, including the
    /// project's own manifest when present.
    ///
    /// # Errors
    ///
    /// Returns a [`WalkError`] when the evidence this walker relies on is
    /// missing, unreadable, or malformed.
    fn walk(&self, dir: &Path) -> Result<Vec<Package>, WalkError>;

    /// Human-readable prefix identifying what this strategy was doing when
    /// `err` happened, used when discovery errors are aggregated.
    fn error_context(&self, err: &WalkError) -> String;
}

/// Returns the default strategy chain, in priority order.
pub fn default_walkers(parse_options: ParseOptions) -> Vec<Box<dyn Walker>> {
    vec![
        Box::new(ManifestWalker),
        Box::new(PackageLockWalker),
        Box::new(YarnLockWalker::new(parse_options)),
    ]
}

/// All walkers expect `dir` to be an existing directory.
pub(crate) fn ensure_project_dir(dir: &Path) -> Result<(), WalkError> {
    let metadata = std::fs::metadata(dir)?;
    if !metadata.is_dir() {
        return Err(WalkError::NotADirectory(dir.to_path_buf()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_walkers_order() {
        let walkers = default_walkers(ParseOptions::default());
        let names: Vec<&str> = walkers.iter().map(|w| w.name()).collect();
        assert_eq!(
            names,
            vec!["installed manifests", "package-lock.json", "yarn.lock"]
        );
    }

    #[test]
    fn test_ensure_project_dir_rejects_files() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = ensure_project_dir(file.path()).unwrap_err();
        assert!(matches!(err, WalkError::NotADirectory(_)));
    }

    #[test]
    fn test_ensure_project_dir_rejects_missing_paths() {
        let err = ensure_project_dir(Path::new("./does-not-exist")).unwrap_err();
        assert!(matches!(err, WalkError::Io(_)));
    }
}
