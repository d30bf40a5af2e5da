use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, trace};

use super::{ensure_project_dir, WalkError, Walker};
use crate::model::Package;
use crate::parse::range;

/// Reads the resolved dependency tree from a project's `package-lock.json`.
///
/// The lock manifest nests dependencies recursively; the tree is unwrapped
/// depth-first into a flat list, root entry included.
pub struct PackageLockWalker;

#[derive(Deserialize)]
struct LockManifest {
    #[serde(default)]
    name: String,
    #[serde(default)]
    version: String,
    #[serde(default)]
    dependencies: BTreeMap<String, LockDependency>,
}

#[derive(Deserialize)]
struct LockDependency {
    #[serde(default)]
    version: String,
    #[serde(default)]
    dependencies: BTreeMap<String, LockDependency>,
}

fn unwrap_dependencies(deps: &BTreeMap<String, LockDependency>, out: &mut Vec<Package>) {
    for (name, dep) in deps {
        if let Ok(normalized) = range::normalize(&dep.version) {
            trace!(%name, version = %normalized, "resolved dependency");
        }
        out.push(Package::new(name.clone(), dep.version.clone()));
        unwrap_dependencies(&dep.dependencies, out);
    }
}

impl Walker for PackageLockWalker {
    fn name(&self) -> &'static str {
        "package-lock.json"
    }

    fn walk(&self, dir: &Path) -> Result<Vec<Package>, WalkError> {
        ensure_project_dir(dir)?;

        let path = dir.join("package-lock.json");
        let content = fs::read_to_string(&path)?;
        let manifest: LockManifest = serde_json::from_str(&content)?;

        let mut packages = vec![Package::new(manifest.name, manifest.version)];
        unwrap_dependencies(&manifest.dependencies, &mut packages);

        if packages.len() == 1 {
            debug!(dir = %dir.display(), "package-lock.json only declares the project itself");
        }
        Ok(packages)
    }

    fn error_context(&self, _err: &WalkError) -> String {
        "while reading the dependency tree from package-lock.json".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOCK: &str = r#"{
        "name": "insecure-project",
        "version": "1.0.0",
        "dependencies": {
            "bassmaster": {
                "version": "1.0.0",
                "dependencies": {
                    "hoek": { "version": "1.5.2" }
                }
            },
            "left-pad": { "version": "1.1.3" }
        }
    }"#;

    #[test]
    fn test_walk_unwraps_nested_dependencies() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("package-lock.json"), LOCK).unwrap();

        let packages = PackageLockWalker.walk(dir.path()).unwrap();
        assert_eq!(packages.len(), 4);
        assert_eq!(packages[0], Package::new("insecure-project", "1.0.0"));
        assert!(packages.contains(&Package::new("bassmaster", "1.0.0")));
        assert!(packages.contains(&Package::new("hoek", "1.5.2")));
        assert!(packages.contains(&Package::new("left-pad", "1.1.3")));
    }

    #[test]
    fn test_walk_root_comes_first() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("package-lock.json"),
            r#"{"name": "solo", "version": "0.1.0"}"#,
        )
        .unwrap();

        let packages = PackageLockWalker.walk(dir.path()).unwrap();
        assert_eq!(packages, vec![Package::new("solo", "0.1.0")]);
    }

    #[test]
    fn test_walk_without_lockfile_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = PackageLockWalker.walk(dir.path()).unwrap_err();
        assert!(matches!(err, WalkError::Io(_)));
    }

    #[test]
    fn test_walk_with_malformed_json_is_a_schema_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("package-lock.json"), "definitely not json").unwrap();

        let err = PackageLockWalker.walk(dir.path()).unwrap_err();
        assert!(matches!(err, WalkError::Json(_)));
    }

    #[test]
    fn test_walk_rejects_non_directories() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = PackageLockWalker.walk(file.path()).unwrap_err();
        assert!(matches!(err, WalkError::NotADirectory(_)));
    }
}
