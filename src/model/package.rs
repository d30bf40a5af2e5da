use serde::{Deserialize, Serialize};

/// Version marker for packages discovered without a concrete version.
pub const ANY_VERSION: &str = "*";

/// A package discovered in a project, identified by npm-style name and the
/// version actually present.
///
/// `name` may carry a scope prefix (`@scope/name`). `version` is a free-form
/// string until it goes through range normalization; an empty version means
/// "any version" and is replaced with [`ANY_VERSION`] during deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
}

impl Package {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    /// Deduplication key, `name@version`.
    pub fn key(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }
}

impl std::fmt::Display for Package {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_includes_scope() {
        let pkg = Package::new("@babel/core", "7.0.0");
        assert_eq!(pkg.key(), "@babel/core@7.0.0");
    }

    #[test]
    fn test_deserialize_tolerates_missing_fields() {
        let pkg: Package = serde_json::from_str("{}").unwrap();
        assert_eq!(pkg.name, "");
        assert_eq!(pkg.version, "");
    }
}
