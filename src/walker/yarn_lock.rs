use std::fs;
use std::path::Path;

use super::{ensure_project_dir, WalkError, Walker};
use crate::model::Package;
use crate::parse::{decode, yarnlock, ParseOptions};

/// Reads a project's `yarn.lock` and hands it to the lockfile grammar.
pub struct YarnLockWalker {
    options: ParseOptions,
}

impl YarnLockWalker {
    pub fn new(options: ParseOptions) -> Self {
        Self { options }
    }
}

impl Default for YarnLockWalker {
    fn default() -> Self {
        Self::new(ParseOptions::default())
    }
}

impl Walker for YarnLockWalker {
    fn name(&self) -> &'static str {
        "yarn.lock"
    }

    fn walk(&self, dir: &Path) -> Result<Vec<Package>, WalkError> {
        ensure_project_dir(dir)?;

        let bytes = fs::read(dir.join("yarn.lock"))?;
        let text = decode(&bytes, self.options.lenient_utf8)
            .map_err(|err| err.with_source_name(yarnlock::SOURCE_NAME))?;
        Ok(yarnlock::parse_yarn_lock(&text, self.options)?)
    }

    fn error_context(&self, _err: &WalkError) -> String {
        "while parsing the dependencies locked in yarn.lock".to_string()
    }
}
