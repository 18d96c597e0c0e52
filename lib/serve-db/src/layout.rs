//! Fixed file names inside a store directory

use std::path::{Path, PathBuf};

pub const LOADED_FILE: &str = "serves.loaded";
pub const STAGING_FILE: &str = "serves.new";
pub const REJECTED_FILE: &str = "serves.rej";
pub const ERROR_FILE: &str = "last_error";

/// Prefix of in-flight temporary files created by the persistence engine
pub const TEMP_PREFIX: &str = "tmp_";

/// Paths of the files making up a store directory
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreLayout {
    root: PathBuf,
}

impl StoreLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Last accepted serve file
    pub fn loaded_path(&self) -> PathBuf {
        self.root.join(LOADED_FILE)
    }

    /// Candidate serve file dropped by an external submitter
    pub fn staging_path(&self) -> PathBuf {
        self.root.join(STAGING_FILE)
    }

    /// Most recently rejected candidate
    pub fn rejected_path(&self) -> PathBuf {
        self.root.join(REJECTED_FILE)
    }

    /// Diagnostic for the current rejected candidate
    pub fn error_path(&self) -> PathBuf {
        self.root.join(ERROR_FILE)
    }
}
