use std::path::{Path, PathBuf};

use crate::profile::Variant;

/// File locations inside a prepared server directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerLayout {
    dir: PathBuf,
}

impl ServerLayout {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn jar_path(&self, variant: Variant) -> PathBuf {
        self.dir.join(variant.jar_file_name())
    }

    pub fn eula_path(&self) -> PathBuf {
        self.dir.join("eula.txt")
    }

    pub fn properties_path(&self) -> PathBuf {
        self.dir.join("server.properties")
    }
}
