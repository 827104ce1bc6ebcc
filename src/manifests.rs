//! Release catalogue consumed by the installer.

use std::{
    fmt::Debug,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ManifestError;

#[cfg(feature = "mc-vanilla")]
pub mod vanilla;

#[cfg(feature = "mc-vanilla")]
pub use vanilla::MojangReleases;

/// Known versions: `latest` is the newest release id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionList {
    pub latest: String,
    pub release: Vec<String>,
    pub snapshot: Vec<String>,
}

impl VersionList {
    pub fn contains(&self, id: &str) -> bool {
        self.release.iter().chain(&self.snapshot).any(|v| v == id)
    }
}

/// Where server jars come from.
#[async_trait]
pub trait ReleaseSource: Debug + Send + Sync {
    async fn fetch_versions(&self) -> Result<VersionList, ManifestError>;

    /// Downloads the server jar for `id` into `dest_dir` as
    /// [`versioned_jar_name`] and returns its path.
    async fn download_release(&self, id: &str, dest_dir: &Path) -> Result<PathBuf, ManifestError>;
}

pub fn versioned_jar_name(id: &str) -> String {
    format!("minecraft_server.{id}.jar")
}

/// Inverse of [`versioned_jar_name`].
pub fn version_from_jar_name(file_name: &str) -> Option<&str> {
    file_name
        .strip_prefix("minecraft_server.")?
        .strip_suffix(".jar")
        .filter(|id| !id.is_empty())
}
