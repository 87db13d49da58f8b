//! Local and remote caches for installed tool directories.
//!
//! - [`local::ToolCache`] keeps ready-to-run installs on this machine
//! - [`remote::ArchiveCache`] moves tar.gz snapshots of those installs through a
//!   [`remote::RemoteStore`] so fresh CI runners can skip the package manager

pub mod archive;
pub mod local;
pub mod remote;

use crate::error::Result;
use crate::types::Packager;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

pub trait LocalCache: Send + Sync {
    /// Directory of a complete cached install of `version`, if any.
    fn from_local_cache(&self, version: &str) -> Option<PathBuf>;

    /// Move `source` into the cache under `version` and return the cached path.
    fn to_local_cache(&self, source: &Path, version: &str) -> Result<PathBuf>;
}

/// Failures surface as [`crate::error::InstallError::RemoteCache`].
#[async_trait]
pub trait RemoteCache: Send + Sync {
    /// Restore an archived install into the local cache, returning its path.
    async fn from_remote_cache(
        &self,
        version: &str,
        packager: Packager,
        key_suffix: Option<&str>,
    ) -> Result<Option<PathBuf>>;

    async fn to_remote_cache(
        &self,
        source: &Path,
        version: &str,
        packager: Packager,
        key_suffix: Option<&str>,
    ) -> Result<()>;
}
