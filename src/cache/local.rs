use super::LocalCache;
use crate::error::{InstallError, Result};
use crate::platform::get_system_info;
use crate::types::CacheMarker;
use chrono::Utc;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// On-disk tool cache laid out as `<root>/<tool>/<version>/<arch>`.
///
/// An entry counts as present only once `<root>/<tool>/<version>/<arch>.complete`
/// exists. The marker is written after the content so an interrupted copy is
/// never reported as a hit.
#[derive(Debug, Clone)]
pub struct ToolCache {
    root: PathBuf,
    tool: String,
    arch: String,
}

impl ToolCache {
    pub fn new(root: impl Into<PathBuf>, tool: &str) -> Self {
        Self::with_arch(root, tool, &get_system_info().arch)
    }

    pub fn with_arch(root: impl Into<PathBuf>, tool: &str, arch: &str) -> Self {
        Self {
            root: root.into(),
            tool: tool.replace('/', "__"),
            arch: arch.to_string(),
        }
    }

    pub fn entry_dir(&self, version: &str) -> PathBuf {
        self.root.join(&self.tool).join(version).join(&self.arch)
    }

    fn marker_path(&self, version: &str) -> PathBuf {
        self.root
            .join(&self.tool)
            .join(version)
            .join(format!("{}.complete", self.arch))
    }

    fn is_complete(&self, version: &str) -> bool {
        self.entry_dir(version).is_dir() && self.marker_path(version).is_file()
    }

    /// Cached versions of the tool, lowest first.
    pub fn list(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(self.root.join(&self.tool)) else {
            return Vec::new();
        };

        let mut versions: Vec<semver::Version> = entries
            .flatten()
            .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
            .filter(|name| self.is_complete(name))
            .filter_map(|name| semver::Version::parse(&name).ok())
            .collect();
        versions.sort();
        versions.into_iter().map(|v| v.to_string()).collect()
    }

    fn write_marker(&self, version: &str) -> io::Result<()> {
        let marker = CacheMarker {
            tool: self.tool.clone(),
            version: version.to_string(),
            arch: self.arch.clone(),
            cached_at: Utc::now().to_rfc3339(),
        };
        let content = serde_json::to_string_pretty(&marker)?;
        fs::write(self.marker_path(version), content)
    }
}

fn local_cache_error(path: &Path) -> impl FnOnce(io::Error) -> InstallError + '_ {
    move |source| InstallError::LocalCache {
        path: path.to_path_buf(),
        source,
    }
}

impl LocalCache for ToolCache {
    fn from_local_cache(&self, version: &str) -> Option<PathBuf> {
        if semver::Version::parse(version).is_err() {
            tracing::debug!("Not probing local cache with non-exact version '{}'", version);
            return None;
        }

        if self.is_complete(version) {
            let path = self.entry_dir(version);
            tracing::debug!("Local cache hit: {}", path.display());
            Some(path)
        } else {
            tracing::debug!(
                "Local cache miss for {} {} (cached: {:?})",
                self.tool,
                version,
                self.list()
            );
            None
        }
    }

    fn to_local_cache(&self, source: &Path, version: &str) -> Result<PathBuf> {
        let dest = self.entry_dir(version);

        if semver::Version::parse(version).is_err() {
            return Err(InstallError::LocalCache {
                path: dest,
                source: io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("'{}' is not an exact version", version),
                ),
            });
        }

        // A retried call after a successful move has nothing left to move.
        if !source.exists() && self.is_complete(version) {
            tracing::debug!("{} already cached at {}", version, dest.display());
            return Ok(dest);
        }

        let marker = self.marker_path(version);
        if marker.exists() {
            fs::remove_file(&marker).map_err(local_cache_error(&marker))?;
        }
        if dest.exists() {
            tracing::debug!("Replacing existing cache entry {}", dest.display());
            fs::remove_dir_all(&dest).map_err(local_cache_error(&dest))?;
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(local_cache_error(parent))?;
        }

        if let Err(e) = fs::rename(source, &dest) {
            tracing::debug!("Rename into cache failed ({}), copying instead", e);
            copy_dir_all(source, &dest).map_err(local_cache_error(&dest))?;
        }

        self.write_marker(version).map_err(local_cache_error(&marker))?;

        tracing::info!("Cached {} {} at {}", self.tool, version, dest.display());
        Ok(dest)
    }
}

/// Recursively copy `source` into `dest`, recreating symlinks rather than
/// following them (`node_modules/.bin` is mostly links).
pub(crate) fn copy_dir_all(source: &Path, dest: &Path) -> io::Result<()> {
    for entry in WalkDir::new(source) {
        let entry = entry.map_err(io::Error::other)?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(io::Error::other)?;
        let target = dest.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_symlink() {
            let link = fs::read_link(entry.path())?;
            #[cfg(unix)]
            std::os::unix::fs::symlink(&link, &target)?;
            #[cfg(not(unix))]
            {
                let resolved = entry.path().parent().unwrap_or(source).join(&link);
                fs::copy(resolved, &target)?;
            }
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
