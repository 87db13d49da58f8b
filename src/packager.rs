//! Fresh installs through an external package manager.

use crate::error::{InstallError, Result};
use crate::types::Packager;
use async_trait::async_trait;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::process::Command;

const STDERR_TAIL_LINES: usize = 20;

/// A temporary directory holding a fresh install.
///
/// Dropping it removes whatever is left; promote it into the local cache first.
#[derive(Debug)]
pub struct StagedInstall {
    dir: TempDir,
}

impl StagedInstall {
    pub fn new(dir: TempDir) -> Self {
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

#[async_trait]
pub trait PackagerInstall: Send + Sync {
    async fn from_packager(&self, version: &str, packager: Packager) -> Result<StagedInstall>;
}

pub struct PackagerInstaller {
    package: String,
    temp_root: PathBuf,
    search_path: Option<OsString>,
}

impl PackagerInstaller {
    pub fn new(package: &str, temp_root: impl Into<PathBuf>) -> Self {
        Self {
            package: package.to_string(),
            temp_root: temp_root.into(),
            search_path: None,
        }
    }

    /// Look packagers up in `paths` instead of the process `PATH`.
    pub fn with_search_path(mut self, paths: impl Into<OsString>) -> Self {
        self.search_path = Some(paths.into());
        self
    }

    fn locate(&self, packager: Packager) -> Result<PathBuf> {
        let found = match &self.search_path {
            Some(paths) => which::which_in(packager.executable(), Some(paths), &self.temp_root),
            None => which::which(packager.executable()),
        };
        found.map_err(|source| InstallError::ToolNotFound { packager, source })
    }

    fn create_staging_dir(&self) -> Result<TempDir> {
        let filesystem_error = |source| InstallError::Filesystem {
            path: self.temp_root.clone(),
            source,
        };

        fs::create_dir_all(&self.temp_root).map_err(filesystem_error)?;
        tempfile::Builder::new()
            .prefix(&format!("{}-", self.package.replace(['/', '@'], "_")))
            .tempdir_in(&self.temp_root)
            .map_err(filesystem_error)
    }
}

#[async_trait]
impl PackagerInstall for PackagerInstaller {
    async fn from_packager(&self, version: &str, packager: Packager) -> Result<StagedInstall> {
        let executable = self.locate(packager)?;
        tracing::debug!("Using {} at {}", packager, executable.display());

        let staging = self.create_staging_dir()?;
        let package_spec = format!("{}@{}", self.package, version);
        let args = packager.add_args(&package_spec);

        tracing::info!(
            "Installing {} with {} into {}",
            package_spec,
            packager,
            staging.path().display()
        );

        let output = Command::new(&executable)
            .args(&args)
            .current_dir(staging.path())
            .output()
            .await
            .map_err(|e| InstallError::InstallCommand {
                packager,
                package: package_spec.clone(),
                code: None,
                stderr: e.to_string(),
            })?;

        for line in String::from_utf8_lossy(&output.stdout).lines() {
            tracing::debug!("{}: {}", packager, line);
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let lines: Vec<&str> = stderr.lines().collect();
            let tail = lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n");
            return Err(InstallError::InstallCommand {
                packager,
                package: package_spec,
                code: output.status.code(),
                stderr: tail,
            });
        }

        Ok(StagedInstall::new(staging))
    }
}
