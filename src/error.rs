//! Error types for resolving and installing tools.

use std::path::PathBuf;
use thiserror::Error;

use crate::types::Packager;

pub type Result<T> = std::result::Result<T, InstallError>;

#[derive(Error, Debug)]
pub enum InstallError {
    /// Registry lookup failed or no published version matched.
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error("Could not find '{packager}' on PATH: {source}")]
    ToolNotFound {
        packager: Packager,
        #[source]
        source: which::Error,
    },

    #[error("Failed to prepare directory {}: {source}", .path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The package manager exited non-zero.
    #[error("'{packager} add {package}' failed with {}: {stderr}", exit_description(.code))]
    InstallCommand {
        packager: Packager,
        package: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Local cache error at {}: {source}", .path.display())]
    LocalCache {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Never fatal; the orchestrator logs it and carries on.
    #[error(transparent)]
    RemoteCache(#[from] RemoteCacheError),
}

#[derive(Error, Debug)]
pub enum ResolutionError {
    #[error("Package '{0}' not found in registry")]
    PackageNotFound(String),

    #[error("No version of '{package}' matches '{specifier}'")]
    NoMatchingVersion { package: String, specifier: String },

    #[error("Registry request for '{package}' failed: {status}")]
    RequestFailed {
        package: String,
        status: reqwest::StatusCode,
    },

    #[error("Registry request failed: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Error, Debug)]
pub enum RemoteCacheError {
    #[error("Remote cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Remote cache request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Remote cache responded {status} for '{key}'")]
    Status {
        key: String,
        status: reqwest::StatusCode,
    },

    #[error("Could not restore '{key}' into local cache: {message}")]
    Restore { key: String, message: String },
}

fn exit_description(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "no exit code".to_string(),
    }
}
