use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

/// Relative location of the executables inside an installed tool directory.
pub const BIN_SUFFIX: &str = "node_modules/.bin";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Packager {
    #[default]
    Npm,
    Yarn,
    Pnpm,
}

impl Packager {
    /// Executable name looked up on PATH.
    pub fn executable(&self) -> &'static str {
        match self {
            Packager::Npm => "npm",
            Packager::Yarn => "yarn",
            Packager::Pnpm => "pnpm",
        }
    }

    /// Arguments installing `package_spec` into the current directory.
    pub fn add_args(&self, package_spec: &str) -> Vec<String> {
        match self {
            Packager::Npm | Packager::Yarn | Packager::Pnpm => {
                vec!["add".to_string(), package_spec.to_string()]
            }
        }
    }
}

impl fmt::Display for Packager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.executable())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOptions {
    /// Exact version, semver range or dist-tag.
    pub version: String,
    pub packager: Packager,
    /// Enables the remote cache for lookups and uploads.
    pub cache: bool,
    pub cache_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Manifest {
    pub name: String,
    pub version: String,
}

/// Abbreviated registry document listing every published version of a package.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Packument {
    pub name: String,
    #[serde(rename = "dist-tags", default)]
    pub dist_tags: HashMap<String, String>,
    #[serde(default)]
    pub versions: HashMap<String, serde_json::Value>,
}

/// Written beside a local cache entry once its content is complete.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheMarker {
    pub tool: String,
    pub version: String,
    pub arch: String,
    pub cached_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlatformInfo {
    pub os: String,
    pub arch: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolstashSettings {
    #[serde(default = "default_package")]
    pub package: String,
    #[serde(default = "default_registry")]
    pub registry: String,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    #[serde(default)]
    pub remote_cache: Option<String>,
    #[serde(default, skip_serializing)]
    pub remote_token: Option<String>,
    /// PATH-style list searched for the packager instead of the process PATH.
    #[serde(default)]
    pub packager_path: Option<String>,
}

fn default_package() -> String {
    "expo-cli".to_string()
}
fn default_registry() -> String {
    "https://registry.npmjs.org".to_string()
}
fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("toolstash")
}

impl Default for ToolstashSettings {
    fn default() -> Self {
        Self {
            package: default_package(),
            registry: default_registry(),
            cache_dir: default_cache_dir(),
            remote_cache: None,
            remote_token: None,
            packager_path: None,
        }
    }
}
