//! Package registry access and version resolution.
//!
//! [`Resolver`] turns a specifier (`latest`, `^3.0`, `3.0.10`) into the concrete
//! version published in the registry. The registry itself sits behind the
//! [`Registry`] trait so the install flow can be exercised without a network.

use crate::error::ResolutionError;
use crate::range::NpmRange;
use crate::types::{Manifest, Packument};
use async_trait::async_trait;
use reqwest::StatusCode;

const ABBREVIATED_PACKUMENT: &str = "application/vnd.npm.install-v1+json";

#[async_trait]
pub trait Registry: Send + Sync {
    /// Fetch the manifest for `package_spec` (`name@specifier`).
    async fn manifest(&self, package_spec: &str) -> Result<Manifest, ResolutionError>;
}

pub struct Resolver<'a> {
    package: &'a str,
    registry: &'a dyn Registry,
}

impl<'a> Resolver<'a> {
    pub fn new(package: &'a str, registry: &'a dyn Registry) -> Self {
        Self { package, registry }
    }

    pub fn package(&self) -> &str {
        self.package
    }

    pub async fn resolve(&self, specifier: &str) -> Result<String, ResolutionError> {
        let package_spec = format!("{}@{}", self.package, specifier);
        tracing::debug!("Resolving {}", package_spec);

        let manifest = self.registry.manifest(&package_spec).await?;
        tracing::info!("Resolved {} to {}", package_spec, manifest.version);
        Ok(manifest.version)
    }
}

/// Returns the normalized version when `specifier` names one exact version.
pub fn exact_version(specifier: &str) -> Option<String> {
    let trimmed = specifier.trim().trim_start_matches('=').trim_start_matches('v');
    semver::Version::parse(trimmed).ok().map(|v| v.to_string())
}

/// Split `name@spec`, keeping the leading `@` of scoped names.
pub fn split_package_spec(package_spec: &str) -> (&str, &str) {
    match package_spec.rfind('@') {
        Some(0) | None => (package_spec, ""),
        Some(pos) => (&package_spec[..pos], &package_spec[pos + 1..]),
    }
}

/// Pick the version of `packument` that `specifier` refers to.
pub fn pick_version(packument: &Packument, specifier: &str) -> Option<String> {
    let specifier = specifier.trim();
    let specifier = if specifier.is_empty() { "latest" } else { specifier };

    if let Some(tagged) = packument.dist_tags.get(specifier) {
        return Some(tagged.clone());
    }

    if let Some(exact) = exact_version(specifier) {
        return packument.versions.contains_key(&exact).then_some(exact);
    }

    let range = NpmRange::parse(specifier)?;

    if let Some(latest) = packument.dist_tags.get("latest") {
        if let Ok(latest_version) = semver::Version::parse(latest) {
            if range.matches(&latest_version) {
                return Some(latest.clone());
            }
        }
    }

    packument
        .versions
        .keys()
        .filter_map(|v| semver::Version::parse(v).ok())
        .filter(|v| v.pre.is_empty() && range.matches(v))
        .max()
        .map(|v| v.to_string())
}

/// npm-compatible registry over HTTP.
pub struct NpmRegistry {
    client: reqwest::Client,
    base_url: String,
}

impl NpmRegistry {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn packument_url(&self, name: &str) -> String {
        // Scoped names keep their `@` but encode the separator slash.
        format!("{}/{}", self.base_url, name.replace('/', "%2f"))
    }

    async fn fetch_packument(&self, name: &str) -> Result<Packument, ResolutionError> {
        let url = self.packument_url(name);
        tracing::debug!("Fetching packument from: {}", url);

        let response = self
            .client
            .get(&url)
            .header("Accept", ABBREVIATED_PACKUMENT)
            .header("User-Agent", concat!("toolstash/", env!("CARGO_PKG_VERSION")))
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(response.json().await?),
            StatusCode::NOT_FOUND => Err(ResolutionError::PackageNotFound(name.to_string())),
            status => Err(ResolutionError::RequestFailed {
                package: name.to_string(),
                status,
            }),
        }
    }
}

#[async_trait]
impl Registry for NpmRegistry {
    async fn manifest(&self, package_spec: &str) -> Result<Manifest, ResolutionError> {
        let (name, specifier) = split_package_spec(package_spec);
        let packument = self.fetch_packument(name).await?;

        let version =
            pick_version(&packument, specifier).ok_or_else(|| ResolutionError::NoMatchingVersion {
                package: name.to_string(),
                specifier: specifier.to_string(),
            })?;

        Ok(Manifest {
            name: name.to_string(),
            version,
        })
    }
}
