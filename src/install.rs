//! Install orchestration.
//!
//! One call to [`Orchestrator::install`] walks
//! `Resolving -> CheckLocal -> CheckRemote -> Installing -> Caching -> Done`,
//! leaving early on the first cache hit. Remote cache failures are logged and
//! treated as misses; every other failure aborts the call.

use crate::cache::{LocalCache, RemoteCache};
use crate::error::Result;
use crate::packager::PackagerInstall;
use crate::registry::{exact_version, Resolver};
use crate::types::{InstallOptions, BIN_SUFFIX};
use std::path::{Path, PathBuf};

pub struct Orchestrator<'a> {
    resolver: Resolver<'a>,
    local: &'a dyn LocalCache,
    remote: Option<&'a dyn RemoteCache>,
    packager: &'a dyn PackagerInstall,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        resolver: Resolver<'a>,
        local: &'a dyn LocalCache,
        remote: Option<&'a dyn RemoteCache>,
        packager: &'a dyn PackagerInstall,
    ) -> Self {
        Self {
            resolver,
            local,
            remote,
            packager,
        }
    }

    pub async fn resolve(&self, specifier: &str) -> Result<String> {
        Ok(self.resolver.resolve(specifier).await?)
    }

    /// Install the requested version and return its `node_modules/.bin` path.
    pub async fn install(&self, options: &InstallOptions) -> Result<PathBuf> {
        let version = match exact_version(&options.version) {
            Some(exact) => {
                tracing::debug!("'{}' is exact, skipping resolution", options.version);
                exact
            }
            None => self.resolve(&options.version).await?,
        };

        if let Some(cached) = self.local.from_local_cache(&version) {
            tracing::info!("Using {} {} from local cache", self.resolver.package(), version);
            return Ok(bin_path(&cached));
        }

        let remote = if options.cache {
            if self.remote.is_none() {
                tracing::warn!("Remote caching requested but no remote cache is configured");
            }
            self.remote
        } else {
            None
        };

        if let Some(remote) = remote {
            match remote
                .from_remote_cache(&version, options.packager, options.cache_key.as_deref())
                .await
            {
                Ok(Some(restored)) => {
                    tracing::info!("Using {} {} from remote cache", self.resolver.package(), version);
                    return Ok(bin_path(&restored));
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("Remote cache lookup failed, installing fresh: {}", e),
            }
        }

        let staged = self.packager.from_packager(&version, options.packager).await?;
        let cached = self.local.to_local_cache(staged.path(), &version)?;

        if let Some(remote) = remote {
            if let Err(e) = remote
                .to_remote_cache(&cached, &version, options.packager, options.cache_key.as_deref())
                .await
            {
                tracing::warn!("Could not save {} to remote cache: {}", version, e);
            }
        }

        Ok(bin_path(&cached))
    }
}

pub fn bin_path(install_dir: &Path) -> PathBuf {
    install_dir.join(BIN_SUFFIX)
}
