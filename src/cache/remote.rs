//! Remote cache of installed tool directories.
//!
//! Installs are stored as tar.gz archives under a key derived from the tool,
//! host OS, packager and resolved version. Stores are interchangeable:
//! [`DirectoryStore`] for a shared or mounted directory, [`HttpStore`] for a
//! plain `GET`/`PUT` object endpoint.

use super::archive::{pack_dir, unpack_into};
use super::local::ToolCache;
use super::{LocalCache, RemoteCache};
use crate::error::RemoteCacheError;
use crate::platform::get_system_info;
use crate::types::Packager;
use async_trait::async_trait;
use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use regex::Regex;
use reqwest::StatusCode;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;

type Result<T> = std::result::Result<T, RemoteCacheError>;

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Download the archive stored under `key` to `dest`. `Ok(false)` on a miss.
    async fn fetch(&self, key: &str, dest: &Path) -> Result<bool>;

    async fn upload(&self, key: &str, archive: &Path) -> Result<()>;
}

/// Build the remote cache key, e.g. `expo-cli-linux-npm-3.20.1`.
pub fn cache_key(
    tool: &str,
    os: &str,
    packager: Packager,
    version: &str,
    key_suffix: Option<&str>,
) -> String {
    static UNSAFE: OnceLock<Regex> = OnceLock::new();
    let unsafe_chars =
        UNSAFE.get_or_init(|| Regex::new(r"[^A-Za-z0-9._-]").expect("valid key regex"));

    let mut key = format!("{}-{}-{}-{}", tool, os, packager, version);
    if let Some(suffix) = key_suffix.filter(|s| !s.is_empty()) {
        key.push('-');
        key.push_str(suffix);
    }
    unsafe_chars.replace_all(&key, "_").into_owned()
}

pub struct ArchiveCache<S> {
    store: S,
    local: ToolCache,
    tool: String,
    os: String,
    temp_root: PathBuf,
}

impl<S: RemoteStore> ArchiveCache<S> {
    /// Archives are staged under `temp_root`, which should share a filesystem
    /// with the local cache so restores promote by rename.
    pub fn new(store: S, local: ToolCache, tool: &str, temp_root: impl Into<PathBuf>) -> Self {
        Self {
            store,
            local,
            tool: tool.to_string(),
            os: get_system_info().os,
            temp_root: temp_root.into(),
        }
    }

    async fn scratch_dir(&self) -> Result<TempDir> {
        tokio::fs::create_dir_all(&self.temp_root).await?;
        Ok(tempfile::Builder::new()
            .prefix("toolstash-remote-")
            .tempdir_in(&self.temp_root)?)
    }

    fn key(&self, version: &str, packager: Packager, key_suffix: Option<&str>) -> String {
        cache_key(&self.tool, &self.os, packager, version, key_suffix)
    }

    async fn restore(
        &self,
        version: &str,
        packager: Packager,
        key_suffix: Option<&str>,
    ) -> Result<Option<PathBuf>> {
        let key = self.key(version, packager, key_suffix);
        tracing::debug!("Looking up remote cache key {}", key);

        let scratch = self.scratch_dir().await?;
        let archive = scratch.path().join("install.tar.gz");
        if !self.store.fetch(&key, &archive).await? {
            tracing::info!("Remote cache miss for {}", key);
            return Ok(None);
        }

        let extracted = scratch.path().join("install");
        let (archive_path, extract_dir) = (archive.clone(), extracted.clone());
        tokio::task::spawn_blocking(move || unpack_into(&archive_path, &extract_dir))
            .await
            .map_err(|e| RemoteCacheError::Restore {
                key: key.clone(),
                message: e.to_string(),
            })??;

        let cached = self
            .local
            .to_local_cache(&extracted, version)
            .map_err(|e| RemoteCacheError::Restore {
                key: key.clone(),
                message: e.to_string(),
            })?;

        tracing::info!("Restored {} from remote cache", key);
        Ok(Some(cached))
    }

    async fn save(
        &self,
        source: &Path,
        version: &str,
        packager: Packager,
        key_suffix: Option<&str>,
    ) -> Result<()> {
        let key = self.key(version, packager, key_suffix);

        let scratch = self.scratch_dir().await?;
        let archive = scratch.path().join("install.tar.gz");
        let (source_dir, archive_path) = (source.to_path_buf(), archive.clone());
        tokio::task::spawn_blocking(move || pack_dir(&source_dir, &archive_path))
            .await
            .map_err(std::io::Error::other)??;

        self.store.upload(&key, &archive).await?;
        tracing::info!("Saved {} to remote cache", key);
        Ok(())
    }
}

#[async_trait]
impl<S: RemoteStore> RemoteCache for ArchiveCache<S> {
    async fn from_remote_cache(
        &self,
        version: &str,
        packager: Packager,
        key_suffix: Option<&str>,
    ) -> crate::error::Result<Option<PathBuf>> {
        Ok(self.restore(version, packager, key_suffix).await?)
    }

    async fn to_remote_cache(
        &self,
        source: &Path,
        version: &str,
        packager: Packager,
        key_suffix: Option<&str>,
    ) -> crate::error::Result<()> {
        Ok(self.save(source, version, packager, key_suffix).await?)
    }
}

/// Archives kept as `<root>/<key>.tar.gz`.
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn archive_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.tar.gz", key))
    }
}

#[async_trait]
impl RemoteStore for DirectoryStore {
    async fn fetch(&self, key: &str, dest: &Path) -> Result<bool> {
        let path = self.archive_path(key);
        if !tokio::fs::try_exists(&path).await? {
            return Ok(false);
        }
        tokio::fs::copy(&path, dest).await?;
        Ok(true)
    }

    async fn upload(&self, key: &str, archive: &Path) -> Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        let dest = self.archive_path(key);
        // Readers must never see a half-written archive.
        let partial = self.root.join(format!(".{}.partial", key));
        tokio::fs::copy(archive, &partial).await?;
        tokio::fs::rename(&partial, &dest).await?;
        Ok(())
    }
}

/// Archives served from `<base_url>/<key>.tar.gz`.
pub struct HttpStore {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpStore {
    pub fn new(base_url: &str, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    pub fn archive_url(&self, key: &str) -> String {
        format!("{}/{}.tar.gz", self.base_url, key)
    }

    fn request(&self, method: reqwest::Method, key: &str) -> reqwest::RequestBuilder {
        let mut request = self
            .client
            .request(method, self.archive_url(key))
            .header("User-Agent", concat!("toolstash/", env!("CARGO_PKG_VERSION")));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        request
    }
}

#[async_trait]
impl RemoteStore for HttpStore {
    async fn fetch(&self, key: &str, dest: &Path) -> Result<bool> {
        let response = self.request(reqwest::Method::GET, key).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => return Ok(false),
            status if !status.is_success() => {
                return Err(RemoteCacheError::Status {
                    key: key.to_string(),
                    status,
                })
            }
            _ => {}
        }

        let total_size = response.content_length().unwrap_or(0);
        let pb = if std::io::stderr().is_terminal() {
            ProgressBar::new(total_size)
        } else {
            ProgressBar::hidden()
        };
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb.set_message(format!("Downloading {}", key));

        let mut file = tokio::fs::File::create(dest).await?;
        let mut downloaded = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
            pb.set_position(downloaded);
        }
        file.flush().await?;

        pb.finish_and_clear();
        Ok(true)
    }

    async fn upload(&self, key: &str, archive: &Path) -> Result<()> {
        let body = tokio::fs::read(archive).await?;
        let response = self
            .request(reqwest::Method::PUT, key)
            .header("Content-Type", "application/gzip")
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(RemoteCacheError::Status {
                key: key.to_string(),
                status: response.status(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn install_dir(parent: &Path) -> PathBuf {
        let dir = parent.join("cached");
        fs::create_dir_all(dir.join("node_modules/.bin")).unwrap();
        fs::write(dir.join("node_modules/.bin/expo"), "#!/bin/sh\n").unwrap();
        dir
    }

    #[test]
    fn test_cache_key_layout() {
        assert_eq!(
            cache_key("expo-cli", "linux", Packager::Npm, "3.20.1", None),
            "expo-cli-linux-npm-3.20.1"
        );
        assert_eq!(
            cache_key("expo-cli", "darwin", Packager::Yarn, "3.20.1", Some("node18")),
            "expo-cli-darwin-yarn-3.20.1-node18"
        );
        assert_eq!(
            cache_key("expo-cli", "linux", Packager::Npm, "3.20.1", Some("")),
            "expo-cli-linux-npm-3.20.1"
        );
        assert_eq!(
            cache_key("@expo/cli", "linux", Packager::Pnpm, "1.0.0", Some("a b")),
            "_expo_cli-linux-pnpm-1.0.0-a_b"
        );
    }

    #[test]
    fn test_http_archive_url() {
        let store = HttpStore::new("https://cache.example.com/tools/", None);
        assert_eq!(
            store.archive_url("expo-cli-linux-npm-3.20.1"),
            "https://cache.example.com/tools/expo-cli-linux-npm-3.20.1.tar.gz"
        );
    }

    #[tokio::test]
    async fn test_remote_miss() {
        let remote_root = TempDir::new().unwrap();
        let local_root = TempDir::new().unwrap();
        let cache = ArchiveCache::new(
            DirectoryStore::new(remote_root.path()),
            ToolCache::with_arch(local_root.path(), "expo-cli", "x64"),
            "expo-cli",
            local_root.path().join("tmp"),
        );

        let restored = cache
            .from_remote_cache("3.20.1", Packager::Npm, None)
            .await
            .unwrap();
        assert_eq!(restored, None);
    }

    #[tokio::test]
    async fn test_upload_then_restore_on_fresh_runner() {
        let remote_root = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let source = install_dir(work.path());

        let uploader_root = TempDir::new().unwrap();
        let uploader = ArchiveCache::new(
            DirectoryStore::new(remote_root.path()),
            ToolCache::with_arch(uploader_root.path(), "expo-cli", "x64"),
            "expo-cli",
            work.path().join("tmp"),
        );
        uploader
            .to_remote_cache(&source, "3.20.1", Packager::Npm, Some("ci"))
            .await
            .unwrap();

        let fresh_root = TempDir::new().unwrap();
        let fresh = ArchiveCache::new(
            DirectoryStore::new(remote_root.path()),
            ToolCache::with_arch(fresh_root.path(), "expo-cli", "x64"),
            "expo-cli",
            fresh_root.path().join("tmp"),
        );

        // a different suffix is a different key
        assert_eq!(
            fresh
                .from_remote_cache("3.20.1", Packager::Npm, None)
                .await
                .unwrap(),
            None
        );

        let restored = fresh
            .from_remote_cache("3.20.1", Packager::Npm, Some("ci"))
            .await
            .unwrap()
            .expect("archive should be restored");

        assert_eq!(restored, fresh_root.path().join("expo-cli/3.20.1/x64"));
        assert!(restored.join("node_modules/.bin/expo").is_file());

        let local = ToolCache::with_arch(fresh_root.path(), "expo-cli", "x64");
        assert_eq!(local.from_local_cache("3.20.1"), Some(restored));

        // scratch space lives under the given temp root and is cleaned up
        for tmp in [work.path().join("tmp"), fresh_root.path().join("tmp")] {
            assert!(tmp.is_dir(), "{} was not used", tmp.display());
            assert_eq!(fs::read_dir(&tmp).unwrap().count(), 0);
        }
    }

    #[tokio::test]
    async fn test_unusable_temp_root_is_a_remote_cache_error() {
        let remote_root = TempDir::new().unwrap();
        let local_root = TempDir::new().unwrap();
        let not_a_dir = local_root.path().join("tmp");
        fs::write(&not_a_dir, "x").unwrap();

        let cache = ArchiveCache::new(
            DirectoryStore::new(remote_root.path()),
            ToolCache::with_arch(local_root.path(), "expo-cli", "x64"),
            "expo-cli",
            &not_a_dir,
        );

        let err = cache
            .from_remote_cache("3.20.1", Packager::Npm, None)
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::InstallError::RemoteCache(_)));
    }

    #[tokio::test]
    async fn test_corrupt_archive_is_a_remote_cache_error() {
        let remote_root = TempDir::new().unwrap();
        let local_root = TempDir::new().unwrap();
        let os = get_system_info().os;
        let key = cache_key("expo-cli", &os, Packager::Npm, "3.20.1", None);
        fs::write(remote_root.path().join(format!("{}.tar.gz", key)), b"junk").unwrap();

        let cache = ArchiveCache::new(
            DirectoryStore::new(remote_root.path()),
            ToolCache::with_arch(local_root.path(), "expo-cli", "x64"),
            "expo-cli",
            local_root.path().join("tmp"),
        );

        assert!(cache
            .from_remote_cache("3.20.1", Packager::Npm, None)
            .await
            .is_err());
    }

    mod http {
        use super::*;
        use wiremock::matchers::{body_bytes, header, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        const KEY: &str = "expo-cli-linux-npm-3.20.1";

        #[tokio::test]
        async fn test_fetch_streams_archive_with_token() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path(format!("/tools/{}.tar.gz", KEY)))
                .and(header("authorization", "Bearer s3cret"))
                .respond_with(ResponseTemplate::new(200).set_body_bytes(b"archive bytes".to_vec()))
                .expect(1)
                .mount(&server)
                .await;

            let work = TempDir::new().unwrap();
            let dest = work.path().join("install.tar.gz");
            let store = HttpStore::new(
                &format!("{}/tools/", server.uri()),
                Some("s3cret".to_string()),
            );

            assert!(store.fetch(KEY, &dest).await.unwrap());
            assert_eq!(fs::read(&dest).unwrap(), b"archive bytes");
        }

        #[tokio::test]
        async fn test_fetch_not_found_is_a_miss() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .respond_with(ResponseTemplate::new(404))
                .mount(&server)
                .await;

            let work = TempDir::new().unwrap();
            let dest = work.path().join("install.tar.gz");
            let store = HttpStore::new(&server.uri(), None);

            assert!(!store.fetch(KEY, &dest).await.unwrap());
            assert!(!dest.exists());
        }

        #[tokio::test]
        async fn test_fetch_server_error_is_status() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .respond_with(ResponseTemplate::new(500))
                .mount(&server)
                .await;

            let work = TempDir::new().unwrap();
            let store = HttpStore::new(&server.uri(), None);

            let err = store
                .fetch(KEY, &work.path().join("install.tar.gz"))
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                RemoteCacheError::Status { ref key, status }
                    if key == KEY && status == StatusCode::INTERNAL_SERVER_ERROR
            ));
        }

        #[tokio::test]
        async fn test_upload_puts_archive_body() {
            let server = MockServer::start().await;
            Mock::given(method("PUT"))
                .and(path(format!("/{}.tar.gz", KEY)))
                .and(header("authorization", "Bearer s3cret"))
                .and(header("content-type", "application/gzip"))
                .and(body_bytes(b"archive bytes".to_vec()))
                .respond_with(ResponseTemplate::new(201))
                .expect(1)
                .mount(&server)
                .await;

            let work = TempDir::new().unwrap();
            let archive = work.path().join("install.tar.gz");
            fs::write(&archive, b"archive bytes").unwrap();
            let store = HttpStore::new(&server.uri(), Some("s3cret".to_string()));

            store.upload(KEY, &archive).await.unwrap();
        }

        #[tokio::test]
        async fn test_rejected_upload_is_status() {
            let server = MockServer::start().await;
            Mock::given(method("PUT"))
                .respond_with(ResponseTemplate::new(403))
                .mount(&server)
                .await;

            let work = TempDir::new().unwrap();
            let archive = work.path().join("install.tar.gz");
            fs::write(&archive, b"archive bytes").unwrap();
            let store = HttpStore::new(&server.uri(), None);

            let err = store.upload(KEY, &archive).await.unwrap_err();
            assert!(matches!(
                err,
                RemoteCacheError::Status { status, .. } if status == StatusCode::FORBIDDEN
            ));
        }

        #[tokio::test]
        async fn test_archive_cache_round_trip_over_http() {
            let server = MockServer::start().await;
            let work = TempDir::new().unwrap();
            let source = install_dir(work.path());

            let archive = work.path().join("packed.tar.gz");
            pack_dir(&source, &archive).unwrap();
            let key = cache_key("expo-cli", &get_system_info().os, Packager::Yarn, "3.0.10", None);
            Mock::given(method("GET"))
                .and(path(format!("/{}.tar.gz", key)))
                .respond_with(ResponseTemplate::new(200).set_body_bytes(fs::read(&archive).unwrap()))
                .mount(&server)
                .await;

            let local_root = TempDir::new().unwrap();
            let cache = ArchiveCache::new(
                HttpStore::new(&server.uri(), None),
                ToolCache::with_arch(local_root.path(), "expo-cli", "x64"),
                "expo-cli",
                local_root.path().join("tmp"),
            );

            let restored = cache
                .from_remote_cache("3.0.10", Packager::Yarn, None)
                .await
                .unwrap()
                .expect("archive should be restored");
            assert!(restored.join("node_modules/.bin/expo").is_file());
        }
    }
}
