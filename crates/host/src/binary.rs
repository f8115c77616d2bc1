//! Provider binary acquisition: cache lookup, download, checksum verification
//! and archive extraction.

use std::io::{BufReader, ErrorKind};
use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use flate2::read::GzDecoder;
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::descriptor::ProviderDescriptor;
use crate::error::BinaryError;

/// Default cache root, `<home>/.anzu/providers`.
pub fn default_cache_root() -> Option<PathBuf> {
    dirs_next::home_dir().map(|home| home.join(".anzu").join("providers"))
}

/// Operating system and architecture names used in cached binary file names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    pub os: String,
    pub arch: String,
}

impl Platform {
    /// Platform of the running host, named the way release archives name it
    /// (`linux`, `darwin`, `windows`; `amd64`, `arm64`, `386`).
    pub fn current() -> Self {
        let os = match std::env::consts::OS {
            "macos" => "darwin",
            other => other,
        };
        let arch = match std::env::consts::ARCH {
            "x86_64" => "amd64",
            "aarch64" => "arm64",
            "x86" => "386",
            other => other,
        };
        Self { os: os.to_string(), arch: arch.to_string() }
    }
}

/// Resolves provider versions to local executables.
#[derive(Debug, Clone)]
pub struct BinaryManager {
    http: reqwest::Client,
    cache_root: PathBuf,
    disable_cache: bool,
    bearer_token: Option<String>,
    platform: Platform,
}

impl BinaryManager {
    /// Create a manager caching binaries under `cache_root`.
    pub fn new(cache_root: impl Into<PathBuf>) -> Result<Self, BinaryError> {
        let http = reqwest::Client::builder().build().map_err(BinaryError::Client)?;
        Ok(Self { http, cache_root: cache_root.into(), disable_cache: false, bearer_token: None, platform: Platform::current() })
    }

    /// Always download, even when a cached binary exists.
    pub fn with_disable_cache(mut self, disable_cache: bool) -> Self {
        self.disable_cache = disable_cache;
        self
    }

    /// Authenticate downloads with a bearer token.
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    /// Cache path of a provider version: `<root>/<versionId>_<os>_<arch>`.
    pub fn binary_path(&self, provider_version_id: &str) -> PathBuf {
        self.cache_root
            .join(format!("{provider_version_id}_{}_{}", self.platform.os, self.platform.arch))
    }

    /// Return the local path of the descriptor's binary, downloading and
    /// verifying it first unless a cached copy may be used.
    pub async fn ensure_binary(&self, descriptor: &ProviderDescriptor, cancel: &CancellationToken) -> Result<PathBuf, BinaryError> {
        let path = self.binary_path(&descriptor.provider_version_id);
        let cached = match fs::metadata(&path).await {
            Ok(_) => true,
            Err(error) if error.kind() == ErrorKind::NotFound => false,
            Err(source) => return Err(BinaryError::Stat { path, source }),
        };

        let binary = descriptor.binary();
        if cached && !self.disable_cache {
            trace!(
                provider = %descriptor.provider_id,
                provider_version = %descriptor.provider_version_id,
                local_binary = %path.display(),
                "using cached provider binary"
            );
            return Ok(path);
        }

        debug!(
            provider = %descriptor.provider_id,
            provider_version = %descriptor.provider_version_id,
            local_binary = %path.display(),
            url = %binary.url,
            os = %self.platform.os,
            arch = %self.platform.arch,
            "downloading provider binary"
        );
        fs::create_dir_all(&self.cache_root)
            .await
            .map_err(|source| BinaryError::CacheDirectory { path: self.cache_root.clone(), source })?;

        let archive = archive_path(&path);
        let staging = staging_path(&path);
        let result = self.download_and_install(descriptor, &archive, &staging, &path, cancel).await;
        if result.is_err() {
            discard_file(&archive).await;
            discard_directory(&staging).await;
        }
        result.map(|()| path)
    }

    async fn download_and_install(
        &self,
        descriptor: &ProviderDescriptor,
        archive: &Path,
        staging: &Path,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), BinaryError> {
        let binary = descriptor.binary();
        let digest = tokio::select! {
            _ = cancel.cancelled() => return Err(BinaryError::Cancelled),
            digest = self.download(&binary.url, archive) => digest?,
        };

        if digest != binary.check_sum {
            return Err(BinaryError::ChecksumMismatch {
                provider_version_id: descriptor.provider_version_id.clone(),
                expected: binary.check_sum.clone(),
                actual: digest,
            });
        }

        extract(archive, staging, path).await?;
        fs::remove_file(archive)
            .await
            .map_err(|source| BinaryError::Cleanup { path: archive.to_path_buf(), source })?;
        Ok(())
    }

    /// Stream `url` into `archive`, returning the base64 SHA-256 of the bytes.
    async fn download(&self, url: &str, archive: &Path) -> Result<String, BinaryError> {
        let mut request = self.http.get(url);
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }
        let mut response = request
            .send()
            .await
            .map_err(|source| BinaryError::Request { url: url.to_string(), source })?;
        if !response.status().is_success() {
            return Err(BinaryError::Status { url: url.to_string(), status: response.status().as_u16() });
        }

        let write_error = |source: std::io::Error| BinaryError::Write { path: archive.to_path_buf(), source };
        let mut file = fs::File::create(archive).await.map_err(write_error)?;
        let mut hasher = Sha256::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|source| BinaryError::Request { url: url.to_string(), source })?
        {
            hasher.update(&chunk);
            file.write_all(&chunk).await.map_err(write_error)?;
        }
        file.flush().await.map_err(write_error)?;

        Ok(STANDARD.encode(hasher.finalize()))
    }
}

fn archive_path(path: &Path) -> PathBuf {
    let mut archive = path.as_os_str().to_os_string();
    archive.push(".tar.gz");
    PathBuf::from(archive)
}

/// Scratch directory next to `path`, `.<name>.staging`.
fn staging_path(path: &Path) -> PathBuf {
    let mut name = std::ffi::OsString::from(".");
    name.push(path.file_name().unwrap_or_default());
    name.push(".staging");
    path.with_file_name(name)
}

/// Unpack `archive` into `staging`, then move the binary named like `path`
/// into place. `path` is only ever replaced by a fully unpacked file.
async fn extract(archive: &Path, staging: &Path, path: &Path) -> Result<(), BinaryError> {
    let extract_error = |reason: String| BinaryError::Extract { archive: archive.to_path_buf(), reason };

    discard_directory(staging).await;
    let unpack = {
        let archive = archive.to_path_buf();
        let staging = staging.to_path_buf();
        tokio::task::spawn_blocking(move || unpack(&archive, &staging))
    };
    unpack
        .await
        .map_err(|error| extract_error(error.to_string()))?
        .map_err(|error| extract_error(error.to_string()))?;

    let unpacked = staging.join(path.file_name().unwrap_or_default());
    fs::metadata(&unpacked)
        .await
        .map_err(|source| BinaryError::MissingBinary { path: path.to_path_buf(), source })?;
    fs::rename(&unpacked, path)
        .await
        .map_err(|source| BinaryError::Install { path: path.to_path_buf(), source })?;
    fs::remove_dir_all(staging)
        .await
        .map_err(|source| BinaryError::Cleanup { path: staging.to_path_buf(), source })?;
    Ok(())
}

fn unpack(archive: &Path, staging: &Path) -> std::io::Result<()> {
    let file = std::fs::File::open(archive)?;
    let mut tarball = tar::Archive::new(GzDecoder::new(BufReader::new(file)));
    tarball.unpack(staging)
}

async fn discard_file(path: &Path) {
    match fs::remove_file(path).await {
        Err(error) if error.kind() != ErrorKind::NotFound => {
            warn!(path = %path.display(), error = %error, "failed to remove partial download");
        }
        _ => {}
    }
}

async fn discard_directory(path: &Path) {
    match fs::remove_dir_all(path).await {
        Err(error) if error.kind() != ErrorKind::NotFound => {
            warn!(path = %path.display(), error = %error, "failed to remove staging directory");
        }
        _ => {}
    }
}
