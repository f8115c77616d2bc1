//! Error types for host-side provider management.

use std::io;
use std::path::PathBuf;

use anzu_provider::RpcError;
use anzu_value::{EncodingError, ResolveError};
use thiserror::Error;

/// Errors raised while acquiring a provider binary.
#[derive(Debug, Error)]
pub enum BinaryError {
    #[error("failed to stat provider binary {path}: {source}")]
    Stat {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to create provider cache {path}: {source}")]
    CacheDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to build download client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("failed to download {url}: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to download {url}: unexpected status {status}")]
    Status { url: String, status: u16 },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("checksum mismatch for provider {provider_version_id}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        provider_version_id: String,
        expected: String,
        actual: String,
    },

    #[error("failed to untar {archive}: {reason}")]
    Extract { archive: PathBuf, reason: String },

    #[error("failed to install provider binary at {path}: {source}")]
    Install {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not check that provider exists at {path}: {source}")]
    MissingBinary {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to remove {path}: {source}")]
    Cleanup {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("download cancelled")]
    Cancelled,
}

/// Errors raised while starting a provider process.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("failed to get free port: {0}")]
    FreePort(#[source] io::Error),

    #[error("failed to start provider with {shell}: {source}")]
    Spawn {
        shell: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to connect to provider: {0}")]
    Connect(#[from] RpcError),

    #[error("provider on port {port} not ready after {attempts} attempts: {last_error}")]
    NotReady { port: u16, attempts: u32, last_error: String },

    #[error("launch cancelled")]
    Cancelled,
}

/// Errors raised while configuring a launched provider.
#[derive(Debug, Error)]
pub enum ConfigureError {
    #[error("failed to resolve configuration {name:?} of environment provider {environment_provider_id:?}: {source}")]
    Resolve {
        environment_provider_id: String,
        name: String,
        #[source]
        source: ResolveError,
    },

    #[error(transparent)]
    Encoding(#[from] EncodingError),

    #[error("failed to configure environment provider {environment_provider_id:?}: {source}")]
    Rpc {
        environment_provider_id: String,
        #[source]
        source: RpcError,
    },
}

/// Errors returned by registry lookups and shutdown.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("environmentProviderId is empty")]
    EmptyEnvironmentProviderId,

    #[error("providerVersionId is empty")]
    EmptyProviderVersionId,

    #[error("provider client for environment provider id {0:?} not found")]
    EnvironmentProviderNotFound(String),

    #[error("provider client for provider version id {0:?} not found")]
    ProviderVersionNotFound(String),

    #[error("failed to close connection for provider {provider_version_id}: {source}")]
    Close {
        provider_version_id: String,
        #[source]
        source: RpcError,
    },
}

/// The step of provider bring-up that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupStep {
    Download,
    Launch,
    Connect,
    Configure,
}

impl std::fmt::Display for SetupStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SetupStep::Download => "download",
            SetupStep::Launch => "launch",
            SetupStep::Connect => "connect",
            SetupStep::Configure => "configure",
        };
        f.write_str(name)
    }
}

/// Errors aborting a setup call.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("provider version {provider_version_id} is listed more than once")]
    DuplicateProviderVersion { provider_version_id: String },

    #[error("failed to locate provider cache: home directory not found")]
    NoHomeDirectory,

    #[error("failed to create anzu provider cache {path}: {source}")]
    CacheDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to prepare provider downloads: {0}")]
    DownloadClient(#[source] BinaryError),

    #[error("failed to download provider {provider_version_id}: {source}")]
    Download {
        provider_version_id: String,
        #[source]
        source: BinaryError,
    },

    #[error("failed to launch provider {provider_version_id}: {source}")]
    Launch {
        provider_version_id: String,
        #[source]
        source: LaunchError,
    },

    #[error("failed to connect to local provider {provider_version_id}: {source}")]
    Connect {
        provider_version_id: String,
        #[source]
        source: RpcError,
    },

    #[error("failed to configure provider {provider_version_id}: {source}")]
    Configure {
        provider_version_id: String,
        #[source]
        source: ConfigureError,
    },
}

impl SetupError {
    /// Provider version whose bring-up failed, if the failure is provider specific.
    pub fn provider_version_id(&self) -> Option<&str> {
        match self {
            SetupError::NoHomeDirectory | SetupError::CacheDirectory { .. } | SetupError::DownloadClient(_) => None,
            SetupError::DuplicateProviderVersion { provider_version_id }
            | SetupError::Download { provider_version_id, .. }
            | SetupError::Launch { provider_version_id, .. }
            | SetupError::Connect { provider_version_id, .. }
            | SetupError::Configure { provider_version_id, .. } => Some(provider_version_id),
        }
    }

    pub fn step(&self) -> Option<SetupStep> {
        match self {
            SetupError::DuplicateProviderVersion { .. } | SetupError::NoHomeDirectory | SetupError::CacheDirectory { .. } => None,
            SetupError::DownloadClient(_) | SetupError::Download { .. } => Some(SetupStep::Download),
            SetupError::Launch { .. } => Some(SetupStep::Launch),
            SetupError::Connect { .. } => Some(SetupStep::Connect),
            SetupError::Configure { .. } => Some(SetupStep::Configure),
        }
    }
}

/// Errors returned by typed calls through a [`crate::ProviderHandle`].
#[derive(Debug, Error)]
pub enum CallError {
    #[error(transparent)]
    Encoding(#[from] EncodingError),

    #[error(transparent)]
    Rpc(#[from] RpcError),
}
