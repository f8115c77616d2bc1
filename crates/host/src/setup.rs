//! Bring-up of every provider a deployment needs.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anzu_provider::ProviderConfiguration;
use anzu_value::{ConfigurationResolver, Input, Resolvers, resolve_value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::binary::{BinaryManager, default_cache_root};
use crate::descriptor::ProviderDescriptor;
use crate::error::{CallError, ConfigureError, SetupError};
use crate::handle::ProviderHandle;
use crate::launcher::{LaunchSettings, Launcher};
use crate::registry::{ConnectionRecord, ConnectionRegistry};

/// Options of [`setup_providers`].
#[derive(Clone, Default)]
pub struct SetupOptions {
    disable_cache: bool,
    local_providers: HashMap<String, u16>,
    configuration_resolver: Option<Arc<dyn ConfigurationResolver>>,
    shell: Option<String>,
    log_level: Option<String>,
    cache_root: Option<PathBuf>,
    bearer_token: Option<String>,
    call_deadline: Option<Duration>,
    launch_settings: Option<LaunchSettings>,
}

impl std::fmt::Debug for SetupOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SetupOptions")
            .field("disable_cache", &self.disable_cache)
            .field("local_providers", &self.local_providers)
            .field("configuration_resolver", &self.configuration_resolver.is_some())
            .field("shell", &self.shell)
            .field("log_level", &self.log_level)
            .field("cache_root", &self.cache_root)
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "<redacted>"))
            .field("call_deadline", &self.call_deadline)
            .field("launch_settings", &self.launch_settings)
            .finish()
    }
}

impl SetupOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-download binaries even when cached.
    pub fn with_disable_cache(mut self, disable_cache: bool) -> Self {
        self.disable_cache = disable_cache;
        self
    }

    /// Provider versions already served locally, by port. These are neither
    /// downloaded nor launched.
    pub fn with_local_providers(mut self, local_providers: HashMap<String, u16>) -> Self {
        self.local_providers = local_providers;
        self
    }

    /// Resolver for configuration references in provider usages.
    pub fn with_configuration_resolver(mut self, resolver: Arc<dyn ConfigurationResolver>) -> Self {
        self.configuration_resolver = Some(resolver);
        self
    }

    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = Some(shell.into());
        self
    }

    pub fn with_log_level(mut self, log_level: impl Into<String>) -> Self {
        self.log_level = Some(log_level.into());
        self
    }

    /// Cache binaries under `cache_root` instead of `<home>/.anzu/providers`.
    pub fn with_cache_root(mut self, cache_root: impl Into<PathBuf>) -> Self {
        self.cache_root = Some(cache_root.into());
        self
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    pub fn with_call_deadline(mut self, deadline: Duration) -> Self {
        self.call_deadline = Some(deadline);
        self
    }

    pub fn with_launch_settings(mut self, settings: LaunchSettings) -> Self {
        self.launch_settings = Some(settings);
        self
    }

    fn launcher(&self) -> Launcher {
        let mut launcher = Launcher::new().with_call_deadline(self.call_deadline);
        if let Some(shell) = &self.shell {
            launcher = launcher.with_shell(shell.clone());
        }
        if let Some(log_level) = &self.log_level {
            launcher = launcher.with_log_level(log_level.clone());
        }
        if let Some(settings) = &self.launch_settings {
            launcher = launcher.with_settings(settings.clone());
        }
        launcher
    }
}

/// How one provider version is reached.
#[derive(Debug)]
enum Source {
    /// Already serving on a loopback port.
    Local(u16),
    /// Cached binary to launch.
    Binary(PathBuf),
}

/// Download, launch and configure every provider in `descriptors`.
///
/// Provider version ids must be unique. All binaries are acquired before any
/// process starts. Providers are then
/// brought up one at a time in descriptor order. If any step fails, every
/// connection opened so far is closed and its process stopped before the
/// error is returned.
pub async fn setup_providers(
    descriptors: &[ProviderDescriptor],
    options: SetupOptions,
    cancel: &CancellationToken,
) -> Result<ConnectionRegistry, SetupError> {
    let mut seen = HashSet::new();
    if let Some(duplicate) = descriptors.iter().find(|descriptor| !seen.insert(descriptor.provider_version_id.as_str())) {
        return Err(SetupError::DuplicateProviderVersion { provider_version_id: duplicate.provider_version_id.clone() });
    }

    let cache_root = match &options.cache_root {
        Some(root) => root.clone(),
        None => default_cache_root().ok_or(SetupError::NoHomeDirectory)?,
    };
    tokio::fs::create_dir_all(&cache_root)
        .await
        .map_err(|source| SetupError::CacheDirectory { path: cache_root.clone(), source })?;

    let mut binaries = BinaryManager::new(cache_root)
        .map_err(SetupError::DownloadClient)?
        .with_disable_cache(options.disable_cache);
    if let Some(token) = &options.bearer_token {
        binaries = binaries.with_bearer_token(token.clone());
    }

    let mut plan = Vec::with_capacity(descriptors.len());
    for descriptor in descriptors {
        let source = match options.local_providers.get(&descriptor.provider_version_id) {
            Some(port) => Source::Local(*port),
            None => binaries
                .ensure_binary(descriptor, cancel)
                .await
                .map(Source::Binary)
                .map_err(|source| SetupError::Download { provider_version_id: descriptor.provider_version_id.clone(), source })?,
        };
        plan.push((descriptor, source));
    }

    let launcher = options.launcher();
    let mut registry = ConnectionRegistry::new();
    for (descriptor, source) in plan {
        match bring_up(descriptor, source, &options, &launcher, cancel).await {
            Ok(record) => {
                if let Some(displaced) = registry.insert(record) {
                    displaced.stop_quietly().await;
                }
            }
            Err(error) => {
                registry.unwind().await;
                return Err(error);
            }
        }
    }

    info!(providers = registry.len(), "providers ready");
    Ok(registry)
}

async fn bring_up(
    descriptor: &ProviderDescriptor,
    source: Source,
    options: &SetupOptions,
    launcher: &Launcher,
    cancel: &CancellationToken,
) -> Result<ConnectionRecord, SetupError> {
    let provider_version_id = descriptor.provider_version_id.clone();

    let record = match source {
        Source::Local(port) => {
            debug!(provider_version = %provider_version_id, port, "using local provider");
            let connection = launcher
                .connect_local(port)
                .map_err(|source| SetupError::Connect { provider_version_id: provider_version_id.clone(), source })?;
            ConnectionRecord::new(&descriptor.provider_id, &provider_version_id, descriptor.environment_provider_ids(), connection)
        }
        Source::Binary(path) => {
            let launched = launcher
                .launch(&provider_version_id, &path, cancel)
                .await
                .map_err(|source| SetupError::Launch { provider_version_id: provider_version_id.clone(), source })?;
            ConnectionRecord::new(&descriptor.provider_id, &provider_version_id, descriptor.environment_provider_ids(), launched.connection)
                .with_process(launched.stop, launched.watchdog)
        }
    };

    if let Err(source) = configure_usages(descriptor, record.handle(""), options.configuration_resolver.as_deref()).await {
        record.stop_quietly().await;
        return Err(SetupError::Configure { provider_version_id, source });
    }
    Ok(record)
}

async fn configure_usages(
    descriptor: &ProviderDescriptor,
    handle: ProviderHandle,
    resolver: Option<&dyn ConfigurationResolver>,
) -> Result<(), ConfigureError> {
    let mut resolvers = Resolvers::new();
    if let Some(resolver) = resolver {
        resolvers = resolvers.with_configuration(resolver);
    }

    for usage in &descriptor.usages {
        let mut values = Vec::with_capacity(usage.configuration.len());
        for input in &usage.configuration {
            let value = resolve_value(input.value.clone(), resolvers).await.map_err(|source| ConfigureError::Resolve {
                environment_provider_id: usage.environment_provider_id.clone(),
                name: input.name.clone(),
                source,
            })?;
            values.push(Input { name: input.name.clone(), value });
        }

        let handle = handle.clone().with_environment_provider(&usage.environment_provider_id);
        handle.configure(&ProviderConfiguration::new(values)).await.map_err(|source| match source {
            CallError::Encoding(error) => ConfigureError::Encoding(error),
            CallError::Rpc(source) => {
                ConfigureError::Rpc { environment_provider_id: usage.environment_provider_id.clone(), source }
            }
        })?;
        debug!(
            provider_version = %descriptor.provider_version_id,
            environment_provider = %usage.environment_provider_id,
            "configured environment provider"
        );
    }
    Ok(())
}
