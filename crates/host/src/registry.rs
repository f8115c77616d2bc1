//! In-memory index of live provider connections.

use anzu_provider::ProviderConnection;
use indexmap::IndexMap;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::RegistryError;
use crate::handle::ProviderHandle;

/// A live connection and the environment providers it serves.
#[derive(Debug)]
pub struct ConnectionRecord {
    pub provider_id: String,
    pub provider_version_id: String,
    pub environment_provider_ids: Vec<String>,
    connection: ProviderConnection,
    /// Stops the provider process. `None` for local providers.
    stop: Option<CancellationToken>,
    /// Finishes once the stopped process has been reaped.
    watchdog: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionRecord {
    pub fn new(
        provider_id: impl Into<String>,
        provider_version_id: impl Into<String>,
        environment_provider_ids: Vec<String>,
        connection: ProviderConnection,
    ) -> Self {
        Self {
            provider_id: provider_id.into(),
            provider_version_id: provider_version_id.into(),
            environment_provider_ids,
            connection,
            stop: None,
            watchdog: Mutex::new(None),
        }
    }

    /// Attach the launched process: the token that stops it and the task that
    /// reaps it. Closing the record waits for that task.
    pub fn with_process(mut self, stop: CancellationToken, watchdog: JoinHandle<()>) -> Self {
        self.stop = Some(stop);
        self.watchdog = Mutex::new(Some(watchdog));
        self
    }

    pub(crate) fn handle(&self, environment_provider_id: &str) -> ProviderHandle {
        ProviderHandle::new(
            self.provider_id.clone(),
            self.provider_version_id.clone(),
            environment_provider_id.to_string(),
            self.connection.client(),
        )
    }

    async fn close(&self) -> Result<(), RegistryError> {
        if let Some(stop) = &self.stop {
            stop.cancel();
        }
        if let Some(watchdog) = self.watchdog.lock().await.take()
            && let Err(join_error) = watchdog.await
        {
            warn!(provider_version = %self.provider_version_id, error = %join_error, "provider watchdog failed");
        }
        self.connection.close().await.map_err(|source| RegistryError::Close {
            provider_version_id: self.provider_version_id.clone(),
            source,
        })
    }

    /// Close and stop, logging instead of returning a failure.
    pub(crate) async fn stop_quietly(&self) {
        if let Err(error) = self.close().await {
            debug!(error = %error, "ignoring close failure while unwinding setup");
        }
    }
}

/// Connections keyed by provider version, in registration order.
///
/// The registry exclusively owns every connection. Lookups hand out
/// [`ProviderHandle`]s that cannot close the channel.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    records: IndexMap<String, ConnectionRecord>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection, returning any record it replaced.
    ///
    /// A replaced record is still open. Callers own closing it.
    pub fn insert(&mut self, record: ConnectionRecord) -> Option<ConnectionRecord> {
        self.records.insert(record.provider_version_id.clone(), record)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Provider version ids in registration order.
    pub fn provider_version_ids(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    /// Find the connection serving `environment_provider_id`.
    pub fn lookup(&self, environment_provider_id: &str) -> Result<ProviderHandle, RegistryError> {
        if environment_provider_id.is_empty() {
            return Err(RegistryError::EmptyEnvironmentProviderId);
        }
        self.records
            .values()
            .find(|record| record.environment_provider_ids.iter().any(|id| id == environment_provider_id))
            .map(|record| record.handle(environment_provider_id))
            .ok_or_else(|| RegistryError::EnvironmentProviderNotFound(environment_provider_id.to_string()))
    }

    /// Find the connection of a provider version.
    pub fn lookup_by_version(&self, provider_version_id: &str) -> Result<ProviderHandle, RegistryError> {
        if provider_version_id.is_empty() {
            return Err(RegistryError::EmptyProviderVersionId);
        }
        self.records
            .get(provider_version_id)
            .map(|record| record.handle(""))
            .ok_or_else(|| RegistryError::ProviderVersionNotFound(provider_version_id.to_string()))
    }

    /// Close every connection and stop launched processes, waiting for each
    /// process to exit.
    ///
    /// A failure closing one connection is logged and does not prevent closing
    /// the rest. The failures are returned in registration order.
    pub async fn shutdown_all(&self) -> Vec<RegistryError> {
        let mut failures = Vec::new();
        for record in self.records.values() {
            match record.close().await {
                Ok(()) => debug!(provider_version = %record.provider_version_id, "closed provider connection"),
                Err(err) => {
                    error!(provider_version = %record.provider_version_id, error = %err, "failed to close provider connection");
                    failures.push(err);
                }
            }
        }
        failures
    }

    /// Close and stop every connection, consuming the registry.
    ///
    /// Every launched process has exited when this returns.
    pub(crate) async fn unwind(self) {
        for record in self.records.values() {
            record.stop_quietly().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    fn record(version: &str, environments: &[&str], port: u16) -> ConnectionRecord {
        let connection = ProviderConnection::connect(port, None).expect("connection");
        ConnectionRecord::new("provider", version, environments.iter().map(|id| id.to_string()).collect(), connection)
    }

    #[test]
    fn lookup_finds_any_served_environment_provider() {
        let mut registry = ConnectionRegistry::new();
        registry.insert(record("pv-1", &["env-a", "env-b"], 40001));
        registry.insert(record("pv-2", &["env-c"], 40002));

        let handle = registry.lookup("env-b").expect("handle");
        assert_eq!(handle.provider_version_id, "pv-1");
        assert_eq!(handle.environment_provider_id, "env-b");

        let handle = registry.lookup_by_version("pv-2").expect("handle");
        assert_eq!(handle.provider_version_id, "pv-2");
        assert!(handle.environment_provider_id.is_empty());
    }

    #[test]
    fn empty_and_unknown_ids_are_client_errors() {
        let registry = ConnectionRegistry::new();
        assert!(matches!(registry.lookup(""), Err(RegistryError::EmptyEnvironmentProviderId)));
        assert!(matches!(registry.lookup_by_version(""), Err(RegistryError::EmptyProviderVersionId)));
        assert!(matches!(registry.lookup("env-x"), Err(RegistryError::EnvironmentProviderNotFound(id)) if id == "env-x"));
        assert!(matches!(registry.lookup_by_version("pv-x"), Err(RegistryError::ProviderVersionNotFound(id)) if id == "pv-x"));
    }

    #[tokio::test]
    async fn shutdown_continues_past_failures() {
        let mut registry = ConnectionRegistry::new();
        let stop = CancellationToken::new();
        let reaped = Arc::new(AtomicBool::new(false));
        let watchdog = tokio::spawn({
            let stop = stop.clone();
            let reaped = Arc::clone(&reaped);
            async move {
                stop.cancelled().await;
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                reaped.store(true, Ordering::SeqCst);
            }
        });
        registry.insert(record("pv-1", &["env-a"], 40011).with_process(stop.clone(), watchdog));
        registry.insert(record("pv-2", &["env-b"], 40012));

        assert!(registry.shutdown_all().await.is_empty());
        assert!(stop.is_cancelled());
        assert!(reaped.load(Ordering::SeqCst), "shutdown returned before the process was reaped");

        let failures = registry.shutdown_all().await;
        let failed: Vec<&str> = failures
            .iter()
            .filter_map(|failure| match failure {
                RegistryError::Close { provider_version_id, .. } => Some(provider_version_id.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(failed, ["pv-1", "pv-2"]);
    }
}
