//! Provider process launch, readiness polling and shutdown.

use std::net::{Ipv4Addr, TcpListener};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use anzu_provider::ProviderConnection;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::error::LaunchError;

const DEFAULT_SHELL: &str = "sh";
const DEFAULT_LOG_LEVEL: &str = "warn";
const PASSTHROUGH_VARIABLES: [&str; 4] = ["HOME", "PWD", "USER", "PATH"];

/// Timings of provider launch and shutdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSettings {
    /// Wait after spawning before the first readiness attempt.
    pub startup_grace: Duration,
    /// Number of connect-and-ping attempts.
    pub readiness_attempts: u32,
    /// Wait before each readiness attempt.
    pub readiness_interval: Duration,
    /// Wait between the termination signal and a forced kill.
    pub shutdown_grace: Duration,
}

impl Default for LaunchSettings {
    fn default() -> Self {
        Self {
            startup_grace: Duration::from_secs(2),
            readiness_attempts: 5,
            readiness_interval: Duration::from_secs(1),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

/// A provider process that answered its readiness ping.
#[derive(Debug)]
pub struct LaunchedProvider {
    pub connection: ProviderConnection,
    pub port: u16,
    /// Cancelling this token stops the process. It is a child of the token
    /// passed to [`Launcher::launch`].
    pub stop: CancellationToken,
    /// Completes once the process has exited and been reaped.
    pub watchdog: JoinHandle<()>,
}

/// Starts provider binaries as subprocesses on loopback ports.
#[derive(Debug, Clone)]
pub struct Launcher {
    shell: String,
    log_level: Option<String>,
    settings: LaunchSettings,
    call_deadline: Option<Duration>,
}

impl Default for Launcher {
    fn default() -> Self {
        Self { shell: DEFAULT_SHELL.to_string(), log_level: None, settings: LaunchSettings::default(), call_deadline: None }
    }
}

impl Launcher {
    /// Create a launcher using `sh` and default timings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Shell used to invoke the binary. The shell replaces itself with the
    /// binary, so signals reach the provider directly.
    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    /// `LOG_LEVEL` handed to the provider. Defaults to `warn`.
    pub fn with_log_level(mut self, log_level: impl Into<String>) -> Self {
        self.log_level = Some(log_level.into());
        self
    }

    pub fn with_settings(mut self, settings: LaunchSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Bound every RPC call on launched connections by `deadline`.
    pub fn with_call_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.call_deadline = deadline;
        self
    }

    pub fn settings(&self) -> &LaunchSettings {
        &self.settings
    }

    /// Spawn `binary_path` and wait until it answers `Ping`.
    ///
    /// The process is terminated when `cancel` (or the returned stop token) is
    /// cancelled, and also when readiness polling fails. In the latter case the
    /// process is gone by the time the error is returned.
    pub async fn launch(&self, provider_version_id: &str, binary_path: &Path, cancel: &CancellationToken) -> Result<LaunchedProvider, LaunchError> {
        let port = free_port().map_err(LaunchError::FreePort)?;
        let log_level = self.log_level.as_deref().filter(|level| !level.is_empty()).unwrap_or(DEFAULT_LOG_LEVEL);

        let mut command = Command::new(&self.shell);
        command
            .arg("-c")
            .arg(r#"exec "$0""#)
            .arg(binary_path)
            .kill_on_drop(true)
            .env_clear()
            .env("PORT", port.to_string())
            .env("LOG_LEVEL", log_level)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for name in PASSTHROUGH_VARIABLES {
            if let Some(value) = std::env::var_os(name).filter(|value| !value.is_empty()) {
                command.env(name, value);
            }
        }

        let mut child = command
            .spawn()
            .map_err(|source| LaunchError::Spawn { shell: self.shell.clone(), source })?;
        info!(
            provider_version = %provider_version_id,
            port,
            local_binary = %binary_path.display(),
            "started provider process"
        );

        if let Some(stdout) = child.stdout.take() {
            spawn_output_logger(provider_version_id.to_string(), "stdout", stdout);
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_output_logger(provider_version_id.to_string(), "stderr", stderr);
        }

        let stop = cancel.child_token();
        let watchdog = spawn_watchdog(provider_version_id.to_string(), child, stop.clone(), self.settings.shutdown_grace);

        match self.wait_until_ready(port, &stop).await {
            Ok(connection) => Ok(LaunchedProvider { connection, port, stop, watchdog }),
            Err(error) => {
                stop.cancel();
                if let Err(join_error) = watchdog.await {
                    warn!(provider_version = %provider_version_id, error = %join_error, "provider watchdog failed");
                }
                Err(error)
            }
        }
    }

    /// Connect to a provider that is already serving on `port`.
    pub fn connect_local(&self, port: u16) -> Result<ProviderConnection, anzu_provider::RpcError> {
        ProviderConnection::connect(port, self.call_deadline)
    }

    async fn wait_until_ready(&self, port: u16, cancel: &CancellationToken) -> Result<ProviderConnection, LaunchError> {
        sleep_or_cancel(self.settings.startup_grace, cancel).await?;

        let mut last_error = String::from("no attempt made");
        for attempt in 1..=self.settings.readiness_attempts {
            sleep_or_cancel(self.settings.readiness_interval, cancel).await?;

            let connection = ProviderConnection::connect(port, self.call_deadline)?;
            match connection.client().ping().await {
                Ok(()) => {
                    debug!(port, attempt, "provider is ready");
                    return Ok(connection);
                }
                Err(error) => {
                    trace!(port, attempt, error = %error, "provider not ready yet");
                    last_error = error.to_string();
                }
            }
        }

        Err(LaunchError::NotReady { port, attempts: self.settings.readiness_attempts, last_error })
    }
}

/// Ask the kernel for a free loopback port by binding and releasing it.
pub fn free_port() -> std::io::Result<u16> {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
    Ok(listener.local_addr()?.port())
}

async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> Result<(), LaunchError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(LaunchError::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

fn spawn_output_logger<R>(provider_version_id: String, stream: &'static str, output: R)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(output).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            info!(provider_version = %provider_version_id, stream, "{line}");
        }
    });
}

fn spawn_watchdog(provider_version_id: String, mut child: Child, stop: CancellationToken, grace: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            status = child.wait() => {
                match status {
                    Ok(status) => debug!(provider_version = %provider_version_id, %status, "provider process exited"),
                    Err(error) => warn!(provider_version = %provider_version_id, error = %error, "failed to wait for provider process"),
                }
            }
            _ = stop.cancelled() => terminate(&provider_version_id, &mut child, grace).await,
        }
    })
}

async fn terminate(provider_version_id: &str, child: &mut Child, grace: Duration) {
    debug!(provider_version = %provider_version_id, "stopping provider process");
    send_terminate(child);

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => debug!(provider_version = %provider_version_id, %status, "provider process stopped"),
        Ok(Err(error)) => warn!(provider_version = %provider_version_id, error = %error, "failed to wait for provider process"),
        Err(_) => {
            warn!(provider_version = %provider_version_id, "provider process did not stop in time, killing");
            if let Err(error) = child.kill().await {
                warn!(provider_version = %provider_version_id, error = %error, "failed to kill provider process");
            }
        }
    }
}

#[cfg(unix)]
fn send_terminate(child: &mut Child) {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let Some(pid) = child.id().and_then(|pid| i32::try_from(pid).ok()) else {
        return;
    };
    if let Err(errno) = kill(Pid::from_raw(pid), Signal::SIGTERM) {
        debug!(pid, error = %errno, "failed to send SIGTERM");
    }
}

#[cfg(not(unix))]
fn send_terminate(child: &mut Child) {
    let _ = child.start_kill();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_port_is_non_zero() {
        assert_ne!(free_port().expect("port"), 0);
    }

    #[test]
    fn default_settings_match_launch_timings() {
        let settings = LaunchSettings::default();
        assert_eq!(settings.startup_grace, Duration::from_secs(2));
        assert_eq!(settings.readiness_attempts, 5);
        assert_eq!(settings.readiness_interval, Duration::from_secs(1));
        assert_eq!(settings.shutdown_grace, Duration::from_secs(5));
    }
}
