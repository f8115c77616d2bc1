//! Entry point run by provider binaries.

use anyhow::bail;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use crate::Provider;
use crate::server::serve;

const DEFAULT_LOG_LEVEL: &str = "warn";

/// Command line of a provider binary.
#[derive(Debug, Parser)]
#[command(about = "Serve an Anzu provider over the provider RPC protocol")]
pub struct ServeArgs {
    /// Port to serve on. A non-zero PORT environment variable takes precedence.
    #[arg(long, default_value_t = 0)]
    pub port: u16,
}

/// Parse the command line, install logging and serve `provider` until the
/// process receives SIGINT or SIGTERM.
pub async fn start(provider: Provider) -> anyhow::Result<()> {
    init_tracing();

    let args = ServeArgs::parse();
    let port = resolve_port(args.port, std::env::var("PORT").ok().as_deref())?;

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    serve(provider, port, shutdown).await
}

/// Pick the serving port. A non-zero `PORT` value overrides the flag.
pub fn resolve_port(flag_port: u16, env_port: Option<&str>) -> anyhow::Result<u16> {
    let env_port = env_port.and_then(|raw| raw.trim().parse::<u16>().ok()).unwrap_or(0);
    let port = if env_port != 0 { env_port } else { flag_port };
    if port == 0 {
        bail!("port flag must be provided with non-zero value");
    }
    Ok(port)
}

/// Install a stderr subscriber filtered by `LOG_LEVEL`, then `RUST_LOG`.
pub fn init_tracing() {
    let filter = EnvFilter::try_new(log_filter()).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}

fn log_filter() -> String {
    std::env::var("LOG_LEVEL")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string())
}

async fn cancel_on_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => debug!(signal = "SIGINT", "received signal, shutting down"),
                    _ = terminate.recv() => debug!(signal = "SIGTERM", "received signal, shutting down"),
                }
            }
            Err(error) => {
                warn!(error = %error, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        debug!("received interrupt, shutting down");
    }
    shutdown.cancel();
}
