#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::Duration;

use anzu_host::{LaunchError, LaunchSettings, Launcher};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn short_settings() -> LaunchSettings {
    LaunchSettings {
        startup_grace: Duration::from_millis(50),
        readiness_attempts: 2,
        readiness_interval: Duration::from_millis(50),
        shutdown_grace: Duration::from_millis(200),
    }
}

/// Script that records its environment and then idles without serving.
fn write_env_capture(dir: &Path) -> std::path::PathBuf {
    let script = dir.join("provider");
    let capture = dir.join("env.txt");
    std::fs::write(&script, format!("#!/bin/sh\nenv > {}\nexec sleep 30\n", capture.display())).expect("write script");
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).expect("chmod");
    script
}

#[tokio::test]
async fn silent_provider_is_not_ready_and_gets_a_minimal_environment() {
    let dir = TempDir::new().expect("tempdir");
    let script = write_env_capture(dir.path());

    let launcher = Launcher::new().with_settings(short_settings());
    let error = launcher
        .launch("pv-silent", &script, &CancellationToken::new())
        .await
        .expect_err("nothing listens on the port");

    let port = match error {
        LaunchError::NotReady { port, attempts, .. } => {
            assert_eq!(attempts, 2);
            port
        }
        other => panic!("unexpected error: {other}"),
    };

    let env = std::fs::read_to_string(dir.path().join("env.txt")).expect("captured environment");
    assert!(env.lines().any(|line| line == format!("PORT={port}")), "{env}");
    assert!(env.lines().any(|line| line == "LOG_LEVEL=warn"), "{env}");
    assert!(!env.contains("CARGO_"), "{env}");
}

#[tokio::test]
async fn configured_log_level_is_forwarded() {
    let dir = TempDir::new().expect("tempdir");
    let script = write_env_capture(dir.path());

    let launcher = Launcher::new().with_settings(short_settings()).with_log_level("debug");
    launcher
        .launch("pv-debug", &script, &CancellationToken::new())
        .await
        .expect_err("nothing listens on the port");

    let env = std::fs::read_to_string(dir.path().join("env.txt")).expect("captured environment");
    assert!(env.lines().any(|line| line == "LOG_LEVEL=debug"), "{env}");
}

#[tokio::test]
async fn cancellation_aborts_readiness_wait() {
    let dir = TempDir::new().expect("tempdir");
    let script = write_env_capture(dir.path());

    let settings = LaunchSettings { startup_grace: Duration::from_secs(30), ..short_settings() };
    let launcher = Launcher::new().with_settings(settings);
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let error = launcher.launch("pv-cancel", &script, &cancel).await.expect_err("cancelled");
    assert!(matches!(error, LaunchError::Cancelled), "{error}");
}
