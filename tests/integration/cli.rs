use core::time::Duration;
use std::{
    path::{Path, PathBuf},
    process::Stdio,
};

use clap::Parser as _;
use vpswatch_bot::{cli::Cli, inner_main};

use crate::common::{KillOnDrop, get_free_port, open_port, spawn_bot, write_config};

#[tokio::test]
async fn probe_reports_open_port() {
    let (_listener, port) = open_port().await;
    let address = format!("127.0.0.1:{port}");
    let res = inner_main(Cli::parse_from(["vpswatch", "probe", &address, "--timeout", "2"])).await;
    assert!(res.is_ok(), "open port should be UP: {res:?}");
}

#[tokio::test]
async fn probe_fails_on_closed_port() {
    let port = get_free_port();
    let address = format!("127.0.0.1:{port}");
    let res = inner_main(Cli::parse_from(["vpswatch", "probe", &address, "--timeout", "1"])).await;
    assert!(res.is_err(), "closed port should be DOWN");
}

#[tokio::test]
async fn probe_uses_default_port() {
    let (_listener, port) = open_port().await;
    let port = port.to_string();
    let res = inner_main(Cli::parse_from([
        "vpswatch",
        "probe",
        "127.0.0.1",
        "--default-port",
        &port,
    ]))
    .await;
    assert!(res.is_ok(), "default port should be applied: {res:?}");
}

#[test]
fn probe_binary_exit_status() {
    let port = get_free_port();
    let status = std::process::Command::new(crate::common::get_bot_bin())
        .args(["probe", &format!("127.0.0.1:{port}"), "--timeout", "1"])
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .expect("failed to run vpswatch");
    assert!(!status.success(), "DOWN must exit non-zero");
}

#[tokio::test]
async fn check_config_accepts_valid_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        dir.path(),
        r#"
        [telegram]
        bot_token = "123:abc"

        [monitor]
        interval_seconds = 60

        [db]
        path = "./endpoints.db"
        "#,
    );
    let res = inner_main(Cli::parse_from([
        "vpswatch",
        "check-config",
        "--config",
        path.to_str().unwrap(),
    ]))
    .await;
    assert!(res.is_ok(), "valid config rejected: {res:?}");
}

#[tokio::test]
async fn check_config_rejects_bad_files() {
    let dir = tempfile::tempdir().unwrap();
    for bad in [
        "[monitor]\ninterval_seconds = 60\n",
        "[telegram]\nbot_token = \"\"\n",
        "[telegram]\nbot_token = \"1:x\"\n[monitor]\nping_concurrency = 0\n",
        "not toml at all",
    ] {
        let path = write_config(dir.path(), bad);
        let res = inner_main(Cli::parse_from([
            "vpswatch",
            "check-config",
            "--config",
            path.to_str().unwrap(),
        ]))
        .await;
        assert!(res.is_err(), "config should be rejected:\n{bad}");
    }

    let missing = dir.path().join("missing.toml");
    let res = inner_main(Cli::parse_from([
        "vpswatch",
        "check-config",
        "--config",
        missing.to_str().unwrap(),
    ]))
    .await;
    assert!(res.is_err(), "missing file should be rejected");
}

/// Config whose Telegram API points at a closed local port.
fn unreachable_api_config(dir: &Path) -> PathBuf {
    let api_port = get_free_port();
    write_config(
        dir,
        &format!(
            r#"
            [telegram]
            bot_token = "123:abc"
            api_base = "http://127.0.0.1:{api_port}"
            poll_timeout_seconds = 1

            [db]
            path = "./endpoints.db"
            "#
        ),
    )
}

#[tokio::test]
async fn bot_keeps_running_while_telegram_is_unreachable() {
    let dir = tempfile::tempdir().unwrap();
    let path = unreachable_api_config(dir.path());
    let mut guard = KillOnDrop(spawn_bot(&["run", "--config", path.to_str().unwrap()]));

    tokio::time::sleep(Duration::from_secs(2)).await;

    assert!(
        guard.0.try_wait().unwrap().is_none(),
        "bot should keep polling despite API errors"
    );
    assert!(
        dir.path().join("endpoints.db").exists(),
        "database should be created next to the config"
    );
}

#[cfg(unix)]
#[tokio::test]
async fn dropping_the_guard_reaps_the_bot() {
    let dir = tempfile::tempdir().unwrap();
    let path = unreachable_api_config(dir.path());
    let guard = KillOnDrop(spawn_bot(&["run", "--config", path.to_str().unwrap()]));
    let pid = guard.0.id().to_string();
    tokio::time::sleep(Duration::from_millis(500)).await;

    drop(guard);

    let alive = std::process::Command::new("kill")
        .args(["-0", &pid])
        .stderr(Stdio::null())
        .status()
        .expect("failed to run kill")
        .success();
    assert!(!alive, "bot process {pid} should be gone");
}

#[tokio::test]
async fn bot_refuses_to_start_without_token() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), "[monitor]\ninterval_seconds = 60\n");
    let mut child = spawn_bot(&["run", "--config", path.to_str().unwrap()]);
    let status = child.wait().expect("failed to wait on child");
    assert!(!status.success(), "missing token must be fatal");
}
