//! Common utilities for integration tests.
//!
//! Shared helpers for writing config files, spawning the binary and
//! managing throwaway listeners.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use tokio::net::TcpListener;

pub fn get_free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .expect("failed to bind to address")
        .local_addr()
        .unwrap()
        .port()
}

/// A listener on an ephemeral local port, with that port.
pub async fn open_port() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind to address");
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

/// Guard that kills and waits on a child process when dropped.
pub struct KillOnDrop(pub Child);

impl Drop for KillOnDrop {
    fn drop(&mut self) {
        drop(self.0.kill());
        drop(self.0.wait());
    }
}

pub fn get_bot_bin() -> &'static str {
    env!("CARGO_BIN_EXE_vpswatch")
}

/// Writes `config_toml` as `vpswatch.toml` inside `dir`.
pub fn write_config(dir: &Path, config_toml: &str) -> PathBuf {
    let path = dir.join("vpswatch.toml");
    std::fs::write(&path, config_toml).expect("failed to write config");
    path
}

/// Runs the binary with `args`, quiet logs, and returns the child.
pub fn spawn_bot(args: &[&str]) -> Child {
    Command::new(get_bot_bin())
        .args(args)
        .env("VPSWATCH_TEST", "1")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to start vpswatch")
}
