//! Library entry for the `vpswatch` bot.
//!
//! Exposes `inner_main` so a workspace-level shim binary can call into the bot logic.
//!
//! Provides commands to run the bot, probe a single address or validate a config file.
#![cfg_attr(
    test,
    expect(clippy::indexing_slicing, reason = "This is not problematic in tests",)
)]

extern crate alloc;
extern crate core;

pub mod app;
pub mod cli;
pub mod config;
pub mod store;
pub mod transport;

use core::time::Duration;
use std::{env, fs, sync::Once};

#[cfg(unix)]
use nix::sys::stat;
use tracing::{Instrument as _, info};
use tracing_subscriber::{EnvFilter, fmt::time::ChronoLocal};

use eyre::{Result, WrapErr as _, bail};
use vpswatch_common::{EndpointStatus, parse_address, probe};

use cli::{Cli, Command, LogFormat};

use crate::app::start;

static INIT_TRACING: Once = Once::new();

/// Set by the test suites to keep their output quiet.
pub const TEST_ENV_VAR: &str = "VPSWATCH_TEST";

fn init_tracing(log_format: LogFormat) {
    INIT_TRACING.call_once(move || {
        let default_level = if env::var(TEST_ENV_VAR).is_ok() {
            "error"
        } else {
            "info"
        };

        let builder = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
            )
            .with_timer(ChronoLocal::rfc_3339());

        match log_format {
            LogFormat::Compact => builder.compact().init(),
            LogFormat::Json => builder.json().init(),
            LogFormat::Pretty => builder.pretty().init(),
        }
    });
}

/// The bot's main function; can be called from a shim binary.
///
/// Parses CLI and dispatches to the bot, the one-shot probe or the config check.
///
/// # Errors
///
/// Returns an error if the config is unusable, the bot fails to start,
/// or a probed address is unreachable.
pub async fn inner_main(invocation: Cli) -> Result<()> {
    match invocation.command {
        Command::Run(args) => {
            // Set umask to ensure database files have restrictive permissions
            #[cfg(unix)]
            stat::umask(stat::Mode::S_IRWXU.complement());

            let config = &args.config;
            let config_path =
                fs::canonicalize(config).wrap_err(format!("Config file not found at: {config}"))?;

            init_tracing(args.log_format);

            // Create a startup span that holds the resolved config path for the lifetime
            // of the bot.
            let startup_span = tracing::info_span!("bot.startup", ?config_path, pid = ?std::process::id(), version = env!("CARGO_PKG_VERSION"));

            info!(parent: &startup_span, "Starting vpswatch");

            start(&config_path).instrument(startup_span).await
        }
        Command::Probe(args) => {
            let address = parse_address(&args.address, args.default_port);
            if address.host.is_empty() {
                bail!("No address given");
            }
            let reachable = probe(
                &address.host,
                address.port,
                Duration::from_secs(args.timeout.max(1)),
            )
            .await;
            let status = EndpointStatus::from_reachable(reachable);
            println!("{} {address} {status}", status.marker());
            if !reachable {
                bail!("{address} is unreachable");
            }
            Ok(())
        }
        Command::CheckConfig { config: path } => {
            let config_path =
                fs::canonicalize(&path).wrap_err(format!("Config file not found at: {path}"))?;
            let loaded = config::load(&config_path).await?;
            let storage = match loaded.db {
                Some(config::DbConfig {
                    enable: true,
                    path: ref db_path,
                }) => config::resolve_config_relative_paths(&config_path, db_path)
                    .display()
                    .to_string(),
                _ => "in memory".to_owned(),
            };
            println!(
                "{} is valid: sweep every {}s, {} concurrent probes, storage {storage}",
                config_path.display(),
                loaded.monitor.interval_seconds,
                loaded.monitor.max_concurrent_probes(),
            );
            Ok(())
        }
    }
}
