//! Configuration loading utilities for the bot.
//!
//! This module provides functions for reading, parsing and validating
//! configuration files from disk.

use std::{env, path::Path};

use eyre::{WrapErr as _, bail};
use secrecy::ExposeSecret as _;
use tokio::fs;
use url::Url;

use crate::config::BotConfig;

/// Environment variable that overrides `monitor.interval_seconds`.
pub const INTERVAL_ENV_VAR: &str = "MONITOR_INTERVAL_SECONDS";

/// Longest accepted `getUpdates` long poll.
pub const MAX_POLL_TIMEOUT_SECONDS: u64 = 300;
/// Longest accepted sweep interval or startup delay (30 days).
pub const MAX_SCHEDULE_SECONDS: u64 = 30 * 24 * 60 * 60;
/// Longest accepted connect timeout of one probe.
pub const MAX_PROBE_TIMEOUT_SECONDS: u64 = 300;
/// Longest accepted pause between two notifications.
pub const MAX_NOTIFY_INTERVAL_MS: u64 = 60_000;

/// Reads, parses and validates the bot config from a TOML file.
///
/// `MONITOR_INTERVAL_SECONDS` takes precedence over the file's sweep interval.
///
/// # Arguments
///
/// * `path` - File path to the TOML configuration file.
///
/// # Errors
///
/// Returns an error if the config file cannot be read or parsed,
/// or if it describes an unusable configuration.
pub async fn load<P: AsRef<Path>>(path: P) -> eyre::Result<BotConfig> {
    let path_ref = path.as_ref();
    let content = fs::read_to_string(&path).await.wrap_err(format!(
        "Failed to read config file at: {}",
        path_ref.display()
    ))?;
    let mut config = parse(&content).wrap_err(format!(
        "Invalid config at: {}",
        path_ref.display()
    ))?;
    apply_env_overrides(&mut config, env::var(INTERVAL_ENV_VAR).ok().as_deref())?;
    validate(&config)?;
    Ok(config)
}

fn parse(content: &str) -> eyre::Result<BotConfig> {
    toml::from_str(content).wrap_err("Failed to parse config as TOML")
}

fn apply_env_overrides(config: &mut BotConfig, interval: Option<&str>) -> eyre::Result<()> {
    if let Some(raw) = interval {
        config.monitor.interval_seconds = raw
            .trim()
            .parse()
            .wrap_err(format!("{INTERVAL_ENV_VAR} must be a number of seconds, got {raw:?}"))?;
    }
    Ok(())
}

/// Rejects configurations the bot cannot run with.
///
/// # Errors
///
/// Returns an error describing the first offending setting.
pub fn validate(config: &BotConfig) -> eyre::Result<()> {
    if config.telegram.bot_token.expose_secret().trim().is_empty() {
        bail!("telegram.bot_token must not be empty");
    }
    if config.telegram.api_base.trim().is_empty() {
        bail!("telegram.api_base must not be empty");
    }
    Url::parse(&config.telegram.api_base).wrap_err(format!(
        "telegram.api_base is not a valid URL: {}",
        config.telegram.api_base
    ))?;
    if config.telegram.poll_timeout_seconds > MAX_POLL_TIMEOUT_SECONDS {
        bail!("telegram.poll_timeout_seconds must be at most {MAX_POLL_TIMEOUT_SECONDS}");
    }
    let monitor = &config.monitor;
    if !(1..=MAX_SCHEDULE_SECONDS).contains(&monitor.interval_seconds) {
        bail!("monitor.interval_seconds must be between 1 and {MAX_SCHEDULE_SECONDS}");
    }
    if monitor.startup_delay_seconds > MAX_SCHEDULE_SECONDS {
        bail!("monitor.startup_delay_seconds must be at most {MAX_SCHEDULE_SECONDS}");
    }
    if !(1..=MAX_PROBE_TIMEOUT_SECONDS).contains(&monitor.probe_timeout_seconds) {
        bail!("monitor.probe_timeout_seconds must be between 1 and {MAX_PROBE_TIMEOUT_SECONDS}");
    }
    if monitor.notify_min_interval_ms > MAX_NOTIFY_INTERVAL_MS {
        bail!("monitor.notify_min_interval_ms must be at most {MAX_NOTIFY_INTERVAL_MS}");
    }
    if monitor.default_port == 0 {
        bail!("monitor.default_port must be between 1 and 65535");
    }
    if monitor.max_concurrent_probes == Some(0) {
        bail!("monitor.max_concurrent_probes must be at least 1");
    }
    if monitor.ping_concurrency == 0 {
        bail!("monitor.ping_concurrency must be at least 1");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use secrecy::ExposeSecret as _;

    use super::*;
    use crate::config::{DbConfig, MonitorConfig};

    const MINIMAL: &str = r#"
        [telegram]
        bot_token = "123:abc"
    "#;

    #[tokio::test]
    async fn load_bot_config_file() {
        let toml_str = r#"
            [telegram]
            bot_token = "123:abc"
            poll_timeout_seconds = 10

            [monitor]
            interval_seconds = 60
            default_port = 2222
            max_concurrent_probes = 4

            [db]
            path = "./state/endpoints.db"
        "#;
        let dir = tempfile::tempdir().unwrap();
        let tmp = dir.path().join("vpswatch.toml");
        fs::write(&tmp, toml_str).unwrap();
        let cfg = load(&tmp).await.unwrap();
        assert_eq!(cfg.telegram.bot_token.expose_secret(), "123:abc");
        assert_eq!(cfg.telegram.api_base, "https://api.telegram.org");
        assert_eq!(cfg.telegram.poll_timeout_seconds, 10);
        assert_eq!(cfg.monitor.default_port, 2222);
        assert_eq!(cfg.monitor.max_concurrent_probes(), 4);
        assert_eq!(cfg.monitor.startup_delay_seconds, 10);
        let db = cfg.db.unwrap();
        assert_eq!(db.path, "./state/endpoints.db");
        assert!(db.enable, "enable should default to true");
    }

    #[tokio::test]
    async fn load_bot_config_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let res = load(dir.path().join("does_not_exist.toml")).await;
        assert!(res.is_err(), "Expected error for missing file");
    }

    #[test]
    fn invalid_toml_is_rejected() {
        assert!(parse("not valid toml").is_err());
    }

    #[test]
    fn missing_token_is_rejected() {
        let res = parse("[monitor]\ninterval_seconds = 5\n");
        assert!(res.is_err(), "telegram.bot_token is required");
    }

    #[test]
    fn empty_token_fails_validation() {
        let cfg = parse("[telegram]\nbot_token = \"  \"\n").unwrap();
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn omitted_sections_use_defaults() {
        let cfg = parse(MINIMAL).unwrap();
        assert_eq!(cfg.monitor, MonitorConfig::default());
        assert_eq!(cfg.monitor.interval_seconds, 300);
        assert_eq!(cfg.monitor.probe_timeout_seconds, 3);
        assert_eq!(cfg.monitor.default_port, 22);
        assert_eq!(cfg.monitor.ping_concurrency, 8);
        assert_eq!(cfg.monitor.notify_min_interval_ms, 50);
        assert!(cfg.db.is_none(), "db should stay unset when omitted");
        validate(&cfg).unwrap();
    }

    #[test]
    fn empty_db_table_uses_defaults() {
        let cfg = parse(&format!("{MINIMAL}\n[db]\n")).unwrap();
        assert_eq!(cfg.db, Some(DbConfig::default()));
    }

    #[test]
    fn zero_values_fail_validation() {
        for section in [
            "interval_seconds = 0",
            "probe_timeout_seconds = 0",
            "default_port = 0",
            "max_concurrent_probes = 0",
            "ping_concurrency = 0",
        ] {
            let cfg = parse(&format!("{MINIMAL}\n[monitor]\n{section}\n")).unwrap();
            assert!(validate(&cfg).is_err(), "{section} should be rejected");
        }
    }

    #[test]
    fn huge_values_fail_validation() {
        for section in [
            "[telegram]\nbot_token = \"123:abc\"\npoll_timeout_seconds = 9223372036854775807\n",
            "[telegram]\nbot_token = \"123:abc\"\n[monitor]\nstartup_delay_seconds = 9223372036854775807\n",
            "[telegram]\nbot_token = \"123:abc\"\n[monitor]\ninterval_seconds = 9223372036854775807\n",
            "[telegram]\nbot_token = \"123:abc\"\n[monitor]\nprobe_timeout_seconds = 100000\n",
            "[telegram]\nbot_token = \"123:abc\"\n[monitor]\nnotify_min_interval_ms = 100000000\n",
        ] {
            let cfg = parse(section).unwrap();
            assert!(validate(&cfg).is_err(), "{section} should be rejected");
        }

        let edge = format!(
            "[telegram]\nbot_token = \"123:abc\"\npoll_timeout_seconds = {MAX_POLL_TIMEOUT_SECONDS}\n\
             [monitor]\nstartup_delay_seconds = {MAX_SCHEDULE_SECONDS}\ninterval_seconds = {MAX_SCHEDULE_SECONDS}\n"
        );
        validate(&parse(&edge).unwrap()).unwrap();
    }

    #[test]
    fn api_base_must_be_a_url() {
        let cfg = parse("[telegram]\nbot_token = \"123:abc\"\napi_base = \"not a url\"\n").unwrap();
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn interval_env_override_wins() {
        let mut cfg = parse(&format!("{MINIMAL}\n[monitor]\ninterval_seconds = 60\n")).unwrap();
        apply_env_overrides(&mut cfg, Some(" 15 ")).unwrap();
        assert_eq!(cfg.monitor.interval_seconds, 15);

        apply_env_overrides(&mut cfg, None).unwrap();
        assert_eq!(cfg.monitor.interval_seconds, 15);

        assert!(apply_env_overrides(&mut cfg, Some("soon")).is_err());
    }
}
