use alloc::sync::Arc;
use std::path::{Path, PathBuf};

use eyre::WrapErr as _;
use tracing::{info, warn};

use crate::{
    app::{
        conversation::{Conversation, ConversationSettings},
        notify::{NotificationRx, NotificationTx, notification_channel},
        prober::{Prober, TcpProber},
    },
    config::{BotConfig, DbConfig, load, resolve_config_relative_paths},
    store::{EndpointStore, MemoryStore, SqliteStore},
};

/// Application state shared by the chat workers and background tasks.
#[derive(Clone)]
pub struct AppState {
    /// Path to the configuration file, for diagnostics.
    pub config_path: PathBuf,
    /// Configuration as loaded at startup.
    pub config: Arc<BotConfig>,

    pub store: Arc<dyn EndpointStore>,
    pub prober: Arc<dyn Prober>,
    pub conversation: Arc<Conversation>,

    /// Sender side of the alert queue, used by the monitor.
    pub notify_tx: NotificationTx,
}

/// Open the endpoint store based on configuration.
///
/// If a persistent DB is configured and enabled, open it relative to the
/// config file when appropriate. Otherwise endpoints live in memory.
#[tracing::instrument(skip_all)]
async fn initialize_store(
    config: &BotConfig,
    config_path: &Path,
) -> eyre::Result<Arc<dyn EndpointStore>> {
    Ok(match config.db {
        Some(DbConfig {
            enable: true,
            ref path,
        }) => {
            let db_path = resolve_config_relative_paths(config_path, path);
            let store = SqliteStore::open(&db_path).await.wrap_err(format!(
                "Failed to initialize database at: {}",
                db_path.display()
            ))?;
            info!(
                "Database initialized at: {} (note: WAL mode creates .db-wal and .db-shm files alongside)",
                db_path.display()
            );
            Arc::new(store)
        }
        _ => {
            info!("DB persistence disabled, keeping endpoints in memory");
            Arc::new(MemoryStore::new())
        }
    })
}

/// Emit startup warnings based on configuration and runtime state.
fn emit_startup_warnings(app_state: &AppState) {
    #[cfg(unix)]
    {
        use std::fs;
        use std::os::unix::fs::PermissionsExt as _;
        if let Ok(metadata) = fs::metadata(&app_state.config_path) {
            let mode = metadata.permissions().mode();
            if mode & 0o077 != 0 {
                warn!(
                    "Config file holds the bot token but its permissions are too permissive (current: {mode:#o}). Run 'chmod 600 {}' to restrict access to owner only.",
                    app_state.config_path.display()
                );
            }
        }
    }

    if !matches!(app_state.config.db, Some(DbConfig { enable: true, .. })) {
        warn!("Endpoints are kept in memory and will be lost on restart. Add a [db] section to persist them.");
    }
}

/// Load the config and build the application state.
///
/// Returns the receiving end of the alert queue, to be handed to the dispatcher.
///
/// # Errors
///
/// Returns an error if the config is unusable or the store cannot be opened.
#[tracing::instrument(skip_all)]
pub async fn initialize_state(config_path: &Path) -> eyre::Result<(AppState, NotificationRx)> {
    let config = Arc::new(load(config_path).await?);
    let store = initialize_store(&config, config_path).await?;
    let prober: Arc<dyn Prober> = Arc::new(TcpProber::new(config.monitor.probe_timeout()));
    let conversation = Arc::new(Conversation::new(
        store.clone(),
        prober.clone(),
        ConversationSettings {
            default_port: config.monitor.default_port,
            ping_concurrency: config.monitor.ping_concurrency,
        },
    ));
    let (notify_tx, notify_rx) = notification_channel();

    let app_state = AppState {
        config_path: config_path.to_path_buf(),
        config,
        store,
        prober,
        conversation,
        notify_tx,
    };

    emit_startup_warnings(&app_state);

    Ok((app_state, notify_rx))
}
