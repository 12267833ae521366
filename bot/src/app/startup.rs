use alloc::sync::Arc;
use std::path::Path;

use tokio::signal;
use tracing::{Instrument as _, error, info};

use crate::{
    app::{
        monitor::Monitor,
        notify::{NotificationRx, dispatch_notifications},
        state::{AppState, initialize_state},
    },
    transport::{
        Notifier,
        telegram::{TelegramClient, run_polling},
    },
};

/// Creates a future that resolves when a shutdown signal is received.
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => {}
                    _ = signal::ctrl_c() => {}
                }
            }
            Err(e) => {
                error!(error = ?e, "Failed to install SIGTERM handler, only Ctrl-C will stop the bot");
                drop(signal::ctrl_c().await);
            }
        }
    }
    #[cfg(not(unix))]
    {
        drop(signal::ctrl_c().await);
    }
}

/// Start the sweep loop and the alert dispatcher.
fn start_background_tasks(state: &AppState, notify_rx: NotificationRx, notifier: Arc<dyn Notifier>) {
    // Periodic reachability sweeps
    {
        let monitor_config = &state.config.monitor;
        let monitor = Monitor::new(
            state.store.clone(),
            state.prober.clone(),
            state.notify_tx.clone(),
            monitor_config.max_concurrent_probes(),
        );
        let interval = monitor_config.interval();
        let startup_delay = monitor_config.startup_delay();
        tokio::spawn(
            async move {
                monitor.run(interval, startup_delay).await;
            }
            .in_current_span(),
        );
    }

    // Drains the alert queue towards the chat service
    {
        let min_interval = state.config.monitor.notify_min_interval();
        tokio::spawn(
            async move {
                dispatch_notifications(notify_rx, notifier, min_interval).await;
            }
            .in_current_span(),
        );
    }
}

/// Runs the bot until a shutdown signal arrives.
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded, the store cannot
/// be opened or the HTTP client cannot be built.
pub(crate) async fn start(config_path: &Path) -> eyre::Result<()> {
    info!("Starting bot...");

    let (app_state, notify_rx) = initialize_state(config_path).await?;
    let client = Arc::new(TelegramClient::new(&app_state.config.telegram)?);

    start_background_tasks(&app_state, notify_rx, client.clone());

    tokio::select! {
        () = run_polling(client, app_state.conversation.clone()) => {}
        () = shutdown_signal() => {
            info!("Received shutdown, shutting down");
        }
    }

    Ok(())
}
