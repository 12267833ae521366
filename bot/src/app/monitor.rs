//! Periodic reachability sweep with edge-triggered alerts.
//!
//! Each sweep probes every stored endpoint under a shared concurrency limit,
//! persists status changes and queues an alert only for `UP -> DOWN` and
//! `DOWN -> UP`. The first observation of a fresh endpoint sets its baseline
//! silently.

use alloc::sync::Arc;
use core::time::Duration;
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::{
    sync::{Semaphore, mpsc::error::TrySendError},
    task::{self, JoinSet},
    time::{Instant, MissedTickBehavior, interval_at},
};
use tracing::{Instrument as _, debug, error, info, info_span, warn};
use vpswatch_common::EndpointStatus;

use crate::{
    app::{
        notify::{Notification, NotificationKind, NotificationTx},
        prober::Prober,
    },
    store::{Endpoint, EndpointId, EndpointStore},
};

/// What a fresh observation means for a stored status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// First observation; persist without alerting.
    Baseline(EndpointStatus),
    WentDown,
    Recovered,
    Unchanged,
}

impl Transition {
    #[must_use]
    pub const fn between(stored: EndpointStatus, reachable: bool) -> Self {
        match (stored, reachable) {
            (EndpointStatus::Unknown, true) => Self::Baseline(EndpointStatus::Up),
            (EndpointStatus::Unknown, false) => Self::Baseline(EndpointStatus::Down),
            (EndpointStatus::Up, false) => Self::WentDown,
            (EndpointStatus::Down, true) => Self::Recovered,
            (EndpointStatus::Up, true) | (EndpointStatus::Down, false) => Self::Unchanged,
        }
    }

    /// Status to persist, if any.
    #[must_use]
    pub const fn new_status(self) -> Option<EndpointStatus> {
        match self {
            Self::Baseline(status) => Some(status),
            Self::WentDown => Some(EndpointStatus::Down),
            Self::Recovered => Some(EndpointStatus::Up),
            Self::Unchanged => None,
        }
    }

    #[must_use]
    pub const fn notification(self) -> Option<NotificationKind> {
        match self {
            Self::WentDown => Some(NotificationKind::WentDown),
            Self::Recovered => Some(NotificationKind::Recovered),
            Self::Baseline(_) | Self::Unchanged => None,
        }
    }
}

/// Counters of one sweep, logged when it finishes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub probed: usize,
    pub up: usize,
    pub down: usize,
    /// Status changes that were persisted.
    pub changed: usize,
    /// Alerts queued for delivery.
    pub notified: usize,
    /// Alerts lost because the delivery queue was full or closed.
    pub dropped: usize,
    /// Endpoints whose check could not complete (store error or probe crash).
    pub failed: usize,
}

#[derive(Debug, Default, Clone, Copy)]
struct CheckOutcome {
    reachable: bool,
    changed: bool,
    notified: bool,
    dropped: bool,
    failed: bool,
}

impl SweepReport {
    fn record(&mut self, outcome: CheckOutcome) {
        self.probed += 1;
        if outcome.reachable {
            self.up += 1;
        } else {
            self.down += 1;
        }
        self.changed += usize::from(outcome.changed);
        self.notified += usize::from(outcome.notified);
        self.dropped += usize::from(outcome.dropped);
        self.failed += usize::from(outcome.failed);
    }
}

/// Runs sweeps over everything in the store.
#[derive(Clone)]
pub struct Monitor {
    store: Arc<dyn EndpointStore>,
    prober: Arc<dyn Prober>,
    notify_tx: NotificationTx,
    permits: Arc<Semaphore>,
}

impl Monitor {
    /// `max_concurrent_probes` is clamped to at least one.
    #[must_use]
    pub fn new(
        store: Arc<dyn EndpointStore>,
        prober: Arc<dyn Prober>,
        notify_tx: NotificationTx,
        max_concurrent_probes: usize,
    ) -> Self {
        Self {
            store,
            prober,
            notify_tx,
            permits: Arc::new(Semaphore::new(max_concurrent_probes.max(1))),
        }
    }

    /// Probes every stored endpoint once.
    ///
    /// A failing endpoint (store error, crashed probe) never aborts the
    /// sweep for the others.
    pub async fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();
        let endpoints = match self.store.list_all().await {
            Ok(endpoints) => endpoints,
            Err(e) => {
                error!(error = ?e, "Failed to load endpoints, skipping sweep");
                return report;
            }
        };

        let mut tasks = JoinSet::new();
        let mut task_endpoints: HashMap<task::Id, EndpointId> = HashMap::new();
        for endpoint in endpoints {
            let id = endpoint.id;
            let this = self.clone();
            let handle = tasks.spawn(async move { this.check(endpoint).await }.in_current_span());
            task_endpoints.insert(handle.id(), id);
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => report.record(outcome),
                Err(e) => {
                    let endpoint_id = task_endpoints.get(&e.id()).copied();
                    error!(?endpoint_id, error = %e, "Endpoint check crashed");
                    report.probed += 1;
                    report.failed += 1;
                }
            }
        }
        report
    }

    async fn check(&self, endpoint: Endpoint) -> CheckOutcome {
        let reachable = {
            let Ok(_permit) = self.permits.acquire().await else {
                warn!(endpoint_id = endpoint.id, "Probe limiter closed");
                return CheckOutcome {
                    failed: true,
                    ..CheckOutcome::default()
                };
            };
            self.prober.probe(&endpoint.host, endpoint.port).await
        };
        let observed_at = Utc::now();
        let mut outcome = CheckOutcome {
            reachable,
            ..CheckOutcome::default()
        };

        let transition = Transition::between(endpoint.status, reachable);
        let Some(new_status) = transition.new_status() else {
            return outcome;
        };

        match self.store.update_status(endpoint.id, new_status).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(
                    endpoint_id = endpoint.id,
                    "Endpoint deleted during sweep, dropping result"
                );
                return outcome;
            }
            Err(e) => {
                error!(endpoint_id = endpoint.id, error = ?e, "Failed to persist status");
                outcome.failed = true;
                return outcome;
            }
        }
        outcome.changed = true;
        info!(
            owner = endpoint.owner,
            endpoint_id = endpoint.id,
            address = %endpoint.address(),
            from = %endpoint.status,
            to = %new_status,
            %observed_at,
            "Endpoint status changed"
        );

        if let Some(kind) = transition.notification() {
            let queued = self.enqueue(&endpoint, kind, observed_at);
            outcome.notified = queued;
            outcome.dropped = !queued;
        }
        outcome
    }

    /// Never waits for queue space.
    fn enqueue(
        &self,
        endpoint: &Endpoint,
        kind: NotificationKind,
        observed_at: DateTime<Utc>,
    ) -> bool {
        let notification = Notification {
            owner: endpoint.owner,
            kind,
            label: endpoint.label.clone(),
            address: endpoint.address(),
            observed_at,
        };
        match self.notify_tx.try_send(notification) {
            Ok(()) => true,
            Err(TrySendError::Full(dropped)) => {
                error!(
                    owner = dropped.owner,
                    endpoint_id = endpoint.id,
                    kind = ?dropped.kind,
                    "Notification queue full, alert dropped"
                );
                false
            }
            Err(TrySendError::Closed(_)) => {
                warn!(endpoint_id = endpoint.id, "Notification queue closed, alert dropped");
                false
            }
        }
    }

    /// Sweeps forever: first after `startup_delay`, then every `interval`.
    /// A sweep that overruns the interval delays the next one instead of
    /// overlapping it.
    ///
    /// # Panics
    ///
    /// Panics if `interval` is zero or `startup_delay` is too large to add to
    /// the current instant. `config::validate` rules out both.
    pub async fn run(self, interval: Duration, startup_delay: Duration) {
        let mut ticker = interval_at(Instant::now() + startup_delay, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            interval_secs = interval.as_secs(),
            startup_delay_secs = startup_delay.as_secs(),
            "Monitor started"
        );
        loop {
            ticker.tick().await;
            let started = Instant::now();
            let report = self.sweep().instrument(info_span!("sweep")).await;
            info!(
                probed = report.probed,
                up = report.up,
                down = report.down,
                changed = report.changed,
                notified = report.notified,
                dropped = report.dropped,
                failed = report.failed,
                elapsed = ?started.elapsed(),
                "Sweep finished"
            );
        }
    }
}
