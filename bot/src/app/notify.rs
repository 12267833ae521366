//! Outgoing alert queue.
//!
//! The monitor pushes [`Notification`]s into a bounded channel; a single
//! dispatcher task drains it and hands the rendered text to the [`Notifier`],
//! spacing deliveries so bursts do not trip the chat service's rate limits.

use alloc::sync::Arc;
use core::time::Duration;

use chrono::{DateTime, Utc};
use tokio::{sync::mpsc, time::sleep};
use tracing::{debug, error, info};
use vpswatch_common::Address;

use crate::{store::OwnerId, transport::Notifier};

/// Alerts waiting for delivery before the monitor starts waiting on the queue.
pub const NOTIFICATION_QUEUE_CAPACITY: usize = 256;

pub type NotificationTx = mpsc::Sender<Notification>;
pub type NotificationRx = mpsc::Receiver<Notification>;

/// Which edge an alert reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    WentDown,
    Recovered,
}

/// One status-change alert for one owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub owner: OwnerId,
    pub kind: NotificationKind,
    pub label: String,
    pub address: Address,
    pub observed_at: DateTime<Utc>,
}

impl Notification {
    /// Chat text of the alert.
    #[must_use]
    pub fn render(&self) -> String {
        let headline = match self.kind {
            NotificationKind::WentDown => "🔴 ENDPOINT DOWN",
            NotificationKind::Recovered => "🟢 ENDPOINT RECOVERED",
        };
        format!(
            "{headline}\nName: {}\nAddress: {}",
            self.label, self.address
        )
    }
}

#[must_use]
pub fn notification_channel() -> (NotificationTx, NotificationRx) {
    mpsc::channel(NOTIFICATION_QUEUE_CAPACITY)
}

/// Delivers queued alerts until every sender is gone.
///
/// Delivery failures are logged and dropped; the next alert is still sent.
pub async fn dispatch_notifications(
    mut rx: NotificationRx,
    notifier: Arc<dyn Notifier>,
    min_interval: Duration,
) {
    while let Some(notification) = rx.recv().await {
        match notifier
            .deliver(notification.owner, &notification.render())
            .await
        {
            Ok(()) => debug!(
                owner = notification.owner,
                address = %notification.address,
                "Notification delivered"
            ),
            Err(e) => error!(
                owner = notification.owner,
                address = %notification.address,
                error = ?e,
                "Failed to deliver notification"
            ),
        }
        if !min_interval.is_zero() {
            sleep(min_interval).await;
        }
    }
    info!("Notification queue closed, dispatcher stopping");
}


#[cfg(test)]
mod tests {
    use tokio::time::Instant;

    use super::{testing::RecordingNotifier, *};

    fn alert(owner: OwnerId, kind: NotificationKind) -> Notification {
        Notification {
            owner,
            kind,
            label: "web".to_owned(),
            address: Address {
                host: "10.0.0.5".to_owned(),
                port: 22,
            },
            observed_at: Utc::now(),
        }
    }

    #[test]
    fn renders_down_and_recovered() {
        assert_eq!(
            alert(1, NotificationKind::WentDown).render(),
            "🔴 ENDPOINT DOWN\nName: web\nAddress: 10.0.0.5:22"
        );
        assert_eq!(
            alert(1, NotificationKind::Recovered).render(),
            "🟢 ENDPOINT RECOVERED\nName: web\nAddress: 10.0.0.5:22"
        );
    }

    #[tokio::test]
    async fn failed_delivery_does_not_stop_dispatcher() {
        let notifier = Arc::new(RecordingNotifier::default());
        notifier.failing.lock().unwrap().push(2);
        let (tx, rx) = notification_channel();

        tx.send(alert(1, NotificationKind::WentDown)).await.unwrap();
        tx.send(alert(2, NotificationKind::WentDown)).await.unwrap();
        tx.send(alert(3, NotificationKind::Recovered)).await.unwrap();
        drop(tx);

        dispatch_notifications(rx, notifier.clone(), Duration::ZERO).await;

        let delivered = notifier.delivered.lock().unwrap();
        let owners: Vec<_> = delivered.iter().map(|&(owner, _)| owner).collect();
        assert_eq!(owners, vec![1, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn deliveries_are_paced() {
        let notifier = Arc::new(RecordingNotifier::default());
        let (tx, rx) = notification_channel();
        for owner in 0..3 {
            tx.send(alert(owner, NotificationKind::WentDown)).await.unwrap();
        }
        drop(tx);

        let started = Instant::now();
        dispatch_notifications(rx, notifier.clone(), Duration::from_millis(50)).await;

        assert_eq!(notifier.delivered.lock().unwrap().len(), 3);
        assert!(started.elapsed() >= Duration::from_millis(150));
    }
}
