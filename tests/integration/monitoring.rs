//! Add an endpoint through the chat handlers, then watch it go down.

use alloc::sync::Arc;
use core::time::Duration;
use std::sync::Mutex;

use async_trait::async_trait;
use vpswatch_bot::{
    app::{
        Conversation, ConversationSettings, Monitor, TcpProber, dispatch_notifications,
        notification_channel,
    },
    store::{EndpointStore as _, OwnerId, SqliteStore},
    transport::{Command, Inbound, Notifier, NotifyError},
};
use vpswatch_common::EndpointStatus;

use crate::common::open_port;

const OWNER: OwnerId = 1001;

#[derive(Default)]
struct Inbox(Mutex<Vec<(OwnerId, String)>>);

#[async_trait]
impl Notifier for Inbox {
    async fn deliver(&self, owner: OwnerId, text: &str) -> Result<(), NotifyError> {
        self.0.lock().unwrap().push((owner, text.to_owned()));
        Ok(())
    }
}

#[tokio::test]
async fn endpoint_going_down_is_reported_once() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteStore::open(&dir.path().join("vpswatch.db")).await.unwrap());
    let prober = Arc::new(TcpProber::new(Duration::from_secs(1)));
    let conversation = Conversation::new(
        store.clone(),
        prober.clone(),
        ConversationSettings {
            default_port: 22,
            ping_concurrency: 4,
        },
    );
    let (listener, port) = open_port().await;

    conversation
        .handle(Inbound::Command {
            owner: OWNER,
            command: Command::Add,
        })
        .await;
    let replies = conversation
        .handle(Inbound::Text {
            owner: OWNER,
            text: format!("127.0.0.1:{port} local"),
        })
        .await;
    let reply = &replies.first().unwrap().text;
    assert!(
        reply.contains(&format!("local (127.0.0.1:{port}) - 🟢 UP")),
        "{reply}"
    );

    let (tx, rx) = notification_channel();
    let monitor = Monitor::new(store.clone(), prober, tx, 4);

    // Baseline, silent.
    let report = monitor.sweep().await;
    assert_eq!(report.up, 1);
    assert_eq!(report.notified, 0);

    drop(listener);
    let report = monitor.sweep().await;
    assert_eq!(report.down, 1);
    assert_eq!(report.notified, 1);

    // Still down, no repeat.
    assert_eq!(monitor.sweep().await.notified, 0);

    let endpoint = store.list_by_owner(OWNER).await.unwrap().remove(0);
    assert_eq!(endpoint.status, EndpointStatus::Down);

    let inbox = Arc::new(Inbox::default());
    drop(monitor);
    dispatch_notifications(rx, inbox.clone(), Duration::ZERO).await;

    let delivered = inbox.0.lock().unwrap();
    assert_eq!(
        *delivered,
        vec![(
            OWNER,
            format!("🔴 ENDPOINT DOWN\nName: local\nAddress: 127.0.0.1:{port}")
        )]
    );
}
