pub mod conversation;
pub mod monitor;
pub mod notify;
pub mod prober;
mod startup;
mod state;

// Re-export a curated surface for the CLI and integration tests
pub use conversation::{Conversation, ConversationSettings, PendingMode};
pub use monitor::{Monitor, SweepReport, Transition};
pub use notify::{
    Notification, NotificationKind, NotificationRx, NotificationTx, dispatch_notifications,
    notification_channel,
};
pub use prober::{Prober, TcpProber};
pub(crate) use startup::start;
pub use startup::shutdown_signal;
pub use state::{AppState, initialize_state};
