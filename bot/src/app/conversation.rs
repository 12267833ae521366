//! Per-owner chat state machine.
//!
//! Every inbound event is turned into an ordered list of replies. The only
//! state kept between events is whether the owner's next free text is an add
//! batch or a ping batch.

use alloc::sync::Arc;
use core::fmt::Write as _;
use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use futures::{StreamExt as _, stream};
use thiserror::Error as ThisError;
use tracing::{debug, error, info};
use vpswatch_common::{Address, EndpointStatus, is_valid_host, parse_address};

use crate::{
    app::prober::Prober,
    store::{Endpoint, EndpointId, EndpointStore, OwnerId, StoreError},
    transport::{Command, Inbound, InlineButton, Markup, Reply},
};

/// Longest accepted label, in characters.
pub const MAX_LABEL_CHARS: usize = 64;

/// Prefix of inline button payloads that delete an endpoint.
pub const DELETE_CALLBACK_PREFIX: &str = "delete:";

const GREETING: &str = "👋 Hi! I watch your servers and tell you when one stops \
accepting connections or comes back.\nUse the menu below to get started.";

const HELP: &str = "Available commands:\n\
➕ Add (/add) - register endpoints, one <address> [label] per line\n\
📋 List (/list) - show your endpoints and their status\n\
🗑️ Delete (/delete) - remove an endpoint\n\
📡 Ping (/ping) - check endpoints now, by id, host or any address\n\
❓ Help (/help) - this message\n\
/cancel - abort a pending add or ping\n\n\
Addresses look like host or host:port; the port defaults to {port}.";

const ADD_PROMPT: &str = "Send the endpoints to add, one per line:\n\
<address> [label]\n\nExample:\n10.0.0.5 web\ndb.example.com:5432 database";

const PING_PROMPT: &str = "Send the endpoints to check, one per line.\n\
Use an id from the list, a registered host or any address.";

const UNRECOGNIZED: &str = "❓ Unknown command. Use the menu or /help.";
const STORE_UNAVAILABLE: &str = "⚠️ Storage is temporarily unavailable, please try again later.";
const NOTHING_TO_PROCESS: &str = "Nothing to process. Send at least one non-empty line.";

/// What the next free-text message from an owner means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PendingMode {
    #[default]
    None,
    AwaitingAdd,
    AwaitingPing,
}

/// Why one line of an add batch was not registered.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum AddLineError {
    #[error("{line} (invalid: {reason})")]
    Invalid { line: String, reason: &'static str },
    #[error("{host} (already registered)")]
    Duplicate { host: String },
    #[error("{host} (storage unavailable)")]
    Unavailable { host: String },
}

/// Result for one line of a ping batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PingOutcome {
    Probed {
        label: String,
        address: Address,
        reachable: bool,
        /// Not a stored endpoint.
        ad_hoc: bool,
    },
    /// Numeric id the owner does not have.
    NotFound(String),
    Unavailable(String),
}

enum PingTarget {
    Probe {
        label: String,
        address: Address,
        ad_hoc: bool,
    },
    Done(PingOutcome),
}

/// Splits an add line into its address and label.
///
/// # Errors
///
/// Returns [`AddLineError::Invalid`] for an implausible host or an overlong label.
pub fn parse_add_line(line: &str, default_port: u16) -> Result<(Address, String), AddLineError> {
    let line = line.trim();
    let (token, label) = line
        .split_once(char::is_whitespace)
        .map_or((line, ""), |(token, rest)| (token, rest.trim()));
    let address = parse_address(token, default_port);
    if !is_valid_host(&address.host) {
        return Err(AddLineError::Invalid {
            line: line.to_owned(),
            reason: "bad host",
        });
    }
    if label.chars().count() > MAX_LABEL_CHARS {
        return Err(AddLineError::Invalid {
            line: line.to_owned(),
            reason: "label too long",
        });
    }
    let label = if label.is_empty() {
        address.host.clone()
    } else {
        label.to_owned()
    };
    Ok((address, label))
}

fn non_blank_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines().map(str::trim).filter(|l| !l.is_empty())
}

fn status_line(label: &str, address: &Address, status: EndpointStatus) -> String {
    format!("{label} ({address}) - {} {status}", status.marker())
}

/// Tunables of the chat handlers.
#[derive(Debug, Clone, Copy)]
pub struct ConversationSettings {
    pub default_port: u16,
    pub ping_concurrency: usize,
}

/// Chat front end over the store and the prober.
pub struct Conversation {
    store: Arc<dyn EndpointStore>,
    prober: Arc<dyn Prober>,
    settings: ConversationSettings,
    sessions: Mutex<HashMap<OwnerId, PendingMode>>,
}

impl Conversation {
    #[must_use]
    pub fn new(
        store: Arc<dyn EndpointStore>,
        prober: Arc<dyn Prober>,
        settings: ConversationSettings,
    ) -> Self {
        Self {
            store,
            prober,
            settings,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<OwnerId, PendingMode>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current pending mode of an owner.
    #[must_use]
    pub fn mode(&self, owner: OwnerId) -> PendingMode {
        self.sessions().get(&owner).copied().unwrap_or_default()
    }

    fn set_mode(&self, owner: OwnerId, mode: PendingMode) {
        self.sessions().insert(owner, mode);
    }

    fn take_mode(&self, owner: OwnerId) -> PendingMode {
        self.sessions().remove(&owner).unwrap_or_default()
    }

    /// Processes one event. Events of the same owner must not be handled concurrently.
    pub async fn handle(&self, inbound: Inbound) -> Vec<Reply> {
        match inbound {
            Inbound::Command { owner, command } => self.handle_command(owner, command).await,
            Inbound::Text { owner, text } => vec![self.handle_text(owner, &text).await],
            Inbound::Callback { owner, data } => vec![self.handle_callback(owner, &data).await],
        }
    }

    async fn handle_command(&self, owner: OwnerId, command: Command) -> Vec<Reply> {
        let previous = self.take_mode(owner);
        debug!(owner, ?command, ?previous, "Handling command");
        match command {
            Command::Start => vec![Reply::text(GREETING).with_markup(Markup::Menu)],
            Command::Cancel => vec![Reply::text(if previous == PendingMode::None {
                "Nothing to cancel."
            } else {
                "Cancelled."
            })],
            Command::Add => {
                self.set_mode(owner, PendingMode::AwaitingAdd);
                vec![Reply::text(ADD_PROMPT)]
            }
            Command::Ping => {
                self.set_mode(owner, PendingMode::AwaitingPing);
                vec![Reply::text(PING_PROMPT)]
            }
            Command::List => vec![self.list(owner).await],
            Command::Delete => vec![self.delete_menu(owner).await],
            Command::Help => vec![Reply::text(
                HELP.replace("{port}", &self.settings.default_port.to_string()),
            )],
        }
    }

    async fn handle_text(&self, owner: OwnerId, text: &str) -> Reply {
        match self.take_mode(owner) {
            PendingMode::AwaitingAdd => self.add_batch(owner, text).await,
            PendingMode::AwaitingPing => self.ping_batch(owner, text).await,
            PendingMode::None => Reply::text(UNRECOGNIZED),
        }
    }

    async fn add_batch(&self, owner: OwnerId, text: &str) -> Reply {
        let mut added = Vec::new();
        let mut failed = Vec::new();
        for line in non_blank_lines(text) {
            match self.add_line(owner, line).await {
                Ok(endpoint) => added.push(endpoint),
                Err(e) => failed.push(e),
            }
        }
        if added.is_empty() && failed.is_empty() {
            return Reply::text(NOTHING_TO_PROCESS);
        }
        info!(owner, added = added.len(), failed = failed.len(), "Processed add batch");

        // Shown to the user only; the first sweep records the baseline.
        let prober = &self.prober;
        let probed: Vec<(Endpoint, bool)> = stream::iter(added)
            .map(|endpoint| async move {
                let up = prober.probe(&endpoint.host, endpoint.port).await;
                (endpoint, up)
            })
            .buffered(self.settings.ping_concurrency.max(1))
            .collect()
            .await;

        let mut out = String::new();
        if !probed.is_empty() {
            out.push_str("✅ Added:");
            for &(ref endpoint, up) in &probed {
                let line = status_line(
                    &endpoint.label,
                    &endpoint.address(),
                    EndpointStatus::from_reachable(up),
                );
                let _ = write!(out, "\n- {line} ID: {}", endpoint.id);
            }
        }
        if !failed.is_empty() {
            if !out.is_empty() {
                out.push_str("\n\n");
            }
            out.push_str("⚠️ Failed to add:");
            for e in &failed {
                let _ = write!(out, "\n- {e}");
            }
        }
        Reply::text(out)
    }

    async fn add_line(&self, owner: OwnerId, line: &str) -> Result<Endpoint, AddLineError> {
        let (address, label) = parse_add_line(line, self.settings.default_port)?;
        self.store
            .insert(owner, &address.host, address.port, &label)
            .await
            .map_err(|e| match e {
                StoreError::Duplicate { host } => AddLineError::Duplicate { host },
                StoreError::Unavailable(ref report) => {
                    error!(owner, host = %address.host, error = ?report, "Failed to store endpoint");
                    AddLineError::Unavailable {
                        host: address.host.clone(),
                    }
                }
            })
    }

    async fn resolve_ping_target(&self, owner: OwnerId, line: &str) -> PingTarget {
        let stored = if line.bytes().all(|b| b.is_ascii_digit()) {
            let Ok(id) = line.parse::<EndpointId>() else {
                return PingTarget::Done(PingOutcome::NotFound(line.to_owned()));
            };
            match self.store.find_by_owner_and_id(owner, id).await {
                Ok(Some(endpoint)) => Ok(Some(endpoint)),
                Ok(None) => return PingTarget::Done(PingOutcome::NotFound(line.to_owned())),
                Err(e) => Err(e),
            }
        } else {
            self.store.find_by_owner_and_host(owner, line).await
        };

        match stored {
            Ok(Some(endpoint)) => PingTarget::Probe {
                address: endpoint.address(),
                label: endpoint.label,
                ad_hoc: false,
            },
            Ok(None) => {
                let address = parse_address(line, self.settings.default_port);
                PingTarget::Probe {
                    label: address.host.clone(),
                    address,
                    ad_hoc: true,
                }
            }
            Err(e) => {
                error!(owner, line, error = ?e, "Failed to look up ping target");
                PingTarget::Done(PingOutcome::Unavailable(line.to_owned()))
            }
        }
    }

    /// Resolves and probes every line, keeping input order.
    pub async fn ping(&self, owner: OwnerId, text: &str) -> Vec<PingOutcome> {
        let mut targets = Vec::new();
        for line in non_blank_lines(text) {
            targets.push(self.resolve_ping_target(owner, line).await);
        }
        let prober = &self.prober;
        stream::iter(targets)
            .map(|target| async move {
                match target {
                    PingTarget::Probe {
                        label,
                        address,
                        ad_hoc,
                    } => {
                        let reachable = prober.probe(&address.host, address.port).await;
                        PingOutcome::Probed {
                            label,
                            address,
                            reachable,
                            ad_hoc,
                        }
                    }
                    PingTarget::Done(outcome) => outcome,
                }
            })
            .buffered(self.settings.ping_concurrency.max(1))
            .collect()
            .await
    }

    async fn ping_batch(&self, owner: OwnerId, text: &str) -> Reply {
        let outcomes = self.ping(owner, text).await;
        if outcomes.is_empty() {
            return Reply::text(NOTHING_TO_PROCESS);
        }

        let mut results = String::new();
        let mut not_found = Vec::new();
        let mut unavailable = Vec::new();
        for outcome in outcomes {
            match outcome {
                PingOutcome::Probed {
                    label,
                    address,
                    reachable,
                    ad_hoc,
                } => {
                    let line =
                        status_line(&label, &address, EndpointStatus::from_reachable(reachable));
                    let suffix = if ad_hoc { " (ad hoc)" } else { "" };
                    let _ = write!(results, "\n- {line}{suffix}");
                }
                PingOutcome::NotFound(line) => not_found.push(line),
                PingOutcome::Unavailable(line) => unavailable.push(line),
            }
        }

        let mut sections = Vec::new();
        if !results.is_empty() {
            sections.push(format!("📡 Ping results:{results}"));
        }
        if !not_found.is_empty() {
            sections.push(format!("⚠️ Not found: {}", not_found.join(", ")));
        }
        if !unavailable.is_empty() {
            sections.push(format!(
                "⚠️ Storage unavailable for: {}",
                unavailable.join(", ")
            ));
        }
        Reply::text(sections.join("\n\n"))
    }

    async fn list(&self, owner: OwnerId) -> Reply {
        let endpoints = match self.store.list_by_owner(owner).await {
            Ok(endpoints) => endpoints,
            Err(e) => {
                error!(owner, error = ?e, "Failed to list endpoints");
                return Reply::text(STORE_UNAVAILABLE);
            }
        };
        if endpoints.is_empty() {
            return Reply::text("You have no endpoints yet. Use ➕ Add to register one.");
        }
        let mut out = String::from("📋 Your endpoints:");
        for (index, endpoint) in endpoints.iter().enumerate() {
            let _ = write!(
                out,
                "\n{}. {} ID: {}",
                index + 1,
                status_line(&endpoint.label, &endpoint.address(), endpoint.status),
                endpoint.id
            );
        }
        Reply::text(out)
    }

    async fn delete_menu(&self, owner: OwnerId) -> Reply {
        let endpoints = match self.store.list_by_owner(owner).await {
            Ok(endpoints) => endpoints,
            Err(e) => {
                error!(owner, error = ?e, "Failed to list endpoints");
                return Reply::text(STORE_UNAVAILABLE);
            }
        };
        if endpoints.is_empty() {
            return Reply::text("You have no endpoints to delete.");
        }
        let buttons = endpoints
            .iter()
            .map(|endpoint| InlineButton {
                text: format!("❌ {} ({})", endpoint.label, endpoint.address()),
                data: format!("{DELETE_CALLBACK_PREFIX}{}", endpoint.id),
            })
            .collect();
        Reply::text("Choose an endpoint to delete:").with_markup(Markup::Inline(buttons))
    }

    async fn handle_callback(&self, owner: OwnerId, data: &str) -> Reply {
        let Some(id) = data
            .strip_prefix(DELETE_CALLBACK_PREFIX)
            .and_then(|raw| raw.parse::<EndpointId>().ok())
        else {
            debug!(owner, data, "Unknown callback data");
            return Reply::text("Not found.");
        };
        match self.store.delete(owner, id).await {
            Ok(true) => {
                info!(owner, endpoint_id = id, "Endpoint deleted");
                Reply::text(format!("🗑️ Endpoint {id} deleted."))
            }
            Ok(false) => Reply::text(format!("Endpoint {id} not found.")),
            Err(e) => {
                error!(owner, endpoint_id = id, error = ?e, "Failed to delete endpoint");
                Reply::text(STORE_UNAVAILABLE)
            }
        }
    }
}
