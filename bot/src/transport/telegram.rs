//! Telegram transport over `teloxide`: long polling in, `sendMessage` out.
//!
//! Updates are routed to one worker task per chat so that a chat's events are
//! handled strictly in order while different chats proceed in parallel.
//! Workers that have been quiet for a while are dropped and restarted on demand.

use alloc::sync::Arc;
use core::time::Duration;
use std::collections::HashMap;

use async_trait::async_trait;
use eyre::WrapErr as _;
use secrecy::{ExposeSecret as _, SecretString};
use teloxide::{
    RequestError, net,
    prelude::*,
    types::{
        AllowedUpdate, ChatId, InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton,
        KeyboardMarkup, ReplyMarkup, Update, UpdateKind,
    },
};
use thiserror::Error as ThisError;
use tokio::{
    sync::mpsc,
    time::{Instant, sleep},
};
use tracing::{Instrument as _, debug, info, warn};
use url::Url;

use crate::{
    app::Conversation,
    config::TelegramConfig,
    store::OwnerId,
    transport::{Command, Inbound, Markup, Notifier, NotifyError, Reply},
};

/// Pause after a failed `getUpdates` before polling again.
pub const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Telegram's limit on the text of one message, in UTF-16 units.
pub const MAX_MESSAGE_LEN: usize = 4096;

/// A chat worker with nothing to do for this long is dropped.
pub const WORKER_IDLE_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Extra time the HTTP client grants a long poll beyond its own timeout.
const POLL_GRACE: Duration = Duration::from_secs(10);

const ALLOWED_UPDATES: [AllowedUpdate; 2] =
    [AllowedUpdate::Message, AllowedUpdate::CallbackQuery];

/// A failed Bot API call, with the token scrubbed from the description.
#[derive(Debug, ThisError)]
#[error("Telegram {method} failed: {detail}")]
pub struct TelegramError {
    method: &'static str,
    detail: String,
}

/// The event an update represents, if it is one we handle.
#[must_use]
pub fn to_inbound(update: &Update) -> Option<Inbound> {
    match update.kind {
        UpdateKind::Message(ref message) => {
            Some(Inbound::from_text(message.chat.id.0, message.text()?))
        }
        UpdateKind::CallbackQuery(ref query) => {
            let owner = match query.message {
                Some(ref message) => message.chat().id.0,
                None => i64::try_from(query.from.id.0).ok()?,
            };
            Some(Inbound::Callback {
                owner,
                data: query.data.clone()?,
            })
        }
        _ => None,
    }
}

/// The persistent menu, two buttons per row.
fn menu_keyboard() -> KeyboardMarkup {
    KeyboardMarkup::new(Command::MENU.chunks(2).map(|row| {
        row.iter()
            .filter_map(|cmd| cmd.menu_label())
            .map(KeyboardButton::new)
            .collect::<Vec<_>>()
    }))
    .resize_keyboard()
}

/// Telegram `reply_markup` for a reply, if it has any.
fn reply_markup(markup: &Markup) -> Option<ReplyMarkup> {
    match *markup {
        Markup::None => None,
        Markup::Menu => Some(ReplyMarkup::Keyboard(menu_keyboard())),
        Markup::Inline(ref buttons) => Some(ReplyMarkup::InlineKeyboard(InlineKeyboardMarkup::new(
            buttons
                .iter()
                .map(|b| [InlineKeyboardButton::callback(b.text.clone(), b.data.clone())]),
        ))),
    }
}

/// Bot API client plus the settings the polling loop needs.
pub struct TelegramClient {
    bot: Bot,
    token: Arc<SecretString>,
    poll_timeout_seconds: u32,
}

impl TelegramClient {
    /// # Errors
    ///
    /// Returns an error if the API URL is invalid or the HTTP client cannot be built.
    pub fn new(config: &TelegramConfig) -> eyre::Result<Self> {
        let poll_timeout = Duration::from_secs(config.poll_timeout_seconds);
        let http = net::default_reqwest_settings()
            // Long polls must be allowed to outlive their own timeout.
            .timeout(poll_timeout.saturating_add(POLL_GRACE))
            .build()
            .wrap_err("Failed to build HTTP client for Telegram")?;
        let api_url = Url::parse(&config.api_base).wrap_err(format!(
            "Invalid Telegram API URL: {}",
            config.api_base
        ))?;
        let poll_timeout_seconds = u32::try_from(config.poll_timeout_seconds)
            .wrap_err("telegram.poll_timeout_seconds is out of range")?;
        Ok(Self {
            bot: Bot::with_client(config.bot_token.expose_secret(), http).set_api_url(api_url),
            token: config.bot_token.clone(),
            poll_timeout_seconds,
        })
    }

    fn error(&self, method: &'static str, e: &RequestError) -> TelegramError {
        TelegramError {
            method,
            detail: e
                .to_string()
                .replace(self.token.expose_secret(), "<redacted>"),
        }
    }

    /// Long-polls for updates starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or Telegram rejects it.
    pub async fn get_updates(&self, offset: Option<i32>) -> Result<Vec<Update>, TelegramError> {
        let mut request = self
            .bot
            .get_updates()
            .timeout(self.poll_timeout_seconds)
            .allowed_updates(ALLOWED_UPDATES);
        if let Some(offset) = offset {
            request = request.offset(offset);
        }
        request.await.map_err(|e| self.error("getUpdates", &e))
    }

    /// Sends one reply as plain text, split into several messages if it is too long.
    ///
    /// # Errors
    ///
    /// Returns an error if a request fails or Telegram rejects it. Parts sent
    /// before the failure stay sent.
    pub async fn send_reply(&self, chat_id: OwnerId, reply: Reply) -> Result<(), TelegramError> {
        for chunk in reply.into_chunks(MAX_MESSAGE_LEN) {
            let mut request = self.bot.send_message(ChatId(chat_id), chunk.text);
            if let Some(markup) = reply_markup(&chunk.markup) {
                request = request.reply_markup(markup);
            }
            request.await.map_err(|e| self.error("sendMessage", &e))?;
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramClient {
    async fn deliver(&self, owner: OwnerId, text: &str) -> Result<(), NotifyError> {
        self.send_reply(owner, Reply::text(text))
            .await
            .map_err(|e| NotifyError::Delivery {
                owner,
                source: e.into(),
            })
    }
}

struct Worker {
    tx: mpsc::UnboundedSender<Inbound>,
    last_seen: Instant,
}

/// One sequential worker per chat, started on the chat's first event.
struct ChatWorkers<H> {
    workers: HashMap<OwnerId, Worker>,
    handler: H,
    idle_timeout: Duration,
}

impl<H, F> ChatWorkers<H>
where
    H: Fn(Inbound) -> F + Clone + Send + 'static,
    F: Future<Output = ()> + Send + 'static,
{
    fn new(handler: H, idle_timeout: Duration) -> Self {
        Self {
            workers: HashMap::new(),
            handler,
            idle_timeout,
        }
    }

    /// Hands an event to its chat's worker, starting one if needed.
    fn route(&mut self, inbound: Inbound) {
        let owner = inbound.owner();
        let now = Instant::now();
        let inbound = match self.workers.get_mut(&owner) {
            Some(worker) => match worker.tx.send(inbound) {
                Ok(()) => {
                    worker.last_seen = now;
                    return;
                }
                // Worker is gone (it panicked); start a fresh one.
                Err(mpsc::error::SendError(inbound)) => inbound,
            },
            None => inbound,
        };

        let (tx, mut rx) = mpsc::unbounded_channel();
        let handler = self.handler.clone();
        tokio::spawn(
            async move {
                while let Some(inbound) = rx.recv().await {
                    handler(inbound).await;
                }
                debug!(owner, "Chat worker stopped");
            }
            .in_current_span(),
        );
        if tx.send(inbound).is_err() {
            warn!(owner, "Chat worker exited before its first event");
        }
        self.workers.insert(owner, Worker { tx, last_seen: now });
    }

    /// Forgets crashed and idle workers. An idle worker finishes whatever is
    /// still queued and then exits.
    fn reap(&mut self) {
        let idle_timeout = self.idle_timeout;
        self.workers.retain(|_, worker| {
            !worker.tx.is_closed() && worker.last_seen.elapsed() < idle_timeout
        });
    }

    fn len(&self) -> usize {
        self.workers.len()
    }
}

/// Polls Telegram forever and feeds updates to the chat workers.
pub async fn run_polling(client: Arc<TelegramClient>, conversation: Arc<Conversation>) {
    let handler = {
        let client = client.clone();
        move |inbound: Inbound| {
            let client = client.clone();
            let conversation = conversation.clone();
            async move {
                let owner = inbound.owner();
                for reply in conversation.handle(inbound).await {
                    if let Err(e) = client.send_reply(owner, reply).await {
                        warn!(owner, error = %e, "Failed to send reply");
                    }
                }
            }
        }
    };
    let mut workers = ChatWorkers::new(handler, WORKER_IDLE_TIMEOUT);
    let mut offset = None;
    info!("Polling Telegram for updates");
    loop {
        let updates = match client.get_updates(offset).await {
            Ok(updates) => updates,
            Err(e) => {
                warn!(
                    error = %e,
                    "Failed to fetch updates, retrying in {}s",
                    POLL_ERROR_BACKOFF.as_secs()
                );
                sleep(POLL_ERROR_BACKOFF).await;
                continue;
            }
        };

        for update in updates {
            match i32::try_from(update.id.0).ok().and_then(|id| id.checked_add(1)) {
                Some(next) => offset = Some(next),
                None => warn!(update_id = update.id.0, "Update id out of range"),
            }
            if let UpdateKind::CallbackQuery(ref query) = update.kind {
                let client = client.clone();
                let id = query.id.clone();
                tokio::spawn(
                    async move {
                        if let Err(e) = client.bot.answer_callback_query(id).await {
                            let e = client.error("answerCallbackQuery", &e);
                            debug!(error = %e, "Failed to answer callback query");
                        }
                    }
                    .in_current_span(),
                );
            }
            match to_inbound(&update) {
                Some(inbound) => workers.route(inbound),
                None => debug!(update_id = update.id.0, "Ignoring update"),
            }
        }
        workers.reap();
        debug!(workers = workers.len(), "Chat workers alive");
    }
}
