//! Chat transport abstractions.
//!
//! The conversation logic only sees [`Inbound`] events and produces [`Reply`]
//! values; the monitor only needs a [`Notifier`]. How messages travel is up to
//! the concrete transport in [`telegram`].

pub mod telegram;

use core::mem;

use async_trait::async_trait;
use thiserror::Error as ThisError;

use crate::store::OwnerId;

/// Commands understood regardless of the conversation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Start,
    Cancel,
    Add,
    List,
    Delete,
    Ping,
    Help,
}

impl Command {
    /// Menu actions, in keyboard order.
    pub const MENU: [Self; 5] = [Self::Add, Self::List, Self::Delete, Self::Ping, Self::Help];

    /// Text of the menu button for this command, if it has one.
    #[must_use]
    pub const fn menu_label(self) -> Option<&'static str> {
        match self {
            Self::Add => Some("➕ Add"),
            Self::List => Some("📋 List"),
            Self::Delete => Some("🗑️ Delete"),
            Self::Ping => Some("📡 Ping"),
            Self::Help => Some("❓ Help"),
            Self::Start | Self::Cancel => None,
        }
    }

    /// Matches a menu button text exactly.
    #[must_use]
    pub fn from_menu_label(text: &str) -> Option<Self> {
        Self::MENU
            .into_iter()
            .find(|cmd| cmd.menu_label() == Some(text))
    }

    /// Parses `/name` or `/name@botname`, ignoring anything after whitespace.
    #[must_use]
    pub fn from_slash(text: &str) -> Option<Self> {
        let word = text.strip_prefix('/')?.split_whitespace().next()?;
        let name = word.split_once('@').map_or(word, |(name, _bot)| name);
        Some(match name {
            "start" => Self::Start,
            "cancel" => Self::Cancel,
            "add" => Self::Add,
            "list" => Self::List,
            "delete" => Self::Delete,
            "ping" => Self::Ping,
            "help" => Self::Help,
            _ => return None,
        })
    }

    /// Recognizes either form of a command.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        Self::from_menu_label(text).or_else(|| Self::from_slash(text))
    }
}

/// Something a user sent us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Command { owner: OwnerId, command: Command },
    Text { owner: OwnerId, text: String },
    /// Payload of an inline button press.
    Callback { owner: OwnerId, data: String },
}

impl Inbound {
    /// Classifies a raw text message.
    #[must_use]
    pub fn from_text(owner: OwnerId, text: &str) -> Self {
        match Command::parse(text) {
            Some(command) => Self::Command { owner, command },
            None => Self::Text {
                owner,
                text: text.to_owned(),
            },
        }
    }

    #[must_use]
    pub const fn owner(&self) -> OwnerId {
        match *self {
            Self::Command { owner, .. } | Self::Text { owner, .. } | Self::Callback { owner, .. } => {
                owner
            }
        }
    }
}

/// A button attached to a single message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineButton {
    pub text: String,
    pub data: String,
}

/// Extra UI attached to a reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Markup {
    #[default]
    None,
    /// The persistent menu keyboard.
    Menu,
    Inline(Vec<InlineButton>),
}

/// One outgoing message in answer to an [`Inbound`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub markup: Markup,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            markup: Markup::None,
        }
    }

    #[must_use]
    pub fn with_markup(mut self, markup: Markup) -> Self {
        self.markup = markup;
        self
    }

    /// Splits the text into messages of at most `limit` UTF-16 units.
    /// The markup goes with the last one.
    #[must_use]
    pub fn into_chunks(self, limit: usize) -> Vec<Self> {
        let mut chunks: Vec<Self> = split_text(&self.text, limit)
            .into_iter()
            .map(Self::text)
            .collect();
        if let Some(last) = chunks.last_mut() {
            last.markup = self.markup;
        }
        chunks
    }
}

/// Byte offset of the longest prefix of `line` within `limit` UTF-16 units,
/// never less than one character.
fn prefix_end(line: &str, limit: usize) -> usize {
    let mut units = 0;
    for (index, ch) in line.char_indices() {
        units += ch.len_utf16();
        if units > limit {
            return if index == 0 { ch.len_utf8() } else { index };
        }
    }
    line.len()
}

/// Breaks `text` at line ends so no piece exceeds `limit` UTF-16 units.
/// A single overlong line is cut at a character boundary.
#[must_use]
pub fn split_text(text: &str, limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_units = 0;
    for mut line in text.split('\n') {
        loop {
            let line_units = line.encode_utf16().count();
            let separator = usize::from(!current.is_empty());
            if current_units + separator + line_units <= limit {
                if separator == 1 {
                    current.push('\n');
                }
                current.push_str(line);
                current_units += separator + line_units;
                break;
            }
            if !current.is_empty() {
                chunks.push(mem::take(&mut current));
                current_units = 0;
                continue;
            }
            let (head, tail) = line.split_at(prefix_end(line, limit));
            chunks.push(head.to_owned());
            line = tail;
        }
    }
    if !current.is_empty() || chunks.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Failure to hand a message to the chat service.
#[derive(Debug, ThisError)]
pub enum NotifyError {
    #[error("Failed to deliver message to {owner}")]
    Delivery {
        owner: OwnerId,
        #[source]
        source: eyre::Report,
    },
}

/// Delivers plain text to a user. Fire and forget from the caller's view.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the message could not be handed over.
    async fn deliver(&self, owner: OwnerId, text: &str) -> Result<(), NotifyError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn menu_labels_round_trip() {
        for cmd in Command::MENU {
            let label = cmd.menu_label().unwrap();
            assert_eq!(Command::parse(label), Some(cmd));
        }
    }

    #[test]
    fn slash_commands_parse() {
        assert_eq!(Command::parse("/start"), Some(Command::Start));
        assert_eq!(Command::parse("/cancel"), Some(Command::Cancel));
        assert_eq!(Command::parse("/ping@vpswatch_bot"), Some(Command::Ping));
        assert_eq!(Command::parse("/add extra words"), Some(Command::Add));
        assert_eq!(Command::parse("/unknown"), None);
        assert_eq!(Command::parse("/"), None);
    }

    #[test]
    fn menu_labels_need_exact_match() {
        assert_eq!(Command::parse("Add"), None);
        assert_eq!(Command::parse("➕ add"), None);
        assert_eq!(Command::parse("start"), None);
    }

    #[test]
    fn short_text_is_one_chunk() {
        assert_eq!(split_text("a\nb", 10), vec!["a\nb".to_owned()]);
        assert_eq!(split_text("", 10), vec![String::new()]);
    }

    #[test]
    fn long_text_breaks_at_line_ends() {
        let lines: Vec<String> = (0..300)
            .map(|i| format!("{i}. web-{i} (10.0.{i}.1:22) - 🟢 UP"))
            .collect();
        let text = lines.join("\n");

        let chunks = split_text(&text, 4096);

        assert!(chunks.len() > 1, "{} chunks", chunks.len());
        for chunk in &chunks {
            assert!(chunk.encode_utf16().count() <= 4096);
        }
        assert_eq!(chunks.join("\n"), text);
    }

    #[test]
    fn overlong_line_is_cut_on_char_boundary() {
        let chunks = split_text(&"é".repeat(10), 4);
        assert_eq!(chunks, vec!["éééé", "éééé", "éé"]);
        // Surrogate pairs count twice.
        assert_eq!(split_text("🟢🟢🟢", 4), vec!["🟢🟢", "🟢"]);
    }

    #[test]
    fn markup_rides_on_last_chunk() {
        let reply = Reply::text("one\ntwo\nthree").with_markup(Markup::Menu);
        let chunks = reply.into_chunks(7);
        assert_eq!(
            chunks.iter().map(|r| r.text.as_str()).collect::<Vec<_>>(),
            vec!["one\ntwo", "three"]
        );
        assert_eq!(chunks[0].markup, Markup::None);
        assert_eq!(chunks[1].markup, Markup::Menu);
    }

    #[test]
    fn free_text_is_text() {
        assert_eq!(
            Inbound::from_text(5, "10.0.0.5 web"),
            Inbound::Text {
                owner: 5,
                text: "10.0.0.5 web".to_owned()
            }
        );
        assert_eq!(
            Inbound::from_text(5, "📋 List"),
            Inbound::Command {
                owner: 5,
                command: Command::List
            }
        );
    }
}
