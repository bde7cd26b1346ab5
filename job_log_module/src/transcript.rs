//! Canonical transcript text for mirrored threads.
//!
//! The first line of a thread carries the date:
//! `Alice @ 09:00 01-01-24: hello`; every later line is an indented reply:
//! `     Bob @ 09:05: hi`.

use std::collections::HashMap;

use chrono::FixedOffset;
use tracing::warn;

use crate::chat::ChatMessage;
use crate::collaborators::ChatPlatform;

const REPLY_INDENT: &str = "     ";
const UNKNOWN_AUTHOR: &str = "Unknown";

/// Resolves user ids to display names for one formatting pass.
///
/// Lookup failures degrade to the raw id; each id is looked up at most once.
pub struct AuthorNames<'a> {
    chat: &'a dyn ChatPlatform,
    cache: HashMap<String, String>,
}

impl<'a> AuthorNames<'a> {
    pub fn new(chat: &'a dyn ChatPlatform) -> Self {
        Self {
            chat,
            cache: HashMap::new(),
        }
    }

    pub async fn resolve(&mut self, user_id: Option<&str>) -> String {
        let Some(user_id) = user_id.filter(|id| !id.is_empty()) else {
            return UNKNOWN_AUTHOR.to_string();
        };
        if let Some(name) = self.cache.get(user_id) {
            return name.clone();
        }
        let name = match self.chat.user_identity(user_id).await {
            Ok(identity) => identity
                .preferred_name()
                .map(str::to_string)
                .unwrap_or_else(|| user_id.to_string()),
            Err(err) => {
                warn!("user lookup failed for {}: {}", user_id, err);
                user_id.to_string()
            }
        };
        self.cache.insert(user_id.to_string(), name.clone());
        name
    }
}

/// Format a batch of thread messages in arrival order.
///
/// With `first` set, the first emitted line carries the date; otherwise every
/// line is an indented reply. Automated messages are skipped.
pub async fn format_messages(
    messages: &[ChatMessage],
    first: bool,
    names: &mut AuthorNames<'_>,
    offset: &FixedOffset,
) -> String {
    let mut lines = Vec::with_capacity(messages.len());
    for message in messages.iter().filter(|message| !message.is_automated()) {
        let author = names.resolve(message.user.as_deref()).await;
        let posted_at = message.posted_at(offset);
        let time = posted_at.format("%H:%M");
        let text = message.text_or_empty().trim();
        if first && lines.is_empty() {
            lines.push(format!(
                "{} @ {} {}: {}",
                author,
                time,
                posted_at.format("%m-%d-%y"),
                text
            ));
        } else {
            lines.push(format!("{}{} @ {}: {}", REPLY_INDENT, author, time, text));
        }
    }
    lines.join("\n")
}

/// Format one message as an indented reply line, whoever authored it.
pub async fn format_reply(
    message: &ChatMessage,
    names: &mut AuthorNames<'_>,
    offset: &FixedOffset,
) -> String {
    let author = names.resolve(message.user.as_deref()).await;
    format!(
        "{}{} @ {}: {}",
        REPLY_INDENT,
        author,
        message.posted_at(offset).format("%H:%M"),
        message.text_or_empty().trim()
    )
}

/// Reference line for a non-image attachment.
pub fn attachment_line(name: Option<&str>, permalink: &str) -> String {
    format!(
        "\n📎 Attachment: [{}]({})\n",
        name.unwrap_or("Attachment"),
        permalink
    )
}
