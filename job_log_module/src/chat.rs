//! Chat-side data shared by the dispatcher, the formatter and the Slack adapter.
//!
//! Field names follow the Slack Web API so the same types deserialize both
//! `message` events and history responses.

use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Message subtypes that describe edits or bookkeeping rather than new content.
const NON_CONTENT_SUBTYPES: &[&str] = &[
    "message_changed",
    "message_deleted",
    "message_replied",
    "channel_join",
    "channel_leave",
    "group_join",
    "group_leave",
];

/// A chat message, either delivered as an event or fetched from history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default)]
    pub ts: String,
    #[serde(default)]
    pub thread_ts: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub bot_id: Option<String>,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub files: Vec<ChatFile>,
}

impl ChatMessage {
    /// Thread key for this message; a root message keys its own thread.
    pub fn thread_key(&self) -> &str {
        self.thread_ts.as_deref().unwrap_or(&self.ts)
    }

    /// Authored by an integration or service account rather than a person.
    pub fn is_automated(&self) -> bool {
        self.bot_id.is_some() || self.subtype.as_deref() == Some("bot_message")
    }

    /// Edits, deletions and membership notices carry no transcript content.
    pub fn is_content(&self) -> bool {
        match self.subtype.as_deref() {
            Some(subtype) => !NON_CONTENT_SUBTYPES.contains(&subtype),
            None => true,
        }
    }

    pub fn text_or_empty(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }

    /// Message timestamp in the given offset. Slack timestamps are
    /// `seconds.micros` strings; unparseable values map to the epoch.
    pub fn posted_at(&self, offset: &FixedOffset) -> DateTime<FixedOffset> {
        parse_slack_ts(&self.ts)
            .unwrap_or_default()
            .with_timezone(offset)
    }

    pub fn has_file(&self, file_id: &str) -> bool {
        self.files.iter().any(|file| file.id == file_id)
    }
}

/// A file attached to a chat message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatFile {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub mimetype: Option<String>,
    #[serde(default)]
    pub url_private: Option<String>,
    #[serde(default)]
    pub permalink: Option<String>,
}

impl ChatFile {
    pub fn is_image(&self) -> bool {
        is_image_mimetype(self.mimetype.as_deref())
    }
}

/// Full metadata of a shared file, as returned by `files.info`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SharedFile {
    pub id: String,
    #[serde(default)]
    pub mimetype: Option<String>,
    #[serde(default)]
    pub url_private: Option<String>,
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub ims: Vec<String>,
}

impl SharedFile {
    pub fn is_image(&self) -> bool {
        is_image_mimetype(self.mimetype.as_deref())
    }

    /// Every conversation the file was shared into: public channels, private
    /// groups, then direct messages.
    pub fn conversations(&self) -> impl Iterator<Item = &str> {
        self.channels
            .iter()
            .chain(self.groups.iter())
            .chain(self.ims.iter())
            .map(String::as_str)
    }
}

/// Profile names of a chat user.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserIdentity {
    pub display_name: Option<String>,
    pub real_name: Option<String>,
}

impl UserIdentity {
    /// Display name, then real name; blank values are skipped.
    pub fn preferred_name(&self) -> Option<&str> {
        [self.display_name.as_deref(), self.real_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|name| !name.is_empty())
    }
}

/// Inbound events the dispatcher understands.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    MessagePosted { channel: String, message: ChatMessage },
    FileShared { file_id: String },
}

fn is_image_mimetype(mimetype: Option<&str>) -> bool {
    mimetype.is_some_and(|value| value.starts_with("image/"))
}

fn parse_slack_ts(ts: &str) -> Option<DateTime<Utc>> {
    let (secs, frac) = match ts.split_once('.') {
        Some((secs, frac)) => (secs, frac),
        None => (ts, ""),
    };
    let secs: i64 = secs.parse().ok()?;
    let nanos = if frac.is_empty() {
        0
    } else {
        let digits: String = frac.chars().take(9).collect();
        let padded = format!("{:0<9}", digits);
        padded.parse::<u32>().ok()?
    };
    Utc.timestamp_opt(secs, nanos).single()
}
