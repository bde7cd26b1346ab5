//! Slack Web API client and Events API payload types.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use super::{check_status, join_url};
use crate::chat::{ChatMessage, InboundEvent, SharedFile, UserIdentity};
use crate::collaborators::{ChatPlatform, CollaboratorError};

pub const DEFAULT_SLACK_API_BASE_URL: &str = "https://slack.com/api";

const REPLIES_PAGE_SIZE: usize = 200;

/// Slack URL verification challenge (sent when configuring the Events API).
#[derive(Debug, Clone, Deserialize)]
pub struct SlackUrlVerification {
    #[serde(rename = "type")]
    pub verification_type: String,
    pub challenge: String,
}

/// Response to a URL verification challenge.
#[derive(Debug, Clone, Serialize)]
pub struct SlackChallengeResponse {
    pub challenge: String,
}

/// Returns the challenge when the payload is a `url_verification` request.
pub fn is_url_verification(body: &[u8]) -> Option<SlackUrlVerification> {
    serde_json::from_slice::<SlackUrlVerification>(body)
        .ok()
        .filter(|verification| verification.verification_type == "url_verification")
}

/// Outer envelope of an Events API callback.
#[derive(Debug, Clone, Deserialize)]
pub struct SlackEventWrapper {
    #[serde(rename = "type")]
    pub envelope_type: String,
    #[serde(default)]
    pub team_id: Option<String>,
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub event: Option<SlackEvent>,
}

/// The inner `event` object. Message fields are flattened in so a `message`
/// event deserializes straight into a [`ChatMessage`].
#[derive(Debug, Clone, Deserialize)]
pub struct SlackEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub file_id: Option<String>,
    #[serde(flatten)]
    pub message: ChatMessage,
}

impl SlackEventWrapper {
    /// The dispatcher-level event, if this callback carries one it handles.
    pub fn into_inbound_event(self) -> Option<InboundEvent> {
        if self.envelope_type != "event_callback" {
            return None;
        }
        let event = self.event?;
        match event.event_type.as_str() {
            "message" => Some(InboundEvent::MessagePosted {
                channel: event.channel?,
                message: event.message,
            }),
            "file_shared" => Some(InboundEvent::FileShared {
                file_id: event.file_id?,
            }),
            _ => None,
        }
    }
}

/// Identity of the bot token, from `auth.test`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SlackIdentity {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub bot_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RepliesPage {
    #[serde(default)]
    messages: Vec<ChatMessage>,
    #[serde(default)]
    response_metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HistoryPage {
    #[serde(default)]
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    user: SlackUser,
}

#[derive(Debug, Deserialize)]
struct SlackUser {
    #[serde(default)]
    real_name: Option<String>,
    #[serde(default)]
    profile: SlackProfile,
}

#[derive(Debug, Default, Deserialize)]
struct SlackProfile {
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    real_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FileInfo {
    file: SharedFile,
}

/// Bot-token client for the Slack Web API.
#[derive(Clone)]
pub struct SlackClient {
    http: reqwest::Client,
    api_base: String,
    bot_token: String,
}

impl SlackClient {
    pub fn new(http: reqwest::Client, bot_token: impl Into<String>) -> Self {
        Self::with_base_url(http, bot_token, DEFAULT_SLACK_API_BASE_URL)
    }

    pub fn with_base_url(
        http: reqwest::Client,
        bot_token: impl Into<String>,
        api_base: impl Into<String>,
    ) -> Self {
        Self {
            http,
            api_base: api_base.into(),
            bot_token: bot_token.into(),
        }
    }

    /// Resolve the bot's own user and bot ids.
    pub async fn auth_test(&self) -> Result<SlackIdentity, CollaboratorError> {
        let request = self.http.post(self.url("auth.test"));
        self.call(request, "auth.test").await
    }

    fn url(&self, method: &str) -> String {
        join_url(&self.api_base, method)
    }

    /// Send a Web API request and unwrap Slack's `{ok, error}` envelope.
    async fn call<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        method: &str,
    ) -> Result<T, CollaboratorError> {
        let response = request.bearer_auth(&self.bot_token).send().await?;
        let response = check_status(response, &format!("Slack {}", method)).await?;
        let body: Value = response.json().await?;

        if body.get("ok").and_then(Value::as_bool) != Some(true) {
            let error = body
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            return Err(CollaboratorError::Api(format!("{}: {}", method, error)));
        }
        serde_json::from_value(body)
            .map_err(|e| CollaboratorError::Parse(format!("{}: {}", method, e)))
    }
}

#[async_trait]
impl ChatPlatform for SlackClient {
    async fn post_thread_reply(
        &self,
        channel: &str,
        thread_ts: &str,
        text: &str,
    ) -> Result<(), CollaboratorError> {
        let payload = json!({
            "channel": channel,
            "thread_ts": thread_ts,
            "text": text,
            "mrkdwn": true
        });
        let request = self.http.post(self.url("chat.postMessage")).json(&payload);
        let _: Value = self.call(request, "chat.postMessage").await?;
        Ok(())
    }

    async fn fetch_thread(
        &self,
        channel: &str,
        thread_ts: &str,
    ) -> Result<Vec<ChatMessage>, CollaboratorError> {
        let mut messages = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut query = vec![
                ("channel", channel.to_string()),
                ("ts", thread_ts.to_string()),
                ("limit", REPLIES_PAGE_SIZE.to_string()),
            ];
            if let Some(cursor) = cursor.take() {
                query.push(("cursor", cursor));
            }
            let request = self.http.get(self.url("conversations.replies")).query(&query);
            let page: RepliesPage = self.call(request, "conversations.replies").await?;
            messages.extend(page.messages);

            cursor = page
                .response_metadata
                .and_then(|metadata| metadata.next_cursor)
                .filter(|next| !next.is_empty());
            if cursor.is_none() {
                break;
            }
            debug!("fetching next page of thread {}", thread_ts);
        }
        Ok(messages)
    }

    async fn user_identity(&self, user_id: &str) -> Result<UserIdentity, CollaboratorError> {
        let request = self
            .http
            .get(self.url("users.info"))
            .query(&[("user", user_id)]);
        let info: UserInfo = self.call(request, "users.info").await?;
        Ok(UserIdentity {
            display_name: info.user.profile.display_name,
            real_name: info.user.real_name.or(info.user.profile.real_name),
        })
    }

    async fn file_info(&self, file_id: &str) -> Result<SharedFile, CollaboratorError> {
        let request = self
            .http
            .get(self.url("files.info"))
            .query(&[("file", file_id)]);
        let info: FileInfo = self.call(request, "files.info").await?;
        Ok(info.file)
    }

    async fn channel_history(
        &self,
        channel: &str,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, CollaboratorError> {
        let request = self
            .http
            .get(self.url("conversations.history"))
            .query(&[("channel", channel.to_string()), ("limit", limit.to_string())]);
        let page: HistoryPage = self.call(request, "conversations.history").await?;
        Ok(page.messages)
    }
}
