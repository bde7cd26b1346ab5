//! Seams to the external services the dispatcher drives.
//!
//! Not-found answers are values (`bool`, `Option`); `CollaboratorError` is
//! reserved for calls that failed, timed out or returned a non-success status.

use async_trait::async_trait;

use crate::chat::{ChatMessage, SharedFile, UserIdentity};
use crate::google_auth::GoogleAuthError;
use crate::job_number::JobNumber;

/// Reference to a destination document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentHandle {
    pub id: String,
    pub name: Option<String>,
}

impl DocumentHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    #[error("http error: {0}")]
    Http(String),
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("api error: {0}")]
    Api(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("auth error: {0}")]
    Auth(#[from] GoogleAuthError),
}

impl From<reqwest::Error> for CollaboratorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            CollaboratorError::Timeout(err.to_string())
        } else if err.is_decode() {
            CollaboratorError::Parse(err.to_string())
        } else {
            CollaboratorError::Http(err.to_string())
        }
    }
}

/// The messaging platform.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    async fn post_thread_reply(
        &self,
        channel: &str,
        thread_ts: &str,
        text: &str,
    ) -> Result<(), CollaboratorError>;

    /// Every message of a thread, root first.
    async fn fetch_thread(
        &self,
        channel: &str,
        thread_ts: &str,
    ) -> Result<Vec<ChatMessage>, CollaboratorError>;

    async fn user_identity(&self, user_id: &str) -> Result<UserIdentity, CollaboratorError>;

    async fn file_info(&self, file_id: &str) -> Result<SharedFile, CollaboratorError>;

    /// The most recent `limit` messages of a conversation, newest first.
    async fn channel_history(
        &self,
        channel: &str,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, CollaboratorError>;
}

/// The spreadsheet of known job numbers.
#[async_trait]
pub trait JobRecords: Send + Sync {
    async fn contains_job(&self, job_number: &JobNumber) -> Result<bool, CollaboratorError>;
}

/// The document store holding one document per job.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find_document(
        &self,
        job_number: &JobNumber,
    ) -> Result<Option<DocumentHandle>, CollaboratorError>;

    /// Append text at the end of the document body.
    async fn append_text(
        &self,
        document: &DocumentHandle,
        text: &str,
    ) -> Result<(), CollaboratorError>;
}

/// Hand-off of an image URL to the service that embeds it into a document.
#[async_trait]
pub trait ImageRelay: Send + Sync {
    async fn relay_image(
        &self,
        document: &DocumentHandle,
        image_url: &str,
    ) -> Result<(), CollaboratorError>;
}
