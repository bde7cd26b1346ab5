//! HTTP implementations of the collaborator traits.
//!
//! Every adapter shares one `reqwest::Client`, so the request timeout set on
//! that client bounds every outbound call.

pub mod google_docs;
pub mod google_sheets;
pub mod image_relay;
pub mod slack;

pub use google_docs::GoogleDocsStore;
pub use google_sheets::GoogleSheetsJobRecords;
pub use image_relay::AppsScriptImageRelay;
pub use slack::{
    is_url_verification, SlackChallengeResponse, SlackClient, SlackEvent, SlackEventWrapper,
    SlackIdentity, SlackUrlVerification,
};

use tracing::error;

use crate::collaborators::CollaboratorError;

pub const DEFAULT_SHEETS_API_BASE_URL: &str = "https://sheets.googleapis.com";
pub const DEFAULT_DRIVE_API_BASE_URL: &str = "https://www.googleapis.com";
pub const DEFAULT_DOCS_API_BASE_URL: &str = "https://docs.googleapis.com";

/// Base URLs of the Google APIs, overridable for tests and proxies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoogleEndpoints {
    pub sheets: String,
    pub drive: String,
    pub docs: String,
}

impl Default for GoogleEndpoints {
    fn default() -> Self {
        Self {
            sheets: DEFAULT_SHEETS_API_BASE_URL.to_string(),
            drive: DEFAULT_DRIVE_API_BASE_URL.to_string(),
            docs: DEFAULT_DOCS_API_BASE_URL.to_string(),
        }
    }
}

impl GoogleEndpoints {
    /// All three APIs served from one base URL.
    pub fn single(base_url: &str) -> Self {
        Self {
            sheets: base_url.to_string(),
            drive: base_url.to_string(),
            docs: base_url.to_string(),
        }
    }
}

pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Turn a non-success response into `CollaboratorError::Status`.
pub(crate) async fn check_status(
    response: reqwest::Response,
    what: &str,
) -> Result<reqwest::Response, CollaboratorError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    error!("{} failed: {} - {}", what, status, body);
    Err(CollaboratorError::Status {
        status: status.as_u16(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_url_normalizes_slashes() {
        assert_eq!(
            join_url("https://slack.com/api/", "/chat.postMessage"),
            "https://slack.com/api/chat.postMessage"
        );
        assert_eq!(join_url("http://127.0.0.1:1234", "v1/documents/d"), "http://127.0.0.1:1234/v1/documents/d");
    }
}
