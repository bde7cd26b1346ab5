use std::env;
use std::time::Duration;

use chrono::FixedOffset;

use crate::adapters::slack::DEFAULT_SLACK_API_BASE_URL;
use crate::adapters::{
    GoogleEndpoints, DEFAULT_DOCS_API_BASE_URL, DEFAULT_DRIVE_API_BASE_URL,
    DEFAULT_SHEETS_API_BASE_URL,
};
use crate::google_auth::GoogleAuthConfig;

pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 20;
pub const DEFAULT_CHANNEL_HISTORY_LIMIT: usize = 50;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
    #[error("no Google credentials: set GOOGLE_ACCESS_TOKEN, GOOGLE_SERVICE_ACCOUNT_JSON, or GOOGLE_CLIENT_ID + GOOGLE_CLIENT_SECRET + GOOGLE_REFRESH_TOKEN")]
    MissingGoogleCredentials,
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    pub max_body_bytes: usize,
    /// Bot OAuth token used for every Slack Web API call
    pub slack_bot_token: String,
    /// Signing secret for Events API requests; unsigned requests are accepted when unset
    pub slack_signing_secret: Option<String>,
    /// Bot user ID for dropping the bot's own messages (resolved via auth.test when unset)
    pub slack_bot_user_id: Option<String>,
    pub slack_api_base_url: String,
    pub google_sheet_id: String,
    pub google_worksheet_name: String,
    /// Restrict document search to one Drive folder
    pub google_drive_folder_id: Option<String>,
    pub google_endpoints: GoogleEndpoints,
    pub google_auth: GoogleAuthConfig,
    /// Apps Script web app that embeds images into documents
    pub gas_webhook_url: String,
    pub image_relay_token: String,
    pub http_timeout: Duration,
    pub channel_history_limit: usize,
    pub transcript_offset: FixedOffset,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Build the configuration from a variable lookup. Blank values count as unset.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let required = |key: &'static str| var(key).ok_or(ConfigError::Missing(key));

        let host = var("JOB_LOG_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = var("JOB_LOG_PORT")
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(3000);
        let max_body_bytes = var("JOB_LOG_MAX_BODY_BYTES")
            .and_then(|value| value.parse::<usize>().ok())
            .filter(|value| *value > 0)
            .unwrap_or(DEFAULT_MAX_BODY_BYTES);

        let slack_bot_token = required("SLACK_BOT_TOKEN")?;
        let google_sheet_id = required("GOOGLE_SHEET_ID")?;
        let google_worksheet_name = required("GOOGLE_WORKSHEET_NAME")?;
        let gas_webhook_url = required("GAS_WEBHOOK_URL")?;
        let image_relay_token = var("IMAGE_RELAY_TOKEN").unwrap_or_else(|| slack_bot_token.clone());

        let google_auth = GoogleAuthConfig::from_vars(&var);
        if !google_auth.is_valid() {
            return Err(ConfigError::MissingGoogleCredentials);
        }
        let google_endpoints = GoogleEndpoints {
            sheets: var("GOOGLE_SHEETS_API_BASE_URL")
                .unwrap_or_else(|| DEFAULT_SHEETS_API_BASE_URL.to_string()),
            drive: var("GOOGLE_DRIVE_API_BASE_URL")
                .unwrap_or_else(|| DEFAULT_DRIVE_API_BASE_URL.to_string()),
            docs: var("GOOGLE_DOCS_API_BASE_URL")
                .unwrap_or_else(|| DEFAULT_DOCS_API_BASE_URL.to_string()),
        };

        let http_timeout = var("HTTP_TIMEOUT_SECS")
            .and_then(|value| value.parse::<u64>().ok())
            .filter(|value| *value > 0)
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS));
        let channel_history_limit = var("CHANNEL_HISTORY_LIMIT")
            .and_then(|value| value.parse::<usize>().ok())
            .filter(|value| *value > 0)
            .unwrap_or(DEFAULT_CHANNEL_HISTORY_LIMIT);
        let transcript_offset = match var("TRANSCRIPT_UTC_OFFSET_MINUTES") {
            Some(raw) => parse_offset_minutes(&raw).ok_or(ConfigError::Invalid {
                key: "TRANSCRIPT_UTC_OFFSET_MINUTES",
                value: raw,
            })?,
            None => FixedOffset::east_opt(0).ok_or(ConfigError::Invalid {
                key: "TRANSCRIPT_UTC_OFFSET_MINUTES",
                value: "0".to_string(),
            })?,
        };

        Ok(Self {
            host,
            port,
            max_body_bytes,
            slack_bot_token,
            slack_signing_secret: var("SLACK_SIGNING_SECRET"),
            slack_bot_user_id: var("SLACK_BOT_USER_ID"),
            slack_api_base_url: var("SLACK_API_BASE_URL")
                .unwrap_or_else(|| DEFAULT_SLACK_API_BASE_URL.to_string()),
            google_sheet_id,
            google_worksheet_name,
            google_drive_folder_id: var("GOOGLE_DRIVE_FOLDER_ID"),
            google_endpoints,
            google_auth,
            gas_webhook_url,
            image_relay_token,
            http_timeout,
            channel_history_limit,
            transcript_offset,
        })
    }
}

fn parse_offset_minutes(raw: &str) -> Option<FixedOffset> {
    let minutes: i32 = raw.parse().ok()?;
    FixedOffset::east_opt(minutes.checked_mul(60)?)
}
