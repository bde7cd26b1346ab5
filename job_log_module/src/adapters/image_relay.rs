use async_trait::async_trait;
use serde::Serialize;
use tracing::{error, info};

use crate::collaborators::{CollaboratorError, DocumentHandle, ImageRelay};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RelayRequest<'a> {
    doc_id: &'a str,
    image_url: &'a str,
}

/// Apps Script web app that downloads a private image and appends it to a document.
pub struct AppsScriptImageRelay {
    http: reqwest::Client,
    webhook_url: String,
    token: String,
}

impl AppsScriptImageRelay {
    pub fn new(
        http: reqwest::Client,
        webhook_url: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            http,
            webhook_url: webhook_url.into(),
            token: token.into(),
        }
    }
}

#[async_trait]
impl ImageRelay for AppsScriptImageRelay {
    async fn relay_image(
        &self,
        document: &DocumentHandle,
        image_url: &str,
    ) -> Result<(), CollaboratorError> {
        let payload = RelayRequest {
            doc_id: &document.id,
            image_url,
        };
        let response = self
            .http
            .post(&self.webhook_url)
            .bearer_auth(&self.token)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        info!("Posting image to relay: {} - status {}", image_url, status);
        // Only 200 counts as success.
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            error!("Image relay failed for {}: {} - {}", image_url, status, body);
            return Err(CollaboratorError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}
