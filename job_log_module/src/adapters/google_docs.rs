//! Drive search and Docs append for per-job documents.
//!
//! A job's document is the first Google Doc whose name contains `"{job} |"`,
//! e.g. `12345 | Smith kitchen remodel`.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{check_status, join_url, GoogleEndpoints};
use crate::collaborators::{CollaboratorError, DocumentHandle, DocumentStore};
use crate::google_auth::GoogleAuth;
use crate::job_number::JobNumber;

const GOOGLE_DOC_MIME_TYPE: &str = "application/vnd.google-apps.document";

#[derive(Debug, Deserialize)]
struct DriveFileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Debug, Deserialize)]
struct DriveFile {
    id: String,
    #[serde(default)]
    name: Option<String>,
}

pub struct GoogleDocsStore {
    http: reqwest::Client,
    auth: Arc<GoogleAuth>,
    endpoints: GoogleEndpoints,
    folder_id: Option<String>,
}

impl GoogleDocsStore {
    pub fn new(http: reqwest::Client, auth: Arc<GoogleAuth>, endpoints: GoogleEndpoints) -> Self {
        Self {
            http,
            auth,
            endpoints,
            folder_id: None,
        }
    }

    /// Only match documents directly inside this Drive folder.
    pub fn with_folder(mut self, folder_id: Option<String>) -> Self {
        self.folder_id = folder_id.filter(|id| !id.trim().is_empty());
        self
    }

    fn search_query(&self, job_number: &JobNumber) -> String {
        let mut query = format!(
            "name contains '{} |' and mimeType='{}'",
            job_number, GOOGLE_DOC_MIME_TYPE
        );
        if let Some(folder_id) = &self.folder_id {
            query.push_str(&format!(" and '{}' in parents", escape_query_value(folder_id)));
        }
        query
    }

    /// Index just before the final newline of the document body.
    async fn end_of_body(&self, document_id: &str, access_token: &str) -> Result<i64, CollaboratorError> {
        let url = join_url(&self.endpoints.docs, &format!("v1/documents/{}", document_id));
        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .query(&[("fields", "body(content(endIndex))")])
            .send()
            .await?;
        let response = check_status(response, "Docs documents.get").await?;
        let document: Value = response.json().await?;

        let end_index = document
            .pointer("/body/content")
            .and_then(Value::as_array)
            .and_then(|content| content.last())
            .and_then(|element| element.get("endIndex"))
            .and_then(Value::as_i64)
            .ok_or_else(|| {
                CollaboratorError::Parse(format!("document {} has no body end index", document_id))
            })?;
        Ok((end_index - 1).max(1))
    }
}

#[async_trait]
impl DocumentStore for GoogleDocsStore {
    async fn find_document(
        &self,
        job_number: &JobNumber,
    ) -> Result<Option<DocumentHandle>, CollaboratorError> {
        let access_token = self.auth.access_token().await?;
        let url = join_url(&self.endpoints.drive, "drive/v3/files");
        let query = self.search_query(job_number);
        debug!("Drive search: {}", query);

        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .query(&[
                ("q", query.as_str()),
                ("spaces", "drive"),
                ("fields", "files(id,name)"),
                ("pageSize", "1"),
            ])
            .send()
            .await?;
        let response = check_status(response, "Drive files.list").await?;
        let list: DriveFileList = response.json().await?;

        Ok(list.files.into_iter().next().map(|file| DocumentHandle {
            id: file.id,
            name: file.name,
        }))
    }

    async fn append_text(
        &self,
        document: &DocumentHandle,
        text: &str,
    ) -> Result<(), CollaboratorError> {
        let access_token = self.auth.access_token().await?;
        let index = self.end_of_body(&document.id, &access_token).await?;

        let url = join_url(
            &self.endpoints.docs,
            &format!("v1/documents/{}:batchUpdate", document.id),
        );
        let payload = json!({
            "requests": [{
                "insertText": {
                    "location": {"index": index},
                    "text": format!("{}\n\n", text)
                }
            }]
        });
        let response = self
            .http
            .post(&url)
            .bearer_auth(access_token)
            .json(&payload)
            .send()
            .await?;
        check_status(response, "Docs batchUpdate").await?;

        info!("Appended {} chars to document {}", text.chars().count(), document.id);
        Ok(())
    }
}

fn escape_query_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}
