use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{check_status, join_url};
use crate::collaborators::{CollaboratorError, JobRecords};
use crate::google_auth::GoogleAuth;
use crate::job_number::JobNumber;

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

/// Job records kept in the first column of a worksheet.
pub struct GoogleSheetsJobRecords {
    http: reqwest::Client,
    auth: Arc<GoogleAuth>,
    api_base: String,
    spreadsheet_id: String,
    worksheet: String,
}

impl GoogleSheetsJobRecords {
    pub fn new(
        http: reqwest::Client,
        auth: Arc<GoogleAuth>,
        api_base: impl Into<String>,
        spreadsheet_id: impl Into<String>,
        worksheet: impl Into<String>,
    ) -> Self {
        Self {
            http,
            auth,
            api_base: api_base.into(),
            spreadsheet_id: spreadsheet_id.into(),
            worksheet: worksheet.into(),
        }
    }

    /// A1 range covering column A of the worksheet.
    fn column_range(&self) -> String {
        format!("'{}'!A:A", self.worksheet.replace('\'', "''"))
    }

    /// Every value in column A, header row included.
    pub async fn job_column(&self) -> Result<Vec<String>, CollaboratorError> {
        let access_token = self.auth.access_token().await?;
        let url = join_url(
            &self.api_base,
            &format!(
                "v4/spreadsheets/{}/values/{}",
                self.spreadsheet_id,
                urlencoding::encode(&self.column_range())
            ),
        );
        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .query(&[("majorDimension", "COLUMNS")])
            .send()
            .await?;
        let response = check_status(response, "Sheets values.get").await?;
        let range: ValueRange = response.json().await?;
        Ok(range.values.into_iter().next().unwrap_or_default())
    }
}

#[async_trait]
impl JobRecords for GoogleSheetsJobRecords {
    async fn contains_job(&self, job_number: &JobNumber) -> Result<bool, CollaboratorError> {
        let column = self.job_column().await?;
        let found = column
            .iter()
            .any(|value| value.trim() == job_number.as_str());
        debug!(
            "job {} {} among {} sheet rows",
            job_number,
            if found { "found" } else { "not found" },
            column.len()
        );
        Ok(found)
    }
}
