// Sheets v4 client implementing the spreadsheet access collaborator.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::core::extraction::{ExtractionError, SheetReader};
use crate::infra::google::auth::ServiceAccountAuth;

pub struct SheetsApiClient {
    client: Client,
    auth: Arc<ServiceAccountAuth>,
    base_url: String,
}

/// Response of a `values` fetch with COLUMNS major dimension: one inner
/// vector per requested column. Cells may come back as numbers or booleans,
/// so they are accepted as raw JSON values and rendered to strings.
#[derive(Debug, Deserialize)]
struct ValuesResponse {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

impl SheetsApiClient {
    pub fn new(auth: Arc<ServiceAccountAuth>) -> Self {
        Self {
            client: Client::new(),
            auth,
            base_url: "https://sheets.googleapis.com".to_string(),
        }
    }

    fn cell_to_string(cell: &serde_json::Value) -> String {
        match cell {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

#[async_trait]
impl SheetReader for SheetsApiClient {
    async fn column_values(
        &self,
        file_id: &str,
        column: &str,
    ) -> Result<Vec<String>, ExtractionError> {
        let sheet_err = |cause: String| ExtractionError::Sheet {
            file_id: file_id.to_string(),
            cause,
        };

        let token = self
            .auth
            .access_token()
            .await
            .map_err(|e| sheet_err(format!("authorization: {}", e)))?;

        // Whole-column range on the first sheet, e.g. "L:L".
        let url = format!(
            "{}/v4/spreadsheets/{}/values/{}:{}",
            self.base_url, file_id, column, column
        );
        debug!(file_id, column, "fetching sheet column");

        let response = self
            .client
            .get(url)
            .query(&[("majorDimension", "COLUMNS")])
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| sheet_err(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(sheet_err(format!("Sheets API error ({}): {}", status, body)));
        }

        let values: ValuesResponse = response
            .json()
            .await
            .map_err(|e| sheet_err(format!("invalid values response: {}", e)))?;

        Ok(values
            .values
            .into_iter()
            .next()
            .unwrap_or_default()
            .iter()
            .map(Self::cell_to_string)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_response_flattens_to_one_column() {
        let json = r#"{
            "range": "Sheet1!L1:L3",
            "majorDimension": "COLUMNS",
            "values": [["https://twitter.com/foo", "", "bar"]]
        }"#;
        let parsed: ValuesResponse = serde_json::from_str(json).unwrap();
        let cells: Vec<String> = parsed
            .values
            .into_iter()
            .next()
            .unwrap_or_default()
            .iter()
            .map(SheetsApiClient::cell_to_string)
            .collect();
        assert_eq!(cells, vec!["https://twitter.com/foo", "", "bar"]);
    }

    #[test]
    fn empty_column_yields_no_cells() {
        let parsed: ValuesResponse = serde_json::from_str(r#"{"range": "Sheet1!L1:L1"}"#).unwrap();
        assert!(parsed.values.is_empty());
    }

    #[test]
    fn non_string_cells_are_rendered() {
        let cell = serde_json::json!(42);
        assert_eq!(SheetsApiClient::cell_to_string(&cell), "42");
    }
}
