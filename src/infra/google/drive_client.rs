// Drive v3 client implementing the drive listing collaborator.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::core::discovery::{DiscoveryError, DriveFile, DriveLister, DriveQuery};
use crate::infra::google::auth::ServiceAccountAuth;

/// Minimal Drive REST client. It deliberately exposes only the listing call
/// the core layer needs.
pub struct DriveApiClient {
    client: Client,
    auth: Arc<ServiceAccountAuth>,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct FileListResponse {
    #[serde(default)]
    files: Vec<ApiFile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiFile {
    id: String,
    name: String,
    created_time: Option<String>,
}

impl DriveApiClient {
    pub fn new(auth: Arc<ServiceAccountAuth>) -> Self {
        Self {
            client: Client::new(),
            auth,
            base_url: "https://www.googleapis.com".to_string(),
        }
    }

    fn build_query(query: &DriveQuery) -> String {
        // https://developers.google.com/drive/api/guides/search-files
        match query {
            DriveQuery::Folder(folder_id) => format!("'{}' in parents", folder_id),
            DriveQuery::TitleContains(title) => format!("name contains '{}'", title),
        }
    }
}

#[async_trait]
impl DriveLister for DriveApiClient {
    async fn list(&self, query: &DriveQuery) -> Result<Vec<DriveFile>, DiscoveryError> {
        let q = Self::build_query(query);
        debug!(%q, "listing drive files");

        let token = self
            .auth
            .access_token()
            .await
            .map_err(|e| DiscoveryError::Drive(format!("authorization: {}", e)))?;

        let response = self
            .client
            .get(format!("{}/drive/v3/files", self.base_url))
            .query(&[
                ("q", q.as_str()),
                ("fields", "files(id,name,createdTime)"),
                ("pageSize", "1000"),
            ])
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| DiscoveryError::Drive(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DiscoveryError::Drive(format!(
                "Drive API error ({}): {}",
                status, body
            )));
        }

        let listing: FileListResponse = response
            .json()
            .await
            .map_err(|e| DiscoveryError::Drive(format!("invalid listing response: {}", e)))?;

        let mut files = Vec::with_capacity(listing.files.len());
        for file in listing.files {
            let created_at = parse_created_time(&file)?;
            files.push(DriveFile {
                id: file.id,
                title: file.name,
                created_at,
            });
        }
        Ok(files)
    }
}

fn parse_created_time(file: &ApiFile) -> Result<DateTime<Utc>, DiscoveryError> {
    let raw = file.created_time.as_deref().ok_or_else(|| {
        DiscoveryError::Drive(format!("file {} has no createdTime", file.id))
    })?;
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            DiscoveryError::Drive(format!("file {} has invalid createdTime {}: {}", file.id, raw, e))
        })
}
