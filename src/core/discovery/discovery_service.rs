// Spreadsheet discovery - scans the drive listing and registers unseen files.
//
// Platform-agnostic: the actual Drive API lives behind the `DriveLister`
// trait in the infra layer. Discovery is purely additive; it never mutates
// or removes records that are already in the registry.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info};

use crate::core::registry::{FileRecord, OutreachStore, StoreError};

// ============================================================================
// COLLABORATOR MODELS
// ============================================================================

/// One file as reported by the drive listing collaborator.
#[derive(Debug, Clone)]
pub struct DriveFile {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

/// The single listing criterion. Exactly one must be configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriveQuery {
    /// Files inside a folder, by folder id.
    Folder(String),
    /// Files whose title contains a substring.
    TitleContains(String),
}

impl DriveQuery {
    /// Builds the criterion from the two optional config values.
    /// Supplying neither, or both, is a configuration error raised before
    /// any store mutation.
    pub fn from_options(
        folder_id: Option<String>,
        title_match: Option<String>,
    ) -> Result<Self, DiscoveryError> {
        match (folder_id, title_match) {
            (Some(folder), None) => Ok(DriveQuery::Folder(folder)),
            (None, Some(title)) => Ok(DriveQuery::TitleContains(title)),
            (None, None) => Err(DiscoveryError::Criterion(
                "no listing criterion configured: set a folder id or a title match".to_string(),
            )),
            (Some(_), Some(_)) => Err(DiscoveryError::Criterion(
                "both folder id and title match configured: set exactly one".to_string(),
            )),
        }
    }
}

/// Trait for the drive listing collaborator.
#[async_trait]
pub trait DriveLister: Send + Sync {
    async fn list(&self, query: &DriveQuery) -> Result<Vec<DriveFile>, DiscoveryError>;
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("invalid discovery criterion: {0}")]
    Criterion(String),
    #[error("drive listing failed: {0}")]
    Drive(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

// ============================================================================
// CORE SERVICE
// ============================================================================

/// Counts reported after one discovery pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscoverySummary {
    /// Files newly registered this run.
    pub discovered: usize,
    /// Files the registry already knew about.
    pub known: usize,
    /// Listing results rejected by the naming-convention filter.
    pub rejected: usize,
}

pub struct DiscoveryService<L: DriveLister> {
    lister: L,
    store: Arc<dyn OutreachStore>,
}

impl<L: DriveLister> DiscoveryService<L> {
    pub fn new(lister: L, store: Arc<dyn OutreachStore>) -> Self {
        Self { lister, store }
    }

    /// Lists the drive and registers every acceptable, unseen file with
    /// `processed = false`. Known ids are left untouched so title and
    /// creation date are never refreshed.
    pub async fn run(&self, query: &DriveQuery) -> Result<DiscoverySummary, DiscoveryError> {
        let listing = self.lister.list(query).await?;
        let mut summary = DiscoverySummary::default();

        for file in listing {
            // Naming convention: real spreadsheets end in a digit. Everything
            // else in the folder (.csv exports, photos, misc files) does not.
            if !title_matches_convention(&file.title) {
                debug!(title = %file.title, "skipping non-spreadsheet file");
                summary.rejected += 1;
                continue;
            }

            let record = FileRecord {
                id: file.id,
                title: file.title,
                created_at: file.created_at,
                processed: false,
            };

            if self.store.insert_file_if_unseen(&record).await? {
                info!(title = %record.title, id = %record.id, "discovered spreadsheet");
                summary.discovered += 1;
            } else {
                summary.known += 1;
            }
        }

        if summary.discovered == 0 {
            info!("no new spreadsheets available");
        }

        Ok(summary)
    }
}

fn title_matches_convention(title: &str) -> bool {
    title.chars().last().is_some_and(|c| c.is_ascii_digit())
}

// ============================================================================
// TESTS
// ============================================================================
