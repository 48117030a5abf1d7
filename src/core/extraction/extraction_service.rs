// Extraction pass - turns unprocessed spreadsheets into handle records.
//
// For every file not yet marked processed we fetch the designated column,
// normalize each cell through the extractor, and commit the resulting handle
// inserts plus the processed flip as ONE transaction. A crash mid-file leaves
// the flag false, so the whole file is redone on the next run; handle inserts
// are idempotent by unique key, which makes the redo safe.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info};

use crate::core::extraction::extractor::extract;
use crate::core::registry::{HandleRecord, OutreachStore, StoreError};

/// Default spreadsheet column holding the handle URLs.
pub const DEFAULT_SHEET_COLUMN: &str = "L";

/// Trait for the spreadsheet access collaborator. Returns the ordered cell
/// strings of one column of the file's backing sheet.
#[async_trait]
pub trait SheetReader: Send + Sync {
    async fn column_values(
        &self,
        file_id: &str,
        column: &str,
    ) -> Result<Vec<String>, ExtractionError>;
}

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("sheet read failed for {file_id}: {cause}")]
    Sheet { file_id: String, cause: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Counts reported after one extraction pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractionSummary {
    /// Files processed this run.
    pub files: usize,
    /// Handles extracted from cells (before registry dedup).
    pub extracted: usize,
    /// Handles newly added to the registry.
    pub imported: usize,
}

pub struct ExtractionService<R: SheetReader> {
    reader: R,
    store: Arc<dyn OutreachStore>,
    column: String,
}

impl<R: SheetReader> ExtractionService<R> {
    pub fn new(reader: R, store: Arc<dyn OutreachStore>, column: String) -> Self {
        Self {
            reader,
            store,
            column,
        }
    }

    pub async fn run(&self) -> Result<ExtractionSummary, ExtractionError> {
        let files = self.store.unprocessed_files().await?;
        let mut summary = ExtractionSummary::default();

        for file in files {
            info!(title = %file.title, id = %file.id, created_at = %file.created_at, "processing spreadsheet");

            let cells = self.reader.column_values(&file.id, &self.column).await?;

            let imported_at = Utc::now();
            let mut records = Vec::new();
            for cell in &cells {
                for handle in extract(cell) {
                    debug!(handle = %handle, sheet = %file.id, "extracted handle");
                    records.push(HandleRecord::new(
                        handle,
                        file.created_at,
                        imported_at,
                        file.id.clone(),
                    ));
                }
            }

            // One transaction: handle inserts + processed flip, or neither.
            let imported = self.store.commit_extraction(&file.id, &records).await?;
            info!(
                title = %file.title,
                extracted = records.len(),
                imported,
                "spreadsheet processed"
            );

            summary.files += 1;
            summary.extracted += records.len();
            summary.imported += imported;
        }

        Ok(summary)
    }
}

// ============================================================================
// TESTS
// ============================================================================
