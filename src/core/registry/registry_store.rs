// Registry models and the durable store abstraction.
//
// The store owns two independent mappings keyed by string: one for discovered
// spreadsheet files and one for extracted handles. All mutating operations are
// exposed as the smallest unit that must be atomic, so implementations can
// wrap each call in a single transaction and a crash can never leave a
// half-applied unit behind.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

// ============================================================================
// DOMAIN MODELS
// ============================================================================

/// One spreadsheet file known to the bot.
///
/// Created on first discovery and never overwritten afterwards, so the title
/// and creation date always reflect what Drive reported the first time we saw
/// the file.
#[derive(Debug, Clone, PartialEq)]
pub struct FileRecord {
    /// Stable identifier assigned by the source drive.
    pub id: String,
    pub title: String,
    /// Creation timestamp as reported by the source drive.
    pub created_at: DateTime<Utc>,
    /// Flips false -> true exactly once, when handle extraction completes
    /// without error for this file.
    pub processed: bool,
}

/// Lifecycle record for one extracted handle.
#[derive(Debug, Clone, PartialEq)]
pub struct HandleRecord {
    /// Normalized handle (no URL scheme, no legacy fragment prefix).
    pub handle: String,
    /// Creation date of the source file this handle came from.
    pub added: DateTime<Utc>,
    /// When this bot first saw the handle.
    pub imported: DateTime<Utc>,
    /// Id of the source file, a non-owning reference into the file registry.
    pub sheet: String,
    pub first_message_at: Option<DateTime<Utc>>,
    pub second_message_at: Option<DateTime<Utc>>,
}

/// Which outreach message a handle should receive next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// No message sent yet.
    New,
    /// Stage-1 message sent, stage-2 pending.
    FirstSent,
    /// Both messages sent. Terminal.
    Complete,
}

impl HandleRecord {
    /// Creates a fresh record for a handle first seen in `sheet`.
    pub fn new(handle: String, added: DateTime<Utc>, imported: DateTime<Utc>, sheet: String) -> Self {
        Self {
            handle,
            added,
            imported,
            sheet,
            first_message_at: None,
            second_message_at: None,
        }
    }

    /// The stage is fully derived from which timestamps are present.
    /// `second_message_at` implies `first_message_at`; the store guards
    /// reject any update that would break that.
    pub fn stage(&self) -> Stage {
        match (self.first_message_at, self.second_message_at) {
            (None, _) => Stage::New,
            (Some(_), None) => Stage::FirstSent,
            (Some(_), Some(_)) => Stage::Complete,
        }
    }
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("file {file_id} not in registry")]
    UnknownFile { file_id: String },
    #[error("handle {handle} not in registry")]
    UnknownHandle { handle: String },
    #[error("stage update rejected for {handle}: {reason}")]
    StageConflict { handle: String, reason: String },
}

// ============================================================================
// STORAGE TRAIT
// ============================================================================

/// Durable, transactional persistence for both registries.
///
/// Implementations must make every method an all-or-nothing unit with
/// crash-recoverable commit: a restart sees the last fully committed state
/// and no partial write.
#[async_trait]
pub trait OutreachStore: Send + Sync {
    /// Inserts a new file record unless the id is already known.
    /// Returns true if the record was inserted. Existing records are left
    /// untouched (first-write-wins).
    async fn insert_file_if_unseen(&self, file: &FileRecord) -> Result<bool, StoreError>;

    /// All files not yet marked processed.
    async fn unprocessed_files(&self) -> Result<Vec<FileRecord>, StoreError>;

    /// Commits one file's extraction result as a single transaction: inserts
    /// every handle not already present (insert is idempotent by unique key)
    /// and flips the file's processed flag. Returns how many handles were
    /// newly inserted.
    async fn commit_extraction(
        &self,
        file_id: &str,
        handles: &[HandleRecord],
    ) -> Result<usize, StoreError>;

    /// All handle records, ordered by handle key.
    async fn all_handles(&self) -> Result<Vec<HandleRecord>, StoreError>;

    /// Records the stage-1 send time. Rejects the update if the handle is
    /// unknown or `first_message_at` is already set.
    async fn mark_first_sent(&self, handle: &str, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Records the stage-2 send time. Rejects the update if the handle is
    /// unknown, `first_message_at` is not yet set, or `second_message_at` is
    /// already set.
    async fn mark_second_sent(&self, handle: &str, at: DateTime<Utc>) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(first: Option<DateTime<Utc>>, second: Option<DateTime<Utc>>) -> HandleRecord {
        HandleRecord {
            handle: "foo".to_string(),
            added: Utc::now(),
            imported: Utc::now(),
            sheet: "F1".to_string(),
            first_message_at: first,
            second_message_at: second,
        }
    }

    #[test]
    fn stage_is_derived_from_timestamps() {
        let now = Utc::now();
        assert_eq!(record(None, None).stage(), Stage::New);
        assert_eq!(record(Some(now), None).stage(), Stage::FirstSent);
        assert_eq!(record(Some(now), Some(now)).stage(), Stage::Complete);
    }

    #[test]
    fn fresh_record_starts_new() {
        let rec = HandleRecord::new(
            "foo".to_string(),
            Utc::now(),
            Utc::now(),
            "F1".to_string(),
        );
        assert_eq!(rec.stage(), Stage::New);
        assert!(rec.first_message_at.is_none());
        assert!(rec.second_message_at.is_none());
    }
}
