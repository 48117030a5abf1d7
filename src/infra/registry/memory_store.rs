// In-memory implementation of the OutreachStore trait.
//
// Backs the core service tests and doubles as a dry-run store. BTreeMaps
// keep both registries ordered by key, matching the SQLite implementation's
// ordering guarantees. A single mutex around the whole state gives each
// method the same all-or-nothing visibility as a database transaction.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::core::registry::{FileRecord, HandleRecord, OutreachStore, StoreError};

#[derive(Default)]
struct State {
    files: BTreeMap<String, FileRecord>,
    handles: BTreeMap<String, HandleRecord>,
}

#[derive(Default)]
pub struct MemoryOutreachStore {
    state: Mutex<State>,
}

impl MemoryOutreachStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, State>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Backend("store mutex poisoned".to_string()))
    }
}

#[async_trait]
impl OutreachStore for MemoryOutreachStore {
    async fn insert_file_if_unseen(&self, file: &FileRecord) -> Result<bool, StoreError> {
        let mut state = self.lock()?;
        if state.files.contains_key(&file.id) {
            return Ok(false);
        }
        state.files.insert(file.id.clone(), file.clone());
        Ok(true)
    }

    async fn unprocessed_files(&self) -> Result<Vec<FileRecord>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .files
            .values()
            .filter(|f| !f.processed)
            .cloned()
            .collect())
    }

    async fn commit_extraction(
        &self,
        file_id: &str,
        handles: &[HandleRecord],
    ) -> Result<usize, StoreError> {
        let mut state = self.lock()?;
        if !state.files.contains_key(file_id) {
            return Err(StoreError::UnknownFile {
                file_id: file_id.to_string(),
            });
        }

        let mut inserted = 0;
        for record in handles {
            if !state.handles.contains_key(&record.handle) {
                state.handles.insert(record.handle.clone(), record.clone());
                inserted += 1;
            }
        }

        if let Some(file) = state.files.get_mut(file_id) {
            file.processed = true;
        }
        Ok(inserted)
    }

    async fn all_handles(&self) -> Result<Vec<HandleRecord>, StoreError> {
        let state = self.lock()?;
        Ok(state.handles.values().cloned().collect())
    }

    async fn mark_first_sent(&self, handle: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let record = state
            .handles
            .get_mut(handle)
            .ok_or_else(|| StoreError::UnknownHandle {
                handle: handle.to_string(),
            })?;
        if record.first_message_at.is_some() {
            return Err(StoreError::StageConflict {
                handle: handle.to_string(),
                reason: "first message already recorded".to_string(),
            });
        }
        record.first_message_at = Some(at);
        Ok(())
    }

    async fn mark_second_sent(&self, handle: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let record = state
            .handles
            .get_mut(handle)
            .ok_or_else(|| StoreError::UnknownHandle {
                handle: handle.to_string(),
            })?;
        if record.first_message_at.is_none() {
            return Err(StoreError::StageConflict {
                handle: handle.to_string(),
                reason: "first message not yet recorded".to_string(),
            });
        }
        if record.second_message_at.is_some() {
            return Err(StoreError::StageConflict {
                handle: handle.to_string(),
                reason: "second message already recorded".to_string(),
            });
        }
        record.second_message_at = Some(at);
        Ok(())
    }
}
