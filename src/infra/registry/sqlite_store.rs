// SQLite implementation of the OutreachStore trait

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use crate::core::registry::{FileRecord, HandleRecord, OutreachStore, StoreError};

pub struct SqliteOutreachStore {
    pool: SqlitePool,
}

impl SqliteOutreachStore {
    /// Create a new SQLite store at the given database path.
    pub async fn new(database_path: &str) -> anyhow::Result<Self> {
        let connection_string = format!("sqlite://{}?mode=rwc", database_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(&connection_string)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Run database migrations to create tables.
    async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS files (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                created_at TEXT NOT NULL,
                processed INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS handles (
                handle TEXT PRIMARY KEY,
                added TEXT NOT NULL,
                imported TEXT NOT NULL,
                sheet TEXT NOT NULL,
                first_message_at TEXT,
                second_message_at TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn backend(e: sqlx::Error) -> StoreError {
        StoreError::Backend(e.to_string())
    }

    fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, StoreError> {
        DateTime::parse_from_rfc3339(value)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| StoreError::Backend(format!("invalid stored timestamp {value}: {e}")))
    }

    fn parse_optional(value: Option<String>) -> Result<Option<DateTime<Utc>>, StoreError> {
        value.as_deref().map(Self::parse_timestamp).transpose()
    }

    fn file_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<FileRecord, StoreError> {
        Ok(FileRecord {
            id: row.get("id"),
            title: row.get("title"),
            created_at: Self::parse_timestamp(&row.get::<String, _>("created_at"))?,
            processed: row.get::<i64, _>("processed") != 0,
        })
    }

    fn handle_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<HandleRecord, StoreError> {
        Ok(HandleRecord {
            handle: row.get("handle"),
            added: Self::parse_timestamp(&row.get::<String, _>("added"))?,
            imported: Self::parse_timestamp(&row.get::<String, _>("imported"))?,
            sheet: row.get("sheet"),
            first_message_at: Self::parse_optional(row.get("first_message_at"))?,
            second_message_at: Self::parse_optional(row.get("second_message_at"))?,
        })
    }

    /// Explains why a guarded stage update matched no row.
    async fn stage_conflict(&self, handle: &str, second: bool) -> StoreError {
        let row = sqlx::query(
            "SELECT first_message_at, second_message_at FROM handles WHERE handle = ?",
        )
        .bind(handle)
        .fetch_optional(&self.pool)
        .await;

        match row {
            Ok(None) => StoreError::UnknownHandle {
                handle: handle.to_string(),
            },
            Ok(Some(row)) => {
                let first: Option<String> = row.get("first_message_at");
                let reason = if second && first.is_none() {
                    "first message not yet recorded"
                } else if second {
                    "second message already recorded"
                } else {
                    "first message already recorded"
                };
                StoreError::StageConflict {
                    handle: handle.to_string(),
                    reason: reason.to_string(),
                }
            }
            Err(e) => Self::backend(e),
        }
    }
}

#[async_trait]
impl OutreachStore for SqliteOutreachStore {
    async fn insert_file_if_unseen(&self, file: &FileRecord) -> Result<bool, StoreError> {
        // INSERT OR IGNORE keeps the first write: a known id never has its
        // title or creation date refreshed.
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO files (id, title, created_at, processed)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&file.id)
        .bind(&file.title)
        .bind(file.created_at.to_rfc3339())
        .bind(file.processed as i64)
        .execute(&self.pool)
        .await
        .map_err(Self::backend)?;

        Ok(result.rows_affected() > 0)
    }

    async fn unprocessed_files(&self) -> Result<Vec<FileRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, title, created_at, processed
            FROM files
            WHERE processed = 0
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Self::backend)?;

        rows.iter().map(Self::file_from_row).collect()
    }

    async fn commit_extraction(
        &self,
        file_id: &str,
        handles: &[HandleRecord],
    ) -> Result<usize, StoreError> {
        let mut tx = self.pool.begin().await.map_err(Self::backend)?;

        let mut inserted = 0;
        for record in handles {
            let result = sqlx::query(
                r#"
                INSERT OR IGNORE INTO handles (handle, added, imported, sheet)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(&record.handle)
            .bind(record.added.to_rfc3339())
            .bind(record.imported.to_rfc3339())
            .bind(&record.sheet)
            .execute(&mut *tx)
            .await
            .map_err(Self::backend)?;
            inserted += result.rows_affected() as usize;
        }

        let result = sqlx::query("UPDATE files SET processed = 1 WHERE id = ?")
            .bind(file_id)
            .execute(&mut *tx)
            .await
            .map_err(Self::backend)?;
        if result.rows_affected() == 0 {
            // Dropping the transaction rolls the handle inserts back.
            return Err(StoreError::UnknownFile {
                file_id: file_id.to_string(),
            });
        }

        tx.commit().await.map_err(Self::backend)?;
        Ok(inserted)
    }

    async fn all_handles(&self) -> Result<Vec<HandleRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT handle, added, imported, sheet, first_message_at, second_message_at
            FROM handles
            ORDER BY handle
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Self::backend)?;

        rows.iter().map(Self::handle_from_row).collect()
    }

    async fn mark_first_sent(&self, handle: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE handles
            SET first_message_at = ?
            WHERE handle = ? AND first_message_at IS NULL
            "#,
        )
        .bind(at.to_rfc3339())
        .bind(handle)
        .execute(&self.pool)
        .await
        .map_err(Self::backend)?;

        if result.rows_affected() == 0 {
            return Err(self.stage_conflict(handle, false).await);
        }
        Ok(())
    }

    async fn mark_second_sent(&self, handle: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE handles
            SET second_message_at = ?
            WHERE handle = ?
              AND first_message_at IS NOT NULL
              AND second_message_at IS NULL
            "#,
        )
        .bind(at.to_rfc3339())
        .bind(handle)
        .execute(&self.pool)
        .await
        .map_err(Self::backend)?;

        if result.rows_affected() == 0 {
            return Err(self.stage_conflict(handle, true).await);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn open_store() -> (TempDir, SqliteOutreachStore) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outreach.db");
        let store = SqliteOutreachStore::new(path.to_str().unwrap())
            .await
            .unwrap();
        (dir, store)
    }

    fn file(id: &str, title: &str) -> FileRecord {
        FileRecord {
            id: id.to_string(),
            title: title.to_string(),
            created_at: Utc::now(),
            processed: false,
        }
    }

    fn handle(name: &str) -> HandleRecord {
        HandleRecord::new(name.to_string(), Utc::now(), Utc::now(), "F1".to_string())
    }

    #[tokio::test]
    async fn first_write_wins_for_files() {
        let (_dir, store) = open_store().await;

        assert!(store
            .insert_file_if_unseen(&file("F1", "Leads batch 1"))
            .await
            .unwrap());
        assert!(!store
            .insert_file_if_unseen(&file("F1", "Renamed batch 2"))
            .await
            .unwrap());

        let files = store.unprocessed_files().await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].title, "Leads batch 1");
    }

    #[tokio::test]
    async fn commit_extraction_is_atomic_and_idempotent() {
        let (_dir, store) = open_store().await;
        store
            .insert_file_if_unseen(&file("F1", "Leads batch 1"))
            .await
            .unwrap();

        let inserted = store
            .commit_extraction("F1", &[handle("foo"), handle("bar")])
            .await
            .unwrap();
        assert_eq!(inserted, 2);
        assert!(store.unprocessed_files().await.unwrap().is_empty());

        // Replaying the same commit inserts nothing new.
        let inserted = store
            .commit_extraction("F1", &[handle("foo"), handle("bar")])
            .await
            .unwrap();
        assert_eq!(inserted, 0);
        assert_eq!(store.all_handles().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn commit_against_unknown_file_rolls_back_handles() {
        let (_dir, store) = open_store().await;

        let err = store
            .commit_extraction("missing", &[handle("foo")])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownFile { .. }));
        assert!(store.all_handles().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn handles_are_ordered_by_key() {
        let (_dir, store) = open_store().await;
        store
            .insert_file_if_unseen(&file("F1", "Leads batch 1"))
            .await
            .unwrap();
        store
            .commit_extraction("F1", &[handle("zeta"), handle("alpha")])
            .await
            .unwrap();

        let names: Vec<String> = store
            .all_handles()
            .await
            .unwrap()
            .into_iter()
            .map(|h| h.handle)
            .collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[tokio::test]
    async fn stage_guards_enforce_monotonic_progression() {
        let (_dir, store) = open_store().await;
        store
            .insert_file_if_unseen(&file("F1", "Leads batch 1"))
            .await
            .unwrap();
        store.commit_extraction("F1", &[handle("foo")]).await.unwrap();

        // Second stage before first is rejected.
        let err = store.mark_second_sent("foo", Utc::now()).await.unwrap_err();
        assert!(matches!(err, StoreError::StageConflict { .. }));

        store.mark_first_sent("foo", Utc::now()).await.unwrap();
        let err = store.mark_first_sent("foo", Utc::now()).await.unwrap_err();
        assert!(matches!(err, StoreError::StageConflict { .. }));

        store.mark_second_sent("foo", Utc::now()).await.unwrap();
        let err = store.mark_second_sent("foo", Utc::now()).await.unwrap_err();
        assert!(matches!(err, StoreError::StageConflict { .. }));

        let record = &store.all_handles().await.unwrap()[0];
        assert!(record.first_message_at.is_some());
        assert!(record.second_message_at.is_some());
    }

    #[tokio::test]
    async fn unknown_handle_is_reported_as_such() {
        let (_dir, store) = open_store().await;
        let err = store.mark_first_sent("ghost", Utc::now()).await.unwrap_err();
        assert!(matches!(err, StoreError::UnknownHandle { .. }));
    }

    #[tokio::test]
    async fn state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outreach.db");

        {
            let store = SqliteOutreachStore::new(path.to_str().unwrap())
                .await
                .unwrap();
            store
                .insert_file_if_unseen(&file("F1", "Leads batch 1"))
                .await
                .unwrap();
            store.commit_extraction("F1", &[handle("foo")]).await.unwrap();
            store.mark_first_sent("foo", Utc::now()).await.unwrap();
        }

        let store = SqliteOutreachStore::new(path.to_str().unwrap())
            .await
            .unwrap();
        assert!(store.unprocessed_files().await.unwrap().is_empty());
        let record = &store.all_handles().await.unwrap()[0];
        assert!(record.first_message_at.is_some());
        assert!(record.second_message_at.is_none());
    }
}
