//! SQLite-backed durable row store
//!
//! Default backend. Rows live in `annotation_rows`; the `id` column gives the
//! table order and serves as the [`RowRef`]. A unique index on
//! (annotator_id, session_id) turns a racing double append into an error
//! rather than a duplicate row.

use async_trait::async_trait;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

use super::durable::{AnnotationRow, RowRef, RowStore};
use super::StoreError;

type RawRow = (i64, String, String, String, String);

#[derive(Debug, Clone)]
pub struct SqliteRowStore {
    pool: SqlitePool,
}

impl SqliteRowStore {
    /// Open (creating if needed) the database file and its table
    pub async fn open(db_path: &Path) -> Result<Self, StoreError> {
        let newly_created = !db_path.exists();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }

        let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await?;

        if newly_created {
            info!("Initialized new database: {}", db_path.display());
        } else {
            info!("Opened existing database: {}", db_path.display());
        }

        sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
        sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

        Self::from_pool(pool).await
    }

    /// Private in-memory database, used by tests
    pub async fn in_memory() -> Result<Self, StoreError> {
        // A single connection: every pooled connection would get its own database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        create_annotation_rows_table(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Create the four-column table (idempotent)
async fn create_annotation_rows_table(pool: &SqlitePool) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS annotation_rows (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            annotator_id TEXT NOT NULL,
            session_id TEXT NOT NULL,
            full_json TEXT NOT NULL,
            timestamp TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_annotation_rows_key \
         ON annotation_rows(annotator_id, session_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

fn split(raw: RawRow) -> (RowRef, AnnotationRow) {
    let (id, annotator_id, session_id, full_json, timestamp) = raw;
    (
        RowRef(id as u64),
        AnnotationRow {
            annotator_id,
            session_id,
            full_json,
            timestamp,
        },
    )
}

#[async_trait]
impl RowStore for SqliteRowStore {
    async fn fetch_rows(&self) -> Result<Vec<(RowRef, AnnotationRow)>, StoreError> {
        let rows = sqlx::query_as::<_, RawRow>(
            "SELECT id, annotator_id, session_id, full_json, timestamp \
             FROM annotation_rows ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(split).collect())
    }

    async fn fetch_row(&self, at: RowRef) -> Result<Option<AnnotationRow>, StoreError> {
        let row = sqlx::query_as::<_, RawRow>(
            "SELECT id, annotator_id, session_id, full_json, timestamp \
             FROM annotation_rows WHERE id = ?",
        )
        .bind(at.0 as i64)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|raw| split(raw).1))
    }

    async fn overwrite_row(&self, at: RowRef, row: &AnnotationRow) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE annotation_rows \
             SET annotator_id = ?, session_id = ?, full_json = ?, timestamp = ? \
             WHERE id = ?",
        )
        .bind(&row.annotator_id)
        .bind(&row.session_id)
        .bind(&row.full_json)
        .bind(&row.timestamp)
        .bind(at.0 as i64)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Remote(format!("row {} disappeared before update", at.0)));
        }
        Ok(())
    }

    async fn append_row(&self, row: &AnnotationRow) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO annotation_rows (annotator_id, session_id, full_json, timestamp) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(&row.annotator_id)
        .bind(&row.session_id)
        .bind(&row.full_json)
        .bind(&row.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn row(annotator: &str, session: &str, json: &str) -> AnnotationRow {
        AnnotationRow {
            annotator_id: annotator.into(),
            session_id: session.into(),
            full_json: json.into(),
            timestamp: "2025-01-01T00:00:00+00:00".into(),
        }
    }

    #[tokio::test]
    async fn test_append_fetch_overwrite() {
        let store = SqliteRowStore::in_memory().await.unwrap();
        store.append_row(&row("1", "1_a", "{}")).await.unwrap();
        store.append_row(&row("2", "2_b", "{}")).await.unwrap();

        let rows = store.fetch_rows().await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].1.annotator_id, "1");

        let (at, _) = rows[1].clone();
        store.overwrite_row(at, &row("2", "2_b", "{\"x\":1}")).await.unwrap();
        assert_eq!(store.fetch_row(at).await.unwrap().unwrap().full_json, "{\"x\":1}");
        assert!(store.fetch_row(RowRef(999)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unique_key_rejects_duplicate_append() {
        let store = SqliteRowStore::in_memory().await.unwrap();
        store.append_row(&row("1", "1_a", "{}")).await.unwrap();
        let err = store.append_row(&row("1", "1_a", "{}")).await.unwrap_err();
        assert!(matches!(err, StoreError::Database(_)));
    }

    #[tokio::test]
    async fn test_overwrite_missing_row_fails() {
        let store = SqliteRowStore::in_memory().await.unwrap();
        let err = store.overwrite_row(RowRef(7), &row("1", "1_a", "{}")).await.unwrap_err();
        assert!(matches!(err, StoreError::Remote(_)));
    }

    #[tokio::test]
    async fn test_open_file_database_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("annotations.db");

        {
            let store = SqliteRowStore::open(&path).await.unwrap();
            store.append_row(&row("3", "3_c", "{}")).await.unwrap();
            store.pool().close().await;
        }

        let reopened = SqliteRowStore::open(&path).await.unwrap();
        assert_eq!(reopened.fetch_rows().await.unwrap().len(), 1);
    }
}
