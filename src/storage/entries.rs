use uuid::Uuid;

use super::schema::Database;
use super::types::{DatabaseError, Entry, EntryDbRow, NewEntry};

/// Maximum number of entries to return from any single query (OOM protection)
const MAX_ENTRIES: i64 = 2000;

impl Database {
    // ========================================================================
    // Entry Operations
    // ========================================================================

    /// Insert one entry.
    ///
    /// A second insert for the same `(feed_id, url)` fails with
    /// [`DatabaseError::Duplicate`] and leaves the stored row untouched.
    pub async fn create_entry(&self, entry: &NewEntry) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO entries
                (id, feed_id, title, description, published_at, url, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        )
        .bind(entry.id.to_string())
        .bind(entry.feed_id.to_string())
        .bind(&entry.title)
        .bind(&entry.description)
        .bind(entry.published_at.timestamp())
        .bind(&entry.url)
        .bind(entry.created_at.timestamp())
        .bind(entry.updated_at.timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ========================================================================
    // Entry Queries
    // ========================================================================

    /// Get entries for a feed, newest publication first.
    /// Hard cap at MAX_ENTRIES (2000).
    pub async fn get_entries_for_feed(&self, feed_id: Uuid) -> Result<Vec<Entry>, DatabaseError> {
        let rows = sqlx::query_as::<_, EntryDbRow>(
            r#"
            SELECT id, feed_id, title, description, published_at, url, created_at, updated_at
            FROM entries
            WHERE feed_id = ?
            ORDER BY published_at DESC, created_at DESC
            LIMIT ?
        "#,
        )
        .bind(feed_id.to_string())
        .bind(MAX_ENTRIES)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(EntryDbRow::into_entry).collect()
    }

    /// Total number of stored entries across all feeds.
    pub async fn count_entries(&self) -> Result<i64, DatabaseError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM entries")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
