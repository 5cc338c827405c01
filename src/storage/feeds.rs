use chrono::Utc;
use uuid::Uuid;

use super::schema::Database;
use super::types::{feed_from_row, DatabaseError, Feed, FeedRow};

const FEED_COLUMNS: &str = "id, name, url, created_at, updated_at, last_fetched_at";

impl Database {
    // ========================================================================
    // Feed Operations
    // ========================================================================

    /// Insert a feed, returning its ID.
    ///
    /// A URL that is already stored keeps its ID; only the name is updated.
    pub async fn add_feed(&self, url: &str, name: &str) -> Result<Uuid, DatabaseError> {
        let now = Utc::now().timestamp();
        let (id,): (String,) = sqlx::query_as(
            r#"
            INSERT INTO feeds (id, name, url, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(url) DO UPDATE SET
                name = excluded.name,
                updated_at = excluded.updated_at
            RETURNING id
        "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(name)
        .bind(url)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Uuid::parse_str(&id).map_err(|e| DatabaseError::Corrupt(e.to_string()))
    }

    /// Get a single feed by its ID.
    pub async fn get_feed(&self, feed_id: Uuid) -> Result<Option<Feed>, DatabaseError> {
        let row: Option<FeedRow> =
            sqlx::query_as(&format!("SELECT {FEED_COLUMNS} FROM feeds WHERE id = ?"))
                .bind(feed_id.to_string())
                .fetch_optional(&self.pool)
                .await?;

        row.map(feed_from_row).transpose()
    }

    /// Select up to `limit` feeds that are due for a fetch.
    ///
    /// Feeds that were never fetched come first, then the ones fetched
    /// longest ago. A non-positive limit yields an empty batch.
    pub async fn list_due_feeds(&self, limit: i64) -> Result<Vec<Feed>, DatabaseError> {
        if limit <= 0 {
            return Ok(Vec::new());
        }

        let rows: Vec<FeedRow> = sqlx::query_as(&format!(
            r#"
            SELECT {FEED_COLUMNS}
            FROM feeds
            ORDER BY last_fetched_at ASC NULLS FIRST, created_at ASC
            LIMIT ?
        "#
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(feed_from_row).collect()
    }

    /// Claim a feed by stamping its last-fetched time with now.
    ///
    /// The stamp never moves backwards, even if the wall clock does.
    /// Returns the updated feed.
    pub async fn mark_fetched(&self, feed_id: Uuid) -> Result<Feed, DatabaseError> {
        let now = Utc::now().timestamp();
        let row: Option<FeedRow> = sqlx::query_as(&format!(
            r#"
            UPDATE feeds SET
                last_fetched_at = MAX(COALESCE(last_fetched_at, 0), ?),
                updated_at = ?
            WHERE id = ?
            RETURNING {FEED_COLUMNS}
        "#
        ))
        .bind(now)
        .bind(now)
        .bind(feed_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => feed_from_row(row),
            None => Err(DatabaseError::FeedNotFound(feed_id)),
        }
    }
}
