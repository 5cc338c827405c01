use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors, classified so callers can branch on the kind
/// instead of inspecting messages.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// A row with the same natural key already exists.
    ///
    /// For entries the natural key is `(feed_id, url)`. Re-fetching a feed
    /// produces this for every entry already stored, so it is an expected
    /// outcome rather than a failure.
    #[error("Duplicate key: {0}")]
    Duplicate(String),

    /// The referenced feed does not exist (deleted between listing and claim).
    #[error("Feed not found: {0}")]
    FeedNotFound(Uuid),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// A stored value could not be decoded into its domain type.
    #[error("Corrupt row: {0}")]
    Corrupt(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(sqlx::Error),
}

impl DatabaseError {
    /// Classify a sqlx error by its structured database error kind.
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return DatabaseError::Duplicate(db_err.message().to_string());
            }
        }
        DatabaseError::Other(err)
    }

    /// True for the expected "already stored" outcome of an insert.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, DatabaseError::Duplicate(_))
    }
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        Self::from_sqlx(err)
    }
}

// ============================================================================
// Helper Types
// ============================================================================

/// Row type for feed queries
pub(crate) type FeedRow = (String, String, String, i64, i64, Option<i64>);

pub(crate) fn feed_from_row(
    (id, name, url, created_at, updated_at, last_fetched_at): FeedRow,
) -> Result<Feed, DatabaseError> {
    Ok(Feed {
        id: parse_uuid(&id)?,
        name,
        url,
        created_at: timestamp(created_at)?,
        updated_at: timestamp(updated_at)?,
        last_fetched_at: last_fetched_at.map(timestamp).transpose()?,
    })
}

/// Internal row type for Entry queries (used by sqlx FromRow)
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct EntryDbRow {
    pub id: String,
    pub feed_id: String,
    pub title: String,
    pub description: Option<String>,
    pub published_at: i64,
    pub url: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl EntryDbRow {
    pub(crate) fn into_entry(self) -> Result<Entry, DatabaseError> {
        Ok(Entry {
            id: parse_uuid(&self.id)?,
            feed_id: parse_uuid(&self.feed_id)?,
            title: self.title,
            description: self.description,
            published_at: timestamp(self.published_at)?,
            url: self.url,
            created_at: timestamp(self.created_at)?,
            updated_at: timestamp(self.updated_at)?,
        })
    }
}

fn parse_uuid(raw: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(raw).map_err(|e| DatabaseError::Corrupt(format!("id {raw:?}: {e}")))
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| DatabaseError::Corrupt(format!("timestamp {secs} out of range")))
}

// ============================================================================
// Data Structures
// ============================================================================

/// A subscribed feed as stored in the database.
///
/// The scheduler works on a snapshot of this per cycle; only `mark_fetched`
/// moves `last_fetched_at`, and never backwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feed {
    pub id: Uuid,
    pub name: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_fetched_at: Option<DateTime<Utc>>,
}

/// Parameters for inserting one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry {
    pub id: Uuid,
    pub feed_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub published_at: DateTime<Utc>,
    pub url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A persisted entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub id: Uuid,
    pub feed_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub published_at: DateTime<Utc>,
    pub url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
