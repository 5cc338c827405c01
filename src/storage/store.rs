use async_trait::async_trait;
use uuid::Uuid;

use super::schema::Database;
use super::types::{DatabaseError, Feed, NewEntry};

/// The durable store as seen by the scraper.
///
/// Implementations must tolerate concurrent calls from every worker of a
/// batch at once.
#[async_trait]
pub trait FeedStore: Send + Sync {
    /// Up to `limit` feeds due for a fetch, in the store's due order.
    async fn list_due_feeds(&self, limit: i64) -> Result<Vec<Feed>, DatabaseError>;

    /// Stamp the feed's last-fetched time with now.
    async fn mark_fetched(&self, feed_id: Uuid) -> Result<Feed, DatabaseError>;

    /// Insert one entry. An existing `(feed_id, url)` yields
    /// [`DatabaseError::Duplicate`].
    async fn create_entry(&self, entry: &NewEntry) -> Result<(), DatabaseError>;
}

#[async_trait]
impl FeedStore for Database {
    async fn list_due_feeds(&self, limit: i64) -> Result<Vec<Feed>, DatabaseError> {
        Database::list_due_feeds(self, limit).await
    }

    async fn mark_fetched(&self, feed_id: Uuid) -> Result<Feed, DatabaseError> {
        Database::mark_fetched(self, feed_id).await
    }

    async fn create_entry(&self, entry: &NewEntry) -> Result<(), DatabaseError> {
        Database::create_entry(self, entry).await
    }
}
