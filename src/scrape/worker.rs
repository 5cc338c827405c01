use chrono::Utc;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use super::{Cancellation, ScrapeContext};
use crate::feed::{parse_pub_date, FetchError, ScrapedItem};
use crate::storage::{DatabaseError, Feed, NewEntry};

/// The external call a worker was making when it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Claim,
    Fetch,
    Write,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Claim => "claim",
            Stage::Fetch => "fetch",
            Stage::Write => "write",
        };
        f.write_str(name)
    }
}

/// Reasons a feed's processing stopped before reaching its items.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Marking the feed as fetched failed; nothing else was attempted.
    #[error("Failed to claim feed: {0}")]
    Claim(#[source] DatabaseError),
    /// Retrieval failed after the claim was recorded.
    #[error("Failed to fetch feed: {0}")]
    Fetch(#[source] FetchError),
    /// An external call exceeded its deadline.
    #[error("{0} timed out after {1:?}")]
    Timeout(Stage, Duration),
    /// Shutdown was requested while the call was pending.
    #[error("Cancelled during {0}")]
    Cancelled(Stage),
}

/// Per-feed counters for one run of the worker.
///
/// `items_found` is the number of items in the fetched document, whatever
/// happened to them; the other counters partition it.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FeedOutcome {
    pub items_found: usize,
    pub inserted: usize,
    pub duplicates: usize,
    /// Items dropped because their publish date did not parse.
    pub skipped: usize,
    /// Items whose write failed for a reason other than a duplicate.
    pub failed: usize,
}

/// Run the claim → fetch → write pipeline for one feed.
///
/// Item-level problems (bad dates, failed writes) are logged and counted in
/// the returned [`FeedOutcome`]; they never stop the remaining items. Only a
/// failed claim, a failed fetch, or cancellation ends the run early, and the
/// caller is expected to log that error.
pub async fn scrape_feed(
    ctx: &ScrapeContext,
    feed: &Feed,
    mut cancel: Cancellation,
) -> Result<FeedOutcome, ScrapeError> {
    let timeout = ctx.settings.call_timeout;

    // Claim first so a feed that always fails still moves to the back of the queue
    cancel
        .guard(Stage::Claim, timeout, ctx.store.mark_fetched(feed.id))
        .await?
        .map_err(ScrapeError::Claim)?;

    let document = cancel
        .guard(Stage::Fetch, timeout, ctx.retriever.fetch_and_parse(&feed.url))
        .await?
        .map_err(ScrapeError::Fetch)?;

    let mut outcome = FeedOutcome {
        items_found: document.items.len(),
        ..FeedOutcome::default()
    };

    for item in document.items {
        let link = item.link.clone();
        let Some(entry) = build_entry(feed, item) else {
            outcome.skipped += 1;
            continue;
        };

        match cancel
            .guard(Stage::Write, timeout, ctx.store.create_entry(&entry))
            .await
        {
            Ok(Ok(())) => outcome.inserted += 1,
            Ok(Err(e)) if e.is_duplicate() => {
                tracing::trace!(feed = %feed.name, link = %link, "Entry already stored");
                outcome.duplicates += 1;
            }
            Ok(Err(e)) => {
                tracing::warn!(
                    feed = %feed.name,
                    link = %link,
                    error = %e,
                    "Failed to store entry"
                );
                outcome.failed += 1;
            }
            Err(e @ ScrapeError::Cancelled(_)) => return Err(e),
            Err(e) => {
                tracing::warn!(feed = %feed.name, link = %link, error = %e, "Entry write abandoned");
                outcome.failed += 1;
            }
        }
    }

    tracing::info!(
        feed = %feed.name,
        items_found = outcome.items_found,
        inserted = outcome.inserted,
        duplicates = outcome.duplicates,
        skipped = outcome.skipped,
        failed = outcome.failed,
        "Feed collected"
    );

    Ok(outcome)
}

/// Turn a scraped item into insert parameters, or `None` if its publish
/// date is unusable.
fn build_entry(feed: &Feed, item: ScrapedItem) -> Option<NewEntry> {
    let published_at = match parse_pub_date(&item.pub_date) {
        Ok(dt) => dt,
        Err(e) => {
            tracing::warn!(feed = %feed.name, link = %item.link, error = %e, "Skipping item");
            return None;
        }
    };

    let description = if item.description.is_empty() {
        None
    } else {
        Some(item.description)
    };

    let now = Utc::now();
    Some(NewEntry {
        id: Uuid::new_v4(),
        feed_id: feed.id,
        title: item.title,
        description,
        published_at,
        url: item.link,
        created_at: now,
        updated_at: now,
    })
}
