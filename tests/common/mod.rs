//! In-memory doubles for the store and retriever seams.
#![allow(dead_code)] // Each test binary uses a different subset

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use feedsync::feed::{FeedRetriever, FetchError, ScrapedDocument, ScrapedItem};
use feedsync::scrape::{ScrapeContext, ScrapeSettings};
use feedsync::storage::{DatabaseError, Feed, FeedStore, NewEntry};

pub const GOOD_DATE: &str = "Mon, 02 Jan 2006 15:04:05 -0700";

pub fn feed(name: &str) -> Feed {
    let now = Utc::now();
    Feed {
        id: Uuid::new_v4(),
        name: name.to_string(),
        url: format!("https://{name}.example.com/rss"),
        created_at: now,
        updated_at: now,
        last_fetched_at: None,
    }
}

pub fn item(title: &str, link: &str, pub_date: &str) -> ScrapedItem {
    ScrapedItem {
        title: title.to_string(),
        link: link.to_string(),
        description: String::new(),
        pub_date: pub_date.to_string(),
    }
}

pub fn document(items: Vec<ScrapedItem>) -> ScrapedDocument {
    ScrapedDocument {
        title: "Channel".to_string(),
        items,
    }
}

pub fn settings(concurrency: usize) -> ScrapeSettings {
    ScrapeSettings {
        concurrency,
        interval: Duration::from_secs(60),
        call_timeout: Duration::from_secs(30),
    }
}

pub fn context(
    store: &Arc<MemoryStore>,
    retriever: &Arc<StubRetriever>,
    settings: ScrapeSettings,
) -> ScrapeContext {
    ScrapeContext::new(store.clone(), retriever.clone(), settings)
}

fn backend_failure() -> DatabaseError {
    DatabaseError::Other(sqlx::Error::PoolTimedOut)
}

// ============================================================================
// Store
// ============================================================================

/// A [`FeedStore`] that keeps everything in memory and records every call.
#[derive(Default)]
pub struct MemoryStore {
    feeds: Mutex<Vec<Feed>>,
    entries: Mutex<Vec<NewEntry>>,
    claims: Mutex<Vec<Uuid>>,
    list_limits: Mutex<Vec<i64>>,
    /// Worker fetches in flight at the moment of each due-feed query.
    in_flight_at_list: Mutex<Vec<usize>>,
    failing_lists: AtomicUsize,
    failing_claims: Mutex<HashSet<Uuid>>,
    failing_links: Mutex<HashSet<String>>,
    write_delay: Mutex<Option<Duration>>,
    in_flight: Mutex<Option<Arc<AtomicUsize>>>,
}

impl MemoryStore {
    pub fn with_feeds(feeds: Vec<Feed>) -> Arc<Self> {
        let store = Self::default();
        *store.feeds.lock().unwrap() = feeds;
        Arc::new(store)
    }

    /// Fail the next `n` due-feed queries.
    pub fn fail_lists(&self, n: usize) {
        self.failing_lists.store(n, Ordering::SeqCst);
    }

    pub fn fail_claim(&self, feed_id: Uuid) {
        self.failing_claims.lock().unwrap().insert(feed_id);
    }

    pub fn fail_write(&self, link: &str) {
        self.failing_links.lock().unwrap().insert(link.to_string());
    }

    pub fn delay_writes(&self, delay: Duration) {
        *self.write_delay.lock().unwrap() = Some(delay);
    }

    /// Share the retriever's in-flight counter so due-feed queries can
    /// record whether a batch was still running.
    pub fn watch_in_flight(&self, counter: Arc<AtomicUsize>) {
        *self.in_flight.lock().unwrap() = Some(counter);
    }

    pub fn entries(&self) -> Vec<NewEntry> {
        self.entries.lock().unwrap().clone()
    }

    pub fn entries_for(&self, feed_id: Uuid) -> Vec<NewEntry> {
        self.entries()
            .into_iter()
            .filter(|e| e.feed_id == feed_id)
            .collect()
    }

    pub fn claims(&self) -> Vec<Uuid> {
        self.claims.lock().unwrap().clone()
    }

    pub fn list_limits(&self) -> Vec<i64> {
        self.list_limits.lock().unwrap().clone()
    }

    pub fn in_flight_at_list(&self) -> Vec<usize> {
        self.in_flight_at_list.lock().unwrap().clone()
    }

    pub fn feed(&self, feed_id: Uuid) -> Option<Feed> {
        self.feeds
            .lock()
            .unwrap()
            .iter()
            .find(|f| f.id == feed_id)
            .cloned()
    }
}

#[async_trait]
impl FeedStore for MemoryStore {
    async fn list_due_feeds(&self, limit: i64) -> Result<Vec<Feed>, DatabaseError> {
        self.list_limits.lock().unwrap().push(limit);
        if let Some(counter) = self.in_flight.lock().unwrap().as_ref() {
            self.in_flight_at_list
                .lock()
                .unwrap()
                .push(counter.load(Ordering::SeqCst));
        }

        let remaining = self.failing_lists.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_lists.store(remaining - 1, Ordering::SeqCst);
            return Err(backend_failure());
        }

        let mut feeds = self.feeds.lock().unwrap().clone();
        // None sorts before Some: never-fetched feeds first
        feeds.sort_by_key(|f| f.last_fetched_at);
        feeds.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(feeds)
    }

    async fn mark_fetched(&self, feed_id: Uuid) -> Result<Feed, DatabaseError> {
        self.claims.lock().unwrap().push(feed_id);
        if self.failing_claims.lock().unwrap().contains(&feed_id) {
            return Err(backend_failure());
        }

        let mut feeds = self.feeds.lock().unwrap();
        let feed = feeds
            .iter_mut()
            .find(|f| f.id == feed_id)
            .ok_or(DatabaseError::FeedNotFound(feed_id))?;
        let now = Utc::now();
        feed.last_fetched_at = Some(feed.last_fetched_at.map_or(now, |prev| prev.max(now)));
        feed.updated_at = now;
        Ok(feed.clone())
    }

    async fn create_entry(&self, entry: &NewEntry) -> Result<(), DatabaseError> {
        let delay = *self.write_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_links.lock().unwrap().contains(&entry.url) {
            return Err(backend_failure());
        }

        let mut entries = self.entries.lock().unwrap();
        if entries
            .iter()
            .any(|e| e.feed_id == entry.feed_id && e.url == entry.url)
        {
            return Err(DatabaseError::Duplicate(
                "UNIQUE constraint failed: entries.feed_id, entries.url".to_string(),
            ));
        }
        entries.push(entry.clone());
        Ok(())
    }
}

// ============================================================================
// Retriever
// ============================================================================

#[derive(Clone)]
pub enum Response {
    Document(ScrapedDocument),
    Status(u16),
    Panic,
}

/// A [`FeedRetriever`] serving canned responses by URL.
#[derive(Default)]
pub struct StubRetriever {
    responses: Mutex<HashMap<String, Response>>,
    calls: Mutex<Vec<String>>,
    delay: Mutex<Option<Duration>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: AtomicUsize,
}

impl StubRetriever {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, url: &str, response: Response) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), response);
    }

    pub fn delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn in_flight(&self) -> Arc<AtomicUsize> {
        self.in_flight.clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedRetriever for StubRetriever {
    async fn fetch_and_parse(&self, url: &str) -> Result<ScrapedDocument, FetchError> {
        self.calls.lock().unwrap().push(url.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let response = self.responses.lock().unwrap().get(url).cloned();
        match response {
            Some(Response::Document(doc)) => Ok(doc),
            Some(Response::Status(code)) => Err(FetchError::HttpStatus(code)),
            Some(Response::Panic) => panic!("retriever exploded on {url}"),
            None => Err(FetchError::HttpStatus(404)),
        }
    }
}
