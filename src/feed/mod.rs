//! Feed retrieval: HTTP fetching and RSS decoding.
//!
//! - [`fetcher`] - the [`FeedRetriever`] seam and its HTTP implementation
//! - [`parser`] - RSS 2.0 decoding into a [`ScrapedDocument`]
//! - [`date`] - the strict publish-date format applied to item dates
//!
//! A retriever makes a single attempt per call. Deciding when to try a feed
//! again is left to the scheduler.

mod date;
mod fetcher;
mod parser;

pub use date::{parse_pub_date, DateError};
pub use fetcher::{FeedRetriever, FetchError, HttpRetriever};
pub use parser::{parse_feed, ParseError, ScrapedDocument, ScrapedItem};
