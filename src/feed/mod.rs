//! Remote feed retrieval.
//!
//! - [`fetcher`] - HTTP GET with timeout, user agent and body size cap
//! - [`parser`] - RSS 2.0 parsing into a [`FetchedFeedDocument`]
//! - [`time`] - publish-date normalization across the common RSS layouts

mod fetcher;
mod parser;
mod time;

pub use fetcher::{FetchError, Fetcher};
pub use parser::{parse_rss, FeedItem, FetchedFeedDocument, ParseError};
pub use time::{parse_time, TimeParseError};
