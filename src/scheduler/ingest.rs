//! Turning fetched items into posts.
//!
//! Each item is handled on its own: a bad date, a duplicate URL or a failed
//! insert affects only that item, never its siblings.
use thiserror::Error;

use crate::feed::{parse_time, FeedItem, FetchedFeedDocument, TimeParseError};
use crate::storage::{CreatePostOutcome, DatabaseError, FeedStore, NewPost};

/// Why an item produced no post without anything going wrong.
#[derive(Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// A post with this URL is already stored (from any feed)
    DuplicateUrl,
    /// None of the known date layouts matched `pubDate`
    UnparseableTime(TimeParseError),
}

/// Result of ingesting one item that did not fail.
#[derive(Debug, PartialEq, Eq)]
pub enum IngestOutcome {
    Created(i64),
    Skipped(SkipReason),
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("item has no link")]
    MissingLink,
    #[error(transparent)]
    Store(#[from] DatabaseError),
}

/// Per-document totals.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestTally {
    /// Titles of newly stored posts, in document order
    pub created: Vec<String>,
    pub skipped: usize,
    pub failed: usize,
}

/// Stores a single item as a post of `feed_id`.
///
/// The publish date is normalized first; an unparseable date skips the item.
/// The item link is the post's identity, so a URL seen before (on this feed
/// or any other) resolves to [`SkipReason::DuplicateUrl`].
///
/// # Errors
///
/// [`IngestError::MissingLink`] for items without a link and
/// [`IngestError::Store`] when the insert itself fails.
pub async fn ingest_item(
    store: &dyn FeedStore,
    feed_id: i64,
    item: &FeedItem,
) -> Result<IngestOutcome, IngestError> {
    let published_at = match parse_time(&item.pub_date_raw) {
        Ok(at) => at,
        Err(e) => return Ok(IngestOutcome::Skipped(SkipReason::UnparseableTime(e))),
    };

    if item.link.is_empty() {
        return Err(IngestError::MissingLink);
    }

    let post = NewPost {
        feed_id,
        title: &item.title,
        url: &item.link,
        description: &item.description,
        published_at,
    };
    Ok(match store.create_post(&post).await? {
        CreatePostOutcome::Created(id) => IngestOutcome::Created(id),
        CreatePostOutcome::Duplicate => IngestOutcome::Skipped(SkipReason::DuplicateUrl),
    })
}

/// Ingests every item of `document` in order and tallies the results.
///
/// Never fails as a whole; per-item problems are logged and counted.
pub async fn ingest_document(
    store: &dyn FeedStore,
    feed_id: i64,
    document: &FetchedFeedDocument,
) -> IngestTally {
    let mut tally = IngestTally::default();

    for item in &document.items {
        match ingest_item(store, feed_id, item).await {
            Ok(IngestOutcome::Created(post_id)) => {
                tracing::debug!(feed_id, post_id, url = %item.link, "Created post");
                tally.created.push(item.title.clone());
            }
            Ok(IngestOutcome::Skipped(SkipReason::DuplicateUrl)) => {
                tracing::trace!(feed_id, url = %item.link, "Post already stored");
                tally.skipped += 1;
            }
            Ok(IngestOutcome::Skipped(SkipReason::UnparseableTime(e))) => {
                tracing::warn!(feed_id, url = %item.link, error = %e, "Skipping item");
                tally.skipped += 1;
            }
            Err(e) => {
                tracing::warn!(feed_id, title = %item.title, error = %e, "Failed to store item");
                tally.failed += 1;
            }
        }
    }

    tally
}
