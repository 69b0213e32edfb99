//! Bookmark commands and queries, backend-agnostic.
//!
//! All validation happens here, before the storage backend is touched: a
//! request that fails validation must leave the store exactly as it was.

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::info;

use crate::application::error::AppError;
use crate::application::pagination::PaginationError;
use crate::application::store::{
    BookmarkPage, BookmarkPatch, BookmarkQuery, BookmarkStore, IndexRebuild, StoreError,
};
use crate::domain::bookmarks::{
    BookmarkMetadata, BookmarkRecord, normalize_tags, parse_tweet_url, validate_notes,
};
use crate::domain::error::DomainError;

const METRIC_BOOKMARKS_SAVED_TOTAL: &str = "magpie_bookmarks_saved_total";
const METRIC_BOOKMARKS_UPDATED_TOTAL: &str = "magpie_bookmarks_updated_total";
const METRIC_BOOKMARKS_DELETED_TOTAL: &str = "magpie_bookmarks_deleted_total";
const METRIC_BOOKMARK_LIST_MS: &str = "magpie_bookmark_list_ms";

#[derive(Debug, Error)]
pub enum BookmarkError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Pagination(#[from] PaginationError),
}

impl From<BookmarkError> for AppError {
    fn from(error: BookmarkError) -> Self {
        match error {
            BookmarkError::Domain(err) => AppError::Domain(err),
            BookmarkError::Store(err) => AppError::Store(err),
            BookmarkError::Pagination(err) => AppError::Pagination(err),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SaveBookmarkCommand {
    pub url: String,
    pub tags: Vec<String>,
    pub notes: String,
    pub is_public: bool,
    pub metadata: Option<BookmarkMetadata>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateBookmarkCommand {
    pub tags: Option<Vec<String>>,
    pub notes: Option<String>,
    pub is_public: Option<bool>,
}

#[derive(Clone)]
pub struct BookmarkService {
    store: Arc<dyn BookmarkStore>,
}

impl BookmarkService {
    pub fn new(store: Arc<dyn BookmarkStore>) -> Self {
        Self { store }
    }

    /// Save a tweet. The record id is derived from the URL, so saving the
    /// same tweet again replaces the earlier record instead of duplicating
    /// it.
    pub async fn save(&self, cmd: SaveBookmarkCommand) -> Result<BookmarkRecord, BookmarkError> {
        let tweet = parse_tweet_url(&cmd.url)?;
        let tags = normalize_tags(&cmd.tags)?;
        validate_notes(&cmd.notes)?;

        let record = BookmarkRecord {
            id: tweet.bookmark_id(),
            url: cmd.url.trim().to_string(),
            tweet_id: tweet.tweet_id,
            author_username: tweet.author_username,
            saved_at: OffsetDateTime::now_utc(),
            tags,
            notes: cmd.notes,
            is_public: cmd.is_public,
            metadata: cmd.metadata,
        };
        let saved = self.store.save(record).await?;
        counter!(METRIC_BOOKMARKS_SAVED_TOTAL).increment(1);
        info!(id = %saved.id, author = %saved.author_username, "bookmark saved");
        Ok(saved)
    }

    pub async fn find(&self, id: &str) -> Result<Option<BookmarkRecord>, BookmarkError> {
        Ok(self.store.find(id).await?)
    }

    /// Patch tags, notes, or visibility. An empty patch is a no-op that
    /// still reports whether the record exists.
    pub async fn update(
        &self,
        id: &str,
        cmd: UpdateBookmarkCommand,
    ) -> Result<Option<BookmarkRecord>, BookmarkError> {
        let tags = cmd.tags.map(normalize_tags).transpose()?;
        if let Some(notes) = &cmd.notes {
            validate_notes(notes)?;
        }

        let patch = BookmarkPatch {
            tags,
            notes: cmd.notes,
            is_public: cmd.is_public,
        };
        let updated = self.store.update(id, patch).await?;
        if let Some(record) = &updated {
            counter!(METRIC_BOOKMARKS_UPDATED_TOTAL).increment(1);
            info!(id = %record.id, "bookmark updated");
        }
        Ok(updated)
    }

    pub async fn delete(&self, id: &str) -> Result<bool, BookmarkError> {
        let deleted = self.store.delete(id).await?;
        if deleted {
            counter!(METRIC_BOOKMARKS_DELETED_TOTAL).increment(1);
            info!(id, "bookmark deleted");
        }
        Ok(deleted)
    }

    pub async fn list(&self, query: &BookmarkQuery) -> Result<BookmarkPage, BookmarkError> {
        let started_at = Instant::now();
        let page = self.store.list(query).await?;
        histogram!(METRIC_BOOKMARK_LIST_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);
        Ok(page)
    }

    pub async fn all_tags(&self) -> Result<Vec<String>, BookmarkError> {
        Ok(self.store.all_tags().await?)
    }

    pub async fn export_all(&self) -> Result<Vec<BookmarkRecord>, BookmarkError> {
        Ok(self.store.export_all().await?)
    }

    pub async fn rebuild_indexes(&self) -> Result<IndexRebuild, BookmarkError> {
        let rebuilt = self.store.rebuild_indexes().await?;
        info!(
            records = rebuilt.records,
            index_entries = rebuilt.index_entries,
            "indexes rebuilt"
        );
        Ok(rebuilt)
    }
}
