//! Storage contract every bookmark backend implements.
//!
//! The two backends (redb and a flat JSON file) differ in how they find
//! candidate records, but filtering, ordering, and pagination all run through
//! [`finish_listing`] so a query returns the same page no matter which
//! backend is configured.

use async_trait::async_trait;
use thiserror::Error;

use crate::application::pagination::PageParams;
use crate::domain::bookmarks::{BookmarkRecord, matches_query};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),
    #[error("stored record `{id}` is corrupt: {reason}")]
    Corrupt { id: String, reason: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn backend(err: impl std::fmt::Display) -> Self {
        Self::Backend(err.to_string())
    }

    pub fn corrupt(id: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Corrupt {
            id: id.into(),
            reason: reason.to_string(),
        }
    }
}

/// Filters for a listing request. `None` means "don't filter on this".
#[derive(Debug, Clone, Default)]
pub struct BookmarkQuery {
    pub tag: Option<String>,
    pub q: Option<String>,
    pub public: Option<bool>,
    pub page: PageParams,
}

/// One page of a listing, with the total count of records matching the
/// filters (not just the ones on this page).
#[derive(Debug, Clone)]
pub struct BookmarkPage {
    pub items: Vec<BookmarkRecord>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

/// Partial update of the mutable fields. Absent fields are left alone.
#[derive(Debug, Clone, Default)]
pub struct BookmarkPatch {
    pub tags: Option<Vec<String>>,
    pub notes: Option<String>,
    pub is_public: Option<bool>,
}

impl BookmarkPatch {
    pub fn is_empty(&self) -> bool {
        self.tags.is_none() && self.notes.is_none() && self.is_public.is_none()
    }

    /// Fold the patch into `record`, leaving unspecified fields untouched.
    pub fn apply(&self, record: &mut BookmarkRecord) {
        if let Some(tags) = &self.tags {
            record.tags = tags.clone();
        }
        if let Some(notes) = &self.notes {
            record.notes = notes.clone();
        }
        if let Some(is_public) = self.is_public {
            record.is_public = is_public;
        }
    }
}

/// Outcome of an index rebuild: how many records were walked and how many
/// index entries were written back.
#[derive(Debug, Clone, Copy)]
pub struct IndexRebuild {
    pub records: u64,
    pub index_entries: u64,
}

#[async_trait]
pub trait BookmarkStore: Send + Sync {
    /// Insert or replace the record stored under `record.id`.
    async fn save(&self, record: BookmarkRecord) -> Result<BookmarkRecord, StoreError>;

    async fn find(&self, id: &str) -> Result<Option<BookmarkRecord>, StoreError>;

    /// Apply `patch` to an existing record. `Ok(None)` when the id is
    /// unknown; the store is left untouched in that case.
    async fn update(
        &self,
        id: &str,
        patch: BookmarkPatch,
    ) -> Result<Option<BookmarkRecord>, StoreError>;

    /// Remove a record and its index entries. `Ok(false)` when the id is
    /// unknown.
    async fn delete(&self, id: &str) -> Result<bool, StoreError>;

    async fn list(&self, query: &BookmarkQuery) -> Result<BookmarkPage, StoreError>;

    /// The tag vocabulary, sorted case-insensitively. The redb backend
    /// persists this additively (deleting a bookmark does not retire its
    /// tags); the flat-file backend derives it from live records.
    async fn all_tags(&self) -> Result<Vec<String>, StoreError>;

    /// All records, newest first, for export.
    async fn export_all(&self) -> Result<Vec<BookmarkRecord>, StoreError>;

    /// Drop and regenerate whatever derived state the backend keeps.
    async fn rebuild_indexes(&self) -> Result<IndexRebuild, StoreError>;
}

/// Newest first; ties on `saved_at` break by id ascending so the order is
/// total and repeatable.
pub fn sort_newest_first(records: &mut [BookmarkRecord]) {
    records.sort_by(|a, b| b.saved_at.cmp(&a.saved_at).then_with(|| a.id.cmp(&b.id)));
}

/// Case-insensitive tag ordering, with the exact spelling as tie-break so
/// case variants still come out in a stable order.
pub fn sort_tags(tags: &mut [String]) {
    tags.sort_by(|a, b| {
        a.to_lowercase()
            .cmp(&b.to_lowercase())
            .then_with(|| a.cmp(b))
    });
}

/// Shared tail of every listing: order the candidates, apply the tag, public
/// and substring filters, count the matches, then cut the requested page.
pub fn finish_listing(mut records: Vec<BookmarkRecord>, query: &BookmarkQuery) -> BookmarkPage {
    sort_newest_first(&mut records);
    if let Some(tag) = &query.tag {
        records.retain(|record| record.tags.iter().any(|t| t == tag));
    }
    if let Some(is_public) = query.public {
        records.retain(|record| record.is_public == is_public);
    }
    if let Some(q) = &query.q {
        records.retain(|record| matches_query(record, q));
    }

    let total = records.len() as u64;
    let items = records
        .into_iter()
        .skip(query.page.offset())
        .take(query.page.limit() as usize)
        .collect();
    BookmarkPage {
        items,
        total,
        page: query.page.page(),
        limit: query.page.limit(),
    }
}
