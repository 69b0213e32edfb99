//! Conversions between domain records and the wire types in
//! `magpie-api-types`.

use time::OffsetDateTime;

use magpie_api_types::{
    BookmarkExportDocument, BookmarkListResponse, BookmarkMetadataPayload, BookmarkPayload,
};

use crate::application::store::BookmarkPage;
use crate::domain::bookmarks::{BookmarkMetadata, BookmarkRecord};

impl From<BookmarkMetadata> for BookmarkMetadataPayload {
    fn from(metadata: BookmarkMetadata) -> Self {
        Self {
            author_name: metadata.author_name,
            text: metadata.text,
        }
    }
}

pub fn metadata_from_payload(payload: BookmarkMetadataPayload) -> BookmarkMetadata {
    BookmarkMetadata {
        author_name: payload.author_name,
        text: payload.text,
    }
}

impl From<BookmarkRecord> for BookmarkPayload {
    fn from(record: BookmarkRecord) -> Self {
        Self {
            id: record.id,
            url: record.url,
            tweet_id: record.tweet_id,
            author_username: record.author_username,
            saved_at: record.saved_at,
            tags: record.tags,
            notes: record.notes,
            is_public: record.is_public,
            metadata: record.metadata.map(BookmarkMetadataPayload::from),
        }
    }
}

pub fn list_response(page: BookmarkPage) -> BookmarkListResponse {
    BookmarkListResponse {
        tweets: page.items.into_iter().map(BookmarkPayload::from).collect(),
        total: page.total,
        page: page.page,
        limit: page.limit,
    }
}

pub fn export_document(
    records: Vec<BookmarkRecord>,
    exported_at: OffsetDateTime,
) -> BookmarkExportDocument {
    BookmarkExportDocument {
        exported_at,
        total: records.len() as u64,
        tweets: records.into_iter().map(BookmarkPayload::from).collect(),
    }
}
