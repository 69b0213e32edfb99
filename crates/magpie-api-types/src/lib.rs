//! Shared request and response types for the Magpie bookmark API.
//!
//! Everything here serializes with camelCase field names and RFC 3339
//! timestamps, matching both the HTTP wire format and the on-disk JSON
//! layout of the file-backed store.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Body of `POST /api/bookmarks`. Unknown fields fail deserialization so
/// client typos surface as errors instead of silently dropped data.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SaveBookmarkRequest {
    pub url: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub metadata: Option<BookmarkMetadataPayload>,
}

/// Body of `PATCH /api/bookmarks/{id}`. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateBookmarkRequest {
    pub tags: Option<Vec<String>>,
    pub notes: Option<String>,
    pub is_public: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BookmarkMetadataPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkPayload {
    pub id: String,
    pub url: String,
    pub tweet_id: String,
    pub author_username: String,
    #[serde(with = "time::serde::rfc3339")]
    pub saved_at: OffsetDateTime,
    pub tags: Vec<String>,
    pub notes: String,
    pub is_public: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BookmarkMetadataPayload>,
}

/// Envelope of `GET /api/bookmarks`: one page of results plus the size of
/// the whole filtered set.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkListResponse {
    pub tweets: Vec<BookmarkPayload>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TagListResponse {
    pub tags: Vec<String>,
}

/// Full-collection export, newest first.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkExportDocument {
    #[serde(with = "time::serde::rfc3339")]
    pub exported_at: OffsetDateTime,
    pub total: u64,
    pub tweets: Vec<BookmarkPayload>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn save_request_rejects_unknown_fields() {
        let body = r#"{"url":"https://x.com/alice/status/42","tagz":["oops"]}"#;
        let err = serde_json::from_str::<SaveBookmarkRequest>(body).unwrap_err();
        assert!(err.to_string().contains("tagz"));
    }

    #[test]
    fn update_request_fields_default_to_absent() {
        let patch: UpdateBookmarkRequest = serde_json::from_str("{}").unwrap();
        assert!(patch.tags.is_none());
        assert!(patch.notes.is_none());
        assert!(patch.is_public.is_none());
    }

    #[test]
    fn payload_uses_camel_case_and_rfc3339() {
        let payload = BookmarkPayload {
            id: "alice-42".into(),
            url: "https://twitter.com/alice/status/42".into(),
            tweet_id: "42".into(),
            author_username: "alice".into(),
            saved_at: datetime!(2024-03-01 12:30:00 UTC),
            tags: vec!["rust".into()],
            notes: String::new(),
            is_public: false,
            metadata: None,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["authorUsername"], "alice");
        assert_eq!(json["savedAt"], "2024-03-01T12:30:00Z");
        assert_eq!(json["isPublic"], false);
        assert!(json.get("metadata").is_none());
    }
}
