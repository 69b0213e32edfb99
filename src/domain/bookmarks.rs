//! Bookmark records and the tweet-URL rules that key them.
//!
//! A bookmark's identity is derived, never assigned: the id of a saved tweet
//! is `{author_username}-{tweet_id}`, extracted from the status URL at save
//! time, so saving the same tweet twice always lands on the same record.
//! Everything here is pure; the storage backends and the HTTP layer share
//! one set of rules.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use url::Url;

use crate::domain::error::DomainError;

pub const MAX_TAGS: usize = 10;
pub const MAX_TAG_CHARS: usize = 50;
pub const MAX_NOTES_CHARS: usize = 5000;
pub const MAX_USERNAME_CHARS: usize = 15;

const TWEET_HOSTS: [&str; 2] = ["twitter.com", "x.com"];

/// A saved tweet, as persisted and as served.
///
/// `url`, `tweet_id`, `author_username`, `saved_at` and `metadata` are fixed
/// at save time; only `tags`, `notes` and `is_public` are patchable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkRecord {
    pub id: String,
    pub url: String,
    pub tweet_id: String,
    pub author_username: String,
    #[serde(with = "time::serde::rfc3339")]
    pub saved_at: OffsetDateTime,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BookmarkMetadata>,
}

/// Snapshot of the tweet captured when it was saved. Never refreshed by
/// updates; a fresh save of the same URL replaces it wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// The `(author, tweet id)` pair extracted from a status URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TweetRef {
    pub author_username: String,
    pub tweet_id: String,
}

impl TweetRef {
    /// Canonical bookmark id: `{author_username}-{tweet_id}`.
    pub fn bookmark_id(&self) -> String {
        format!("{}-{}", self.author_username, self.tweet_id)
    }
}

/// Parse a tweet status URL into its author/tweet-id pair.
///
/// Accepts `twitter.com` and `x.com` hosts (optionally prefixed with `www.`
/// or `mobile.`) with a path of exactly `/{username}/status/{tweet_id}`.
/// Query strings and fragments are ignored. Anything else is a validation
/// error; callers never get a partial result.
pub fn parse_tweet_url(raw: &str) -> Result<TweetRef, DomainError> {
    let trimmed = raw.trim();
    let url = Url::parse(trimmed)
        .map_err(|_| DomainError::validation(format!("`{trimmed}` is not a valid URL")))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(DomainError::validation(format!(
            "unsupported URL scheme `{}`",
            url.scheme()
        )));
    }

    let host = url
        .host_str()
        .ok_or_else(|| DomainError::validation("tweet URL has no host"))?
        .to_ascii_lowercase();
    let bare_host = host
        .strip_prefix("www.")
        .or_else(|| host.strip_prefix("mobile."))
        .unwrap_or(&host);
    if !TWEET_HOSTS.contains(&bare_host) {
        return Err(DomainError::validation(format!(
            "`{host}` is not a recognized tweet host"
        )));
    }

    let segments: Vec<&str> = url
        .path_segments()
        .map(|parts| parts.filter(|segment| !segment.is_empty()).collect())
        .unwrap_or_default();
    let [username, marker, tweet_id] = segments.as_slice() else {
        return Err(DomainError::validation(
            "tweet URL path must be /{username}/status/{tweet_id}",
        ));
    };
    if *marker != "status" {
        return Err(DomainError::validation(
            "tweet URL path must be /{username}/status/{tweet_id}",
        ));
    }

    validate_username(username)?;
    if tweet_id.is_empty() || !tweet_id.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DomainError::validation(format!(
            "`{tweet_id}` is not a numeric tweet id"
        )));
    }

    Ok(TweetRef {
        author_username: (*username).to_string(),
        tweet_id: (*tweet_id).to_string(),
    })
}

fn validate_username(username: &str) -> Result<(), DomainError> {
    let ok = !username.is_empty()
        && username.chars().count() <= MAX_USERNAME_CHARS
        && username
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_');
    if ok {
        Ok(())
    } else {
        Err(DomainError::validation(format!(
            "`{username}` is not a valid tweet author username"
        )))
    }
}

/// Trim and de-duplicate a tag list, enforcing the per-tag and per-bookmark
/// limits. Order of first occurrence is preserved; duplicates after trimming
/// collapse silently, but an empty or oversized tag is an error, never
/// dropped.
pub fn normalize_tags<I, S>(tags: I) -> Result<Vec<String>, DomainError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut normalized: Vec<String> = Vec::new();
    for tag in tags {
        let trimmed = tag.as_ref().trim();
        if trimmed.is_empty() {
            return Err(DomainError::validation("tags must not be empty"));
        }
        if trimmed.chars().count() > MAX_TAG_CHARS {
            return Err(DomainError::validation(format!(
                "tag `{trimmed}` exceeds {MAX_TAG_CHARS} characters"
            )));
        }
        if !normalized.iter().any(|existing| existing == trimmed) {
            normalized.push(trimmed.to_string());
        }
    }
    if normalized.len() > MAX_TAGS {
        return Err(DomainError::validation(format!(
            "a bookmark can carry at most {MAX_TAGS} tags"
        )));
    }
    Ok(normalized)
}

pub fn validate_notes(notes: &str) -> Result<(), DomainError> {
    if notes.chars().count() > MAX_NOTES_CHARS {
        return Err(DomainError::validation(format!(
            "notes exceed {MAX_NOTES_CHARS} characters"
        )));
    }
    Ok(())
}

/// Case-insensitive substring match across notes, tags, and the captured
/// tweet text. This is the `q` filter of the list endpoint.
pub fn matches_query(record: &BookmarkRecord, query: &str) -> bool {
    let needle = query.to_lowercase();
    if needle.is_empty() {
        return true;
    }
    if record.notes.to_lowercase().contains(&needle) {
        return true;
    }
    if record
        .tags
        .iter()
        .any(|tag| tag.to_lowercase().contains(&needle))
    {
        return true;
    }
    record
        .metadata
        .as_ref()
        .and_then(|meta| meta.text.as_deref())
        .is_some_and(|text| text.to_lowercase().contains(&needle))
}
