//! Flat-file bookmark store: one JSON document holding every record.
//!
//! Reads parse the whole file. Writes rewrite it through a temp file in the
//! same directory followed by an atomic rename, and a single async mutex
//! serializes writers, so concurrent saves queue up instead of clobbering
//! each other. Readers see either the old document or the new one, never a
//! torn write.
//!
//! There are no secondary indexes in this mode; the tag vocabulary is
//! derived from live records, so deleting the last bookmark with a tag also
//! retires the tag here.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tokio::sync::Mutex;

use crate::application::store::{
    BookmarkPage, BookmarkPatch, BookmarkQuery, BookmarkStore, IndexRebuild, StoreError,
    finish_listing, sort_newest_first, sort_tags,
};
use crate::domain::bookmarks::BookmarkRecord;

/// On-disk layout: a single object keyed by bookmark id.
#[derive(Debug, Default, Serialize, Deserialize)]
struct BookmarkFile {
    #[serde(default)]
    tweets: BTreeMap<String, BookmarkRecord>,
}

pub struct JsonFileBookmarkStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileBookmarkStore {
    /// Point the store at `path`, creating parent directories. The file
    /// itself is only created by the first write; a missing file reads as an
    /// empty collection.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self {
            path: path.to_path_buf(),
            write_lock: Mutex::new(()),
        })
    }

    async fn load(&self) -> Result<BookmarkFile, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(BookmarkFile::default());
            }
            Err(err) => return Err(StoreError::Io(err)),
        };
        serde_json::from_slice(&bytes).map_err(|err| {
            StoreError::backend(format!("failed to parse `{}`: {err}", self.path.display()))
        })
    }

    async fn persist(&self, file: &BookmarkFile) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(file)
            .map_err(|err| StoreError::backend(format!("failed to encode bookmark file: {err}")))?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || persist_blocking(&path, &bytes))
            .await
            .map_err(|err| StoreError::backend(format!("storage task failed: {err}")))?
    }
}

fn persist_blocking(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let dir = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut temp_file = NamedTempFile::new_in(dir)?;
    temp_file.write_all(bytes)?;
    temp_file.flush()?;
    temp_file
        .persist(path)
        .map_err(|err| StoreError::Io(err.error))?;
    Ok(())
}

#[async_trait]
impl BookmarkStore for JsonFileBookmarkStore {
    async fn save(&self, record: BookmarkRecord) -> Result<BookmarkRecord, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut file = self.load().await?;
        file.tweets.insert(record.id.clone(), record.clone());
        self.persist(&file).await?;
        Ok(record)
    }

    async fn find(&self, id: &str) -> Result<Option<BookmarkRecord>, StoreError> {
        let mut file = self.load().await?;
        Ok(file.tweets.remove(id))
    }

    async fn update(
        &self,
        id: &str,
        patch: BookmarkPatch,
    ) -> Result<Option<BookmarkRecord>, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut file = self.load().await?;
        let Some(record) = file.tweets.get_mut(id) else {
            return Ok(None);
        };
        patch.apply(record);
        let updated = record.clone();
        self.persist(&file).await?;
        Ok(Some(updated))
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut file = self.load().await?;
        if file.tweets.remove(id).is_none() {
            return Ok(false);
        }
        self.persist(&file).await?;
        Ok(true)
    }

    async fn list(&self, query: &BookmarkQuery) -> Result<BookmarkPage, StoreError> {
        let file = self.load().await?;
        let records = file.tweets.into_values().collect();
        Ok(finish_listing(records, query))
    }

    async fn all_tags(&self) -> Result<Vec<String>, StoreError> {
        let file = self.load().await?;
        let unique: BTreeSet<String> = file
            .tweets
            .values()
            .flat_map(|record| record.tags.iter().cloned())
            .collect();
        let mut tags: Vec<String> = unique.into_iter().collect();
        sort_tags(&mut tags);
        Ok(tags)
    }

    async fn export_all(&self) -> Result<Vec<BookmarkRecord>, StoreError> {
        let file = self.load().await?;
        let mut records: Vec<BookmarkRecord> = file.tweets.into_values().collect();
        sort_newest_first(&mut records);
        Ok(records)
    }

    /// Nothing is derived on disk in this mode; reported as a walk with zero
    /// entries written.
    async fn rebuild_indexes(&self) -> Result<IndexRebuild, StoreError> {
        let file = self.load().await?;
        Ok(IndexRebuild {
            records: file.tweets.len() as u64,
            index_entries: 0,
        })
    }
}
