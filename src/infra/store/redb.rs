//! redb-backed bookmark store.
//!
//! Everything lives in one table under namespaced keys:
//!
//! * `tweet:{id}`            - the record itself, JSON-encoded
//! * `recency:{inv_ts}:{id}` - newest-first listing order (inverted timestamp)
//! * `tag:{tag}:{id}`        - membership per tag
//! * `public:{id}`           - the public subset
//! * `tagv:{tag}`            - tag vocabulary, only ever added to
//!
//! Index keys carry empty values. Every mutation rewrites the record and its
//! index entries in a single write transaction, so readers never observe a
//! record without its indexes or the other way round.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use redb::{Database, ReadableTable, Table, TableDefinition};
use time::OffsetDateTime;

use crate::application::store::{
    BookmarkPage, BookmarkPatch, BookmarkQuery, BookmarkStore, IndexRebuild, StoreError,
    finish_listing, sort_newest_first, sort_tags,
};
use crate::domain::bookmarks::BookmarkRecord;

const TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("bookmarks");
const EMPTY: &[u8] = &[];

const RECORD_PREFIX: &str = "tweet:";
const RECENCY_PREFIX: &str = "recency:";
const TAG_PREFIX: &str = "tag:";
const PUBLIC_PREFIX: &str = "public:";
const VOCABULARY_PREFIX: &str = "tagv:";

pub struct RedbBookmarkStore {
    db: Arc<Database>,
}

impl RedbBookmarkStore {
    /// Open or create the database at `path`, creating parent directories
    /// and the table as needed.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path).map_err(StoreError::backend)?;

        let write_txn = db.begin_write().map_err(StoreError::backend)?;
        {
            let _table = write_txn.open_table(TABLE).map_err(StoreError::backend)?;
        }
        write_txn.commit().map_err(StoreError::backend)?;

        Ok(Self { db: Arc::new(db) })
    }
}

#[async_trait]
impl BookmarkStore for RedbBookmarkStore {
    async fn save(&self, record: BookmarkRecord) -> Result<BookmarkRecord, StoreError> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || save_blocking(&db, record))
            .await
            .map_err(join_error)?
    }

    async fn find(&self, id: &str) -> Result<Option<BookmarkRecord>, StoreError> {
        let db = self.db.clone();
        let id = id.to_string();
        tokio::task::spawn_blocking(move || find_blocking(&db, &id))
            .await
            .map_err(join_error)?
    }

    async fn update(
        &self,
        id: &str,
        patch: BookmarkPatch,
    ) -> Result<Option<BookmarkRecord>, StoreError> {
        let db = self.db.clone();
        let id = id.to_string();
        tokio::task::spawn_blocking(move || update_blocking(&db, &id, patch))
            .await
            .map_err(join_error)?
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let db = self.db.clone();
        let id = id.to_string();
        tokio::task::spawn_blocking(move || delete_blocking(&db, &id))
            .await
            .map_err(join_error)?
    }

    async fn list(&self, query: &BookmarkQuery) -> Result<BookmarkPage, StoreError> {
        let db = self.db.clone();
        let query = query.clone();
        tokio::task::spawn_blocking(move || list_blocking(&db, &query))
            .await
            .map_err(join_error)?
    }

    async fn all_tags(&self) -> Result<Vec<String>, StoreError> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || all_tags_blocking(&db))
            .await
            .map_err(join_error)?
    }

    async fn export_all(&self) -> Result<Vec<BookmarkRecord>, StoreError> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || export_all_blocking(&db))
            .await
            .map_err(join_error)?
    }

    async fn rebuild_indexes(&self) -> Result<IndexRebuild, StoreError> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || rebuild_indexes_blocking(&db))
            .await
            .map_err(join_error)?
    }
}

fn save_blocking(db: &Database, record: BookmarkRecord) -> Result<BookmarkRecord, StoreError> {
    let bytes = encode_record(&record)?;
    let write_txn = db.begin_write().map_err(StoreError::backend)?;
    {
        let mut table = write_txn.open_table(TABLE).map_err(StoreError::backend)?;
        if let Some(previous) = read_record(&table, &record.id)? {
            remove_index_entries(&mut table, &previous)?;
        }
        table
            .insert(record_key(&record.id).as_str(), bytes.as_slice())
            .map_err(StoreError::backend)?;
        insert_index_entries(&mut table, &record)?;
    }
    write_txn.commit().map_err(StoreError::backend)?;
    Ok(record)
}

fn find_blocking(db: &Database, id: &str) -> Result<Option<BookmarkRecord>, StoreError> {
    let read_txn = db.begin_read().map_err(StoreError::backend)?;
    let table = read_txn.open_table(TABLE).map_err(StoreError::backend)?;
    read_record(&table, id)
}

fn update_blocking(
    db: &Database,
    id: &str,
    patch: BookmarkPatch,
) -> Result<Option<BookmarkRecord>, StoreError> {
    let write_txn = db.begin_write().map_err(StoreError::backend)?;
    let mut updated = None;
    {
        let mut table = write_txn.open_table(TABLE).map_err(StoreError::backend)?;
        if let Some(previous) = read_record(&table, id)? {
            let mut record = previous.clone();
            patch.apply(&mut record);
            let bytes = encode_record(&record)?;

            remove_index_entries(&mut table, &previous)?;
            table
                .insert(record_key(id).as_str(), bytes.as_slice())
                .map_err(StoreError::backend)?;
            insert_index_entries(&mut table, &record)?;
            updated = Some(record);
        }
    }
    write_txn.commit().map_err(StoreError::backend)?;
    Ok(updated)
}

fn delete_blocking(db: &Database, id: &str) -> Result<bool, StoreError> {
    let write_txn = db.begin_write().map_err(StoreError::backend)?;
    let mut deleted = false;
    {
        let mut table = write_txn.open_table(TABLE).map_err(StoreError::backend)?;
        if let Some(previous) = read_record(&table, id)? {
            table
                .remove(record_key(id).as_str())
                .map_err(StoreError::backend)?;
            remove_index_entries(&mut table, &previous)?;
            deleted = true;
        }
    }
    write_txn.commit().map_err(StoreError::backend)?;
    Ok(deleted)
}

fn list_blocking(db: &Database, query: &BookmarkQuery) -> Result<BookmarkPage, StoreError> {
    let read_txn = db.begin_read().map_err(StoreError::backend)?;
    let table = read_txn.open_table(TABLE).map_err(StoreError::backend)?;

    // Pick the narrowest index for the base candidate set; the shared
    // pipeline re-applies every filter, so an over-wide set is never wrong.
    let candidates = match (&query.tag, query.public) {
        (Some(tag), _) => {
            let mut suffixes = scan_suffixes(&table, &format!("{TAG_PREFIX}{tag}:"))?;
            // A longer tag can share this prefix; ids never contain ':'.
            suffixes.retain(|suffix| !suffix.contains(':'));
            suffixes
        }
        (None, Some(true)) => scan_suffixes(&table, PUBLIC_PREFIX)?,
        _ => recency_ids(&table)?,
    };

    let mut records = Vec::with_capacity(candidates.len());
    for id in candidates {
        if let Some(record) = read_record(&table, &id)? {
            records.push(record);
        }
    }
    Ok(finish_listing(records, query))
}

fn all_tags_blocking(db: &Database) -> Result<Vec<String>, StoreError> {
    let read_txn = db.begin_read().map_err(StoreError::backend)?;
    let table = read_txn.open_table(TABLE).map_err(StoreError::backend)?;
    let mut tags = scan_suffixes(&table, VOCABULARY_PREFIX)?;
    sort_tags(&mut tags);
    Ok(tags)
}

fn export_all_blocking(db: &Database) -> Result<Vec<BookmarkRecord>, StoreError> {
    let read_txn = db.begin_read().map_err(StoreError::backend)?;
    let table = read_txn.open_table(TABLE).map_err(StoreError::backend)?;
    // Walk the records themselves rather than the recency index: an export
    // must include everything, even if an index has drifted.
    let mut records = scan_records(&table)?;
    sort_newest_first(&mut records);
    Ok(records)
}

fn rebuild_indexes_blocking(db: &Database) -> Result<IndexRebuild, StoreError> {
    let write_txn = db.begin_write().map_err(StoreError::backend)?;
    let rebuilt;
    {
        let mut table = write_txn.open_table(TABLE).map_err(StoreError::backend)?;

        let mut stale = Vec::new();
        for prefix in [RECENCY_PREFIX, TAG_PREFIX, PUBLIC_PREFIX, VOCABULARY_PREFIX] {
            let iter = table.range(prefix..).map_err(StoreError::backend)?;
            for entry in iter {
                let entry = entry.map_err(StoreError::backend)?;
                let key = entry.0.value().to_string();
                if !key.starts_with(prefix) {
                    break;
                }
                stale.push(key);
            }
        }
        for key in stale {
            table.remove(key.as_str()).map_err(StoreError::backend)?;
        }

        let records = scan_records(&table)?;
        let mut index_entries = 0u64;
        for record in &records {
            index_entries += insert_index_entries(&mut table, record)?;
        }
        rebuilt = IndexRebuild {
            records: records.len() as u64,
            index_entries,
        };
    }
    write_txn.commit().map_err(StoreError::backend)?;
    Ok(rebuilt)
}

fn read_record<T>(table: &T, id: &str) -> Result<Option<BookmarkRecord>, StoreError>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    match table.get(record_key(id).as_str()) {
        Ok(Some(value)) => decode_record(id, value.value()).map(Some),
        Ok(None) => Ok(None),
        Err(err) => Err(StoreError::backend(err)),
    }
}

/// Key suffixes under `prefix`, in key order.
fn scan_suffixes<T>(table: &T, prefix: &str) -> Result<Vec<String>, StoreError>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    let mut suffixes = Vec::new();
    let iter = table.range(prefix..).map_err(StoreError::backend)?;
    for entry in iter {
        let entry = entry.map_err(StoreError::backend)?;
        let key = entry.0.value().to_string();
        if !key.starts_with(prefix) {
            break;
        }
        suffixes.push(key[prefix.len()..].to_string());
    }
    Ok(suffixes)
}

/// Record ids in recency order, newest first.
fn recency_ids<T>(table: &T) -> Result<Vec<String>, StoreError>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    let suffixes = scan_suffixes(table, RECENCY_PREFIX)?;
    Ok(suffixes
        .into_iter()
        .filter_map(|suffix| suffix.split_once(':').map(|(_, id)| id.to_string()))
        .collect())
}

fn scan_records<T>(table: &T) -> Result<Vec<BookmarkRecord>, StoreError>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    let mut records = Vec::new();
    let iter = table.range(RECORD_PREFIX..).map_err(StoreError::backend)?;
    for entry in iter {
        let entry = entry.map_err(StoreError::backend)?;
        let key = entry.0.value().to_string();
        if !key.starts_with(RECORD_PREFIX) {
            break;
        }
        let id = &key[RECORD_PREFIX.len()..];
        records.push(decode_record(id, entry.1.value())?);
    }
    Ok(records)
}

fn insert_index_entries(
    table: &mut Table<'_, &'static str, &'static [u8]>,
    record: &BookmarkRecord,
) -> Result<u64, StoreError> {
    let mut written = 0u64;
    table
        .insert(recency_key(record.saved_at, &record.id).as_str(), EMPTY)
        .map_err(StoreError::backend)?;
    written += 1;
    for tag in &record.tags {
        table
            .insert(tag_key(tag, &record.id).as_str(), EMPTY)
            .map_err(StoreError::backend)?;
        table
            .insert(vocabulary_key(tag).as_str(), EMPTY)
            .map_err(StoreError::backend)?;
        written += 2;
    }
    if record.is_public {
        table
            .insert(public_key(&record.id).as_str(), EMPTY)
            .map_err(StoreError::backend)?;
        written += 1;
    }
    Ok(written)
}

/// Remove the index entries belonging to `record`. Vocabulary keys stay: the
/// set of known tags only ever grows.
fn remove_index_entries(
    table: &mut Table<'_, &'static str, &'static [u8]>,
    record: &BookmarkRecord,
) -> Result<(), StoreError> {
    table
        .remove(recency_key(record.saved_at, &record.id).as_str())
        .map_err(StoreError::backend)?;
    for tag in &record.tags {
        table
            .remove(tag_key(tag, &record.id).as_str())
            .map_err(StoreError::backend)?;
    }
    if record.is_public {
        table
            .remove(public_key(&record.id).as_str())
            .map_err(StoreError::backend)?;
    }
    Ok(())
}

fn record_key(id: &str) -> String {
    format!("{RECORD_PREFIX}{id}")
}

fn recency_key(saved_at: OffsetDateTime, id: &str) -> String {
    format!("{RECENCY_PREFIX}{:039}:{id}", inverted_timestamp(saved_at))
}

fn tag_key(tag: &str, id: &str) -> String {
    format!("{TAG_PREFIX}{tag}:{id}")
}

fn public_key(id: &str) -> String {
    format!("{PUBLIC_PREFIX}{id}")
}

fn vocabulary_key(tag: &str) -> String {
    format!("{VOCABULARY_PREFIX}{tag}")
}

/// Map `saved_at` to a zero-padded number whose ascending key order is
/// newest-first. The sign-bit flip makes the i128 nanosecond timestamp
/// sortable as a u128; subtracting from `u128::MAX` reverses it.
fn inverted_timestamp(when: OffsetDateTime) -> u128 {
    let sortable = (when.unix_timestamp_nanos() as u128) ^ (1u128 << 127);
    u128::MAX - sortable
}

fn encode_record(record: &BookmarkRecord) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(record)
        .map_err(|err| StoreError::backend(format!("failed to encode `{}`: {err}", record.id)))
}

fn decode_record(id: &str, bytes: &[u8]) -> Result<BookmarkRecord, StoreError> {
    serde_json::from_slice(bytes).map_err(|err| StoreError::corrupt(id, err))
}

fn join_error(err: tokio::task::JoinError) -> StoreError {
    StoreError::backend(format!("storage task failed: {err}"))
}
