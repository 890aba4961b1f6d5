//! Local durable store
//!
//! One JSON file per collection under the data directory. Every mutation
//! rewrites the whole collection through a temp file and an atomic rename,
//! and mutations are serialized by a per-collection async mutex.

mod file;
mod records;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{MorduError, MorduResult};
use crate::models::{page_offset, PaginatedResponse};

pub use file::{read_collection, read_json, write_atomic};

/// A record kept in a local collection file
pub trait LocalRecord: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Collection file stem
    const COLLECTION: &'static str;

    fn id(&self) -> &str;

    fn set_id(&mut self, id: String);

    /// Set creation timestamps on append
    fn stamp(&mut self, now: DateTime<Utc>);

    /// Refresh modification timestamps on update
    fn touch(&mut self, _now: DateTime<Utc>) {}

    /// Ordering key for most-recent-first listings
    fn last_activity(&self) -> DateTime<Utc>;

    fn client_ref(&self) -> Option<&str> {
        None
    }
}

/// File-backed collection of `T`, held in storage order
pub struct LocalStore<T> {
    path: PathBuf,
    records: Mutex<IndexMap<String, T>>,
}

impl<T: LocalRecord> LocalStore<T> {
    /// Open the collection under `dir`, creating an empty file when missing.
    ///
    /// Fails with [`MorduError::Corruption`] when the existing file cannot be
    /// parsed or holds two records with the same id.
    pub async fn open(dir: impl AsRef<Path>) -> MorduResult<Self> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(format!("{}.json", T::COLLECTION));

        let records = match read_collection::<T>(&path).await? {
            Some(list) => index_records(&path, list)?,
            None => {
                write_atomic(&path, b"[]").await?;
                IndexMap::new()
            }
        };

        info!(
            "Opened local collection {} ({} records)",
            path.display(),
            records.len()
        );
        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, records: &IndexMap<String, T>) -> MorduResult<()> {
        let list: Vec<&T> = records.values().collect();
        let bytes = serde_json::to_vec_pretty(&list)?;
        write_atomic(&self.path, &bytes).await
    }

    /// Assign an id and timestamps, persist, and return the stored record
    pub async fn append(&self, record: T) -> MorduResult<T> {
        let mut records = self.records.lock().await;
        self.insert_new(&mut records, record).await
    }

    /// Append unless a record with the same client reference is already
    /// stored. Lookup and insert happen under one lock. Returns the stored
    /// record and whether it was created.
    pub async fn append_unique(&self, record: T) -> MorduResult<(T, bool)> {
        let mut records = self.records.lock().await;
        if let Some(client_ref) = record.client_ref() {
            if let Some(existing) = records
                .values()
                .find(|r| r.client_ref() == Some(client_ref))
            {
                return Ok((existing.clone(), false));
            }
        }
        let saved = self.insert_new(&mut records, record).await?;
        Ok((saved, true))
    }

    async fn insert_new(&self, records: &mut IndexMap<String, T>, mut record: T) -> MorduResult<T> {
        let now = Utc::now();

        let mut id = generate_id(now);
        while records.contains_key(&id) {
            id = generate_id(now);
        }
        record.set_id(id.clone());
        record.stamp(now);

        records.insert(id.clone(), record.clone());
        if let Err(e) = self.persist(records).await {
            records.shift_remove(&id);
            return Err(e);
        }

        debug!("Appended {} record {}", T::COLLECTION, id);
        Ok(record)
    }

    /// Records matching `predicate`, most recent first
    pub async fn list(&self, predicate: impl Fn(&T) -> bool) -> Vec<T> {
        let records = self.records.lock().await;
        let mut items: Vec<T> = records
            .values()
            .rev()
            .filter(|r| predicate(r))
            .cloned()
            .collect();
        // Stable sort over reversed storage order: ties go to the later record
        items.sort_by(|a, b| b.last_activity().cmp(&a.last_activity()));
        items
    }

    /// One page of all records, most recent first
    pub async fn page(&self, page: u64, limit: u64) -> PaginatedResponse<T> {
        let all = self.list(|_| true).await;
        let total = all.len() as u64;
        let skip = usize::try_from(page_offset(page, limit)).unwrap_or(usize::MAX);
        let items = all.into_iter().skip(skip).take(limit as usize).collect();
        PaginatedResponse::new(items, total, page, limit)
    }

    pub async fn get(&self, id: &str) -> Option<T> {
        self.records.lock().await.get(id).cloned()
    }

    pub async fn find_by_client_ref(&self, client_ref: &str) -> Option<T> {
        self.records
            .lock()
            .await
            .values()
            .find(|r| r.client_ref() == Some(client_ref))
            .cloned()
    }

    /// Apply `patch` to record `id` and persist. Nothing changes when the
    /// patch fails or the write does.
    pub async fn update<F>(&self, id: &str, patch: F) -> MorduResult<T>
    where
        F: FnOnce(&mut T) -> MorduResult<()>,
    {
        let mut records = self.records.lock().await;
        let current = records
            .get(id)
            .cloned()
            .ok_or_else(|| MorduError::NotFound(format!("{} {}", T::COLLECTION, id)))?;

        let mut next = current.clone();
        patch(&mut next)?;
        next.set_id(id.to_string());
        next.touch(Utc::now());

        records.insert(id.to_string(), next.clone());
        if let Err(e) = self.persist(&records).await {
            records.insert(id.to_string(), current);
            return Err(e);
        }

        debug!("Updated {} record {}", T::COLLECTION, id);
        Ok(next)
    }

    pub async fn remove(&self, id: &str) -> MorduResult<T> {
        let mut records = self.records.lock().await;
        let (index, key, removed) = records
            .shift_remove_full(id)
            .ok_or_else(|| MorduError::NotFound(format!("{} {}", T::COLLECTION, id)))?;

        if let Err(e) = self.persist(&records).await {
            records.shift_insert(index, key, removed);
            return Err(e);
        }

        debug!("Removed {} record {}", T::COLLECTION, id);
        Ok(removed)
    }

    /// Remove every record matching `predicate`; returns what was removed
    pub async fn remove_where(&self, predicate: impl Fn(&T) -> bool) -> MorduResult<Vec<T>> {
        let mut records = self.records.lock().await;
        let before = records.clone();

        let removed: Vec<T> = records.values().filter(|r| predicate(r)).cloned().collect();
        if removed.is_empty() {
            return Ok(removed);
        }
        records.retain(|_, r| !predicate(r));

        if let Err(e) = self.persist(&records).await {
            *records = before;
            return Err(e);
        }
        Ok(removed)
    }

    /// All records in storage order
    pub async fn snapshot(&self) -> Vec<T> {
        self.records.lock().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}

fn index_records<T: LocalRecord>(path: &Path, list: Vec<T>) -> MorduResult<IndexMap<String, T>> {
    let mut records = IndexMap::with_capacity(list.len());
    for record in list {
        let id = record.id().to_string();
        if records.insert(id.clone(), record).is_some() {
            return Err(MorduError::Corruption {
                path: path.to_path_buf(),
                reason: format!("duplicate record id {}", id),
            });
        }
    }
    Ok(records)
}

/// Time-prefixed random id: epoch millis followed by nine base36 characters
fn generate_id(now: DateTime<Utc>) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    format!("{}{}", now.timestamp_millis(), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChatSession, Reading, ReadingInput, Role};
    use std::collections::HashSet;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn reading(name: &str) -> Reading {
        let input: ReadingInput = serde_json::from_value(serde_json::json!({
            "name": name,
            "birthdate": "01/01/2000",
            "sex": "other",
            "topic": "overall",
            "text": "how is my year?",
        }))
        .unwrap();
        Reading::new(&input, "fine".into())
    }

    #[tokio::test]
    async fn test_open_creates_empty_collection() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::<Reading>::open(dir.path().join("data")).await.unwrap();
        assert!(store.is_empty().await);
        let on_disk = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(on_disk.trim(), "[]");
    }

    #[tokio::test]
    async fn test_append_persists_and_reopens() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::<Reading>::open(dir.path()).await.unwrap();
        let saved = store.append(reading("A")).await.unwrap();
        assert!(!saved.id.is_empty());
        assert!(saved.id.chars().take(13).all(|c| c.is_ascii_digit()));

        let reopened = LocalStore::<Reading>::open(dir.path()).await.unwrap();
        assert_eq!(reopened.get(&saved.id).await, Some(saved));
    }

    #[tokio::test]
    async fn test_corrupt_file_is_fatal_and_untouched() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fortunes.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = LocalStore::<Reading>::open(dir.path()).await.err().unwrap();
        assert!(matches!(err, MorduError::Corruption { .. }));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{not json");
    }

    #[tokio::test]
    async fn test_duplicate_ids_on_disk_are_corruption() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::<Reading>::open(dir.path()).await.unwrap();
        let saved = store.append(reading("A")).await.unwrap();
        let doubled = serde_json::to_vec(&vec![saved.clone(), saved]).unwrap();
        std::fs::write(store.path(), doubled).unwrap();

        let err = LocalStore::<Reading>::open(dir.path()).await.err().unwrap();
        assert!(matches!(err, MorduError::Corruption { .. }));
    }

    #[tokio::test]
    async fn test_list_most_recent_first() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::<Reading>::open(dir.path()).await.unwrap();
        let a = store.append(reading("A")).await.unwrap();
        let b = store.append(reading("B")).await.unwrap();
        let c = store.append(reading("C")).await.unwrap();

        let names: Vec<_> = store.list(|_| true).await.into_iter().map(|r| r.id).collect();
        assert_eq!(names, vec![c.id.clone(), b.id.clone(), a.id.clone()]);

        let only_b: Vec<_> = store.list(|r| r.name == "B").await;
        assert_eq!(only_b.len(), 1);

        let snapshot: Vec<_> = store.snapshot().await.into_iter().map(|r| r.id).collect();
        assert_eq!(snapshot, vec![a.id, b.id, c.id]);
    }

    #[tokio::test]
    async fn test_page() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::<Reading>::open(dir.path()).await.unwrap();
        for name in ["A", "B", "C", "D", "E"] {
            store.append(reading(name)).await.unwrap();
        }
        let page = store.page(2, 2).await;
        assert_eq!(page.total, 5);
        assert_eq!(page.total_pages, 3);
        let names: Vec<_> = page.items.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["C", "B"]);
    }

    #[tokio::test]
    async fn test_update_and_remove() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::<Reading>::open(dir.path()).await.unwrap();
        let saved = store.append(reading("A")).await.unwrap();

        let updated = store
            .update(&saved.id, |r| {
                r.prediction = "changed".into();
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(updated.prediction, "changed");
        assert_eq!(updated.id, saved.id);

        let failed = store
            .update(&saved.id, |_| Err(MorduError::Validation("no".into())))
            .await;
        assert!(failed.is_err());
        assert_eq!(store.get(&saved.id).await.unwrap().prediction, "changed");

        store.remove(&saved.id).await.unwrap();
        assert!(store.get(&saved.id).await.is_none());
        assert!(matches!(
            store.remove(&saved.id).await,
            Err(MorduError::NotFound(_))
        ));
        assert!(matches!(
            store.update("missing", |_| Ok(())).await,
            Err(MorduError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_session_update_touches_updated_at() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::<ChatSession>::open(dir.path()).await.unwrap();
        let saved = store.append(ChatSession::new("u1").unwrap()).await.unwrap();

        let updated = store
            .update(&saved.id, |s| s.push_message(Role::User, "hello"))
            .await
            .unwrap();
        assert!(updated.updated_at >= saved.updated_at);
        assert_eq!(updated.messages.len(), 1);
        assert!(store.path().ends_with("chats.json"));
    }

    #[tokio::test]
    async fn test_remove_where() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::<Reading>::open(dir.path()).await.unwrap();
        store.append(reading("A")).await.unwrap();
        store.append(reading("B")).await.unwrap();
        store.append(reading("A")).await.unwrap();

        let removed = store.remove_where(|r| r.name == "A").await.unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(store.len().await, 1);

        let reopened = LocalStore::<Reading>::open(dir.path()).await.unwrap();
        assert_eq!(reopened.len().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_appends_are_serialized() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(LocalStore::<Reading>::open(dir.path()).await.unwrap());

        let mut handles = Vec::new();
        for i in 0..20 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.append(reading(&format!("R{}", i))).await.unwrap()
            }));
        }
        let mut ids = HashSet::new();
        for handle in handles {
            ids.insert(handle.await.unwrap().id);
        }
        assert_eq!(ids.len(), 20);

        let reopened = LocalStore::<Reading>::open(dir.path()).await.unwrap();
        assert_eq!(reopened.len().await, 20);
    }

    #[tokio::test]
    async fn test_find_by_client_ref() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::<Reading>::open(dir.path()).await.unwrap();
        let mut r = reading("A");
        r.client_ref = Some("local-1".into());
        let saved = store.append(r).await.unwrap();
        store.append(reading("B")).await.unwrap();

        assert_eq!(store.find_by_client_ref("local-1").await, Some(saved));
        assert!(store.find_by_client_ref("local-2").await.is_none());
    }

    #[tokio::test]
    async fn test_append_unique_under_concurrency() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(LocalStore::<Reading>::open(dir.path()).await.unwrap());

        let mut handles = Vec::new();
        for i in 0..10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let mut r = reading(&format!("R{}", i));
                r.client_ref = Some("local-same".into());
                store.append_unique(r).await.unwrap()
            }));
        }
        let mut created = 0;
        let mut ids = HashSet::new();
        for handle in handles {
            let (saved, fresh) = handle.await.unwrap();
            created += usize::from(fresh);
            ids.insert(saved.id);
        }
        assert_eq!(created, 1);
        assert_eq!(ids.len(), 1);
        assert_eq!(store.len().await, 1);

        // Records without a client reference are always appended
        store.append_unique(reading("X")).await.unwrap();
        store.append_unique(reading("X")).await.unwrap();
        assert_eq!(store.len().await, 3);
    }
}
