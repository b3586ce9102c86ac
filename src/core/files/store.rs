//! Project files with optimistic concurrency.
//!
//! Each `(project, name)` key has its own `RwLock`. A save runs its version
//! check and write under that key's write lock, so two saves of one file
//! never interleave and a reader never sees content from one save paired
//! with the version of another.

use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};
use serde::{Deserialize, Serialize};
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};

use crate::core::clock::Clock;
use crate::core::error::{CollabError, CollabResult};
use crate::core::models::ProjectId;

pub const MAX_FILE_NAME_LEN: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display)]
#[display("{project_id}/{name}")]
pub struct FileKey {
    pub project_id: ProjectId,
    pub name: String,
}

impl FileKey {
    pub fn new(project_id: ProjectId, name: impl Into<String>) -> Self {
        Self {
            project_id,
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSnapshot {
    pub content: String,
    pub version: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSummary {
    pub name: String,
    pub version: i64,
}

#[derive(Debug)]
struct StoredFile {
    content: String,
    version: i64,
}

impl StoredFile {
    fn snapshot(&self) -> FileSnapshot {
        FileSnapshot {
            content: self.content.clone(),
            version: self.version,
        }
    }
}

pub fn validate_file_name(name: &str) -> CollabResult<()> {
    if name.trim().is_empty() {
        return Err(CollabError::validation("File name must not be empty"));
    }
    if name.contains('/') {
        return Err(CollabError::validation("File name must not contain '/'"));
    }
    if name.len() > MAX_FILE_NAME_LEN {
        return Err(CollabError::validation(format!(
            "File name must be at most {MAX_FILE_NAME_LEN} bytes"
        )));
    }
    Ok(())
}

pub struct FileStore {
    files: DashMap<FileKey, Arc<RwLock<StoredFile>>>,
    clock: Arc<dyn Clock>,
}

impl FileStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            files: DashMap::new(),
            clock,
        }
    }

    /// Current content and version, creating an empty file if absent.
    pub async fn get(&self, project_id: ProjectId, name: &str) -> CollabResult<FileSnapshot> {
        validate_file_name(name)?;
        let key = FileKey::new(project_id, name);

        if let Some(slot) = self.slot(&key) {
            return Ok(slot.read().await.snapshot());
        }

        let now = self.clock.now_secs();
        let slot = self
            .files
            .entry(key)
            .or_insert_with(|| {
                Arc::new(RwLock::new(StoredFile {
                    content: String::new(),
                    version: now,
                }))
            })
            .clone();
        let snapshot = slot.read().await.snapshot();
        Ok(snapshot)
    }

    /// New file with `content`. An existing file of that name is left alone.
    pub fn create(
        &self,
        project_id: ProjectId,
        name: &str,
        content: String,
    ) -> CollabResult<FileSnapshot> {
        validate_file_name(name)?;
        match self.files.entry(FileKey::new(project_id, name)) {
            Entry::Occupied(_) => Err(CollabError::bad_request("File already exists")),
            Entry::Vacant(slot) => {
                let file = StoredFile {
                    content,
                    version: self.clock.now_secs(),
                };
                let snapshot = file.snapshot();
                tracing::debug!(file = %slot.key(), version = file.version, "File created");
                slot.insert(Arc::new(RwLock::new(file)));
                Ok(snapshot)
            }
        }
    }

    /// Overwrite the file unless `client_version` is older than what is
    /// stored.
    pub async fn save(
        &self,
        project_id: ProjectId,
        name: &str,
        content: String,
        client_version: Option<i64>,
    ) -> CollabResult<FileSnapshot> {
        validate_file_name(name)?;
        if client_version.is_some_and(|v| v < 0) {
            return Err(CollabError::validation("Version must not be negative"));
        }
        let key = FileKey::new(project_id, name);
        let mut file = self.lock_for_write(key.clone()).await;

        if let Some(client_version) = client_version
            && client_version < file.version
        {
            tracing::info!(
                file = %key,
                client_version,
                current_version = file.version,
                "Rejected stale save"
            );
            return Err(CollabError::Conflict {
                current_version: file.version,
            });
        }

        file.version = self.clock.now_secs().max(file.version);
        file.content = content;
        tracing::debug!(file = %key, version = file.version, "File saved");
        Ok(file.snapshot())
    }

    /// Files of a project, sorted by name.
    pub async fn list(&self, project_id: ProjectId) -> Vec<FileSummary> {
        let slots: Vec<(String, Arc<RwLock<StoredFile>>)> = self
            .files
            .iter()
            .filter(|entry| entry.key().project_id == project_id)
            .map(|entry| (entry.key().name.clone(), Arc::clone(entry.value())))
            .collect();

        let mut summaries = Vec::with_capacity(slots.len());
        for (name, slot) in slots {
            let version = slot.read().await.version;
            summaries.push(FileSummary { name, version });
        }
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }

    fn slot(&self, key: &FileKey) -> Option<Arc<RwLock<StoredFile>>> {
        self.files.get(key).map(|entry| Arc::clone(entry.value()))
    }

    /// Write guard for `key`, inserting an empty version-0 entry if absent.
    ///
    /// A freshly inserted entry is locked before it becomes visible, so no
    /// reader can observe the placeholder.
    async fn lock_for_write(&self, key: FileKey) -> OwnedRwLockWriteGuard<StoredFile> {
        let mut fresh = None;
        let slot = self
            .files
            .entry(key)
            .or_insert_with(|| {
                let slot = Arc::new(RwLock::new(StoredFile {
                    content: String::new(),
                    version: 0,
                }));
                fresh = Arc::clone(&slot).try_write_owned().ok();
                slot
            })
            .clone();

        match fresh {
            Some(guard) => guard,
            None => slot.write_owned().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use uuid::Uuid;

    fn store_at(secs: i64) -> (FileStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::at_secs(secs));
        (FileStore::new(clock.clone()), clock)
    }

    #[tokio::test]
    async fn test_get_creates_missing_file() {
        let (store, _) = store_at(500);
        let project = Uuid::new_v4();

        let file = store.get(project, "index.js").await.unwrap();

        assert_eq!(file.content, "");
        assert_eq!(file.version, 500);
        assert_eq!(store.list(project).await.len(), 1);
    }

    #[tokio::test]
    async fn test_create_rejects_existing_names() {
        let (store, _) = store_at(700);
        let project = Uuid::new_v4();

        let created = store.create(project, "main.rs", "fn main() {}".into()).unwrap();
        assert_eq!(created.version, 700);
        assert_eq!(store.get(project, "main.rs").await.unwrap(), created);

        assert_eq!(
            store.create(project, "main.rs", "again".into()),
            Err(CollabError::bad_request("File already exists"))
        );
        store.get(project, "opened.rs").await.unwrap();
        assert!(store.create(project, "opened.rs", String::new()).is_err());
        assert!(matches!(
            store.create(project, "a/b", String::new()),
            Err(CollabError::Validation(_))
        ));
        assert!(store.create(Uuid::new_v4(), "main.rs", String::new()).is_ok());
    }

    #[tokio::test]
    async fn test_stale_save_conflicts_and_leaves_content() {
        let (store, clock) = store_at(999);
        let project = Uuid::new_v4();
        store.save(project, "index.js", "a".into(), None).await.unwrap();
        clock.set_secs(1000);
        let saved = store
            .save(project, "index.js", "b".into(), Some(999))
            .await
            .unwrap();
        assert_eq!(saved.version, 1000);

        let err = store
            .save(project, "index.js", "c".into(), Some(999))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            CollabError::Conflict {
                current_version: 1000
            }
        );
        let file = store.get(project, "index.js").await.unwrap();
        assert_eq!(file.content, "b");
        assert_eq!(file.version, 1000);
    }

    #[tokio::test]
    async fn test_save_without_version_always_wins() {
        let (store, clock) = store_at(10);
        let project = Uuid::new_v4();
        store.save(project, "a.txt", "one".into(), None).await.unwrap();
        clock.set_secs(11);

        let saved = store.save(project, "a.txt", "two".into(), None).await.unwrap();

        assert_eq!(saved.content, "two");
        assert_eq!(saved.version, 11);
    }

    #[tokio::test]
    async fn test_version_never_goes_backwards() {
        let (store, clock) = store_at(2_000);
        let project = Uuid::new_v4();
        store.save(project, "f", "x".into(), None).await.unwrap();

        clock.set_secs(1_500);
        let saved = store.save(project, "f", "y".into(), Some(2_000)).await.unwrap();

        assert_eq!(saved.version, 2_000);
    }

    #[tokio::test]
    async fn test_same_second_save_with_current_version_succeeds() {
        let (store, _) = store_at(100);
        let project = Uuid::new_v4();
        let first = store.save(project, "f", "x".into(), None).await.unwrap();

        let second = store
            .save(project, "f", "y".into(), Some(first.version))
            .await
            .unwrap();

        assert_eq!(second.version, first.version);
        assert_eq!(second.content, "y");
    }

    #[tokio::test]
    async fn test_concurrent_saves_with_same_version_are_serialized() {
        let (store, clock) = store_at(100);
        let store = Arc::new(store);
        let project = Uuid::new_v4();
        let base = store.save(project, "f", "base".into(), None).await.unwrap();
        clock.set_secs(101);

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .save(project, "f", format!("writer-{i}"), Some(base.version))
                    .await
            }));
        }

        let mut winners = Vec::new();
        for handle in handles {
            if let Ok(saved) = handle.await.unwrap() {
                winners.push(saved);
            }
        }

        // The first writer bumps the version; everyone else is now stale.
        assert_eq!(winners.len(), 1);
        let file = store.get(project, "f").await.unwrap();
        assert_eq!(file, winners[0]);
        assert_eq!(file.version, 101);
    }

    #[tokio::test]
    async fn test_file_name_validation() {
        let (store, _) = store_at(1);
        let project = Uuid::new_v4();

        assert!(matches!(
            store.get(project, "").await,
            Err(CollabError::Validation(_))
        ));
        assert!(matches!(
            store.save(project, "a/b", "x".into(), None).await,
            Err(CollabError::Validation(_))
        ));
        assert!(matches!(
            store.save(project, "ok", "x".into(), Some(-1)).await,
            Err(CollabError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_files_are_scoped_per_project() {
        let (store, _) = store_at(1);
        let (p1, p2) = (Uuid::new_v4(), Uuid::new_v4());
        store.save(p1, "b.rs", "1".into(), None).await.unwrap();
        store.save(p1, "a.rs", "2".into(), None).await.unwrap();
        store.save(p2, "c.rs", "3".into(), None).await.unwrap();

        let names: Vec<String> = store.list(p1).await.into_iter().map(|f| f.name).collect();

        assert_eq!(names, vec!["a.rs".to_string(), "b.rs".to_string()]);
        assert_eq!(store.get(p2, "c.rs").await.unwrap().content, "3");
    }

    #[test]
    fn test_file_key_display() {
        let project = Uuid::nil();
        assert_eq!(
            FileKey::new(project, "main.rs").to_string(),
            format!("{project}/main.rs")
        );
    }
}
