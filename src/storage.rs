//! File-backed collection store
//!
//! [`LocalStore`] implements [`CollectionService`] on the local filesystem so
//! the engine can be used end to end without a remote host. Each lineage is
//! one JSON document; an index maps every version uuid to its lineage.
//!
//! ## Architecture
//!
//! ```text
//! store_root/
//! ├── metadata.json              # Store metadata (format, versions, timestamps)
//! ├── index.json                 # version uuid -> collection id
//! └── lineages/
//!     └── <collection_id>.json   # Every version of one collection
//! ```
//!
//! ## Example Usage
//!
//! ```rust
//! use colman::service::{CollectionService, CreateRequest};
//! use colman::storage::LocalStore;
//! use tempfile::TempDir;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let dir = TempDir::new()?;
//! let store = LocalStore::init(dir.path().join("store"))?;
//!
//! let v1 = store.create(CreateRequest::new(
//!     ". 37b51d194a7513e45b56f6524f2d51f2+3 0:3:foo\n",
//!     "My collection",
//! ))?;
//! assert_eq!(store.fetch(&v1.uuid)?.version, 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Thread Safety
//!
//! - `DashMap` caches for the uuid index and loaded lineages
//! - a `parking_lot::Mutex` around create and commit, so the stale check
//!   and the write of a commit are atomic with respect to other commits
//! - `RwLock` for the store metadata
//!
//! Every file is written through a temporary file and a rename, so a crash
//! leaves either the previous or the new lineage document on disk.

use crate::error::{ColmanError, Result};
use crate::lineage::Lineage;
use crate::service::{CollectionService, CommitRequest, CreateRequest};
use crate::types::{StoreMetadata, STORE_FORMAT_VERSION};
use crate::utils::{atomic_write, short_id};
use crate::version::CollectionVersion;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, trace};

const METADATA_FILE: &str = "metadata.json";
const INDEX_FILE: &str = "index.json";
const LINEAGES_DIR: &str = "lineages";

/// Local filesystem collection store
pub struct LocalStore {
    root: PathBuf,
    /// Version uuid to collection id
    index: Arc<DashMap<String, String>>,
    /// Lineages already read from disk, by collection id
    lineages: Arc<DashMap<String, Lineage>>,
    write_lock: Mutex<()>,
    metadata: Arc<RwLock<StoreMetadata>>,
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore")
            .field("root", &self.root)
            .field("indexed_versions", &self.index.len())
            .field("cached_lineages", &self.lineages.len())
            .finish()
    }
}

impl LocalStore {
    /// Create a new store at `root`
    ///
    /// # Errors
    ///
    /// [`ColmanError::StoreAlreadyExists`] if `root` already holds a store.
    pub fn init(root: PathBuf) -> Result<Self> {
        if root.join(METADATA_FILE).exists() {
            return Err(ColmanError::StoreAlreadyExists(root));
        }

        fs::create_dir_all(root.join(LINEAGES_DIR))?;

        let metadata = StoreMetadata::new();
        atomic_write(
            &root.join(METADATA_FILE),
            serde_json::to_string_pretty(&metadata)?.as_bytes(),
        )?;
        atomic_write(&root.join(INDEX_FILE), b"{}")?;

        info!("Initialized store at {:?}", root);

        Ok(Self {
            root,
            index: Arc::new(DashMap::new()),
            lineages: Arc::new(DashMap::new()),
            write_lock: Mutex::new(()),
            metadata: Arc::new(RwLock::new(metadata)),
        })
    }

    /// Open an existing store
    ///
    /// # Errors
    ///
    /// [`ColmanError::StoreNotInitialized`] if there is no store at `root`.
    pub fn open(root: PathBuf) -> Result<Self> {
        let metadata_path = root.join(METADATA_FILE);
        if !metadata_path.exists() {
            return Err(ColmanError::StoreNotInitialized(root));
        }

        let mut metadata: StoreMetadata = serde_json::from_str(&fs::read_to_string(&metadata_path)?)?;
        if metadata.format_version > STORE_FORMAT_VERSION {
            return Err(ColmanError::InvalidConfiguration(format!(
                "store format {} is newer than supported format {}",
                metadata.format_version, STORE_FORMAT_VERSION
            )));
        }
        metadata.last_accessed = Utc::now();
        atomic_write(&metadata_path, serde_json::to_string_pretty(&metadata)?.as_bytes())?;

        let index = Arc::new(DashMap::new());
        let index_path = root.join(INDEX_FILE);
        if index_path.exists() {
            let entries: BTreeMap<String, String> = serde_json::from_str(&fs::read_to_string(&index_path)?)?;
            debug!("Loaded {} index entries", entries.len());
            for (uuid, collection_id) in entries {
                index.insert(uuid, collection_id);
            }
        }

        info!("Opened store at {:?}", root);

        Ok(Self {
            root,
            index,
            lineages: Arc::new(DashMap::new()),
            write_lock: Mutex::new(()),
            metadata: Arc::new(RwLock::new(metadata)),
        })
    }

    /// Open the store at `root`, creating it if needed
    pub fn init_or_open(root: PathBuf) -> Result<Self> {
        if root.join(METADATA_FILE).exists() {
            Self::open(root)
        } else {
            Self::init(root)
        }
    }

    /// Collection id of the lineage holding version `uuid`
    pub fn resolve(&self, uuid: &str) -> Result<String> {
        if let Some(id) = self.index.get(uuid) {
            return Ok(id.value().clone());
        }
        // A collection id also resolves to itself
        let plain = !uuid.is_empty() && uuid.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
        if plain && self.lineage_path(uuid).exists() {
            return Ok(uuid.to_string());
        }
        Err(ColmanError::VersionNotFound(uuid.to_string()))
    }

    /// Load the lineage containing `uuid`
    pub fn lineage_of(&self, uuid: &str) -> Result<Lineage> {
        let collection_id = self.resolve(uuid)?;
        self.load_lineage(&collection_id)
    }

    /// Load a lineage by collection id
    pub fn load_lineage(&self, collection_id: &str) -> Result<Lineage> {
        if let Some(lineage) = self.lineages.get(collection_id) {
            trace!("Lineage {} served from cache", short_id(collection_id));
            return Ok(lineage.clone());
        }

        let path = self.lineage_path(collection_id);
        if !path.exists() {
            return Err(ColmanError::CollectionNotFound(collection_id.to_string()));
        }
        let lineage: Lineage = serde_json::from_str(&fs::read_to_string(&path)?)?;
        self.lineages.insert(collection_id.to_string(), lineage.clone());
        Ok(lineage)
    }

    /// Head version of every collection, sorted by name
    pub fn list_collections(&self) -> Result<Vec<CollectionVersion>> {
        let mut heads = Vec::new();
        for entry in fs::read_dir(self.root.join(LINEAGES_DIR))? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(id) = path.file_stem().and_then(|s| s.to_str()) {
                heads.push(self.load_lineage(id)?.head()?.clone());
            }
        }
        heads.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.collection_id.cmp(&b.collection_id)));
        Ok(heads)
    }

    /// Get store statistics
    pub fn stats(&self) -> Result<StoreStats> {
        let collections = self.list_collections()?;
        let mut stats = StoreStats {
            collection_count: collections.len(),
            ..Default::default()
        };
        for head in &collections {
            let lineage = self.load_lineage(&head.collection_id)?;
            let lineage_stats = lineage.stats();
            stats.version_count += lineage_stats.total_versions;
            stats.manifest_bytes += lineage_stats.manifest_bytes;
        }
        Ok(stats)
    }

    /// Update store metadata
    pub fn update_metadata<F>(&self, updater: F) -> Result<()>
    where
        F: FnOnce(&mut StoreMetadata),
    {
        let mut metadata = self.metadata.write();
        updater(&mut metadata);
        metadata.last_accessed = Utc::now();
        atomic_write(
            &self.root.join(METADATA_FILE),
            serde_json::to_string_pretty(&*metadata)?.as_bytes(),
        )
    }

    /// Get the store root path
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get store metadata
    pub fn metadata(&self) -> StoreMetadata {
        self.metadata.read().clone()
    }

    fn lineage_path(&self, collection_id: &str) -> PathBuf {
        self.root.join(LINEAGES_DIR).join(format!("{}.json", collection_id))
    }

    /// Persist a lineage, then publish it to the caches and the index
    ///
    /// The index goes to disk first and the in-memory state is only touched
    /// once both files are written, so an error leaves the store as it was.
    /// An index entry whose lineage file was never written resolves to a
    /// lineage without that version and is reported as not found.
    fn save_lineage(&self, lineage: &Lineage) -> Result<()> {
        let new_entries: Vec<&str> = lineage
            .history()
            .iter()
            .map(|version| version.uuid.as_str())
            .filter(|uuid| !self.index.contains_key(*uuid))
            .collect();

        if !new_entries.is_empty() {
            let mut entries = self.index_snapshot();
            for uuid in &new_entries {
                entries.insert(uuid.to_string(), lineage.collection_id.clone());
            }
            self.write_index(&entries)?;
        }

        atomic_write(
            &self.lineage_path(&lineage.collection_id),
            serde_json::to_string_pretty(lineage)?.as_bytes(),
        )?;

        for uuid in &new_entries {
            self.index.insert(uuid.to_string(), lineage.collection_id.clone());
        }
        self.lineages.insert(lineage.collection_id.clone(), lineage.clone());
        debug!(
            "Saved lineage {} ({} versions, {} new index entries)",
            short_id(&lineage.collection_id),
            lineage.len(),
            new_entries.len()
        );
        Ok(())
    }

    fn index_snapshot(&self) -> BTreeMap<String, String> {
        self.index
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    fn write_index(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        atomic_write(&self.root.join(INDEX_FILE), serde_json::to_string_pretty(entries)?.as_bytes())
    }
}

impl CollectionService for LocalStore {
    fn fetch(&self, uuid: &str) -> Result<CollectionVersion> {
        let lineage = self.lineage_of(uuid)?;
        lineage
            .get(uuid)
            .or_else(|| (lineage.collection_id == uuid).then(|| lineage.head().ok()).flatten())
            .cloned()
            .ok_or_else(|| ColmanError::VersionNotFound(uuid.to_string()))
    }

    fn list_versions(&self, uuid: &str) -> Result<Vec<CollectionVersion>> {
        Ok(self.lineage_of(uuid)?.versions)
    }

    fn create(&self, request: CreateRequest) -> Result<CollectionVersion> {
        let lineage = Lineage::create(request.manifest_text.clone(), request.metadata())?;
        let _guard = self.write_lock.lock();
        self.save_lineage(&lineage)?;
        Ok(lineage.head()?.clone())
    }

    fn commit(&self, request: CommitRequest) -> Result<CollectionVersion> {
        let _guard = self.write_lock.lock();
        let mut lineage = self.lineage_of(&request.based_on)?;
        let metadata = request.metadata();
        let version = lineage.commit(&request.based_on, request.manifest_text, metadata)?;
        self.save_lineage(&lineage)?;
        Ok(version)
    }
}

/// Store statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    /// Number of collections (lineages)
    pub collection_count: usize,
    /// Number of versions across all collections
    pub version_count: usize,
    /// Total size of stored manifest text
    pub manifest_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const TWO_FILES: &str = ". 37b51d194a7513e45b56f6524f2d51f2+3 0:3:foo 0:3:bar\n";
    const ONE_FILE: &str = ". 37b51d194a7513e45b56f6524f2d51f2+3 0:3:foo\n";

    fn create_test_store() -> (LocalStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalStore::init(temp_dir.path().join("store")).unwrap();
        (store, temp_dir)
    }

    fn commit_request(based_on: &str, text: &str) -> CommitRequest {
        CommitRequest {
            based_on: based_on.to_string(),
            manifest_text: text.to_string(),
            name: "test".to_string(),
            properties: Default::default(),
        }
    }

    #[test]
    fn test_store_init_and_open() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("store");

        assert!(matches!(
            LocalStore::open(path.clone()),
            Err(ColmanError::StoreNotInitialized(_))
        ));

        let store = LocalStore::init(path.clone()).unwrap();
        assert!(path.join("metadata.json").exists());
        assert!(path.join("lineages").is_dir());
        assert_eq!(store.metadata().format_version, 1);
        drop(store);

        assert!(matches!(
            LocalStore::init(path.clone()),
            Err(ColmanError::StoreAlreadyExists(_))
        ));
        LocalStore::open(path.clone()).unwrap();
        LocalStore::init_or_open(path).unwrap();
    }

    #[test]
    fn test_create_fetch_commit_persist() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("store");
        let (v1, v2) = {
            let store = LocalStore::init(path.clone()).unwrap();
            let v1 = store.create(CreateRequest::new(TWO_FILES, "test")).unwrap();
            let v2 = store.commit(commit_request(&v1.uuid, ONE_FILE)).unwrap();
            (v1, v2)
        };

        let store = LocalStore::open(path).unwrap();
        let fetched = store.fetch(&v1.uuid).unwrap();
        assert_eq!(fetched.version, 1);
        assert_eq!(fetched.current_version_uuid, v2.uuid);
        assert!(!fetched.is_head());

        let versions = store.list_versions(&v2.uuid).unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[1].total_size_bytes, 3);

        // The collection id resolves to the head
        assert_eq!(store.fetch(&v1.collection_id).unwrap().uuid, v2.uuid);
    }

    #[test]
    fn test_stale_commit_leaves_store_unchanged() {
        let (store, _temp) = create_test_store();
        let v1 = store.create(CreateRequest::new(TWO_FILES, "test")).unwrap();
        store.commit(commit_request(&v1.uuid, ONE_FILE)).unwrap();

        let err = store.commit(commit_request(&v1.uuid, TWO_FILES)).unwrap_err();
        assert!(err.is_stale());
        assert_eq!(store.list_versions(&v1.uuid).unwrap().len(), 2);
    }

    #[test]
    fn test_unknown_uuid() {
        let (store, _temp) = create_test_store();
        assert!(matches!(store.fetch("missing"), Err(ColmanError::VersionNotFound(_))));
        assert!(matches!(
            store.commit(commit_request("missing", ONE_FILE)),
            Err(ColmanError::VersionNotFound(_))
        ));
    }

    #[test]
    fn test_list_collections_and_stats() {
        let (store, _temp) = create_test_store();
        let b = store.create(CreateRequest::new(ONE_FILE, "beta")).unwrap();
        store.create(CreateRequest::new(TWO_FILES, "alpha")).unwrap();
        store.commit(commit_request(&b.uuid, TWO_FILES)).unwrap();

        let heads = store.list_collections().unwrap();
        assert_eq!(heads.len(), 2);
        assert_eq!(heads[0].name, "alpha");
        assert!(heads.iter().all(|h| h.is_head()));

        let stats = store.stats().unwrap();
        assert_eq!(stats.collection_count, 2);
        assert_eq!(stats.version_count, 3);
    }

    #[test]
    fn test_newer_store_format_refused() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("store");
        let store = LocalStore::init(path.clone()).unwrap();
        store.update_metadata(|m| m.format_version = STORE_FORMAT_VERSION + 1).unwrap();
        drop(store);

        assert!(matches!(
            LocalStore::open(path),
            Err(ColmanError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_malformed_create_writes_nothing() {
        let (store, _temp) = create_test_store();
        assert!(store.create(CreateRequest::new("bogus line\n", "bad")).is_err());
        assert!(store.list_collections().unwrap().is_empty());
    }

    #[test]
    fn test_failed_index_write_leaves_store_unchanged() {
        let (store, _temp) = create_test_store();
        let v1 = store.create(CreateRequest::new(TWO_FILES, "test")).unwrap();
        let lineage_file = store.lineage_path(&v1.collection_id);

        // A non-empty directory in place of the index makes the rename fail
        let index_path = store.root().join(INDEX_FILE);
        fs::remove_file(&index_path).unwrap();
        fs::create_dir(&index_path).unwrap();
        fs::write(index_path.join("blocker"), b"x").unwrap();

        assert!(store.commit(commit_request(&v1.uuid, ONE_FILE)).is_err());

        let on_disk: Lineage = serde_json::from_str(&fs::read_to_string(&lineage_file).unwrap()).unwrap();
        assert_eq!(on_disk.len(), 1);
        assert_eq!(on_disk.head().unwrap().uuid, v1.uuid);
        assert_eq!(store.list_versions(&v1.uuid).unwrap().len(), 1);
        assert!(store.fetch(&v1.uuid).unwrap().is_head());

        // Once the index is writable again the same commit goes through
        fs::remove_dir_all(&index_path).unwrap();
        let v2 = store.commit(commit_request(&v1.uuid, ONE_FILE)).unwrap();
        assert_eq!(v2.version, 2);
        let reopened = LocalStore::open(store.root().to_path_buf()).unwrap();
        assert_eq!(reopened.fetch(&v2.uuid).unwrap().version, 2);
        assert_eq!(reopened.fetch(&v1.uuid).unwrap().current_version_uuid, v2.uuid);
    }
}
