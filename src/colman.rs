//! Main colman implementation
//!
//! [`Colman`] is the entry point for working with collections. It ties the
//! pure tree engine (parser, tree, serializer) to a [`CollectionService`]
//! that persists versions.
//!
//! ## Overview
//!
//! - **open** a version as an [`EditSession`]; sessions on old versions are
//!   read-only
//! - **restore** an old version as a new head
//! - **versions**, **diff** and **verify** for browsing a lineage
//!
//! ## Thread Safety
//!
//! `Colman` is cheap to clone and can be shared between threads. At most one
//! commit per collection may be outstanding at a time; a second concurrent
//! commit fails with [`ColmanError::CommitInProgress`] instead of
//! interleaving with the first.
//!
//! ## Examples
//!
//! ```rust
//! use colman::{Colman, EditOp};
//! use tempfile::TempDir;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let dir = TempDir::new()?;
//! let colman = Colman::init(dir.path().join("store"))?;
//!
//! let v1 = colman.create(". 37b51d194a7513e45b56f6524f2d51f2+3 0:3:bar\n", "example")?;
//! let mut session = colman.open(&v1.uuid)?;
//! session.apply(EditOp::Rename {
//!     path: "bar".to_string(),
//!     new_name: "subdir/foo".to_string(),
//! })?;
//! let v2 = session.commit()?;
//! assert_eq!(v2.version, 2);
//!
//! let v3 = colman.restore(&v1.uuid)?;
//! assert_eq!(v3.manifest_text, v1.manifest_text);
//! # Ok(())
//! # }
//! ```

use crate::diff::{diff_trees, TreeDiff};
use crate::error::{ColmanError, NameError, Result};
use crate::lineage::Lineage;
use crate::parser::ManifestParser;
use crate::service::{CollectionService, CreateRequest};
use crate::session::EditSession;
use crate::storage::LocalStore;
use crate::tree::VirtualFileTree;
use crate::types::{EngineConfig, VersionSummary};
use crate::utils::short_id;
use crate::verification::{LineageVerificationReport, LineageVerifier};
use crate::version::{CollectionVersion, Properties};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, instrument, trace, warn};

/// Engine entry point
#[derive(Clone)]
pub struct Colman {
    service: Arc<dyn CollectionService>,
    config: EngineConfig,
    /// Collection ids with a commit in flight
    in_flight: Arc<DashMap<String, ()>>,
}

impl std::fmt::Debug for Colman {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Colman")
            .field("config", &self.config)
            .field("commits_in_flight", &self.in_flight.len())
            .finish()
    }
}

impl Colman {
    /// Create an engine over any collection service with default settings
    pub fn new(service: Arc<dyn CollectionService>) -> Self {
        ColmanBuilder::new().build(service)
    }

    /// Create a new local store at `store_path` and an engine over it
    #[instrument]
    pub fn init(store_path: PathBuf) -> Result<Self> {
        info!("Initializing colman store at {:?}", store_path);
        let store = LocalStore::init(store_path)?;
        Ok(Self::new(Arc::new(store)))
    }

    /// Open an existing local store at `store_path`
    #[instrument]
    pub fn open_store(store_path: PathBuf) -> Result<Self> {
        let store = LocalStore::open(store_path)?;
        Ok(Self::new(Arc::new(store)))
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The collection service behind this engine
    pub fn service(&self) -> &Arc<dyn CollectionService> {
        &self.service
    }

    /// Parser configured for loading stored manifests
    pub fn parser(&self) -> ManifestParser {
        ManifestParser::new().strict_names(self.config.strict_names_on_load)
    }

    /// Start a new collection from manifest text
    ///
    /// The manifest is parsed first; a malformed manifest creates nothing.
    #[instrument(skip(self, manifest_text))]
    pub fn create(&self, manifest_text: &str, name: &str) -> Result<CollectionVersion> {
        self.create_with_properties(manifest_text, name, Properties::new())
    }

    /// Start a new collection with initial properties
    #[instrument(skip(self, manifest_text, properties))]
    pub fn create_with_properties(
        &self,
        manifest_text: &str,
        name: &str,
        properties: Properties,
    ) -> Result<CollectionVersion> {
        if name.trim().is_empty() {
            return Err(NameError::Required.into());
        }
        self.parser().parse(manifest_text)?;
        let version = self.service.create(CreateRequest {
            manifest_text: manifest_text.to_string(),
            name: name.to_string(),
            properties,
        })?;
        info!("Created collection {} as {}", name, version.uuid);
        Ok(version)
    }

    /// Fetch any version
    pub fn fetch(&self, uuid: &str) -> Result<CollectionVersion> {
        self.service.fetch(uuid)
    }

    /// Parse the manifest of a version
    pub fn load_tree(&self, uuid: &str) -> Result<VirtualFileTree> {
        let version = self.service.fetch(uuid)?;
        Ok(self.parser().parse(&version.manifest_text)?)
    }

    /// Open a version for browsing and editing
    ///
    /// Fails with a parse error if the stored manifest is malformed. A
    /// session on anything but the head is read-only.
    #[instrument(skip(self))]
    pub fn open(&self, uuid: &str) -> Result<EditSession> {
        let version = self.service.fetch(uuid)?;
        let tree = self.parser().parse(&version.manifest_text)?;
        debug!(
            "Opened v{} of {} ({} files){}",
            version.version,
            short_id(&version.collection_id),
            tree.file_count(),
            if version.is_head() { "" } else { " read-only" }
        );
        Ok(EditSession::new(self.clone(), version, tree))
    }

    /// Every version of the lineage `uuid` belongs to
    pub fn lineage(&self, uuid: &str) -> Result<Lineage> {
        let versions = self.service.list_versions(uuid)?;
        let head = versions
            .iter()
            .find(|v| v.is_head())
            .ok_or_else(|| ColmanError::CollectionNotFound(uuid.to_string()))?;
        Ok(Lineage {
            collection_id: head.collection_id.clone(),
            current_version_uuid: head.uuid.clone(),
            versions,
        })
    }

    /// The head of the lineage `uuid` belongs to
    pub fn head(&self, uuid: &str) -> Result<CollectionVersion> {
        Ok(self.lineage(uuid)?.head()?.clone())
    }

    /// Version browser rows for the lineage of `uuid`, ascending
    #[instrument(skip(self))]
    pub fn versions(&self, uuid: &str) -> Result<Vec<VersionSummary>> {
        Ok(self.lineage(uuid)?.summaries())
    }

    /// Make a copy of version `uuid` the new head of its lineage
    ///
    /// The new version carries the old version's manifest, name and
    /// properties. History is never rewritten: the head pointer moves to
    /// the new version, not back to `uuid`.
    #[instrument(skip(self))]
    pub fn restore(&self, uuid: &str) -> Result<CollectionVersion> {
        let lineage = self.lineage(uuid)?;
        let request = lineage.restore_request(uuid)?;

        let _guard = self.begin_commit(&lineage.collection_id)?;
        let restored = self.service.commit(request)?;
        info!(
            "Restored {} of {} as v{}",
            short_id(uuid),
            short_id(&lineage.collection_id),
            restored.version
        );
        Ok(restored)
    }

    /// Path-level differences from version `from` to version `to`
    #[instrument(skip(self))]
    pub fn diff(&self, from: &str, to: &str) -> Result<TreeDiff> {
        let old = self.load_tree(from)?;
        let new = self.load_tree(to)?;
        let diff = diff_trees(&old, &new);
        debug!(
            "Diff {} -> {}: +{} -{} ~{}",
            short_id(from),
            short_id(to),
            diff.stats.files_added,
            diff.stats.files_removed,
            diff.stats.files_modified
        );
        Ok(diff)
    }

    /// Verify the lineage `uuid` belongs to
    #[instrument(skip(self))]
    pub fn verify(&self, uuid: &str) -> Result<LineageVerificationReport> {
        let lineage = self.lineage(uuid)?;
        Ok(LineageVerifier::new()
            .strict_names(self.config.strict_names_on_load)
            .verify(&lineage))
    }

    /// Claim the single commit slot of a collection
    pub(crate) fn begin_commit(&self, collection_id: &str) -> Result<CommitGuard> {
        match self.in_flight.entry(collection_id.to_string()) {
            Entry::Occupied(_) => {
                warn!("Commit to {} already in progress", short_id(collection_id));
                Err(ColmanError::CommitInProgress(collection_id.to_string()))
            }
            Entry::Vacant(slot) => {
                slot.insert(());
                trace!("Commit slot for {} acquired", short_id(collection_id));
                Ok(CommitGuard {
                    in_flight: Arc::clone(&self.in_flight),
                    collection_id: collection_id.to_string(),
                })
            }
        }
    }

    /// Whether a commit to `collection_id` is outstanding
    pub fn commit_in_progress(&self, collection_id: &str) -> bool {
        self.in_flight.contains_key(collection_id)
    }
}

/// Holds a collection's commit slot until dropped
#[derive(Debug)]
pub(crate) struct CommitGuard {
    in_flight: Arc<DashMap<String, ()>>,
    collection_id: String,
}

impl Drop for CommitGuard {
    fn drop(&mut self) {
        self.in_flight.remove(&self.collection_id);
        trace!("Commit slot for {} released", short_id(&self.collection_id));
    }
}

/// Builder for configuring colman
///
/// # Examples
///
/// ```rust
/// use colman::ColmanBuilder;
/// use tempfile::TempDir;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let dir = TempDir::new()?;
/// let colman = ColmanBuilder::new()
///     .undo_depth(100)
///     .strict_names_on_load(true)
///     .build_local(dir.path().join("store"))?;
/// assert_eq!(colman.config().undo_depth, 100);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct ColmanBuilder {
    config: EngineConfig,
}

impl ColmanBuilder {
    /// Create a builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Maximum undo entries per session (0 disables undo)
    pub fn undo_depth(mut self, depth: usize) -> Self {
        self.config.undo_depth = depth;
        self
    }

    /// Reject names with leading/trailing whitespace when loading
    pub fn strict_names_on_load(mut self, strict: bool) -> Self {
        self.config.strict_names_on_load = strict;
        self
    }

    /// Build an engine over `service`
    pub fn build(self, service: Arc<dyn CollectionService>) -> Colman {
        Colman {
            service,
            config: self.config,
            in_flight: Arc::new(DashMap::new()),
        }
    }

    /// Build an engine over a local store, creating the store if needed
    pub fn build_local(self, store_path: PathBuf) -> Result<Colman> {
        let store = LocalStore::init_or_open(store_path)?;
        Ok(self.build(Arc::new(store)))
    }
}
