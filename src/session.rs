//! Edit sessions
//!
//! An [`EditSession`] is one collection version opened for browsing or
//! editing: the parsed tree, the version it was loaded from, the pending
//! name and properties, a [`Selection`] and a bounded undo stack.
//!
//! Every edit is all-or-nothing. A rejected edit leaves the tree, the
//! selection and the undo stack exactly as they were.
//!
//! Committing serializes the tree and submits it based on the loaded
//! version. On success the session rebases onto the new head; on failure
//! (stale base, host error, another commit in flight) nothing changes and
//! the edits can be retried or discarded with [`EditSession::reload`].

use crate::colman::Colman;
use crate::error::{ColmanError, NameError, Result};
use crate::selection::Selection;
use crate::serializer::serialize;
use crate::service::CommitRequest;
use crate::tree::VirtualFileTree;
use crate::types::EditOp;
use crate::utils::short_id;
use crate::version::{CollectionVersion, Properties};
use serde_json::Value;
use std::collections::VecDeque;
use tracing::{debug, info, trace, warn};

/// Session state captured before each edit
#[derive(Debug, Clone)]
struct Snapshot {
    tree: VirtualFileTree,
    name: String,
    properties: Properties,
}

/// A collection version opened for editing
#[derive(Debug)]
pub struct EditSession {
    engine: Colman,
    base: CollectionVersion,
    base_tree: VirtualFileTree,
    tree: VirtualFileTree,
    name: String,
    properties: Properties,
    selection: Selection,
    undo: VecDeque<Snapshot>,
}

impl EditSession {
    pub(crate) fn new(engine: Colman, base: CollectionVersion, tree: VirtualFileTree) -> Self {
        Self {
            engine,
            name: base.name.clone(),
            properties: base.properties.clone(),
            base_tree: tree.clone(),
            tree,
            base,
            selection: Selection::new(),
            undo: VecDeque::new(),
        }
    }

    /// The version this session was loaded from or last committed
    pub fn base(&self) -> &CollectionVersion {
        &self.base
    }

    /// Current tree, including uncommitted edits
    pub fn tree(&self) -> &VirtualFileTree {
        &self.tree
    }

    /// Pending collection name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pending collection properties
    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// Whether the session was opened on an old version
    pub fn is_read_only(&self) -> bool {
        !self.base.is_head()
    }

    /// Whether there is anything to commit
    pub fn is_dirty(&self) -> bool {
        self.tree != self.base_tree
            || self.name != self.base.name
            || self.properties != self.base.properties
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// Mutable access to the selection; selecting is allowed on old versions
    pub fn selection_mut(&mut self) -> &mut Selection {
        &mut self.selection
    }

    /// Select every top-level entry
    pub fn select_all(&mut self) {
        self.selection.select_all(&self.tree);
    }

    /// Manifest text of the current tree
    pub fn manifest_text(&self) -> String {
        serialize(&self.tree)
    }

    /// Apply a structural edit
    ///
    /// # Errors
    ///
    /// - [`ColmanError::ReadOnlyVersion`] on an old version
    /// - [`ColmanError::Edit`] if the tree rejects the edit
    pub fn apply(&mut self, op: EditOp) -> Result<()> {
        self.ensure_writable()?;
        trace!("Applying {}", op);

        let next = match &op {
            EditOp::Rename { path, new_name } => self.tree.rename(path, new_name)?,
            EditOp::RenameInPlace { path, new_name } => self.tree.rename_in_place(path, new_name)?,
            EditOp::Move { from, to } => self.tree.move_path(from, to)?,
            EditOp::Remove { path } => self.tree.remove(path)?,
            EditOp::RemoveSelected => self.selection.remove_selected(&self.tree)?,
            EditOp::AddDirectory { path } => self.tree.add_directory(path)?,
            EditOp::AddFile { path, segments } => self.tree.add_file(path, segments.clone())?,
        };

        self.push_undo();
        self.tree = next;
        if op == EditOp::RemoveSelected {
            self.selection.clear();
        } else {
            self.selection.retain_existing(&self.tree);
        }
        debug!("Applied {} ({} files now)", op, self.tree.file_count());
        Ok(())
    }

    /// Rename a node; `new_name` is a path from the collection root
    pub fn rename(&mut self, path: &str, new_name: &str) -> Result<()> {
        self.apply(EditOp::Rename {
            path: path.to_string(),
            new_name: new_name.to_string(),
        })
    }

    /// Move a node to `to`
    pub fn move_path(&mut self, from: &str, to: &str) -> Result<()> {
        self.apply(EditOp::Move {
            from: from.to_string(),
            to: to.to_string(),
        })
    }

    /// Remove a node
    pub fn remove(&mut self, path: &str) -> Result<()> {
        self.apply(EditOp::Remove { path: path.to_string() })
    }

    /// Remove every selected node
    pub fn remove_selected(&mut self) -> Result<()> {
        self.apply(EditOp::RemoveSelected)
    }

    /// Create an empty directory
    pub fn add_directory(&mut self, path: &str) -> Result<()> {
        self.apply(EditOp::AddDirectory { path: path.to_string() })
    }

    /// Change the collection name
    pub fn set_name(&mut self, name: &str) -> Result<()> {
        self.ensure_writable()?;
        if name.trim().is_empty() {
            return Err(NameError::Required.into());
        }
        self.push_undo();
        self.name = name.to_string();
        Ok(())
    }

    /// Set a property, returning its previous value
    pub fn set_property(&mut self, key: &str, value: Value) -> Result<Option<Value>> {
        self.ensure_writable()?;
        self.push_undo();
        Ok(self.properties.insert(key.to_string(), value))
    }

    /// Remove a property, returning its value
    pub fn remove_property(&mut self, key: &str) -> Result<Option<Value>> {
        self.ensure_writable()?;
        if !self.properties.contains_key(key) {
            return Ok(None);
        }
        self.push_undo();
        Ok(self.properties.remove(key))
    }

    /// Revert the most recent edit; returns false if there is none
    pub fn undo(&mut self) -> bool {
        match self.undo.pop_back() {
            Some(snapshot) => {
                self.tree = snapshot.tree;
                self.name = snapshot.name;
                self.properties = snapshot.properties;
                self.selection.retain_existing(&self.tree);
                debug!("Undid last edit ({} more available)", self.undo.len());
                true
            }
            None => false,
        }
    }

    /// Number of edits that can be undone
    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    /// Submit the edits as a new version
    ///
    /// Returns the base unchanged if there is nothing to commit. On success
    /// the session is rebased onto the new head and the undo stack is
    /// cleared.
    ///
    /// # Errors
    ///
    /// - [`ColmanError::ReadOnlyVersion`] on an old version
    /// - [`ColmanError::CommitInProgress`] if another commit to the same
    ///   collection is outstanding
    /// - [`ColmanError::StaleVersion`] if the head moved since this session
    ///   was loaded
    /// - any error the service returns
    pub fn commit(&mut self) -> Result<CollectionVersion> {
        self.ensure_writable()?;
        if !self.is_dirty() {
            debug!("Nothing to commit for {}", short_id(&self.base.uuid));
            return Ok(self.base.clone());
        }

        let _guard = self.engine.begin_commit(&self.base.collection_id)?;
        let request = CommitRequest {
            based_on: self.base.uuid.clone(),
            manifest_text: serialize(&self.tree),
            name: self.name.clone(),
            properties: self.properties.clone(),
        };

        match self.engine.service().commit(request) {
            Ok(version) => {
                info!(
                    "Committed v{} of {} ({} files, {} bytes)",
                    version.version,
                    short_id(&version.collection_id),
                    version.file_count,
                    version.total_size_bytes
                );
                self.base = version.clone();
                self.base_tree = self.tree.clone();
                self.undo.clear();
                Ok(version)
            }
            Err(e) => {
                warn!("Commit based on {} failed: {}", short_id(&self.base.uuid), e);
                Err(e)
            }
        }
    }

    /// Discard all edits and load the current head
    pub fn reload(&mut self) -> Result<()> {
        let head = self.engine.head(&self.base.uuid)?;
        let tree = self.engine.parser().parse(&head.manifest_text)?;
        debug!("Reloaded {} at v{}", short_id(&head.collection_id), head.version);
        *self = EditSession::new(self.engine.clone(), head, tree);
        Ok(())
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.is_read_only() {
            return Err(ColmanError::ReadOnlyVersion(self.base.uuid.clone()));
        }
        Ok(())
    }

    fn push_undo(&mut self) {
        let depth = self.engine.config().undo_depth;
        if depth == 0 {
            return;
        }
        if self.undo.len() == depth {
            self.undo.pop_front();
        }
        self.undo.push_back(Snapshot {
            tree: self.tree.clone(),
            name: self.name.clone(),
            properties: self.properties.clone(),
        });
    }
}
