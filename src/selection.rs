//! Multi-selection over a tree and bulk removal
//!
//! A selection is a set of normalized paths. It is independent of any one
//! tree so it survives edits; [`Selection::retain_existing`] drops paths
//! that an edit made stale.

use crate::error::EditError;
use crate::path::{join, split_path};
use crate::tree::VirtualFileTree;
use std::collections::BTreeSet;
use tracing::debug;

/// Set of selected paths
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    paths: BTreeSet<String>,
}

impl Selection {
    /// Create an empty selection
    pub fn new() -> Self {
        Self::default()
    }

    /// Select a path; returns false if it was already selected
    pub fn select(&mut self, path: &str) -> bool {
        self.paths.insert(normalize(path))
    }

    /// Deselect a path; returns false if it was not selected
    pub fn deselect(&mut self, path: &str) -> bool {
        self.paths.remove(&normalize(path))
    }

    /// Flip the selection state of a path, returning the new state
    pub fn toggle(&mut self, path: &str) -> bool {
        let path = normalize(path);
        if self.paths.remove(&path) {
            false
        } else {
            self.paths.insert(path);
            true
        }
    }

    /// Select every entry currently listed at the top level of the tree
    pub fn select_all(&mut self, tree: &VirtualFileTree) {
        self.paths
            .extend(tree.root().children().iter().map(|node| node.name().to_string()));
    }

    /// Clear the selection
    pub fn clear(&mut self) {
        self.paths.clear();
    }

    /// Whether a path is selected
    pub fn is_selected(&self, path: &str) -> bool {
        self.paths.contains(&normalize(path))
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Selected paths in sorted order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(String::as_str)
    }

    /// Drop selected paths that no longer exist in `tree`
    pub fn retain_existing(&mut self, tree: &VirtualFileTree) {
        self.paths.retain(|path| tree.contains(path));
    }

    /// Remove every selected entry from `tree` in one edit
    ///
    /// Entries below a selected directory go with it and are not removed
    /// twice. Either every selected path is removed or, if any is missing,
    /// the tree is left unchanged and [`EditError::NotFound`] is returned.
    pub fn remove_selected(&self, tree: &VirtualFileTree) -> Result<VirtualFileTree, EditError> {
        let mut next = tree.clone();
        let mut removed = 0;
        for path in self.top_level_paths() {
            next = next.remove(path)?;
            removed += 1;
        }
        debug!("Removed {} selected entries", removed);
        Ok(next)
    }

    /// Selected paths that are not below another selected path
    fn top_level_paths(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for path in &self.paths {
            // Sorted order puts "a" before "a/b" but "a b" between them, so
            // check every kept ancestor rather than only the last one
            let covered = out
                .iter()
                .any(|kept| path.strip_prefix(kept).is_some_and(|rest| rest.starts_with('/')));
            if !covered {
                out.push(path);
            }
        }
        out
    }
}

impl<'a> FromIterator<&'a str> for Selection {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        let mut selection = Self::new();
        for path in iter {
            selection.select(path);
        }
        selection
    }
}

fn normalize(path: &str) -> String {
    join(&split_path(path))
}
