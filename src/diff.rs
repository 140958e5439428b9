//! Path-level differences between two collection trees
//!
//! Two trees are compared by path: a file present only in the newer tree is
//! added, one present only in the older tree is removed, and a file present
//! in both whose segment list differs is modified. Renames show up as a
//! removal plus an addition of the same content.
//!
//! ## Examples
//!
//! ```rust
//! use colman::diff::diff_trees;
//! use colman::parser::parse;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let old = parse(". 37b51d194a7513e45b56f6524f2d51f2+3 0:3:bar\n")?;
//! let new = old.rename("bar", "subdir/foo")?;
//!
//! let diff = diff_trees(&old, &new);
//! assert_eq!(diff.stats.files_added, 1);
//! assert_eq!(diff.stats.files_removed, 1);
//! assert_eq!(diff.dirs_added, vec!["subdir".to_string()]);
//! # Ok(())
//! # }
//! ```

use crate::tree::{FileNode, VirtualFileTree};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A file as seen by a diff
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffEntry {
    /// Path from the collection root
    pub path: String,
    /// File size in bytes
    pub size: u64,
}

/// Summary counts of a diff
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeStats {
    /// Number of files added
    pub files_added: usize,
    /// Number of files whose content changed
    pub files_modified: usize,
    /// Number of files removed
    pub files_removed: usize,
    /// Total size of added files
    pub bytes_added: u64,
    /// Total size of modified files (new size)
    pub bytes_modified: u64,
    /// Total size of removed files
    pub bytes_removed: u64,
    /// Paths that changed, sorted
    pub changed_files: Vec<String>,
}

impl ChangeStats {
    /// Check if any file was added, modified or removed
    pub fn has_changes(&self) -> bool {
        self.total_operations() > 0
    }

    /// Sum of added, modified and removed files
    pub fn total_operations(&self) -> usize {
        self.files_added + self.files_modified + self.files_removed
    }

    /// Change in collection size in bytes
    ///
    /// Positive values indicate growth, negative values shrinkage.
    pub fn net_size_change(&self, modified_old_bytes: u64) -> i64 {
        let grown = self.bytes_added.saturating_add(self.bytes_modified);
        let shrunk = self.bytes_removed.saturating_add(modified_old_bytes);
        (grown as i64).saturating_sub(shrunk as i64)
    }
}

/// Differences between an older and a newer tree
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeDiff {
    /// Files only in the newer tree
    pub added: Vec<DiffEntry>,
    /// Files only in the older tree
    pub removed: Vec<DiffEntry>,
    /// Files in both trees with different content, as `(old, new)`
    pub modified: Vec<(DiffEntry, DiffEntry)>,
    /// Directories only in the newer tree
    pub dirs_added: Vec<String>,
    /// Directories only in the older tree
    pub dirs_removed: Vec<String>,
    /// Change statistics
    pub stats: ChangeStats,
}

impl TreeDiff {
    /// Whether the trees hold the same files and directories
    pub fn is_empty(&self) -> bool {
        !self.stats.has_changes() && self.dirs_added.is_empty() && self.dirs_removed.is_empty()
    }
}

/// Compare `from` (older) with `to` (newer)
///
/// All lists are sorted by path.
pub fn diff_trees(from: &VirtualFileTree, to: &VirtualFileTree) -> TreeDiff {
    let from_files = file_map(from);
    let to_files = file_map(to);

    let mut diff = TreeDiff::default();

    for (path, new) in &to_files {
        match from_files.get(path) {
            Some(old) if old.segments() != new.segments() => {
                diff.stats.files_modified += 1;
                diff.stats.bytes_modified = diff.stats.bytes_modified.saturating_add(new.size());
                diff.stats.changed_files.push(path.clone());
                diff.modified.push((entry(path, old), entry(path, new)));
            }
            Some(_) => {}
            None => {
                diff.stats.files_added += 1;
                diff.stats.bytes_added = diff.stats.bytes_added.saturating_add(new.size());
                diff.stats.changed_files.push(path.clone());
                diff.added.push(entry(path, new));
            }
        }
    }

    for (path, old) in &from_files {
        if !to_files.contains_key(path) {
            diff.stats.files_removed += 1;
            diff.stats.bytes_removed = diff.stats.bytes_removed.saturating_add(old.size());
            diff.stats.changed_files.push(path.clone());
            diff.removed.push(entry(path, old));
        }
    }
    diff.stats.changed_files.sort();

    let from_dirs = dir_paths(from);
    let to_dirs = dir_paths(to);
    diff.dirs_added = to_dirs.iter().filter(|d| !from_dirs.contains(d)).cloned().collect();
    diff.dirs_removed = from_dirs.iter().filter(|d| !to_dirs.contains(d)).cloned().collect();

    diff
}

fn file_map(tree: &VirtualFileTree) -> BTreeMap<String, &FileNode> {
    tree.files().into_iter().collect()
}

fn dir_paths(tree: &VirtualFileTree) -> Vec<String> {
    let mut dirs: Vec<String> = tree
        .entries()
        .into_iter()
        .filter(|(_, _, node)| node.is_dir())
        .map(|(path, _, _)| path)
        .collect();
    dirs.sort();
    dirs
}

fn entry(path: &str, file: &FileNode) -> DiffEntry {
    DiffEntry {
        path: path.to_string(),
        size: file.size(),
    }
}
