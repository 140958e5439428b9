//! Virtual file tree built from a collection manifest
//!
//! This module provides [`VirtualFileTree`], the in-memory hierarchy of
//! directories and files described by a manifest, together with its
//! structural edits.
//!
//! ## Overview
//!
//! The tree is a persistent value: every mutation borrows the tree, applies
//! the edit to a copy and returns the copy. On failure nothing is returned
//! but the error, so an edit is all-or-nothing and the previous tree stays
//! available for undo or diffing.
//!
//! - **Directories** keep their children in insertion order. Names are
//!   unique within a directory. A directory with no children is legal and
//!   survives edits; it is only deleted by removing it explicitly.
//! - **Files** are an ordered list of [`Segment`]s, so sparse or concatenated
//!   files keep their exact composition.
//!
//! ## Collision policy
//!
//! An edit whose target path is occupied fails with
//! [`EditError::NameConflict`], whether the occupant is a file or a
//! directory. Nothing is ever overwritten implicitly.
//!
//! ## Examples
//!
//! ```rust
//! use colman::parser::parse;
//!
//! let tree = parse(". 37b51d194a7513e45b56f6524f2d51f2+3 0:3:bar\n")?;
//!
//! // Rename takes the destination path from the collection root
//! let moved = tree.rename("bar", "subdir/foo")?;
//! assert!(moved.is_file("subdir/foo"));
//!
//! // Moving the only child out keeps the directory
//! let back = moved.rename("subdir/foo", "baz")?;
//! assert!(back.is_dir("subdir"));
//! assert!(back.is_file("baz"));
//!
//! // The original tree is untouched
//! assert!(tree.is_file("bar"));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::error::EditError;
use crate::locator::Segment;
use crate::path::{self, split_path, validate, validate_path};
use std::collections::HashMap;
use tracing::{debug, trace};

/// A node of the tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeNode {
    /// A directory and its children
    Directory(Directory),
    /// A file and its segments
    File(FileNode),
}

impl TreeNode {
    /// Name of the node within its parent
    pub fn name(&self) -> &str {
        match self {
            TreeNode::Directory(dir) => &dir.name,
            TreeNode::File(file) => &file.name,
        }
    }

    fn set_name(&mut self, name: String) {
        match self {
            TreeNode::Directory(dir) => dir.name = name,
            TreeNode::File(file) => file.name = name,
        }
    }

    /// Whether this node is a directory
    pub fn is_dir(&self) -> bool {
        matches!(self, TreeNode::Directory(_))
    }

    /// Whether this node is a file
    pub fn is_file(&self) -> bool {
        matches!(self, TreeNode::File(_))
    }

    /// Total bytes of every file at or below this node
    pub fn size(&self) -> u64 {
        match self {
            TreeNode::Directory(dir) => dir.total_size(),
            TreeNode::File(file) => file.size(),
        }
    }

    /// Directory view of this node, if it is one
    pub fn as_dir(&self) -> Option<&Directory> {
        match self {
            TreeNode::Directory(dir) => Some(dir),
            TreeNode::File(_) => None,
        }
    }

    /// File view of this node, if it is one
    pub fn as_file(&self) -> Option<&FileNode> {
        match self {
            TreeNode::File(file) => Some(file),
            TreeNode::Directory(_) => None,
        }
    }
}

/// A directory
///
/// Equality compares structure, not child order: two directories are equal
/// when they hold the same set of names mapped to equal nodes.
#[derive(Debug, Clone, Default)]
pub struct Directory {
    name: String,
    children: Vec<TreeNode>,
    /// Child name to position in `children`
    index: HashMap<String, usize>,
}

impl Directory {
    /// Create an empty directory
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Directory name (`.` for the root)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Children in insertion order
    pub fn children(&self) -> &[TreeNode] {
        &self.children
    }

    /// Look up a direct child by name
    pub fn child(&self, name: &str) -> Option<&TreeNode> {
        self.position(name).map(|idx| &self.children[idx])
    }

    /// Whether the directory has no children
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Files directly inside this directory, in order
    pub fn files(&self) -> impl Iterator<Item = &FileNode> {
        self.children.iter().filter_map(TreeNode::as_file)
    }

    /// Subdirectories directly inside this directory, in order
    pub fn subdirectories(&self) -> impl Iterator<Item = &Directory> {
        self.children.iter().filter_map(TreeNode::as_dir)
    }

    /// Number of files at or below this directory
    pub fn file_count(&self) -> usize {
        self.children
            .iter()
            .map(|child| match child {
                TreeNode::Directory(dir) => dir.file_count(),
                TreeNode::File(_) => 1,
            })
            .sum()
    }

    /// Total bytes of every file at or below this directory
    ///
    /// Saturates at `u64::MAX`.
    pub fn total_size(&self) -> u64 {
        self.children
            .iter()
            .fold(0u64, |total, child| total.saturating_add(child.size()))
    }

    pub(crate) fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Append a child; callers check that the name is free
    pub(crate) fn push(&mut self, node: TreeNode) {
        self.index.insert(node.name().to_string(), self.children.len());
        self.children.push(node);
    }

    pub(crate) fn child_mut(&mut self, name: &str) -> Option<&mut TreeNode> {
        let idx = self.position(name)?;
        self.children.get_mut(idx)
    }

    fn take_child(&mut self, name: &str) -> Option<TreeNode> {
        let idx = self.index.remove(name)?;
        for position in self.index.values_mut() {
            if *position > idx {
                *position -= 1;
            }
        }
        Some(self.children.remove(idx))
    }

    /// Walk to an existing subdirectory
    fn dir_at(&self, segments: &[&str]) -> Option<&Directory> {
        let mut current = self;
        for segment in segments {
            current = current.child(segment)?.as_dir()?;
        }
        Some(current)
    }

    fn dir_at_mut(&mut self, segments: &[&str]) -> Option<&mut Directory> {
        let mut current = self;
        for segment in segments {
            current = match current.child_mut(segment)? {
                TreeNode::Directory(dir) => dir,
                TreeNode::File(_) => return None,
            };
        }
        Some(current)
    }

    /// Walk to a subdirectory, creating missing directories on the way
    ///
    /// Fails with `NameConflict` if a file occupies one of the segments.
    pub(crate) fn ensure_dir<S: AsRef<str>>(&mut self, segments: &[S]) -> Result<&mut Directory, EditError> {
        let mut current = self;
        for (i, segment) in segments.iter().enumerate() {
            let segment = segment.as_ref();
            let idx = match current.position(segment) {
                Some(idx) => idx,
                None => {
                    trace!("Creating directory {}", segment);
                    current.push(TreeNode::Directory(Directory::new(segment)));
                    current.children.len() - 1
                }
            };
            current = match &mut current.children[idx] {
                TreeNode::Directory(dir) => dir,
                TreeNode::File(_) => {
                    return Err(EditError::NameConflict(path::join(&segments[..=i])));
                }
            };
        }
        Ok(current)
    }
}

impl PartialEq for Directory {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.children.len() == other.children.len()
            && self
                .children
                .iter()
                .all(|child| other.child(child.name()) == Some(child))
    }
}

impl Eq for Directory {}

/// A file made of ordered segments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileNode {
    name: String,
    segments: Vec<Segment>,
}

impl FileNode {
    /// Create a file; zero-length segments are dropped
    pub fn new(name: impl Into<String>, segments: Vec<Segment>) -> Self {
        Self {
            name: name.into(),
            segments: segments.into_iter().filter(|s| s.length > 0).collect(),
        }
    }

    /// File name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Segments in file order
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// File size in bytes, saturating at `u64::MAX`
    pub fn size(&self) -> u64 {
        self.segments
            .iter()
            .fold(0u64, |total, s| total.saturating_add(s.length))
    }

    pub(crate) fn extend_segments(&mut self, segments: impl IntoIterator<Item = Segment>) {
        self.segments
            .extend(segments.into_iter().filter(|s| s.length > 0));
    }
}

/// In-memory hierarchy of a collection's directories and files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualFileTree {
    root: Directory,
}

impl Default for VirtualFileTree {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualFileTree {
    /// Create an empty tree
    pub fn new() -> Self {
        Self {
            root: Directory::new("."),
        }
    }

    /// Root directory
    pub fn root(&self) -> &Directory {
        &self.root
    }

    pub(crate) fn root_mut(&mut self) -> &mut Directory {
        &mut self.root
    }

    /// Look up a node by path
    ///
    /// The root itself is not a [`TreeNode`]; use [`Self::directory`] to
    /// address directories including the root.
    pub fn get(&self, path: &str) -> Option<&TreeNode> {
        let segments = split_path(path);
        let (last, parents) = segments.split_last()?;
        self.root.dir_at(parents)?.child(last)
    }

    /// Look up a directory by path (empty path or `.` is the root)
    pub fn directory(&self, path: &str) -> Option<&Directory> {
        self.root.dir_at(&split_path(path))
    }

    /// Look up a file by path
    pub fn file(&self, path: &str) -> Option<&FileNode> {
        self.get(path)?.as_file()
    }

    /// Whether a file or directory exists at `path`
    pub fn contains(&self, path: &str) -> bool {
        split_path(path).is_empty() || self.get(path).is_some()
    }

    /// Whether `path` is a directory
    pub fn is_dir(&self, path: &str) -> bool {
        self.directory(path).is_some()
    }

    /// Whether `path` is a file
    pub fn is_file(&self, path: &str) -> bool {
        self.file(path).is_some()
    }

    /// Number of files in the tree
    pub fn file_count(&self) -> usize {
        self.root.file_count()
    }

    /// Total bytes of all files
    pub fn total_size(&self) -> u64 {
        self.root.total_size()
    }

    /// Whether the tree has no entries at all
    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// List the children of a directory
    pub fn list(&self, path: &str) -> Result<&[TreeNode], EditError> {
        self.directory(path)
            .map(Directory::children)
            .ok_or_else(|| EditError::NotFound(path.to_string()))
    }

    /// Every node in depth-first pre-order as `(path, depth, node)`
    ///
    /// Paths are `/`-separated without a leading `./`; top-level entries
    /// have depth 0.
    pub fn entries(&self) -> Vec<(String, usize, &TreeNode)> {
        let mut out = Vec::new();
        collect_entries(&self.root, "", 0, &mut out);
        out
    }

    /// Every file with its path, in depth-first pre-order
    pub fn files(&self) -> Vec<(String, &FileNode)> {
        self.entries()
            .into_iter()
            .filter_map(|(path, _, node)| node.as_file().map(|f| (path, f)))
            .collect()
    }

    /// Rename a node, taking `new_name` as its destination path from the
    /// collection root
    ///
    /// A bare name puts the node at the top level of the collection; a name
    /// with separators moves it into that directory, creating missing
    /// intermediate directories. Renaming a top-level entry with a bare
    /// name is therefore an in-place rename. Use [`Self::rename_in_place`]
    /// to rename within the current parent.
    ///
    /// # Errors
    ///
    /// - [`EditError::InvalidName`] if `new_name` fails validation
    /// - [`EditError::NotFound`] if `old_path` does not exist
    /// - [`EditError::NameConflict`] if the destination is occupied
    pub fn rename(&self, old_path: &str, new_name: &str) -> Result<Self, EditError> {
        let target = validate_path(new_name)?;
        debug!("Renaming {} to {}", old_path, new_name);
        self.relocate(old_path, &target)
    }

    /// Rename a node within its current parent
    ///
    /// If `new_name` contains a separator the edit becomes a move to that
    /// path from the collection root, as with [`Self::rename`].
    pub fn rename_in_place(&self, old_path: &str, new_name: &str) -> Result<Self, EditError> {
        if new_name.contains(path::SEPARATOR) {
            return self.move_path(old_path, new_name);
        }
        validate(new_name)?;

        let source = split_path(old_path);
        let (_, parents) = source.split_last().ok_or(EditError::RootImmutable)?;
        let mut target: Vec<String> = parents.iter().map(|s| s.to_string()).collect();
        target.push(new_name.to_string());
        debug!("Renaming {} in place to {}", old_path, new_name);
        self.relocate(old_path, &target)
    }

    /// Move a file or a whole directory subtree to `new_path`
    ///
    /// Every segment of `new_path` is validated and missing intermediate
    /// directories are created. The source's parent is kept even if the
    /// move leaves it empty.
    pub fn move_path(&self, old_path: &str, new_path: &str) -> Result<Self, EditError> {
        let target = validate_path(new_path)?;
        debug!("Moving {} to {}", old_path, new_path);
        self.relocate(old_path, &target)
    }

    /// Remove a file, or a directory with all of its descendants
    pub fn remove(&self, path: &str) -> Result<Self, EditError> {
        let segments = split_path(path);
        let (last, parents) = segments.split_last().ok_or(EditError::RootImmutable)?;

        let mut next = self.clone();
        let removed = next
            .root
            .dir_at_mut(parents)
            .and_then(|dir| dir.take_child(last))
            .ok_or_else(|| EditError::NotFound(path.to_string()))?;

        debug!(
            "Removed {} ({} files, {} bytes)",
            path,
            match &removed {
                TreeNode::Directory(dir) => dir.file_count(),
                TreeNode::File(_) => 1,
            },
            removed.size()
        );
        Ok(next)
    }

    /// Create an explicit empty directory, including intermediates
    ///
    /// Succeeds without change if the directory already exists. Fails with
    /// `NameConflict` if a file occupies the path or one of its parents.
    pub fn add_directory(&self, path: &str) -> Result<Self, EditError> {
        let segments = validate_path(path)?;
        let mut next = self.clone();
        next.root.ensure_dir(&segments)?;
        debug!("Added directory {}", path);
        Ok(next)
    }

    /// Add a file made of `segments` at `path`
    ///
    /// Missing parent directories are created. Fails with `NameConflict`
    /// if anything already exists at `path`.
    pub fn add_file(&self, path: &str, segments: Vec<Segment>) -> Result<Self, EditError> {
        let mut parts = validate_path(path)?;
        let name = parts.pop().ok_or(EditError::RootImmutable)?;

        let mut next = self.clone();
        let parent = next.root.ensure_dir(&parts)?;
        if parent.position(&name).is_some() {
            return Err(EditError::NameConflict(path.to_string()));
        }
        parent.push(TreeNode::File(FileNode::new(name, segments)));
        debug!("Added file {}", path);
        Ok(next)
    }

    /// Detach the node at `old_path` and attach it at `target`
    fn relocate(&self, old_path: &str, target: &[String]) -> Result<Self, EditError> {
        let source = split_path(old_path);
        let (source_name, source_parents) = source.split_last().ok_or(EditError::RootImmutable)?;
        let (target_name, target_parents) = target.split_last().ok_or(EditError::RootImmutable)?;

        let node = self
            .root
            .dir_at(source_parents)
            .and_then(|dir| dir.child(source_name))
            .ok_or_else(|| EditError::NotFound(old_path.to_string()))?;

        if source.len() == target.len() && source.iter().zip(target).all(|(a, b)| *a == b.as_str()) {
            trace!("Rename of {} onto itself", old_path);
            return Ok(self.clone());
        }

        let target_path = path::join(target);
        if node.is_dir()
            && target.len() > source.len()
            && source.iter().zip(target).all(|(a, b)| *a == b.as_str())
        {
            return Err(EditError::InvalidMove {
                from: old_path.to_string(),
                to: target_path,
            });
        }

        let mut next = self.clone();
        let mut node = next
            .root
            .dir_at_mut(source_parents)
            .and_then(|dir| dir.take_child(source_name))
            .ok_or_else(|| EditError::NotFound(old_path.to_string()))?;

        let parent = next.root.ensure_dir(target_parents)?;
        if parent.position(target_name).is_some() {
            return Err(EditError::NameConflict(target_path));
        }
        node.set_name(target_name.clone());
        parent.push(node);

        Ok(next)
    }

    /// Render the tree for display
    pub fn format_tree(&self) -> String {
        let mut out = String::from(".\n");
        format_children(&self.root, "", &mut out);
        out
    }
}

fn collect_entries<'a>(
    dir: &'a Directory,
    prefix: &str,
    depth: usize,
    out: &mut Vec<(String, usize, &'a TreeNode)>,
) {
    for child in &dir.children {
        let path = if prefix.is_empty() {
            child.name().to_string()
        } else {
            format!("{}/{}", prefix, child.name())
        };
        out.push((path.clone(), depth, child));
        if let TreeNode::Directory(sub) = child {
            collect_entries(sub, &path, depth + 1, out);
        }
    }
}

fn format_children(dir: &Directory, prefix: &str, out: &mut String) {
    let count = dir.children.len();
    for (i, child) in dir.children.iter().enumerate() {
        let is_last = i + 1 == count;
        out.push_str(prefix);
        out.push_str(if is_last { "└── " } else { "├── " });
        out.push_str(child.name());
        match child {
            TreeNode::Directory(sub) => {
                out.push_str("/\n");
                let extension = if is_last { "    " } else { "│   " };
                format_children(sub, &format!("{}{}", prefix, extension), out);
            }
            TreeNode::File(file) => {
                out.push_str(&format!(" ({} B)\n", file.size()));
            }
        }
    }
}
