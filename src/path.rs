//! File and directory name legality
//!
//! Pure functions shared by the parser and the tree mutations. Rules are
//! checked in a fixed order and the first failure wins:
//!
//! 1. empty string: [`NameError::Required`]
//! 2. exactly `.` or `..`: [`NameError::ReservedName`]
//! 3. leading or trailing ASCII whitespace: [`NameError::Whitespace`]
//! 4. an empty segment after splitting on `/`: [`NameError::EmptySegment`]
//!
//! No length limit is imposed here.
//!
//! ```rust
//! use colman::path::{validate, validate_path};
//! use colman::NameError;
//!
//! assert_eq!(validate(".."), Err(NameError::ReservedName));
//! assert_eq!(validate_path("//foo"), Err(NameError::EmptySegment));
//! assert_eq!(validate_path("subdir/foo").unwrap(), vec!["subdir", "foo"]);
//! ```

use crate::error::NameError;

/// Path separator inside collection paths
pub const SEPARATOR: char = '/';

/// Validate a single name (or the whole string of a path)
pub fn validate(name: &str) -> Result<(), NameError> {
    if name.is_empty() {
        return Err(NameError::Required);
    }
    if name == "." || name == ".." {
        return Err(NameError::ReservedName);
    }
    if has_outer_whitespace(name) {
        return Err(NameError::Whitespace);
    }
    if name.split(SEPARATOR).any(str::is_empty) {
        return Err(NameError::EmptySegment);
    }
    Ok(())
}

/// Validate a multi-segment path and return its segments
///
/// The whole string is checked first, then every segment is checked
/// against the single-name rules.
pub fn validate_path(path: &str) -> Result<Vec<String>, NameError> {
    validate(path)?;
    path.split(SEPARATOR)
        .map(|segment| validate(segment).map(|_| segment.to_string()))
        .collect()
}

/// Split an existing path into segments without validating names
///
/// Used to address nodes that are already in a tree. An empty path,
/// `.` and `./` all address the root. A leading `./` is accepted.
pub fn split_path(path: &str) -> Vec<&str> {
    let trimmed = path.strip_prefix("./").unwrap_or(path);
    if trimmed.is_empty() || trimmed == "." {
        return Vec::new();
    }
    trimmed.split(SEPARATOR).collect()
}

/// Join path segments with the separator
pub fn join(segments: &[impl AsRef<str>]) -> String {
    segments
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join("/")
}

fn has_outer_whitespace(name: &str) -> bool {
    let bytes = name.as_bytes();
    match (bytes.first(), bytes.last()) {
        (Some(first), Some(last)) => first.is_ascii_whitespace() || last.is_ascii_whitespace(),
        _ => false,
    }
}
