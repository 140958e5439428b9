//! Block locators and file segments
//!
//! A block locator is an opaque, content-addressed reference to a stored
//! block: `<hash>+<size>[+<hint>...]`. The engine never interprets the hash
//! or the hints (permission signatures, storage zones); it only needs the
//! size to map file tokens onto byte ranges, and it reproduces the locator
//! text exactly when serializing.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Hash of the empty block, used when a stream carries only empty files
/// or directory placeholders.
pub const EMPTY_BLOCK_HASH: &str = "d41d8cd98f00b204e9800998ecf8427e";

/// Length of a block hash in hex characters
const HASH_LEN: usize = 32;

/// Reference to a stored block
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockLocator {
    /// Hex content hash
    pub hash: String,
    /// Block size in bytes
    pub size: u64,
    /// Hints in their original order, without the leading `+`
    pub hints: Vec<String>,
}

impl BlockLocator {
    /// Locator of the zero-length block
    pub fn empty() -> Self {
        Self {
            hash: EMPTY_BLOCK_HASH.to_string(),
            size: 0,
            hints: Vec::new(),
        }
    }

    /// Parse a locator token, returning `None` if it does not have the
    /// `hash+size(+hint)*` shape
    pub fn parse(token: &str) -> Option<Self> {
        let mut parts = token.split('+');
        let hash = parts.next()?;
        if hash.len() != HASH_LEN || !hash.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            return None;
        }

        let size_text = parts.next()?;
        if size_text.is_empty() || !size_text.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let size = size_text.parse().ok()?;

        let hints = parts
            .map(|hint| is_hint(hint).then(|| hint.to_string()))
            .collect::<Option<Vec<_>>>()?;

        Some(Self {
            hash: hash.to_string(),
            size,
            hints,
        })
    }

    /// Whether a token looks like a locator
    pub fn is_locator(token: &str) -> bool {
        Self::parse(token).is_some()
    }
}

impl fmt::Display for BlockLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{}", self.hash, self.size)?;
        for hint in &self.hints {
            write!(f, "+{}", hint)?;
        }
        Ok(())
    }
}

impl FromStr for BlockLocator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("malformed block locator: {:?}", s))
    }
}

/// Hints start with an uppercase letter and contain no separators
fn is_hint(hint: &str) -> bool {
    let mut chars = hint.chars();
    match chars.next() {
        Some(first) if first.is_ascii_uppercase() => {
            chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '@' | '_' | '-'))
        }
        _ => false,
    }
}

/// A contiguous byte range inside one block
///
/// Files are an ordered list of segments; a file spanning several blocks,
/// or assembled from several manifest lines, has several segments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    /// Block holding the bytes
    pub locator: BlockLocator,
    /// Offset within the block
    pub offset: u64,
    /// Number of bytes
    pub length: u64,
}

impl Segment {
    /// Create a segment
    pub fn new(locator: BlockLocator, offset: u64, length: u64) -> Self {
        Self {
            locator,
            offset,
            length,
        }
    }

    /// Whether the segment runs to the end of its block
    pub fn ends_block(&self) -> bool {
        self.offset + self.length == self.locator.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain() {
        let loc = BlockLocator::parse("37b51d194a7513e45b56f6524f2d51f2+3").unwrap();
        assert_eq!(loc.size, 3);
        assert!(loc.hints.is_empty());
        assert_eq!(loc.to_string(), "37b51d194a7513e45b56f6524f2d51f2+3");
    }

    #[test]
    fn test_parse_with_hints_preserved() {
        let text = "365f83f5f808896ec834c8b595288735+2310+K@qr1hi+Af0c9a66381f3b028677411926f0be1c6282fe67c@542b5ddf";
        let loc: BlockLocator = text.parse().unwrap();
        assert_eq!(loc.size, 2310);
        assert_eq!(
            loc.hints,
            vec!["K@qr1hi", "Af0c9a66381f3b028677411926f0be1c6282fe67c@542b5ddf"]
        );
        assert_eq!(loc.to_string(), text);
    }

    #[test]
    fn test_reject_non_locators() {
        assert!(!BlockLocator::is_locator("0:3:bar"));
        assert!(!BlockLocator::is_locator("37b51d194a7513e45b56f6524f2d51f2"));
        assert!(!BlockLocator::is_locator("37b51d194a7513e45b56f6524f2d51f2+"));
        assert!(!BlockLocator::is_locator("37b51d194a7513e45b56f6524f2d51f2+3+"));
        assert!(!BlockLocator::is_locator("37B51D194A7513E45B56F6524F2D51F2+3"));
        assert!(!BlockLocator::is_locator("37b51d194a7513e45b56f6524f2d51f2+3+lower"));
    }

    #[test]
    fn test_empty_block() {
        let loc = BlockLocator::empty();
        assert_eq!(loc.to_string(), "d41d8cd98f00b204e9800998ecf8427e+0");
    }
}
