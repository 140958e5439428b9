//! Manifest text to virtual file tree
//!
//! A manifest is a sequence of newline-terminated streams. Each stream line
//! is made of space-separated fields:
//!
//! ```text
//! ./photos 37b51d194a7513e45b56f6524f2d51f2+3 acbd18db4cc2f85cedef654fccc4a4d8+3 0:3:a.jpg 3:3:b\040c.jpg
//! └─path─┘ └──────────── block locators ────────────────────────────────┘ └─ file segments ─┘
//! ```
//!
//! File tokens address byte ranges of the concatenation of the stream's
//! blocks. A range that crosses block boundaries becomes several
//! [`Segment`]s, and a file named on several lines accumulates the segments
//! of every line in order. A stream with no file tokens, or whose only token
//! is the `0:0:\056` placeholder, declares an empty directory.

use crate::error::{NameError, ParseError};
use crate::escape::unescape;
use crate::locator::{BlockLocator, Segment};
use crate::path::{self, validate};
use crate::tree::{FileNode, TreeNode, VirtualFileTree};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Parse manifest text with default options
pub fn parse(text: &str) -> Result<VirtualFileTree, ParseError> {
    ManifestParser::new().parse(text)
}

/// Configurable manifest parser
#[derive(Debug, Clone, Default)]
pub struct ManifestParser {
    strict_names: bool,
}

impl ManifestParser {
    /// Create a parser with default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Also reject names with leading or trailing whitespace
    ///
    /// Such names are representable (the whitespace is escaped) and are
    /// accepted by default; only names the tree cannot hold (`.`, `..`,
    /// empty, containing `/`) are always rejected.
    pub fn strict_names(mut self, strict: bool) -> Self {
        self.strict_names = strict;
        self
    }

    /// Parse manifest text into a tree
    ///
    /// # Errors
    ///
    /// [`ParseError::Malformed`] with the 1-based line number for a bad
    /// stream name, locator, file token or escape, a segment name with `/`,
    /// a byte range beyond the stream's blocks, or a file/directory clash.
    pub fn parse(&self, text: &str) -> Result<VirtualFileTree, ParseError> {
        let mut tree = VirtualFileTree::new();
        let mut streams = 0;

        for (idx, line) in text.split('\n').enumerate() {
            let line_no = idx + 1;
            let mut fields = line.split_ascii_whitespace().peekable();
            let Some(stream_token) = fields.next() else {
                continue;
            };
            streams += 1;

            let stream = parse_stream_name(stream_token, line_no, self.strict_names)?;

            let mut blocks: Vec<(u64, BlockLocator)> = Vec::new();
            let mut stream_size: u64 = 0;
            while let Some(locator) = fields.peek().and_then(|t| BlockLocator::parse(t)) {
                fields.next();
                blocks.push((stream_size, locator.clone()));
                stream_size = stream_size
                    .checked_add(locator.size)
                    .ok_or_else(|| ParseError::malformed(line_no, "stream size overflows"))?;
            }

            let dir = tree
                .root_mut()
                .ensure_dir(&stream)
                .map_err(|e| ParseError::malformed(line_no, e.to_string()))?;

            for token in fields {
                let (offset, length, name) = parse_file_token(token, line_no)?;
                let end = offset
                    .checked_add(length)
                    .filter(|end| *end <= stream_size)
                    .ok_or_else(|| {
                        ParseError::malformed(
                            line_no,
                            format!("{}:{} is beyond the stream's {} bytes", offset, length, stream_size),
                        )
                    })?;

                if name == "." && length == 0 {
                    trace!("Directory placeholder on line {}", line_no);
                    continue;
                }
                self.check_name(&name, line_no)?;

                let segments = map_range(&blocks, offset, end);
                match dir.child_mut(&name) {
                    Some(TreeNode::File(file)) => file.extend_segments(segments),
                    Some(TreeNode::Directory(_)) => {
                        return Err(ParseError::malformed(
                            line_no,
                            format!("{:?} is both a file and a directory", name),
                        ));
                    }
                    None => dir.push(TreeNode::File(FileNode::new(name, segments))),
                }
            }
        }

        debug!(
            "Parsed {} streams: {} files, {} bytes",
            streams,
            tree.file_count(),
            tree.total_size()
        );
        Ok(tree)
    }

    fn check_name(&self, name: &str, line_no: usize) -> Result<(), ParseError> {
        if name.contains(path::SEPARATOR) {
            return Err(ParseError::malformed(
                line_no,
                format!("file name {:?} contains '/'", name),
            ));
        }
        match validate(name) {
            Ok(()) => Ok(()),
            Err(NameError::Whitespace) if !self.strict_names => Ok(()),
            Err(e) => Err(ParseError::malformed(
                line_no,
                format!("file name {:?}: {}", name, e),
            )),
        }
    }
}

/// Decode a stream name into directory segments below the root
///
/// Segments with leading or trailing whitespace are rejected only when
/// `strict` is set, as for file names.
fn parse_stream_name(token: &str, line_no: usize, strict: bool) -> Result<Vec<String>, ParseError> {
    let name = unescape(token).map_err(|e| ParseError::malformed(line_no, e))?;
    if name == "." {
        return Ok(Vec::new());
    }
    let rest = name.strip_prefix("./").ok_or_else(|| {
        ParseError::malformed(line_no, format!("stream name {:?} does not start with '.'", name))
    })?;
    rest.split(path::SEPARATOR)
        .map(|segment| match validate(segment) {
            Ok(()) => Ok(segment.to_string()),
            Err(NameError::Whitespace) if !strict => Ok(segment.to_string()),
            Err(e) => Err(ParseError::malformed(
                line_no,
                format!("stream name {:?}: {}", name, e),
            )),
        })
        .collect()
}

/// Split an `offset:length:name` token
fn parse_file_token(token: &str, line_no: usize) -> Result<(u64, u64, String), ParseError> {
    let malformed = || ParseError::malformed(line_no, format!("bad file token {:?}", token));

    let mut parts = token.splitn(3, ':');
    let offset = parse_decimal(parts.next()).ok_or_else(malformed)?;
    let length = parse_decimal(parts.next()).ok_or_else(malformed)?;
    let raw_name = parts.next().ok_or_else(malformed)?;
    let name = unescape(raw_name).map_err(|e| ParseError::malformed(line_no, e))?;
    Ok((offset, length, name))
}

fn parse_decimal(field: Option<&str>) -> Option<u64> {
    let field = field?;
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    field.parse().ok()
}

/// Map the stream range `[start, end)` onto per-block segments
///
/// `blocks` is ordered by stream offset, so the first block that can
/// overlap is found by binary search.
fn map_range(blocks: &[(u64, BlockLocator)], start: u64, end: u64) -> Vec<Segment> {
    let first = blocks.partition_point(|(block_start, locator)| block_start + locator.size <= start);
    blocks[first..]
        .iter()
        .take_while(|(block_start, _)| *block_start < end)
        .filter_map(|(block_start, locator)| {
            let block_end = block_start + locator.size;
            let from = start.max(*block_start);
            let to = end.min(block_end);
            (from < to).then(|| Segment::new(locator.clone(), from - block_start, to - from))
        })
        .collect()
}

/// Counts cached with each version
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestStats {
    /// Number of files
    pub file_count: usize,
    /// Sum of file sizes in bytes
    pub total_size_bytes: u64,
}

impl ManifestStats {
    /// Stats of an already parsed tree
    pub fn of(tree: &VirtualFileTree) -> Self {
        Self {
            file_count: tree.file_count(),
            total_size_bytes: tree.total_size(),
        }
    }

    /// Parse `text` and compute its stats
    pub fn from_text(text: &str) -> Result<Self, ParseError> {
        parse(text).map(|tree| Self::of(&tree))
    }
}

/// Every block locator in the manifest, in order, duplicates included
///
/// Only the stream name and locator run of each line are inspected; file
/// tokens are not parsed.
pub fn block_locators(text: &str) -> Result<Vec<BlockLocator>, ParseError> {
    let mut out = Vec::new();
    for (idx, line) in text.split('\n').enumerate() {
        let mut fields = line.split_ascii_whitespace();
        let Some(stream_token) = fields.next() else {
            continue;
        };
        parse_stream_name(stream_token, idx + 1, false)?;
        out.extend(fields.map_while(BlockLocator::parse));
    }
    Ok(out)
}
