//! Virtual file tree to canonical manifest text
//!
//! The inverse of [`crate::parser`]. Directories are visited depth-first in
//! pre-order and each one that holds files, or is empty, becomes one stream
//! line. Within a line the files keep their tree order and the distinct
//! blocks they reference are listed once, in order of first use; file
//! tokens are recomputed from the segments against that block list.
//!
//! Output is canonical: serializing a parsed canonical manifest reproduces
//! it byte for byte.

use crate::escape::{escape_name, escape_stream_name};
use crate::locator::{BlockLocator, Segment};
use crate::tree::{Directory, FileNode, VirtualFileTree};
use std::collections::HashMap;
use tracing::debug;

/// Escaped name of the empty-directory placeholder file (`.`)
const DIR_PLACEHOLDER: &str = "\\056";

/// Serialize a tree into manifest text
pub fn serialize(tree: &VirtualFileTree) -> String {
    let mut out = String::new();
    let mut streams = 0;
    write_directory(tree.root(), ".", &mut out, &mut streams);
    debug!("Serialized {} streams ({} bytes of manifest)", streams, out.len());
    out
}

fn write_directory(dir: &Directory, stream_name: &str, out: &mut String, streams: &mut usize) {
    let files: Vec<&FileNode> = dir.files().collect();

    if !files.is_empty() {
        *streams += write_files(stream_name, &files, out);
    } else if dir.is_empty() && stream_name != "." {
        out.push_str(&escape_stream_name(stream_name));
        out.push(' ');
        out.push_str(&BlockLocator::empty().to_string());
        out.push_str(" 0:0:");
        out.push_str(DIR_PLACEHOLDER);
        out.push('\n');
        *streams += 1;
    }

    for sub in dir.subdirectories() {
        let child_stream = format!("{}/{}", stream_name, sub.name());
        write_directory(sub, &child_stream, out, streams);
    }
}

/// One stream line being assembled
#[derive(Default)]
struct StreamLine<'a> {
    blocks: Vec<&'a BlockLocator>,
    /// Stream offset of each block in `blocks`
    starts: HashMap<&'a BlockLocator, u64>,
    size: u64,
    tokens: Vec<String>,
}

impl<'a> StreamLine<'a> {
    /// Stream offset of `locator`, adding it to the line on first use
    ///
    /// Returns `None` when the block would push the stream past `u64::MAX`.
    fn block_start(&mut self, locator: &'a BlockLocator) -> Option<u64> {
        if let Some(start) = self.starts.get(locator) {
            return Some(*start);
        }
        let start = self.size;
        self.size = start.checked_add(locator.size)?;
        self.blocks.push(locator);
        self.starts.insert(locator, start);
        Some(start)
    }

    fn write(self, stream_name: &str, out: &mut String) {
        out.push_str(&escape_stream_name(stream_name));
        if self.blocks.is_empty() {
            out.push(' ');
            out.push_str(&BlockLocator::empty().to_string());
        }
        for block in &self.blocks {
            out.push(' ');
            out.push_str(&block.to_string());
        }
        for token in &self.tokens {
            out.push(' ');
            out.push_str(token);
        }
        out.push('\n');
    }
}

/// Write the files directly inside a directory; returns the lines written
///
/// The files share one line unless their blocks add up to more than a
/// stream can address. The line is then closed and the remaining segments
/// continue on a new line for the same stream, which the parser joins back
/// onto the same files.
fn write_files(stream_name: &str, files: &[&FileNode], out: &mut String) -> usize {
    let mut line = StreamLine::default();
    let mut lines = 1;

    for file in files {
        let name = escape_name(file.name());
        if file.segments().is_empty() {
            line.tokens.push(format!("0:0:{}", name));
            continue;
        }

        // Two consecutive segments are written as one range only when the
        // first ends its block and the second starts the block placed right
        // after it, so that re-parsing splits the range back the same way.
        let mut pending: Option<(u64, u64)> = None;
        let mut previous: Option<&Segment> = None;
        for segment in file.segments() {
            let start = match line.block_start(&segment.locator) {
                Some(start) => start,
                None => {
                    if let Some((pos, len)) = pending.take() {
                        line.tokens.push(format!("{}:{}:{}", pos, len, name));
                    }
                    std::mem::take(&mut line).write(stream_name, out);
                    lines += 1;
                    previous = None;
                    // A single block always fits an empty line
                    line.block_start(&segment.locator).unwrap_or_default()
                }
            };
            let pos = start + segment.offset;

            let joins_pending = match (previous, pending) {
                (Some(prev), Some((from, len))) => {
                    prev.ends_block() && segment.offset == 0 && from + len == pos
                }
                _ => false,
            };
            if joins_pending {
                if let Some((_, len)) = pending.as_mut() {
                    *len += segment.length;
                }
            } else if let Some((from, len)) = pending.replace((pos, segment.length)) {
                line.tokens.push(format!("{}:{}:{}", from, len, name));
            }
            previous = Some(segment);
        }
        if let Some((pos, len)) = pending {
            line.tokens.push(format!("{}:{}:{}", pos, len, name));
        }
    }

    line.write(stream_name, out);
    lines
}
