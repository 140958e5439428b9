//! Property-based testing for colman
//!
//! Uses proptest to check the manifest laws across randomly built trees:
//! parsing a serialized tree gives the same tree back, serialization is
//! idempotent, and name validation classifies bad names consistently.

use ::colman::*;
use proptest::prelude::*;

/// Blocks every generated tree draws its segments from
const BLOCKS: &[&str] = &[
    "37b51d194a7513e45b56f6524f2d51f2+3",
    "acbd18db4cc2f85cedef654fccc4a4d8+4",
    "73feffa4b7f6bb68e44cf984c85f6e88+10+K@zzzzz",
    "0cc175b9c0f1b6a831c399e269772661+1",
];

/// Structural edits used to build random trees
#[derive(Debug, Clone)]
pub enum TreeOperation {
    AddFile { path: String, segments: Vec<(usize, u64, u64)> },
    AddDirectory { path: String },
    Move { from: String, to: String },
    Remove { path: String },
}

/// Names that pass validation, including ones that need escaping
fn name_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z]{1,6}",
        "[a-z0-9_]([a-z0-9 _.&\\\\-]{0,6}[a-z0-9_])?",
        "(é|❤️|⛵️|файл)[a-z]{0,3}",
    ]
}

/// Paths one to three segments deep, over a small alphabet so that
/// operations collide often
fn path_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop_oneof![3 => "[a-c]".prop_map(String::from), 1 => name_strategy()],
        1..=3,
    )
    .prop_map(|segments| segments.join("/"))
}

/// Segments as (block index, offset, length) with length at least 1
fn segments_strategy() -> impl Strategy<Value = Vec<(usize, u64, u64)>> {
    prop::collection::vec(
        (0..BLOCKS.len()).prop_flat_map(|block| {
            let size = block_size(block);
            (Just(block), 0..size).prop_flat_map(move |(block, offset)| {
                (Just(block), Just(offset), 1..=size - offset)
            })
        }),
        0..4,
    )
}

fn tree_operation_strategy() -> impl Strategy<Value = TreeOperation> {
    prop_oneof![
        4 => (path_strategy(), segments_strategy())
            .prop_map(|(path, segments)| TreeOperation::AddFile { path, segments }),
        2 => path_strategy().prop_map(|path| TreeOperation::AddDirectory { path }),
        1 => (path_strategy(), path_strategy()).prop_map(|(from, to)| TreeOperation::Move { from, to }),
        1 => path_strategy().prop_map(|path| TreeOperation::Remove { path }),
    ]
}

fn block_size(index: usize) -> u64 {
    BlockLocator::parse(BLOCKS[index]).map(|b| b.size).unwrap_or(1)
}

/// Apply operations, skipping the ones the tree rejects
fn build_tree(operations: &[TreeOperation]) -> VirtualFileTree {
    let mut tree = VirtualFileTree::new();
    for op in operations {
        let next = match op {
            TreeOperation::AddFile { path, segments } => {
                let segments = segments
                    .iter()
                    .map(|(block, offset, length)| {
                        let locator = BlockLocator::parse(BLOCKS[*block]).unwrap();
                        Segment::new(locator, *offset, *length)
                    })
                    .collect();
                tree.add_file(path, segments)
            }
            TreeOperation::AddDirectory { path } => tree.add_directory(path),
            TreeOperation::Move { from, to } => tree.move_path(from, to),
            TreeOperation::Remove { path } => tree.remove(path),
        };
        if let Ok(next) = next {
            tree = next;
        }
    }
    tree
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// parse(serialize(T)) == T
    #[test]
    fn serialize_parse_round_trip(
        operations in prop::collection::vec(tree_operation_strategy(), 0..40)
    ) {
        let tree = build_tree(&operations);
        let text = serialize(&tree);
        let reparsed = parse(&text).unwrap();

        prop_assert_eq!(&reparsed, &tree, "manifest was:\n{}", text);
        prop_assert_eq!(reparsed.file_count(), tree.file_count());
        prop_assert_eq!(reparsed.total_size(), tree.total_size());
    }

    /// serialize(parse(serialize(T))) == serialize(T), byte for byte
    #[test]
    fn serialization_is_idempotent(
        operations in prop::collection::vec(tree_operation_strategy(), 0..40)
    ) {
        let text = serialize(&build_tree(&operations));
        let again = serialize(&parse(&text).unwrap());
        prop_assert_eq!(again, text.clone());
        prop_assert!(text.is_ascii());
        prop_assert!(text.is_empty() || text.ends_with('\n'));
    }

    /// Stats computed from text agree with the tree
    #[test]
    fn stats_match_tree(
        operations in prop::collection::vec(tree_operation_strategy(), 0..30)
    ) {
        let tree = build_tree(&operations);
        let stats = ManifestStats::from_text(&serialize(&tree)).unwrap();
        prop_assert_eq!(stats, ManifestStats::of(&tree));
    }

    /// A failed edit never changes the input tree
    #[test]
    fn failed_edits_leave_tree_untouched(
        operations in prop::collection::vec(tree_operation_strategy(), 1..30),
        from in path_strategy(),
        to in path_strategy(),
    ) {
        let tree = build_tree(&operations);
        let before = serialize(&tree);
        if let Err(e) = tree.move_path(&from, &to) {
            prop_assert_eq!(serialize(&tree), before.clone(), "move failed with {}", e);
        }
        if tree.remove(&from).is_err() {
            prop_assert!(!tree.contains(&from) || from.is_empty());
        }
    }

    /// Escaping is reversible for any valid name
    #[test]
    fn escape_round_trip(name in name_strategy()) {
        let escaped = escape::escape_name(&name);
        prop_assert!(!escaped.contains(' '));
        prop_assert!(!escaped.contains('/'));
        prop_assert_eq!(escape::unescape(&escaped).unwrap(), name);
    }

    /// Names with outer whitespace are always rejected as whitespace
    #[test]
    fn outer_whitespace_is_rejected(
        core in "[a-z]{1,5}",
        leading in "[ \t]{0,2}",
        trailing in "[ \t]{0,2}",
    ) {
        prop_assume!(!leading.is_empty() || !trailing.is_empty());
        let name = format!("{}{}{}", leading, core, trailing);
        prop_assert_eq!(path::validate(&name), Err(NameError::Whitespace));
    }

    /// Any empty segment in a path is rejected
    #[test]
    fn empty_segments_are_rejected(
        segments in prop::collection::vec("[a-z]{1,4}", 1..4),
        gap in 0usize..4,
    ) {
        let mut parts: Vec<String> = segments;
        let at = gap.min(parts.len());
        parts.insert(at, String::new());
        let joined = parts.join("/");
        prop_assert_eq!(path::validate_path(&joined), Err(NameError::EmptySegment));
    }

    /// Valid names are accepted and survive validate_path unchanged
    #[test]
    fn valid_paths_are_accepted(
        segments in prop::collection::vec(name_strategy(), 1..4)
    ) {
        let joined = segments.join("/");
        prop_assert_eq!(path::validate_path(&joined), Ok(segments));
    }
}

#[cfg(test)]
mod concrete_cases {
    use super::*;

    #[test]
    fn test_name_validation_cases() {
        assert_eq!(path::validate("."), Err(NameError::ReservedName));
        assert_eq!(path::validate(".."), Err(NameError::ReservedName));
        assert_eq!(path::validate(""), Err(NameError::Required));
        assert_eq!(path::validate(" foo"), Err(NameError::Whitespace));
        assert_eq!(path::validate("foo "), Err(NameError::Whitespace));
        assert_eq!(path::validate(" "), Err(NameError::Whitespace));
        assert_eq!(path::validate_path("//foo"), Err(NameError::EmptySegment));
    }

    #[test]
    fn test_generated_blocks_are_valid() {
        for (i, block) in BLOCKS.iter().enumerate() {
            assert!(BlockLocator::is_locator(block));
            assert!(block_size(i) > 0);
        }
    }
}
