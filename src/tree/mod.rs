//! Addressable snapshot of a virtual file hierarchy.
//!
//! Entries are stored in an id-keyed arena; an [`IdPath`] names an entry by
//! the ids of its ancestors so it keeps resolving across renames.

mod entry;
mod entry_tree;
mod id_path;

pub use entry::{Content, Entry, EntryId, EntryKind, EntrySnapshot, ROOT_ENTRY_ID};
pub use entry_tree::{EntryTree, TreeError, join_path, split_path};
pub use id_path::IdPath;
