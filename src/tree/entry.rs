use bincode::{Decode, Encode};
use derive_more::{Display, From};

/// Identifier assigned to an entry when it is created. Never reused for a
/// different entry.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Display, From, Encode, Decode,
)]
pub struct EntryId(u64);

impl EntryId {
    pub fn value(&self) -> u64 {
        self.0
    }
}

pub const ROOT_ENTRY_ID: EntryId = EntryId(0);

/// Bytes stored in a file entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, From, Encode, Decode)]
pub struct Content(Vec<u8>);

impl Content {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Content {
    fn from(value: &str) -> Self {
        Content(value.as_bytes().to_vec())
    }
}

impl From<String> for Content {
    fn from(value: String) -> Self {
        Content(value.into_bytes())
    }
}

impl From<&[u8]> for Content {
    fn from(value: &[u8]) -> Self {
        Content(value.to_vec())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub enum EntryKind {
    Directory,
    File { content: Content },
}

impl EntryKind {
    pub fn file(content: impl Into<Content>) -> Self {
        EntryKind::File {
            content: content.into(),
        }
    }
}

/// A node of the entry tree. The tree owns every entry; parent and children
/// are stored as ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub(super) id: EntryId,
    pub(super) name: String,
    pub(super) parent: Option<EntryId>,
    pub(super) children: Vec<EntryId>,
    pub(super) kind: EntryKind,
}

impl Entry {
    pub fn id(&self) -> EntryId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<EntryId> {
        self.parent
    }

    pub fn children(&self) -> &[EntryId] {
        &self.children
    }

    pub fn kind(&self) -> &EntryKind {
        &self.kind
    }

    pub fn is_directory(&self) -> bool {
        matches!(self.kind, EntryKind::Directory)
    }

    pub fn content(&self) -> Option<&Content> {
        match &self.kind {
            EntryKind::File { content } => Some(content),
            EntryKind::Directory => None,
        }
    }
}

/// Detached copy of an entry and everything below it, ids included.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct EntrySnapshot {
    pub id: EntryId,
    pub name: String,
    pub kind: EntryKind,
    pub children: Vec<EntrySnapshot>,
}

impl EntrySnapshot {
    /// Visits the snapshot in pre-order, handing each node its parent's
    /// snapshot id (`None` for the snapshot root).
    pub fn walk<F>(&self, visit: &mut F)
    where
        F: FnMut(Option<EntryId>, &EntrySnapshot),
    {
        let mut stack = vec![(None, self)];
        while let Some((parent, node)) = stack.pop() {
            visit(parent, node);
            stack.extend(node.children.iter().rev().map(|child| (Some(node.id), child)));
        }
    }

    pub fn ids(&self) -> Vec<EntryId> {
        let mut ids = Vec::new();
        self.walk(&mut |_, node| ids.push(node.id));
        ids
    }
}
