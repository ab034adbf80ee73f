use std::fmt;

use bincode::{Decode, Encode};

use crate::tree::EntryId;

/// A path from the root to an entry, made of entry ids instead of names.
///
/// Renames never invalidate an `IdPath`. Moves and deletes do: the path then
/// stops resolving in trees where the entry is no longer below the same
/// ancestors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Encode, Decode)]
pub struct IdPath {
    ids: Vec<EntryId>,
}

impl IdPath {
    pub fn new(ids: Vec<EntryId>) -> Self {
        Self { ids }
    }

    pub fn root() -> Self {
        Self {
            ids: vec![crate::tree::ROOT_ENTRY_ID],
        }
    }

    pub fn child(&self, id: EntryId) -> Self {
        let mut ids = self.ids.clone();
        ids.push(id);
        Self { ids }
    }

    pub fn parent(&self) -> Option<IdPath> {
        if self.ids.len() < 2 {
            return None;
        }
        Some(Self {
            ids: self.ids[..self.ids.len() - 1].to_vec(),
        })
    }

    /// Id of the entry this path points at.
    pub fn id(&self) -> Option<EntryId> {
        self.ids.last().copied()
    }

    pub fn ids(&self) -> &[EntryId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: EntryId) -> bool {
        self.ids.contains(&id)
    }

    pub fn starts_with(&self, prefix: &IdPath) -> bool {
        self.ids.starts_with(&prefix.ids)
    }

    /// Two paths overlap when one of them lies on the other: a change to a
    /// directory and a change to anything beneath it touch the same subtree.
    pub fn overlaps(&self, other: &IdPath) -> bool {
        self.starts_with(other) || other.starts_with(self)
    }
}

impl fmt::Display for IdPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for id in &self.ids {
            if !first {
                f.write_str("/")?;
            }
            write!(f, "{id}")?;
            first = false;
        }
        Ok(())
    }
}
