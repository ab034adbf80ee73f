use crate::changes::{Change, ChangeId, StructuralChange};

/// Changes linked to a revert target through shared affected paths.
///
/// Computed by [`crate::log::ChangeLog`] for a single revert and dropped with
/// it; never stored.
#[derive(Debug, Clone)]
pub struct Chain<'a> {
    members: Vec<&'a Change>,
}

impl<'a> Chain<'a> {
    pub(crate) fn new(mut members: Vec<&'a Change>) -> Self {
        members.sort_by_key(|change| change.id());
        Self { members }
    }

    pub fn members(&self) -> &[&'a Change] {
        &self.members
    }

    pub fn ids(&self) -> Vec<ChangeId> {
        self.members.iter().map(|change| change.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, id: ChangeId) -> bool {
        self.members.iter().any(|change| change.id() == id)
    }

    /// Whether `change` shares an affected path with a member of the chain.
    pub fn is_touched_by(&self, change: &StructuralChange) -> bool {
        change.affects_same_as(&self.members)
    }
}
