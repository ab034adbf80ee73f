use bincode::{Decode, Encode};
use tracing::debug;

use crate::changes::{Change, ChangeId, ChangeSetId, StructuralChange, Timestamp};
use crate::visitor::{ChangeVisitor, VisitFlow};

/// Changes recorded together for one user action.
///
/// Only the label may change once the set is in the log.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct ChangeSet {
    id: ChangeSetId,
    label: Option<String>,
    timestamp: Timestamp,
    changes: Vec<Change>,
}

impl ChangeSet {
    pub(crate) fn new(
        id: ChangeSetId,
        label: Option<String>,
        timestamp: Timestamp,
        changes: Vec<Change>,
    ) -> Self {
        Self {
            id,
            label,
            timestamp,
            changes,
        }
    }

    pub fn id(&self) -> ChangeSetId {
        self.id
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub(crate) fn set_label(&mut self, label: Option<String>) {
        self.label = label;
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    pub fn change(&self, id: ChangeId) -> Option<&Change> {
        self.changes.iter().find(|change| change.id() == id)
    }

    pub fn contains(&self, id: ChangeId) -> bool {
        self.change(id).is_some()
    }

    pub fn first_change_id(&self) -> Option<ChangeId> {
        self.changes.first().map(Change::id)
    }

    pub fn last_change_id(&self) -> Option<ChangeId> {
        self.changes.last().map(Change::id)
    }

    /// Structural changes in recording order.
    pub fn structural_changes(
        &self,
    ) -> impl DoubleEndedIterator<Item = (ChangeId, &StructuralChange)> {
        self.changes
            .iter()
            .filter_map(|change| change.as_structural().map(|s| (change.id(), s)))
    }

    pub fn affects_same_as(&self, others: &[&Change]) -> bool {
        self.changes
            .iter()
            .any(|change| change.affects_same_as(others))
    }

    /// Walks this set for a visitor: `begin`, every structural change newest
    /// first, then `end`. Returns [`VisitFlow::Stop`] as soon as the visitor
    /// asks for it.
    pub fn accept<V>(&self, visitor: &mut V) -> Result<VisitFlow, V::Error>
    where
        V: ChangeVisitor + ?Sized,
    {
        if visitor.begin(self)? == VisitFlow::Stop {
            debug!("Visitor stopped at the start of change set {}", self.id);
            return Ok(VisitFlow::Stop);
        }
        for (id, change) in self.structural_changes().rev() {
            if visitor.visit(id, change)? == VisitFlow::Stop {
                debug!("Visitor stopped at change {id} of change set {}", self.id);
                return Ok(VisitFlow::Stop);
            }
        }
        visitor.end(self)
    }
}
