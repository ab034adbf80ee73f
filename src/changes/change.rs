use std::time::SystemTime;

use bincode::{Decode, Encode};
use derive_more::{Display, From};

use crate::changes::StructuralChange;
use crate::ext::SystemTimeExt;
use crate::tree::IdPath;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Display, From, Encode, Decode,
)]
pub struct ChangeId(u64);

impl ChangeId {
    pub fn value(&self) -> u64 {
        self.0
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Display, From, Encode, Decode,
)]
pub struct ChangeSetId(u64);

impl ChangeSetId {
    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Milliseconds since the Unix epoch.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Display, From, Encode, Decode,
)]
pub struct Timestamp(u64);

impl Timestamp {
    pub fn now() -> Self {
        SystemTime::now().to_timestamp()
    }

    pub fn millis(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub enum ChangeKind {
    Structural(StructuralChange),
    /// Named marker in the history. Touches nothing.
    PutLabel { label: String },
}

/// One recorded mutation.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct Change {
    id: ChangeId,
    timestamp: Timestamp,
    kind: ChangeKind,
}

impl Change {
    pub fn new(id: ChangeId, timestamp: Timestamp, kind: ChangeKind) -> Self {
        Self {
            id,
            timestamp,
            kind,
        }
    }

    pub fn id(&self) -> ChangeId {
        self.id
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn kind(&self) -> &ChangeKind {
        &self.kind
    }

    pub fn name(&self) -> Option<&str> {
        match &self.kind {
            ChangeKind::PutLabel { label } => Some(label),
            ChangeKind::Structural(_) => None,
        }
    }

    pub fn as_structural(&self) -> Option<&StructuralChange> {
        match &self.kind {
            ChangeKind::Structural(change) => Some(change),
            ChangeKind::PutLabel { .. } => None,
        }
    }

    pub fn affected_id_paths(&self) -> Vec<&IdPath> {
        self.as_structural()
            .map(StructuralChange::affected_id_paths)
            .unwrap_or_default()
    }

    pub fn affects_same_as(&self, others: &[&Change]) -> bool {
        self.as_structural()
            .is_some_and(|change| change.affects_same_as(others))
    }
}
