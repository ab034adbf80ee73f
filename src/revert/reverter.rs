use snafu::{Snafu, ensure};

use crate::changes::{ChangeError, ChangeId, ChangeSetId, StructuralChange};
use crate::gateway::{Gateway, GatewayError};
use crate::log::{Chain, ChangeLog, LogError};
use crate::revert::{ChainRevert, ChangeReverter, ChangeSetReverter, EntryHistoryReverter};
use crate::tree::EntryTree;

pub trait ReverterTrait {
    /// Confirmation message to show before reverting, if any.
    fn ask_user_for_proceed(&self) -> Option<String>;
    fn check_can_revert(
        &self,
        tree: &EntryTree,
        gateway: &mut dyn Gateway,
    ) -> Result<Vec<String>, ReverterError>;
    fn do_revert(
        &self,
        tree: &mut EntryTree,
        gateway: &mut dyn Gateway,
    ) -> Result<Vec<StructuralChange>, ReverterError>;
    /// Label for the change set that records the revert.
    fn format_label(&self) -> String;

    // Checks, then applies only if the check reported nothing
    fn revert(
        &self,
        tree: &mut EntryTree,
        gateway: &mut dyn Gateway,
    ) -> Result<Vec<StructuralChange>, ReverterError> {
        let errors = self.check_can_revert(tree, gateway)?;
        ensure!(errors.is_empty(), RejectedSnafu { errors });
        self.do_revert(tree, gateway)
    }
}

/// What a revert request undoes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevertTarget {
    Change(ChangeId),
    ChangeSet(ChangeSetId),
    /// Every change made to the entry at `path` since `since`, inclusive.
    Entry { path: String, since: ChangeSetId },
}

#[derive(Debug, Clone)]
pub enum Reverter<'a> {
    Change(ChangeReverter<'a>),
    ChangeSet(ChangeSetReverter<'a>),
    EntryHistory(EntryHistoryReverter<'a>),
}

impl<'a> Reverter<'a> {
    pub fn new(
        log: &'a ChangeLog,
        tree: &EntryTree,
        target: &RevertTarget,
    ) -> Result<Self, ReverterError> {
        let reverter = match target {
            RevertTarget::Change(id) => Reverter::Change(ChangeReverter::new(log, *id)?),
            RevertTarget::ChangeSet(id) => Reverter::ChangeSet(ChangeSetReverter::new(log, *id)?),
            RevertTarget::Entry { path, since } => {
                Reverter::EntryHistory(EntryHistoryReverter::new(log, tree, path, *since)?)
            }
        };
        Ok(reverter)
    }

    pub fn with_writable_check(self, enabled: bool) -> Self {
        match self {
            Reverter::Change(reverter) => Reverter::Change(reverter.with_writable_check(enabled)),
            Reverter::ChangeSet(reverter) => {
                Reverter::ChangeSet(reverter.with_writable_check(enabled))
            }
            Reverter::EntryHistory(reverter) => {
                Reverter::EntryHistory(reverter.with_writable_check(enabled))
            }
        }
    }

    pub fn chain(&self) -> &Chain<'a> {
        self.core().chain()
    }

    fn core(&self) -> &ChainRevert<'a> {
        match self {
            Reverter::Change(reverter) => reverter.core(),
            Reverter::ChangeSet(reverter) => reverter.core(),
            Reverter::EntryHistory(reverter) => reverter.core(),
        }
    }
}

impl ReverterTrait for Reverter<'_> {
    fn ask_user_for_proceed(&self) -> Option<String> {
        match self {
            Reverter::Change(reverter) => reverter.ask_user_for_proceed(),
            Reverter::ChangeSet(reverter) => reverter.ask_user_for_proceed(),
            Reverter::EntryHistory(reverter) => reverter.ask_user_for_proceed(),
        }
    }

    fn check_can_revert(
        &self,
        tree: &EntryTree,
        gateway: &mut dyn Gateway,
    ) -> Result<Vec<String>, ReverterError> {
        match self {
            Reverter::Change(reverter) => reverter.check_can_revert(tree, gateway),
            Reverter::ChangeSet(reverter) => reverter.check_can_revert(tree, gateway),
            Reverter::EntryHistory(reverter) => reverter.check_can_revert(tree, gateway),
        }
    }

    fn do_revert(
        &self,
        tree: &mut EntryTree,
        gateway: &mut dyn Gateway,
    ) -> Result<Vec<StructuralChange>, ReverterError> {
        match self {
            Reverter::Change(reverter) => reverter.do_revert(tree, gateway),
            Reverter::ChangeSet(reverter) => reverter.do_revert(tree, gateway),
            Reverter::EntryHistory(reverter) => reverter.do_revert(tree, gateway),
        }
    }

    fn format_label(&self) -> String {
        match self {
            Reverter::Change(reverter) => reverter.format_label(),
            Reverter::ChangeSet(reverter) => reverter.format_label(),
            Reverter::EntryHistory(reverter) => reverter.format_label(),
        }
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ReverterError {
    #[snafu(display("Cannot find the changes to revert"))]
    TargetLookupError { source: LogError },
    #[snafu(display("'{path}' does not exist"))]
    UnknownPathError { path: String },
    #[snafu(display("Failed to list the files under '{path}'"))]
    FileListingError { path: String, source: GatewayError },
    #[snafu(display("Failed to revert change {change_id} on storage"))]
    AdapterIoError {
        change_id: ChangeId,
        applied: Vec<StructuralChange>,
        source: GatewayError,
    },
    #[snafu(display("Failed to revert change {change_id}"))]
    ApplyConflictError {
        change_id: ChangeId,
        applied: Vec<StructuralChange>,
        source: ChangeError,
    },
    #[snafu(display("Cannot revert: {}", errors.join(", ")))]
    RejectedError { errors: Vec<String> },
}

impl ReverterError {
    /// Inverse changes that reached the tree before the revert failed.
    pub fn applied(&self) -> &[StructuralChange] {
        match self {
            ReverterError::AdapterIoError { applied, .. }
            | ReverterError::ApplyConflictError { applied, .. } => applied,
            _ => &[],
        }
    }
}
