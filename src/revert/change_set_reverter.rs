use snafu::ResultExt;
use tracing::debug;

use crate::changes::{ChangeSet, ChangeSetId, StructuralChange};
use crate::gateway::Gateway;
use crate::log::{ChangeLog, LogError};
use crate::revert::{ChainRevert, ReverterError, ReverterTrait, TargetLookupSnafu};
use crate::tree::EntryTree;

/// Reverts every change of one change set.
#[derive(Debug, Clone)]
pub struct ChangeSetReverter<'a> {
    core: ChainRevert<'a>,
}

impl<'a> ChangeSetReverter<'a> {
    pub fn new(log: &'a ChangeLog, id: ChangeSetId) -> Result<Self, ReverterError> {
        let chain = log.get_change_set_chain(id).context(TargetLookupSnafu)?;
        let change_set = log
            .change_set(id)
            .ok_or(LogError::ChangeSetNotFoundError { id })
            .context(TargetLookupSnafu)?;
        debug!("Change set {id} pulls {} changes into the revert", chain.len());

        Ok(Self {
            core: ChainRevert::new(log, change_set, chain),
        })
    }

    pub fn with_writable_check(self, enabled: bool) -> Self {
        Self {
            core: self.core.with_writable_check(enabled),
        }
    }

    pub fn core(&self) -> &ChainRevert<'a> {
        &self.core
    }

    pub fn change_set(&self) -> &'a ChangeSet {
        self.core.boundary()
    }
}

impl ReverterTrait for ChangeSetReverter<'_> {
    fn ask_user_for_proceed(&self) -> Option<String> {
        self.core.explain_consequences()
    }

    fn check_can_revert(
        &self,
        tree: &EntryTree,
        gateway: &mut dyn Gateway,
    ) -> Result<Vec<String>, ReverterError> {
        self.core.check_can_revert(tree, gateway)
    }

    fn do_revert(
        &self,
        tree: &mut EntryTree,
        gateway: &mut dyn Gateway,
    ) -> Result<Vec<StructuralChange>, ReverterError> {
        self.core.do_revert(tree, gateway)
    }

    fn format_label(&self) -> String {
        let change_set = self.change_set();
        match change_set.label() {
            Some(label) => format!("Revert '{label}'"),
            None => format!("Revert change made at {}", change_set.timestamp()),
        }
    }
}
