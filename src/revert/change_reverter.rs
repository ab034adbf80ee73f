use snafu::ResultExt;
use tracing::debug;

use crate::changes::{Change, ChangeId, ChangeSet, StructuralChange};
use crate::gateway::Gateway;
use crate::log::{ChangeLog, LogError};
use crate::revert::{ChainRevert, ReverterError, ReverterTrait, TargetLookupSnafu};
use crate::tree::EntryTree;

/// Reverts a single change together with everything that depends on it.
#[derive(Debug, Clone)]
pub struct ChangeReverter<'a> {
    core: ChainRevert<'a>,
    change: &'a Change,
}

impl<'a> ChangeReverter<'a> {
    pub fn new(log: &'a ChangeLog, id: ChangeId) -> Result<Self, ReverterError> {
        let chain = log.get_chain(id).context(TargetLookupSnafu)?;
        let change_set = log
            .change_set_of(id)
            .ok_or(LogError::ChangeNotFoundError { id })
            .context(TargetLookupSnafu)?;
        let change = change_set
            .change(id)
            .ok_or(LogError::ChangeNotFoundError { id })
            .context(TargetLookupSnafu)?;
        debug!("Change {id} pulls {} changes into the revert", chain.len());

        Ok(Self {
            core: ChainRevert::new(log, change_set, chain),
            change,
        })
    }

    pub fn with_writable_check(self, enabled: bool) -> Self {
        Self {
            core: self.core.with_writable_check(enabled),
            ..self
        }
    }

    pub fn core(&self) -> &ChainRevert<'a> {
        &self.core
    }

    pub fn change(&self) -> &'a Change {
        self.change
    }

    fn change_set(&self) -> &'a ChangeSet {
        self.core.boundary()
    }
}

impl ReverterTrait for ChangeReverter<'_> {
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
        match self.change.name().or(self.change_set().label()) {
            Some(name) => format!("Revert '{name}'"),
            None => format!("Revert change made at {}", self.change.timestamp()),
        }
    }
}
