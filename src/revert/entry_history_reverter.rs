use snafu::{OptionExt, ResultExt};
use tracing::debug;

use crate::changes::{ChangeSetId, StructuralChange};
use crate::gateway::Gateway;
use crate::log::{ChangeLog, LogError};
use crate::revert::{
    ChainRevert, ReverterError, ReverterTrait, TargetLookupSnafu, UnknownPathSnafu,
};
use crate::tree::EntryTree;

/// Brings one entry back to how it was before a given change set, undoing
/// whatever depends on the changes made to it since.
#[derive(Debug, Clone)]
pub struct EntryHistoryReverter<'a> {
    core: ChainRevert<'a>,
    path: String,
}

impl<'a> EntryHistoryReverter<'a> {
    pub fn new(
        log: &'a ChangeLog,
        tree: &EntryTree,
        path: &str,
        since: ChangeSetId,
    ) -> Result<Self, ReverterError> {
        let id_path = tree
            .find_by_path(path)
            .and_then(|entry| tree.id_path_of(entry.id()))
            .context(UnknownPathSnafu { path })?;
        let chain = log
            .get_entry_chain(&id_path, since)
            .context(TargetLookupSnafu)?;
        let boundary = log
            .change_set(since)
            .ok_or(LogError::ChangeSetNotFoundError { id: since })
            .context(TargetLookupSnafu)?;
        debug!("History of '{path}' pulls {} changes into the revert", chain.len());

        Ok(Self {
            core: ChainRevert::new(log, boundary, chain),
            path: path.to_string(),
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

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl ReverterTrait for EntryHistoryReverter<'_> {
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
        let boundary = self.core.boundary();
        match boundary.label() {
            Some(label) => format!("Revert '{}' to its state before '{label}'", self.path),
            None => format!(
                "Revert '{}' to its state before {}",
                self.path,
                boundary.timestamp()
            ),
        }
    }
}
