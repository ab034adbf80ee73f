use std::collections::HashSet;
use std::convert::Infallible;

use snafu::ResultExt;
use tracing::{debug, info, warn};

use crate::changes::{ChangeId, ChangeSet, StructuralChange};
use crate::gateway::Gateway;
use crate::log::{Chain, ChangeLog};
use crate::revert::{FileListingSnafu, ReverterError};
use crate::tree::EntryTree;
use crate::visitor::{ChangeVisitor, RevertionVisitor, Selection, SelectiveVisitor, VisitFlow};

const DEPENDENT_CHANGES_WARNING: &str =
    "There are changes made after this one that depend on it. They will be reverted too.";
const READ_ONLY_ERROR: &str = "some files are read-only";

/// Check and apply machinery shared by every reverter: a chain, the change
/// set it starts at, and the log both are walked over.
#[derive(Debug, Clone)]
pub struct ChainRevert<'a> {
    log: &'a ChangeLog,
    boundary: &'a ChangeSet,
    chain: Chain<'a>,
    ensure_writable: bool,
}

impl<'a> ChainRevert<'a> {
    pub fn new(log: &'a ChangeLog, boundary: &'a ChangeSet, chain: Chain<'a>) -> Self {
        Self {
            log,
            boundary,
            chain,
            ensure_writable: true,
        }
    }

    /// Turns the read-only clearing step of the check phase on or off.
    pub fn with_writable_check(mut self, enabled: bool) -> Self {
        self.ensure_writable = enabled;
        self
    }

    pub fn chain(&self) -> &Chain<'a> {
        &self.chain
    }

    pub fn boundary(&self) -> &'a ChangeSet {
        self.boundary
    }

    /// A warning when change sets after the boundary depend on the chain.
    pub fn explain_consequences(&self) -> Option<String> {
        let mut visitor = ConsequencesVisitor {
            revert: self,
            warning: None,
        };
        self.log
            .accept(&mut visitor)
            .unwrap_or_else(|never| match never {});
        visitor.warning
    }

    /// Messages explaining why the chain cannot be reverted; empty when it
    /// can. Only a failing gateway makes this an error.
    pub fn check_can_revert(
        &self,
        tree: &EntryTree,
        gateway: &mut dyn Gateway,
    ) -> Result<Vec<String>, ReverterError> {
        info!("Checking whether {} changes can be reverted", self.chain.len());
        let mut errors = Vec::new();

        if self.ensure_writable {
            let files = self.files_to_make_writable(tree, &*gateway)?;
            debug!("Making {} files writable", files.len());
            if !gateway.ensure_files_are_writable(&files) {
                warn!("Some of {} files stay read-only", files.len());
                errors.push(READ_ONLY_ERROR.to_string());
            }
        }

        let mut visitor = SelectiveVisitor::new(
            CheckVisitor {
                tree: tree.clone(),
                errors: Vec::new(),
            },
            self,
        );
        self.log
            .accept(&mut visitor)
            .unwrap_or_else(|never| match never {});
        errors.extend(visitor.into_inner().errors);

        info!("Check finished with {} errors", errors.len());
        Ok(errors)
    }

    /// Undoes the chain on the live tree, newest change first. Returns the
    /// forward changes equivalent to what was undone.
    pub fn do_revert(
        &self,
        tree: &mut EntryTree,
        gateway: &mut dyn Gateway,
    ) -> Result<Vec<StructuralChange>, ReverterError> {
        info!("Reverting {} changes", self.chain.len());
        let mut visitor = SelectiveVisitor::new(RevertionVisitor::new(tree, gateway), self);
        self.log.accept(&mut visitor)?;

        let applied = visitor.into_inner().into_applied();
        info!("Reverted with {} inverse changes", applied.len());
        Ok(applied)
    }

    fn files_to_make_writable(
        &self,
        tree: &EntryTree,
        gateway: &dyn Gateway,
    ) -> Result<Vec<String>, ReverterError> {
        let mut visitor = SelectiveVisitor::new(
            WritableFilesVisitor {
                tree,
                gateway,
                files: HashSet::new(),
            },
            self,
        );
        self.log.accept(&mut visitor)?;

        let mut files = visitor.into_inner().files.into_iter().collect::<Vec<_>>();
        files.sort();
        Ok(files)
    }

    /// Whether `change_set` comes before the boundary (or is it, when
    /// `can_be_equal`).
    fn is_before_boundary(&self, change_set: &ChangeSet, can_be_equal: bool) -> bool {
        self.log
            .is_change_set_before(change_set.id(), self.boundary.id(), can_be_equal)
    }
}

impl Selection for ChainRevert<'_> {
    fn is_finished(&self, change_set: &ChangeSet) -> bool {
        self.is_before_boundary(change_set, false)
    }

    fn should_process(&self, _change_id: ChangeId, change: &StructuralChange) -> bool {
        self.chain.is_touched_by(change)
    }
}

struct ConsequencesVisitor<'r, 'a> {
    revert: &'r ChainRevert<'a>,
    warning: Option<String>,
}

impl ChangeVisitor for ConsequencesVisitor<'_, '_> {
    type Error = Infallible;

    fn begin(&mut self, change_set: &ChangeSet) -> Result<VisitFlow, Self::Error> {
        if self.revert.is_before_boundary(change_set, true) {
            return Ok(VisitFlow::Stop);
        }
        if change_set.affects_same_as(self.revert.chain.members()) {
            debug!("Change set {} depends on the reverted changes", change_set.id());
            self.warning = Some(DEPENDENT_CHANGES_WARNING.to_string());
            return Ok(VisitFlow::Stop);
        }
        Ok(VisitFlow::Continue)
    }
}

struct WritableFilesVisitor<'t, 'g> {
    tree: &'t EntryTree,
    gateway: &'g dyn Gateway,
    files: HashSet<String>,
}

impl ChangeVisitor for WritableFilesVisitor<'_, '_> {
    type Error = ReverterError;

    fn visit(
        &mut self,
        _change_id: ChangeId,
        change: &StructuralChange,
    ) -> Result<VisitFlow, Self::Error> {
        for id_path in change.affected_id_paths() {
            let Some(path) = self
                .tree
                .find_entry(id_path)
                .and_then(|entry| self.tree.path_of(entry.id()))
            else {
                continue;
            };
            let files = self
                .gateway
                .get_all_files_from(&path)
                .context(FileListingSnafu { path })?;
            self.files.extend(files);
        }
        Ok(VisitFlow::Continue)
    }
}

/// Reverts on a private copy of the tree so each check sees the state the
/// newer changes leave behind.
struct CheckVisitor {
    tree: EntryTree,
    errors: Vec<String>,
}

impl ChangeVisitor for CheckVisitor {
    type Error = Infallible;

    fn visit(
        &mut self,
        change_id: ChangeId,
        change: &StructuralChange,
    ) -> Result<VisitFlow, Self::Error> {
        let result = change
            .check_revert_on(&self.tree)
            .and_then(|()| change.revert_on(&mut self.tree));
        if let Err(err) = result {
            warn!("Change {change_id} cannot be reverted: {err}");
            self.errors.push(err.to_string());
        }
        Ok(VisitFlow::Continue)
    }
}
