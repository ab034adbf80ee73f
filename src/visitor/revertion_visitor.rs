use snafu::ResultExt;
use tracing::debug;

use crate::changes::{ChangeError, ChangeId, StructuralChange};
use crate::gateway::{Gateway, GatewayError};
use crate::revert::{AdapterIoSnafu, ApplyConflictSnafu, ReverterError};
use crate::tree::{EntryId, EntryKind, EntrySnapshot, EntryTree, TreeError, join_path};
use crate::visitor::{ChangeVisitor, VisitFlow};

/// Undoes every visited change on the live tree, mirroring each step onto
/// storage through the gateway first.
///
/// The first failure ends the walk. Steps already taken stay applied; the
/// error carries the forward changes they amount to.
pub struct RevertionVisitor<'t, 'g> {
    tree: &'t mut EntryTree,
    gateway: &'g mut dyn Gateway,
    applied: Vec<StructuralChange>,
}

impl<'t, 'g> RevertionVisitor<'t, 'g> {
    pub fn new(tree: &'t mut EntryTree, gateway: &'g mut dyn Gateway) -> Self {
        Self {
            tree,
            gateway,
            applied: Vec::new(),
        }
    }

    /// Forward changes equivalent to everything undone so far.
    pub fn applied(&self) -> &[StructuralChange] {
        &self.applied
    }

    pub fn into_applied(self) -> Vec<StructuralChange> {
        self.applied
    }

    fn path_of(&self, id: Option<EntryId>) -> Result<String, ChangeError> {
        let id = id.ok_or(ChangeError::TreeConsistencyError {
            source: TreeError::MissingEntryError {
                id: self.tree.root_id(),
            },
        })?;
        self.tree
            .require_path(id)
            .map_err(|source| ChangeError::TreeConsistencyError { source })
    }

    /// Mirrors the undo of `change` onto storage, resolving paths in the
    /// tree as it stands before the undo.
    fn mirror(
        &mut self,
        change_id: ChangeId,
        change: &StructuralChange,
    ) -> Result<(), ReverterError> {
        let result = match change {
            StructuralChange::Create { id_path, .. } => {
                let path = self.storage_path(change_id, id_path.id())?;
                self.gateway.delete(&path)
            }
            StructuralChange::Delete { id_path, snapshot } => {
                let parent =
                    self.storage_path(change_id, id_path.parent().and_then(|p| p.id()))?;
                recreate_on_storage(&mut *self.gateway, &parent, snapshot)
            }
            StructuralChange::Rename {
                id_path, old_name, ..
            } => {
                let path = self.storage_path(change_id, id_path.id())?;
                self.gateway.rename(&path, old_name)
            }
            StructuralChange::Move { from, to, .. } => {
                let path = self.storage_path(change_id, to.id())?;
                let old_parent =
                    self.storage_path(change_id, from.parent().and_then(|p| p.id()))?;
                self.gateway.move_entry(&path, &old_parent)
            }
            StructuralChange::ChangeContent {
                id_path,
                old_content,
                ..
            } => {
                let path = self.storage_path(change_id, id_path.id())?;
                self.gateway.write_content(&path, old_content)
            }
        };
        result.context(AdapterIoSnafu {
            change_id,
            applied: self.applied.clone(),
        })
    }

    fn storage_path(
        &self,
        change_id: ChangeId,
        id: Option<EntryId>,
    ) -> Result<String, ReverterError> {
        self.path_of(id).context(ApplyConflictSnafu {
            change_id,
            applied: self.applied.clone(),
        })
    }
}

/// Recreates a deleted subtree below `parent`, parents before children.
fn recreate_on_storage(
    gateway: &mut dyn Gateway,
    parent: &str,
    snapshot: &EntrySnapshot,
) -> Result<(), GatewayError> {
    let mut pending = vec![(parent.to_string(), snapshot)];
    while let Some((parent, node)) = pending.pop() {
        let path = join_path(&parent, &node.name);
        match &node.kind {
            EntryKind::Directory => gateway.create_directory(&path)?,
            EntryKind::File { content } => gateway.create_file(&path, content)?,
        }
        pending.extend(
            node.children
                .iter()
                .rev()
                .map(|child| (path.clone(), child)),
        );
    }
    Ok(())
}

impl ChangeVisitor for RevertionVisitor<'_, '_> {
    type Error = ReverterError;

    fn visit(
        &mut self,
        change_id: ChangeId,
        change: &StructuralChange,
    ) -> Result<VisitFlow, Self::Error> {
        debug!("Reverting change {change_id}");
        let inverse = change.inverse_on(self.tree).context(ApplyConflictSnafu {
            change_id,
            applied: self.applied.clone(),
        })?;

        self.mirror(change_id, change)?;

        change.revert_on(self.tree).context(ApplyConflictSnafu {
            change_id,
            applied: self.applied.clone(),
        })?;
        self.applied.extend(inverse);
        Ok(VisitFlow::Continue)
    }
}
