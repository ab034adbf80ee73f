use std::collections::HashMap;

use bincode::{Decode, Encode};
use derive_more::Display;
use snafu::{OptionExt, ResultExt, Snafu, ensure};

use crate::changes::Change;
use crate::tree::{
    Content, Entry, EntryId, EntryKind, EntrySnapshot, EntryTree, IdPath, ROOT_ENTRY_ID, TreeError,
};

/// A change that mutates the entry tree.
///
/// Every variant carries what is needed to undo it without consulting any
/// earlier state: names, previous content, or a snapshot of a deleted
/// subtree.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub enum StructuralChange {
    Create {
        id_path: IdPath,
        name: String,
        kind: EntryKind,
    },
    Delete {
        id_path: IdPath,
        snapshot: EntrySnapshot,
    },
    Rename {
        id_path: IdPath,
        old_name: String,
        new_name: String,
    },
    Move {
        from: IdPath,
        to: IdPath,
        name: String,
    },
    ChangeContent {
        id_path: IdPath,
        name: String,
        old_content: Content,
        new_content: Content,
    },
}

/// Why a change cannot be undone against the current tree.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum Conflict {
    #[display("'{name}' already exists")]
    AlreadyExists { name: String },
    #[display("'{name}' no longer exists")]
    Missing { name: String },
    #[display("'{expected}' has been renamed to '{actual}'")]
    Renamed { expected: String, actual: String },
    #[display("'{name}' contains entries that were not there when it was created")]
    HasNewChildren { name: String },
    #[display("'{name}' is not a file")]
    NotAFile { name: String },
    #[display("the directory that contained '{name}' no longer exists")]
    MissingParent { name: String },
}

impl StructuralChange {
    pub fn affected_id_paths(&self) -> Vec<&IdPath> {
        match self {
            StructuralChange::Move { from, to, .. } => vec![from, to],
            StructuralChange::Create { id_path, .. }
            | StructuralChange::Delete { id_path, .. }
            | StructuralChange::Rename { id_path, .. }
            | StructuralChange::ChangeContent { id_path, .. } => vec![id_path],
        }
    }

    pub fn affects(&self, other: &StructuralChange) -> bool {
        let theirs = other.affected_id_paths();
        self.affected_id_paths()
            .iter()
            .any(|mine| theirs.iter().any(|their| mine.overlaps(their)))
    }

    /// True if this change shares an affected path with any of `others`.
    pub fn affects_same_as(&self, others: &[&Change]) -> bool {
        others
            .iter()
            .filter_map(|other| other.as_structural())
            .any(|other| self.affects(other))
    }

    /// Applies the change forward. Used when recording and when replaying a log.
    pub fn apply_to(&self, tree: &mut EntryTree) -> Result<(), TreeError> {
        match self {
            StructuralChange::Create {
                id_path,
                name,
                kind,
            } => {
                let parent = resolve_parent(tree, id_path)?;
                tree.insert_child(parent, target_id(id_path)?, name, kind.clone())
            }
            StructuralChange::Delete { id_path, .. } => {
                let id = resolve(tree, id_path)?;
                tree.remove(id).map(|_| ())
            }
            StructuralChange::Rename {
                id_path, new_name, ..
            } => {
                let id = resolve(tree, id_path)?;
                tree.rename(id, new_name).map(|_| ())
            }
            StructuralChange::Move { from, to, .. } => {
                let id = resolve(tree, from)?;
                let new_parent = resolve_parent(tree, to)?;
                tree.reparent(id, new_parent).map(|_| ())
            }
            StructuralChange::ChangeContent {
                id_path,
                new_content,
                ..
            } => {
                let id = resolve(tree, id_path)?;
                tree.set_content(id, new_content.clone()).map(|_| ())
            }
        }
    }

    pub fn can_revert_on(&self, tree: &EntryTree) -> bool {
        self.check_revert_on(tree).is_ok()
    }

    /// Tells why the change cannot be undone on `tree`, if it cannot. Never
    /// mutates the tree.
    pub fn check_revert_on(&self, tree: &EntryTree) -> Result<(), ChangeError> {
        match self {
            StructuralChange::Create { id_path, name, .. } => {
                let entry = tree.find_entry(id_path).context(ConflictSnafu {
                    reason: Conflict::Missing { name: name.clone() },
                })?;
                ensure!(
                    entry.name() == name,
                    ConflictSnafu {
                        reason: Conflict::Renamed {
                            expected: name.clone(),
                            actual: entry.name().to_string(),
                        }
                    }
                );
                ensure!(
                    entry.children().is_empty(),
                    ConflictSnafu {
                        reason: Conflict::HasNewChildren { name: name.clone() }
                    }
                );
                Ok(())
            }
            StructuralChange::Delete { id_path, snapshot } => {
                let parent = id_path
                    .parent()
                    .and_then(|parent| tree.find_entry(&parent))
                    .context(ConflictSnafu {
                        reason: Conflict::MissingParent {
                            name: snapshot.name.clone(),
                        },
                    })?;
                ensure_directory(parent)?;
                ensure!(
                    tree.child_named(parent.id(), &snapshot.name).is_none(),
                    ConflictSnafu {
                        reason: Conflict::AlreadyExists {
                            name: snapshot.name.clone(),
                        }
                    }
                );
                if let Some(id) = snapshot.ids().into_iter().find(|id| tree.contains(*id)) {
                    return Err(TreeError::DuplicateIdError { id }).context(TreeConsistencySnafu);
                }
                Ok(())
            }
            StructuralChange::Rename {
                id_path,
                old_name,
                new_name,
            } => {
                let entry = tree.find_entry(id_path).context(ConflictSnafu {
                    reason: Conflict::Missing {
                        name: new_name.clone(),
                    },
                })?;
                ensure!(
                    entry.name() == new_name,
                    ConflictSnafu {
                        reason: Conflict::Renamed {
                            expected: new_name.clone(),
                            actual: entry.name().to_string(),
                        }
                    }
                );
                ensure_name_free(tree, entry.parent(), old_name, entry.id())
            }
            StructuralChange::Move { from, to, name } => {
                let entry = tree.find_entry(to).context(ConflictSnafu {
                    reason: Conflict::Missing { name: name.clone() },
                })?;
                let old_parent = from
                    .parent()
                    .and_then(|parent| tree.find_entry(&parent))
                    .context(ConflictSnafu {
                        reason: Conflict::MissingParent { name: name.clone() },
                    })?;
                ensure_directory(old_parent)?;
                if tree.is_ancestor(entry.id(), old_parent.id()) {
                    return Err(TreeError::CycleError {
                        id: entry.id(),
                        new_parent: old_parent.id(),
                    })
                    .context(TreeConsistencySnafu);
                }
                ensure_name_free(tree, Some(old_parent.id()), entry.name(), entry.id())
            }
            StructuralChange::ChangeContent { id_path, name, .. } => {
                let entry = tree.find_entry(id_path).context(ConflictSnafu {
                    reason: Conflict::Missing { name: name.clone() },
                })?;
                ensure!(
                    !entry.is_directory(),
                    ConflictSnafu {
                        reason: Conflict::NotAFile { name: name.clone() }
                    }
                );
                Ok(())
            }
        }
    }

    /// Undoes the change in place. The tree is left untouched when the change
    /// cannot be undone.
    pub fn revert_on(&self, tree: &mut EntryTree) -> Result<(), ChangeError> {
        self.check_revert_on(tree)?;

        match self {
            StructuralChange::Create { id_path, .. } => {
                let id = target_id(id_path).context(TreeConsistencySnafu)?;
                tree.remove(id).context(TreeConsistencySnafu)?;
            }
            StructuralChange::Delete { id_path, snapshot } => {
                let parent = parent_id(id_path).context(TreeConsistencySnafu)?;
                tree.insert_snapshot(parent, snapshot)
                    .context(TreeConsistencySnafu)?;
            }
            StructuralChange::Rename {
                id_path, old_name, ..
            } => {
                let id = target_id(id_path).context(TreeConsistencySnafu)?;
                tree.rename(id, old_name).context(TreeConsistencySnafu)?;
            }
            StructuralChange::Move { from, to, .. } => {
                let id = target_id(to).context(TreeConsistencySnafu)?;
                let old_parent = parent_id(from).context(TreeConsistencySnafu)?;
                tree.reparent(id, old_parent)
                    .context(TreeConsistencySnafu)?;
            }
            StructuralChange::ChangeContent {
                id_path,
                old_content,
                ..
            } => {
                let id = target_id(id_path).context(TreeConsistencySnafu)?;
                tree.set_content(id, old_content.clone())
                    .context(TreeConsistencySnafu)?;
            }
        }
        Ok(())
    }

    /// Forward changes equivalent to undoing this one on `tree`, so an undo
    /// can itself be recorded. Must be called before [`Self::revert_on`].
    pub fn inverse_on(&self, tree: &EntryTree) -> Result<Vec<StructuralChange>, ChangeError> {
        self.check_revert_on(tree)?;

        let inverse = match self {
            StructuralChange::Create { id_path, .. } => {
                let id = target_id(id_path).context(TreeConsistencySnafu)?;
                let snapshot = tree
                    .snapshot(id)
                    .ok_or(TreeError::MissingEntryError { id })
                    .context(TreeConsistencySnafu)?;
                vec![StructuralChange::Delete {
                    id_path: id_path.clone(),
                    snapshot,
                }]
            }
            StructuralChange::Delete { id_path, snapshot } => {
                let parent_path = id_path
                    .parent()
                    .ok_or(TreeError::MissingEntryError {
                        id: snapshot.id,
                    })
                    .context(TreeConsistencySnafu)?;
                recreate_snapshot(&parent_path, snapshot)
            }
            StructuralChange::Rename {
                id_path,
                old_name,
                new_name,
            } => vec![StructuralChange::Rename {
                id_path: id_path.clone(),
                old_name: new_name.clone(),
                new_name: old_name.clone(),
            }],
            StructuralChange::Move { from, to, name } => {
                let id = target_id(to).context(TreeConsistencySnafu)?;
                let old_parent = parent_id(from).context(TreeConsistencySnafu)?;
                let restored = tree
                    .id_path_of(old_parent)
                    .ok_or(TreeError::MissingEntryError { id: old_parent })
                    .context(TreeConsistencySnafu)?
                    .child(id);
                vec![StructuralChange::Move {
                    from: to.clone(),
                    to: restored,
                    name: name.clone(),
                }]
            }
            StructuralChange::ChangeContent {
                id_path,
                name,
                old_content,
                ..
            } => {
                let current = tree
                    .find_entry(id_path)
                    .and_then(Entry::content)
                    .cloned()
                    .unwrap_or_default();
                vec![StructuralChange::ChangeContent {
                    id_path: id_path.clone(),
                    name: name.clone(),
                    old_content: current,
                    new_content: old_content.clone(),
                }]
            }
        };
        Ok(inverse)
    }
}

/// One `Create` per snapshot node, parents first.
fn recreate_snapshot(parent_path: &IdPath, snapshot: &EntrySnapshot) -> Vec<StructuralChange> {
    let mut paths: HashMap<EntryId, IdPath> = HashMap::new();
    let mut creates = Vec::new();
    snapshot.walk(&mut |snapshot_parent, node| {
        let base = snapshot_parent
            .and_then(|id| paths.get(&id))
            .unwrap_or(parent_path);
        let id_path = base.child(node.id);
        paths.insert(node.id, id_path.clone());
        creates.push(StructuralChange::Create {
            id_path,
            name: node.name.clone(),
            kind: node.kind.clone(),
        });
    });
    creates
}

fn target_id(path: &IdPath) -> Result<EntryId, TreeError> {
    path.id().ok_or(TreeError::MissingEntryError { id: ROOT_ENTRY_ID })
}

fn parent_id(path: &IdPath) -> Result<EntryId, TreeError> {
    path.parent()
        .and_then(|parent| parent.id())
        .ok_or(TreeError::MissingEntryError {
            id: path.id().unwrap_or(ROOT_ENTRY_ID),
        })
}

fn resolve(tree: &EntryTree, path: &IdPath) -> Result<EntryId, TreeError> {
    let id = target_id(path)?;
    tree.find_entry(path)
        .map(Entry::id)
        .ok_or(TreeError::MissingEntryError { id })
}

fn resolve_parent(tree: &EntryTree, path: &IdPath) -> Result<EntryId, TreeError> {
    let id = parent_id(path)?;
    path.parent()
        .and_then(|parent| tree.find_entry(&parent))
        .map(Entry::id)
        .ok_or(TreeError::MissingEntryError { id })
}

fn ensure_directory(entry: &Entry) -> Result<(), ChangeError> {
    if entry.is_directory() {
        Ok(())
    } else {
        Err(TreeError::NotADirectoryError { id: entry.id() }).context(TreeConsistencySnafu)
    }
}

fn ensure_name_free(
    tree: &EntryTree,
    parent: Option<EntryId>,
    name: &str,
    except: EntryId,
) -> Result<(), ChangeError> {
    let taken = parent
        .and_then(|parent| tree.child_named(parent, name))
        .is_some_and(|existing| existing.id() != except);
    ensure!(
        !taken,
        ConflictSnafu {
            reason: Conflict::AlreadyExists {
                name: name.to_string()
            }
        }
    );
    Ok(())
}

#[derive(Debug, Snafu)]
pub enum ChangeError {
    #[snafu(display("{reason}"))]
    ConflictError { reason: Conflict },
    #[snafu(display("Reverting would leave the entry tree inconsistent: {source}"))]
    TreeConsistencyError { source: TreeError },
}

impl ChangeError {
    pub fn conflict(&self) -> Option<&Conflict> {
        match self {
            ChangeError::ConflictError { reason } => Some(reason),
            ChangeError::TreeConsistencyError { .. } => None,
        }
    }
}
