use std::mem;

use snafu::{OptionExt, ResultExt, Snafu, ensure};
use tracing::{debug, info, warn};

use crate::changes::{
    Change, ChangeId, ChangeKind, ChangeSetId, StructuralChange, Timestamp,
};
use crate::config::HistoryConfig;
use crate::gateway::Gateway;
use crate::log::{ChangeLog, LogError};
use crate::revert::{RevertTarget, Reverter, ReverterError, ReverterTrait};
use crate::storage::StorageError;
use crate::tree::{Content, Entry, EntryKind, EntryTree, IdPath, TreeError, split_path};

/// Live tree plus the log of everything done to it.
///
/// Every mutation goes through here so the tree and the log never disagree.
/// Mutations made outside [`LocalHistory::begin_change_set`] /
/// [`LocalHistory::end_change_set`] become change sets of their own.
#[derive(Debug, Clone, Default)]
pub struct LocalHistory {
    tree: EntryTree,
    log: ChangeLog,
    pending: Vec<Change>,
    depth: usize,
    config: HistoryConfig,
}

impl LocalHistory {
    pub fn new(config: HistoryConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Loads the log named by `config` and rebuilds the tree from it.
    pub async fn load(config: HistoryConfig) -> Result<Self, HistoryError> {
        let log = ChangeLog::read(config.log_file())
            .await
            .context(PersistenceSnafu)?;
        let tree = log.replay().context(ReplaySnafu)?;
        info!(
            "Loaded {} change sets describing {} entries",
            log.len(),
            tree.len().saturating_sub(1)
        );

        Ok(Self {
            tree,
            log,
            config,
            ..Self::default()
        })
    }

    pub async fn save(&self) -> Result<(), HistoryError> {
        if !self.pending.is_empty() {
            warn!(
                "Saving with {} changes of an open change set left out",
                self.pending.len()
            );
        }
        self.log
            .write(self.config.log_file())
            .await
            .context(PersistenceSnafu)
    }

    pub fn tree(&self) -> &EntryTree {
        &self.tree
    }

    pub fn log(&self) -> &ChangeLog {
        &self.log
    }

    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    pub fn is_in_change_set(&self) -> bool {
        self.depth > 0
    }

    /// Opens a change set. Calls nest; only the outermost end appends.
    pub fn begin_change_set(&mut self) {
        self.depth += 1;
    }

    /// Closes a change set. Returns the id of the appended change set, or
    /// `None` when still nested or nothing was recorded.
    pub fn end_change_set(
        &mut self,
        label: Option<String>,
    ) -> Result<Option<ChangeSetId>, HistoryError> {
        ensure!(self.depth > 0, NoOpenChangeSetSnafu);
        self.depth -= 1;
        if self.depth > 0 {
            return Ok(None);
        }
        self.flush(label)
    }

    pub fn create_file(
        &mut self,
        path: &str,
        content: impl Into<Content>,
    ) -> Result<ChangeId, HistoryError> {
        self.create(path, EntryKind::file(content))
    }

    pub fn create_directory(&mut self, path: &str) -> Result<ChangeId, HistoryError> {
        self.create(path, EntryKind::Directory)
    }

    pub fn change_file_content(
        &mut self,
        path: &str,
        content: impl Into<Content>,
    ) -> Result<ChangeId, HistoryError> {
        let entry = self.entry(path)?;
        let old_content = entry.content().cloned().context(NotAFileSnafu { path })?;
        let change = StructuralChange::ChangeContent {
            id_path: self.id_path(entry, path)?,
            name: entry.name().to_string(),
            old_content,
            new_content: content.into(),
        };
        self.record(change)
    }

    pub fn rename(&mut self, path: &str, new_name: &str) -> Result<ChangeId, HistoryError> {
        let entry = self.entry(path)?;
        let change = StructuralChange::Rename {
            id_path: self.id_path(entry, path)?,
            old_name: entry.name().to_string(),
            new_name: new_name.to_string(),
        };
        self.record(change)
    }

    pub fn move_entry(&mut self, path: &str, new_parent: &str) -> Result<ChangeId, HistoryError> {
        let entry = self.entry(path)?;
        let parent = self.entry(new_parent)?;
        let from = self.id_path(entry, path)?;
        let to = self.id_path(parent, new_parent)?.child(entry.id());
        let change = StructuralChange::Move {
            from,
            to,
            name: entry.name().to_string(),
        };
        self.record(change)
    }

    pub fn delete(&mut self, path: &str) -> Result<ChangeId, HistoryError> {
        let entry = self.entry(path)?;
        let id_path = self.id_path(entry, path)?;
        let snapshot = self
            .tree
            .snapshot(entry.id())
            .context(UnknownPathSnafu { path })?;
        self.record(StructuralChange::Delete { id_path, snapshot })
    }

    /// Records a named point in history.
    pub fn put_label(&mut self, label: &str) -> Result<ChangeId, HistoryError> {
        let id = self.log.allocate_change_id();
        self.pending.push(Change::new(
            id,
            Timestamp::now(),
            ChangeKind::PutLabel {
                label: label.to_string(),
            },
        ));
        if self.depth == 0 {
            self.flush(None)?;
        }
        Ok(id)
    }

    pub fn relabel(&mut self, id: ChangeSetId, label: Option<String>) -> Result<(), HistoryError> {
        self.log.relabel(id, label).context(ChangeLogSnafu)
    }

    pub fn reverter(&self, target: &RevertTarget) -> Result<Reverter<'_>, HistoryError> {
        let reverter = Reverter::new(&self.log, &self.tree, target).context(RevertSnafu)?;
        Ok(reverter.with_writable_check(self.config.ensure_writable()))
    }

    /// Warning to confirm before reverting `target`, if later changes depend
    /// on it.
    pub fn explain_revert(&self, target: &RevertTarget) -> Result<Option<String>, HistoryError> {
        Ok(self.reverter(target)?.ask_user_for_proceed())
    }

    pub fn check_revert(
        &self,
        target: &RevertTarget,
        gateway: &mut dyn Gateway,
    ) -> Result<Vec<String>, HistoryError> {
        self.reverter(target)?
            .check_can_revert(&self.tree, gateway)
            .context(RevertSnafu)
    }

    /// Checks and reverts `target`, then records what was undone as a new
    /// change set so the revert can itself be reverted.
    ///
    /// A revert that fails halfway still records the part that reached the
    /// tree before the error is returned.
    pub fn revert(
        &mut self,
        target: &RevertTarget,
        gateway: &mut dyn Gateway,
    ) -> Result<Option<ChangeSetId>, HistoryError> {
        ensure!(self.depth == 0, ChangeSetOpenSnafu);

        let reverter = Reverter::new(&self.log, &self.tree, target)
            .context(RevertSnafu)?
            .with_writable_check(self.config.ensure_writable());
        let label = reverter.format_label();
        let outcome = reverter.revert(&mut self.tree, gateway);

        let (applied, failure) = match outcome {
            Ok(applied) => (applied, None),
            Err(err) => (err.applied().to_vec(), Some(err)),
        };
        let recorded = self.record_applied(label, applied)?;

        match failure {
            Some(source) => Err(HistoryError::RevertError { source }),
            None => Ok(recorded),
        }
    }

    fn record_applied(
        &mut self,
        label: String,
        applied: Vec<StructuralChange>,
    ) -> Result<Option<ChangeSetId>, HistoryError> {
        if applied.is_empty() {
            return Ok(None);
        }
        let timestamp = Timestamp::now();
        let changes = applied
            .into_iter()
            .map(|change| {
                Change::new(
                    self.log.allocate_change_id(),
                    timestamp,
                    ChangeKind::Structural(change),
                )
            })
            .collect::<Vec<_>>();
        let id = self
            .log
            .append(Some(label), timestamp, changes)
            .context(ChangeLogSnafu)?;
        info!("Recorded revert as change set {id}");
        Ok(Some(id))
    }

    fn create(&mut self, path: &str, kind: EntryKind) -> Result<ChangeId, HistoryError> {
        let (parent_path, name) = split_path(path).context(InvalidPathSnafu { path })?;
        let parent = self.entry(&parent_path)?;
        let parent_id_path = self.id_path(parent, &parent_path)?;
        let id = self.tree.allocate_id();
        let change = StructuralChange::Create {
            id_path: parent_id_path.child(id),
            name,
            kind,
        };
        self.record(change)
    }

    fn record(&mut self, change: StructuralChange) -> Result<ChangeId, HistoryError> {
        change.apply_to(&mut self.tree).context(ChangeRejectedSnafu)?;

        let id = self.log.allocate_change_id();
        debug!("Recorded change {id}");
        self.pending.push(Change::new(
            id,
            Timestamp::now(),
            ChangeKind::Structural(change),
        ));
        if self.depth == 0 {
            self.flush(None)?;
        }
        Ok(id)
    }

    fn flush(&mut self, label: Option<String>) -> Result<Option<ChangeSetId>, HistoryError> {
        if self.pending.is_empty() {
            return Ok(None);
        }
        let changes = mem::take(&mut self.pending);
        let timestamp = changes
            .first()
            .map(Change::timestamp)
            .unwrap_or_else(Timestamp::now);
        let id = self
            .log
            .append(label, timestamp, changes)
            .context(ChangeLogSnafu)?;
        Ok(Some(id))
    }

    fn entry(&self, path: &str) -> Result<&Entry, HistoryError> {
        self.tree.find_by_path(path).context(UnknownPathSnafu { path })
    }

    fn id_path(&self, entry: &Entry, path: &str) -> Result<IdPath, HistoryError> {
        self.tree
            .id_path_of(entry.id())
            .context(UnknownPathSnafu { path })
    }
}

#[derive(Debug, Snafu)]
pub enum HistoryError {
    #[snafu(display("'{path}' is not a valid entry path"))]
    InvalidPathError { path: String },
    #[snafu(display("'{path}' does not exist"))]
    UnknownPathError { path: String },
    #[snafu(display("'{path}' is not a file"))]
    NotAFileError { path: String },
    #[snafu(display("The change does not fit the current tree"))]
    ChangeRejectedError { source: TreeError },
    #[snafu(display("Failed to update the change log"))]
    ChangeLogError { source: LogError },
    #[snafu(display("No change set is open"))]
    NoOpenChangeSetError,
    #[snafu(display("Cannot revert while a change set is open"))]
    ChangeSetOpenError,
    #[snafu(display("Revert failed"))]
    RevertError { source: ReverterError },
    #[snafu(display("Failed to persist the change log"))]
    PersistenceError { source: StorageError },
    #[snafu(display("The stored change log does not replay"))]
    ReplayError { source: TreeError },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{GatewayCall, RecordingGateway};
    use tempfile::TempDir;

    #[test]
    fn single_operations_become_their_own_change_sets() {
        let mut history = LocalHistory::default();
        history.create_directory("a").unwrap();
        history.create_file("a/b.txt", "b").unwrap();

        assert_eq!(history.log().len(), 2);
        assert_eq!(history.tree().paths(), vec!["a", "a/b.txt"]);
        assert!(history.log().change_sets().iter().all(|set| set.label().is_none()));
    }

    #[test]
    fn nested_change_sets_append_once_at_the_outermost_end() {
        let mut history = LocalHistory::default();
        history.begin_change_set();
        history.create_directory("a").unwrap();
        history.begin_change_set();
        history.create_directory("b").unwrap();
        assert_eq!(history.end_change_set(Some("inner".to_string())).unwrap(), None);
        history.put_label("marker").unwrap();
        let id = history
            .end_change_set(Some("outer".to_string()))
            .unwrap()
            .unwrap();

        assert_eq!(history.log().len(), 1);
        let change_set = history.log().change_set(id).unwrap();
        assert_eq!(change_set.label(), Some("outer"));
        assert_eq!(change_set.changes().len(), 3);
        assert_eq!(change_set.structural_changes().count(), 2);
    }

    #[test]
    fn empty_change_set_appends_nothing() {
        let mut history = LocalHistory::default();
        history.begin_change_set();
        assert_eq!(history.end_change_set(Some("empty".to_string())).unwrap(), None);
        assert!(history.log().is_empty());
        assert!(matches!(
            history.end_change_set(None),
            Err(HistoryError::NoOpenChangeSetError)
        ));
    }

    #[test]
    fn rejected_operations_leave_tree_and_log_alone() {
        let mut history = LocalHistory::default();
        history.create_file("a.txt", "a").unwrap();

        assert!(matches!(
            history.create_file("a.txt", "again"),
            Err(HistoryError::ChangeRejectedError { .. })
        ));
        assert!(matches!(
            history.create_file("missing/b.txt", ""),
            Err(HistoryError::UnknownPathError { .. })
        ));
        assert!(matches!(
            history.create_file("", ""),
            Err(HistoryError::InvalidPathError { .. })
        ));
        history.create_directory("dir").unwrap();
        assert!(matches!(
            history.change_file_content("dir", "x"),
            Err(HistoryError::NotAFileError { .. })
        ));

        assert_eq!(history.log().len(), 2);
        assert_eq!(history.tree().paths(), vec!["a.txt", "dir"]);
    }

    #[test]
    fn relabel_changes_only_the_label() {
        let mut history = LocalHistory::default();
        history.create_file("a.txt", "a").unwrap();
        let id = history.log().last_change_set().unwrap().id();

        history.relabel(id, Some("Add a".to_string())).unwrap();

        assert_eq!(history.log().change_set(id).unwrap().label(), Some("Add a"));
        assert!(matches!(
            history.relabel(ChangeSetId::from(42_u64), None),
            Err(HistoryError::ChangeLogError { .. })
        ));
    }

    #[test]
    fn revert_is_recorded_as_a_labeled_change_set() {
        let mut history = LocalHistory::default();
        history.create_file("a.txt", "one").unwrap();
        history.begin_change_set();
        let edit = history.change_file_content("a.txt", "two").unwrap();
        history.end_change_set(Some("Edit a".to_string())).unwrap();

        let mut gateway = RecordingGateway::new();
        let id = history
            .revert(&RevertTarget::Change(edit), &mut gateway)
            .unwrap()
            .unwrap();

        let recorded = history.log().change_set(id).unwrap();
        assert_eq!(recorded.label(), Some("Revert 'Edit a'"));
        let content = history.tree().find_by_path("a.txt").unwrap().content().unwrap();
        assert_eq!(content.as_bytes(), b"one");
        assert_eq!(&history.log().replay().unwrap(), history.tree());
    }

    #[test]
    fn revert_can_itself_be_reverted() {
        let mut history = LocalHistory::default();
        let create = history.create_file("a.txt", "a").unwrap();
        let mut gateway = RecordingGateway::new();
        let revert = history
            .revert(&RevertTarget::Change(create), &mut gateway)
            .unwrap()
            .unwrap();
        assert!(history.tree().paths().is_empty());

        history
            .revert(&RevertTarget::ChangeSet(revert), &mut gateway)
            .unwrap();

        assert_eq!(history.tree().paths(), vec!["a.txt"]);
        assert_eq!(&history.log().replay().unwrap(), history.tree());
    }

    #[test]
    fn create_delete_recreate_chain_reverts_fully() {
        let mut history = LocalHistory::default();
        let first = history.create_file("x", "first").unwrap();
        let delete = history.delete("x").unwrap();
        let second = history.create_file("x", "second").unwrap();
        let mut gateway = RecordingGateway::new();

        for change in [second, delete, first] {
            history
                .revert(&RevertTarget::Change(change), &mut gateway)
                .unwrap();
        }

        assert!(history.tree().paths().is_empty());
        assert_eq!(&history.log().replay().unwrap(), history.tree());
    }

    #[test]
    fn rejected_revert_records_nothing() {
        let mut history = LocalHistory::default();
        history.create_file("x", "old").unwrap();
        let delete = history.delete("x").unwrap();
        history.create_file("x", "new").unwrap();
        let before = history.log().len();

        let mut gateway = RecordingGateway::new();
        let result = history.revert(&RevertTarget::Change(delete), &mut gateway);

        assert!(matches!(
            result,
            Err(HistoryError::RevertError {
                source: ReverterError::RejectedError { .. }
            })
        ));
        assert_eq!(history.log().len(), before);
    }

    #[test]
    fn partial_revert_records_what_was_applied() {
        let mut history = LocalHistory::default();
        let create = history.create_file("a", "1").unwrap();
        history.change_file_content("a", "2").unwrap();
        history.rename("a", "b").unwrap();
        let mut gateway = RecordingGateway::new();
        gateway.fail_on_path = Some("a".to_string());

        let result = history.revert(&RevertTarget::Change(create), &mut gateway);

        assert!(matches!(
            result,
            Err(HistoryError::RevertError {
                source: ReverterError::AdapterIoError { .. }
            })
        ));
        assert_eq!(history.tree().paths(), vec!["a"]);
        assert_eq!(&history.log().replay().unwrap(), history.tree());
        assert_eq!(
            gateway.mutations(),
            vec![&GatewayCall::Rename("b".to_string(), "a".to_string())]
        );
    }

    #[test]
    fn revert_is_refused_inside_an_open_change_set() {
        let mut history = LocalHistory::default();
        let create = history.create_file("a", "").unwrap();
        history.begin_change_set();

        let mut gateway = RecordingGateway::new();
        let result = history.revert(&RevertTarget::Change(create), &mut gateway);

        assert!(matches!(result, Err(HistoryError::ChangeSetOpenError)));
    }

    #[test]
    fn explain_and_check_do_not_touch_the_tree() {
        let mut history = LocalHistory::default();
        let create = history.create_file("a", "").unwrap();
        history.rename("a", "b").unwrap();
        let target = RevertTarget::Change(create);

        let mut gateway = RecordingGateway::new();
        assert!(history.explain_revert(&target).unwrap().is_some());
        assert!(history.check_revert(&target, &mut gateway).unwrap().is_empty());
        assert_eq!(history.tree().paths(), vec!["b"]);
        assert!(gateway.mutations().is_empty());
    }

    #[test]
    fn writable_check_follows_the_config() {
        let mut history = LocalHistory::new(HistoryConfig::new("unused.bin", false));
        let create = history.create_file("locked", "").unwrap();
        let mut gateway = RecordingGateway::new();
        gateway.read_only.insert("locked".to_string());

        let errors = history
            .check_revert(&RevertTarget::Change(create), &mut gateway)
            .unwrap();

        assert!(errors.is_empty());
        assert!(gateway.calls.is_empty());
    }

    #[compio::test]
    async fn saved_history_loads_back_with_the_same_tree() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config = HistoryConfig::new(temp_dir.path().join("log.bin"), true);

        let mut history = LocalHistory::new(config.clone());
        history.create_directory("src").unwrap();
        history.create_file("src/main.rs", "fn main() {}").unwrap();
        history.move_entry("src/main.rs", "").unwrap();
        history.save().await.unwrap();

        let loaded = LocalHistory::load(config).await.unwrap();
        assert_eq!(loaded.tree(), history.tree());
        assert_eq!(loaded.log(), history.log());
        assert_eq!(loaded.tree().paths(), vec!["main.rs", "src"]);
    }
}
