use std::collections::HashSet;

use bincode::{Decode, Encode};
use snafu::{OptionExt, Snafu, ensure};
use tracing::debug;

use crate::changes::{Change, ChangeId, ChangeSet, ChangeSetId, Timestamp};
use crate::log::Chain;
use crate::tree::{EntryTree, IdPath, TreeError};
use crate::visitor::{ChangeVisitor, VisitFlow};

/// Append-only history of change sets, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode)]
pub struct ChangeLog {
    change_sets: Vec<ChangeSet>,
    next_change_id: u64,
    next_change_set_id: u64,
}

impl ChangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate_change_id(&mut self) -> ChangeId {
        let id = ChangeId::from(self.next_change_id);
        self.next_change_id += 1;
        id
    }

    /// Appends a change set. Change ids must be increasing and newer than
    /// anything already in the log.
    pub fn append(
        &mut self,
        label: Option<String>,
        timestamp: Timestamp,
        changes: Vec<Change>,
    ) -> Result<ChangeSetId, LogError> {
        ensure!(!changes.is_empty(), EmptyChangeSetSnafu);

        let mut previous = self.last_change_set().and_then(ChangeSet::last_change_id);
        for change in &changes {
            ensure!(
                previous.is_none_or(|previous| previous < change.id()),
                OutOfOrderSnafu { id: change.id() }
            );
            previous = Some(change.id());
        }

        let id = ChangeSetId::from(self.next_change_set_id);
        self.next_change_set_id += 1;
        if let Some(last) = previous {
            self.next_change_id = self.next_change_id.max(last.value() + 1);
        }

        debug!("Appending change set {} with {} changes", id, changes.len());
        self.change_sets
            .push(ChangeSet::new(id, label, timestamp, changes));
        Ok(id)
    }

    pub fn relabel(&mut self, id: ChangeSetId, label: Option<String>) -> Result<(), LogError> {
        let position = self
            .position_of_change_set(id)
            .context(ChangeSetNotFoundSnafu { id })?;
        self.change_sets[position].set_label(label);
        Ok(())
    }

    pub fn change_sets(&self) -> &[ChangeSet] {
        &self.change_sets
    }

    pub fn len(&self) -> usize {
        self.change_sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.change_sets.is_empty()
    }

    pub fn last_change_set(&self) -> Option<&ChangeSet> {
        self.change_sets.last()
    }

    pub fn change_set(&self, id: ChangeSetId) -> Option<&ChangeSet> {
        self.position_of_change_set(id)
            .map(|position| &self.change_sets[position])
    }

    pub fn change_set_of(&self, change: ChangeId) -> Option<&ChangeSet> {
        self.position_of_change(change)
            .map(|position| &self.change_sets[position])
    }

    pub fn change(&self, id: ChangeId) -> Option<&Change> {
        self.change_set_of(id)?.change(id)
    }

    /// Whether the change set holding `change` comes before `change_set`
    /// (or is it, when `can_be_equal`).
    pub fn is_before(&self, change: ChangeId, change_set: &ChangeSet, can_be_equal: bool) -> bool {
        match (
            self.position_of_change(change),
            self.position_of_change_set(change_set.id()),
        ) {
            (Some(mine), Some(theirs)) => mine < theirs || (can_be_equal && mine == theirs),
            _ => false,
        }
    }

    pub fn is_change_set_before(
        &self,
        first: ChangeSetId,
        second: ChangeSetId,
        can_be_equal: bool,
    ) -> bool {
        match (
            self.position_of_change_set(first),
            self.position_of_change_set(second),
        ) {
            (Some(first), Some(second)) => first < second || (can_be_equal && first == second),
            _ => false,
        }
    }

    /// The change plus every change, in its own or a later change set, that
    /// shares an affected path with the chain (transitively).
    pub fn get_chain(&self, change: ChangeId) -> Result<Chain<'_>, LogError> {
        let position = self
            .position_of_change(change)
            .context(ChangeNotFoundSnafu { id: change })?;
        let seed = self.change_sets[position]
            .change(change)
            .context(ChangeNotFoundSnafu { id: change })?;
        Ok(self.close_chain(vec![seed], position))
    }

    /// Chain seeded with every change of a change set.
    pub fn get_change_set_chain(&self, change_set: ChangeSetId) -> Result<Chain<'_>, LogError> {
        let position = self
            .position_of_change_set(change_set)
            .context(ChangeSetNotFoundSnafu { id: change_set })?;
        let seed = self.change_sets[position].changes().iter().collect();
        Ok(self.close_chain(seed, position))
    }

    /// Chain seeded with every change made to the entry at `id_path` (or
    /// below it) since `since`, inclusive.
    pub fn get_entry_chain(
        &self,
        id_path: &IdPath,
        since: ChangeSetId,
    ) -> Result<Chain<'_>, LogError> {
        let position = self
            .position_of_change_set(since)
            .context(ChangeSetNotFoundSnafu { id: since })?;
        let seed = self.change_sets[position..]
            .iter()
            .flat_map(ChangeSet::changes)
            .filter(|change| {
                change
                    .affected_id_paths()
                    .iter()
                    .any(|path| path.overlaps(id_path))
            })
            .collect();
        Ok(self.close_chain(seed, position))
    }

    /// Walks the log newest change set first until the visitor stops.
    pub fn accept<V>(&self, visitor: &mut V) -> Result<(), V::Error>
    where
        V: ChangeVisitor + ?Sized,
    {
        for change_set in self.change_sets.iter().rev() {
            if change_set.accept(visitor)? == VisitFlow::Stop {
                break;
            }
        }
        Ok(())
    }

    /// Rebuilds the tree the log describes by applying every structural
    /// change forward from an empty tree.
    pub fn replay(&self) -> Result<EntryTree, TreeError> {
        let mut tree = EntryTree::new();
        for change_set in &self.change_sets {
            for (_, change) in change_set.structural_changes() {
                change.apply_to(&mut tree)?;
            }
        }
        Ok(tree)
    }

    /// Checks the ordering guarantees `append` maintains. Used on logs that
    /// come from outside, e.g. storage.
    pub fn validate(&self) -> Result<(), LogError> {
        let mut previous_set: Option<ChangeSetId> = None;
        let mut previous_change: Option<ChangeId> = None;
        for change_set in &self.change_sets {
            ensure!(!change_set.changes().is_empty(), EmptyChangeSetSnafu);
            ensure!(
                previous_set.is_none_or(|previous| previous < change_set.id()),
                ChangeSetOutOfOrderSnafu {
                    id: change_set.id()
                }
            );
            previous_set = Some(change_set.id());
            for change in change_set.changes() {
                ensure!(
                    previous_change.is_none_or(|previous| previous < change.id()),
                    OutOfOrderSnafu { id: change.id() }
                );
                previous_change = Some(change.id());
            }
        }
        ensure!(
            previous_change.is_none_or(|last| last.value() < self.next_change_id)
                && previous_set.is_none_or(|last| last.value() < self.next_change_set_id),
            IdCounterSnafu
        );
        Ok(())
    }

    fn position_of_change(&self, id: ChangeId) -> Option<usize> {
        let position = self.change_sets.partition_point(|change_set| {
            change_set
                .last_change_id()
                .is_some_and(|last| last < id)
        });
        self.change_sets
            .get(position)
            .filter(|change_set| change_set.contains(id))
            .map(|_| position)
    }

    fn position_of_change_set(&self, id: ChangeSetId) -> Option<usize> {
        let position = self
            .change_sets
            .partition_point(|change_set| change_set.id() < id);
        self.change_sets
            .get(position)
            .filter(|change_set| change_set.id() == id)
            .map(|_| position)
    }

    fn close_chain<'a>(&'a self, seed: Vec<&'a Change>, from: usize) -> Chain<'a> {
        let window = self.change_sets[from..]
            .iter()
            .flat_map(ChangeSet::changes)
            .collect::<Vec<_>>();

        let visited = seed.iter().map(|change| change.id()).collect::<HashSet<_>>();
        let mut members = seed.clone();
        // Candidates not linked yet; linking one removes it, so each is taken once.
        let mut remaining = window
            .iter()
            .copied()
            .filter(|candidate| !visited.contains(&candidate.id()))
            .collect::<Vec<_>>();
        let mut pending = seed;
        while let Some(change) = pending.pop() {
            remaining.retain(|&candidate| {
                if !candidate.affects_same_as(&[change]) {
                    return true;
                }
                members.push(candidate);
                pending.push(candidate);
                false
            });
        }
        members.sort_by_key(|change| change.id());

        debug!(
            "Chain of {} changes computed over {} candidates",
            members.len(),
            window.len()
        );
        Chain::new(members)
    }
}

#[derive(Debug, Snafu)]
pub enum LogError {
    #[snafu(display("Change {id} is not in the log"))]
    ChangeNotFoundError { id: ChangeId },
    #[snafu(display("Change set {id} is not in the log"))]
    ChangeSetNotFoundError { id: ChangeSetId },
    #[snafu(display("A change set needs at least one change"))]
    EmptyChangeSetError,
    #[snafu(display("Change {id} is not newer than the changes before it"))]
    OutOfOrderError { id: ChangeId },
    #[snafu(display("Change set {id} is not newer than the change sets before it"))]
    ChangeSetOutOfOrderError { id: ChangeSetId },
    #[snafu(display("The log's id counters are behind its recorded ids"))]
    IdCounterError,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changes::{ChangeKind, StructuralChange};
    use crate::history::LocalHistory;
    use crate::tree::EntryKind;

    fn label_change(log: &mut ChangeLog, label: &str) -> Change {
        Change::new(
            log.allocate_change_id(),
            Timestamp::from(1_u64),
            ChangeKind::PutLabel {
                label: label.to_string(),
            },
        )
    }

    #[test]
    fn append_rejects_empty_and_out_of_order_change_sets() {
        let mut log = ChangeLog::new();
        assert!(matches!(
            log.append(None, Timestamp::default(), Vec::new()),
            Err(LogError::EmptyChangeSetError)
        ));

        let first = label_change(&mut log, "first");
        let second = label_change(&mut log, "second");
        log.append(None, Timestamp::default(), vec![second]).unwrap();
        assert!(matches!(
            log.append(None, Timestamp::default(), vec![first]),
            Err(LogError::OutOfOrderError { .. })
        ));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn is_before_follows_insertion_order() {
        let mut history = LocalHistory::default();
        history.create_directory("a").unwrap();
        history.create_directory("b").unwrap();
        history.create_directory("c").unwrap();
        let log = history.log();
        let sets = log.change_sets();
        let first_change = sets[0].changes()[0].id();

        assert!(log.is_before(first_change, &sets[1], false));
        assert!(log.is_before(first_change, &sets[2], false));
        assert!(!log.is_before(first_change, &sets[0], false));
        assert!(log.is_before(first_change, &sets[0], true));
        assert!(log.is_change_set_before(sets[0].id(), sets[2].id(), false));
        assert!(!log.is_change_set_before(sets[2].id(), sets[0].id(), true));
    }

    #[test]
    fn chain_of_an_isolated_change_is_the_change_itself() {
        let mut history = LocalHistory::default();
        let create_a = history.create_file("a.txt", "a").unwrap();
        history.create_file("b.txt", "b").unwrap();
        history.change_file_content("b.txt", "bb").unwrap();

        let chain = history.log().get_chain(create_a).unwrap();
        assert_eq!(chain.ids(), vec![create_a]);
    }

    #[test]
    fn chain_includes_later_changes_to_the_same_entry_transitively() {
        let mut history = LocalHistory::default();
        let create_dir = history.create_directory("src").unwrap();
        let create_file = history.create_file("src/lib.rs", "").unwrap();
        let edit = history.change_file_content("src/lib.rs", "pub mod a;").unwrap();
        let unrelated = history.create_file("README.md", "").unwrap();

        let chain = history.log().get_chain(create_dir).unwrap();
        assert_eq!(chain.ids(), vec![create_dir, create_file, edit]);
        assert!(!chain.contains(unrelated));

        let chain = history.log().get_chain(create_file).unwrap();
        assert_eq!(chain.ids(), vec![create_file, edit]);
    }

    #[test]
    fn chain_ignores_change_sets_before_the_target() {
        let mut history = LocalHistory::default();
        let create = history.create_file("a.txt", "1").unwrap();
        let edit = history.change_file_content("a.txt", "2").unwrap();

        let chain = history.log().get_chain(edit).unwrap();
        assert_eq!(chain.ids(), vec![edit]);
        assert!(!chain.contains(create));
    }

    #[test]
    fn entry_chain_follows_the_entry_through_a_move() {
        let mut history = LocalHistory::default();
        history.create_directory("dir").unwrap();
        let create = history.create_file("file.txt", "").unwrap();
        let since = history.log().last_change_set().unwrap().id();
        let moved = history.move_entry("file.txt", "dir").unwrap();
        history.create_file("other.txt", "").unwrap();

        let id_path = {
            let tree = history.tree();
            let entry = tree.find_by_path("dir/file.txt").unwrap();
            tree.id_path_of(entry.id()).unwrap()
        };
        let chain = history.log().get_entry_chain(&id_path, since).unwrap();
        assert_eq!(chain.ids(), vec![create, moved]);
    }

    #[test]
    fn chain_of_a_file_edited_many_times_is_computed_without_recursion() {
        let mut history = LocalHistory::default();
        let create = history.create_file("a.txt", "0").unwrap();
        for edit in 1..=20_000 {
            history
                .change_file_content("a.txt", edit.to_string())
                .unwrap();
        }

        let chain = history.log().get_chain(create).unwrap();

        assert_eq!(chain.len(), 20_001);
        assert_eq!(chain.ids().first(), Some(&create));
        assert!(chain.ids().windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn accept_walks_newest_first_and_stops_on_request() {
        struct Recorder {
            seen: Vec<ChangeSetId>,
            stop_after: usize,
        }

        impl ChangeVisitor for Recorder {
            type Error = std::convert::Infallible;

            fn begin(&mut self, change_set: &ChangeSet) -> Result<VisitFlow, Self::Error> {
                if self.seen.len() == self.stop_after {
                    return Ok(VisitFlow::Stop);
                }
                self.seen.push(change_set.id());
                Ok(VisitFlow::Continue)
            }
        }

        let mut history = LocalHistory::default();
        for name in ["a", "b", "c", "d"] {
            history.create_directory(name).unwrap();
        }
        let ids = history
            .log()
            .change_sets()
            .iter()
            .map(ChangeSet::id)
            .collect::<Vec<_>>();

        let mut recorder = Recorder {
            seen: Vec::new(),
            stop_after: 2,
        };
        history.log().accept(&mut recorder).unwrap();
        assert_eq!(recorder.seen, vec![ids[3], ids[2]]);
    }

    #[test]
    fn replay_rebuilds_the_recorded_tree() {
        let mut history = LocalHistory::default();
        history.create_directory("src").unwrap();
        history.create_file("src/main.rs", "fn main() {}").unwrap();
        history.rename("src/main.rs", "lib.rs").unwrap();
        history.create_file("tmp.txt", "").unwrap();
        history.delete("tmp.txt").unwrap();

        let replayed = history.log().replay().unwrap();
        assert_eq!(&replayed, history.tree());
        assert_eq!(replayed.paths(), vec!["src", "src/lib.rs"]);
    }

    #[test]
    fn validate_rejects_inconsistent_counters() {
        let mut log = ChangeLog::new();
        let change = Change::new(
            ChangeId::from(7_u64),
            Timestamp::default(),
            ChangeKind::Structural(StructuralChange::Create {
                id_path: IdPath::root().child(crate::tree::EntryId::from(1_u64)),
                name: "x".to_string(),
                kind: EntryKind::Directory,
            }),
        );
        log.append(None, Timestamp::default(), vec![change]).unwrap();
        assert!(log.validate().is_ok());

        log.next_change_id = 3;
        assert!(matches!(log.validate(), Err(LogError::IdCounterError)));
    }
}
