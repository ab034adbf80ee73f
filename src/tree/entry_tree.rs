use std::collections::HashMap;

use snafu::{Snafu, ensure};
use tracing::{debug, error};

use crate::tree::{Content, Entry, EntryId, EntryKind, EntrySnapshot, IdPath, ROOT_ENTRY_ID};

/// Joins a parent path and a child name. The root's path is the empty string.
pub fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}

/// Splits a path into its parent path and last name.
pub fn split_path(path: &str) -> Option<(String, String)> {
    let mut names = path_names(path);
    let name = names.pop()?;
    Some((names.join("/"), name.to_string()))
}

fn path_names(path: &str) -> Vec<&str> {
    path.split('/').filter(|name| !name.is_empty()).collect()
}

/// In-memory snapshot of a file hierarchy.
///
/// Entries live in a flat table keyed by id; the parent/child links are ids
/// too, so cloning the tree is a plain deep copy.
#[derive(Debug, Clone)]
pub struct EntryTree {
    entries: HashMap<EntryId, Entry>,
    next_id: u64,
}

impl Default for EntryTree {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for EntryTree {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl Eq for EntryTree {}

impl EntryTree {
    pub fn new() -> Self {
        let root = Entry {
            id: ROOT_ENTRY_ID,
            name: String::new(),
            parent: None,
            children: Vec::new(),
            kind: EntryKind::Directory,
        };
        EntryTree {
            entries: HashMap::from([(ROOT_ENTRY_ID, root)]),
            next_id: ROOT_ENTRY_ID.value() + 1,
        }
    }

    pub fn root_id(&self) -> EntryId {
        ROOT_ENTRY_ID
    }

    pub fn get(&self, id: EntryId) -> Option<&Entry> {
        self.entries.get(&id)
    }

    pub fn contains(&self, id: EntryId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    /// Resolves an id path. Every id must be present and be a child of the
    /// one before it.
    pub fn find_entry(&self, path: &IdPath) -> Option<&Entry> {
        let mut ids = path.ids().iter();
        if ids.next() != Some(&ROOT_ENTRY_ID) {
            return None;
        }

        let mut current = self.entries.get(&ROOT_ENTRY_ID)?;
        for id in ids {
            let next = self.entries.get(id)?;
            if next.parent != Some(current.id) {
                return None;
            }
            current = next;
        }
        Some(current)
    }

    pub fn find_by_path(&self, path: &str) -> Option<&Entry> {
        let mut current = self.entries.get(&ROOT_ENTRY_ID)?;
        for name in path_names(path) {
            current = self.child_named(current.id, name)?;
        }
        Some(current)
    }

    pub fn child_named(&self, parent: EntryId, name: &str) -> Option<&Entry> {
        self.entries
            .get(&parent)?
            .children
            .iter()
            .filter_map(|id| self.entries.get(id))
            .find(|child| child.name == name)
    }

    pub fn id_path_of(&self, id: EntryId) -> Option<IdPath> {
        let mut ids = Vec::new();
        let mut current = self.entries.get(&id)?;
        loop {
            ids.push(current.id);
            match current.parent {
                Some(parent) => current = self.entries.get(&parent)?,
                None => break,
            }
        }
        ids.reverse();
        Some(IdPath::new(ids))
    }

    pub fn path_of(&self, id: EntryId) -> Option<String> {
        let id_path = self.id_path_of(id)?;
        let names = id_path
            .ids()
            .iter()
            .skip(1)
            .map(|id| self.entries.get(id).map(|entry| entry.name.as_str()))
            .collect::<Option<Vec<_>>>()?;
        Some(names.join("/"))
    }

    pub fn require_path(&self, id: EntryId) -> Result<String, TreeError> {
        self.path_of(id).ok_or(TreeError::MissingEntryError { id })
    }

    /// Sorted paths of every entry below the root.
    pub fn paths(&self) -> Vec<String> {
        let mut paths = self
            .entries
            .keys()
            .filter(|id| **id != ROOT_ENTRY_ID)
            .filter_map(|id| self.path_of(*id))
            .collect::<Vec<_>>();
        paths.sort();
        paths
    }

    /// Returns `true` if `ancestor` lies on the parent chain of `id` (or is `id`).
    pub fn is_ancestor(&self, ancestor: EntryId, id: EntryId) -> bool {
        let mut current = Some(id);
        while let Some(current_id) = current {
            if current_id == ancestor {
                return true;
            }
            current = self.entries.get(&current_id).and_then(|e| e.parent);
        }
        false
    }

    pub fn allocate_id(&mut self) -> EntryId {
        let id = EntryId::from(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn insert_child(
        &mut self,
        parent: EntryId,
        id: EntryId,
        name: &str,
        kind: EntryKind,
    ) -> Result<(), TreeError> {
        self.ensure_can_insert(parent, id, name)?;
        self.attach(parent, id, name.to_string(), kind);
        Ok(())
    }

    /// Inserts a whole subtree under `parent`. Nothing is inserted unless the
    /// entire snapshot fits.
    pub fn insert_snapshot(
        &mut self,
        parent: EntryId,
        snapshot: &EntrySnapshot,
    ) -> Result<(), TreeError> {
        self.ensure_can_insert(parent, snapshot.id, &snapshot.name)?;
        for id in snapshot.ids() {
            ensure!(!self.entries.contains_key(&id), DuplicateIdSnafu { id });
        }

        snapshot.walk(&mut |snapshot_parent, node| {
            let parent_id = snapshot_parent.unwrap_or(parent);
            self.attach(parent_id, node.id, node.name.clone(), node.kind.clone());
        });
        debug!(
            "Inserted snapshot of '{}' with {} entries under {}",
            snapshot.name,
            snapshot.ids().len(),
            parent
        );
        Ok(())
    }

    /// Detaches an entry with its descendants and returns them as a snapshot.
    pub fn remove(&mut self, id: EntryId) -> Result<EntrySnapshot, TreeError> {
        ensure!(id != ROOT_ENTRY_ID, RootEntrySnafu { operation: "removed" });
        let snapshot = self.snapshot(id).ok_or(TreeError::MissingEntryError { id })?;

        if let Some(parent) = self.entries.get(&id).and_then(|e| e.parent) {
            if let Some(parent_entry) = self.entries.get_mut(&parent) {
                parent_entry.children.retain(|child| *child != id);
            }
        }
        for removed in snapshot.ids() {
            self.entries.remove(&removed);
        }
        Ok(snapshot)
    }

    pub fn snapshot(&self, id: EntryId) -> Option<EntrySnapshot> {
        // Each frame holds an entry and the snapshots of its children built so far.
        let mut stack = vec![(id, self.entries.get(&id)?, Vec::new())];
        loop {
            let (_, entry, children) = stack.last()?;
            if let Some(&child) = entry.children.get(children.len()) {
                stack.push((child, self.entries.get(&child)?, Vec::new()));
                continue;
            }

            let (id, entry, children) = stack.pop()?;
            let node = EntrySnapshot {
                id,
                name: entry.name.clone(),
                kind: entry.kind.clone(),
                children,
            };
            match stack.last_mut() {
                Some((_, _, siblings)) => siblings.push(node),
                None => return Some(node),
            }
        }
    }

    /// Renames an entry and returns its previous name.
    pub fn rename(&mut self, id: EntryId, new_name: &str) -> Result<String, TreeError> {
        ensure!(id != ROOT_ENTRY_ID, RootEntrySnafu { operation: "renamed" });
        ensure!(
            !new_name.is_empty() && !new_name.contains('/'),
            InvalidNameSnafu { name: new_name }
        );
        let parent = self
            .entries
            .get(&id)
            .ok_or(TreeError::MissingEntryError { id })?
            .parent
            .ok_or(TreeError::MissingEntryError { id })?;
        self.ensure_name_free(parent, new_name, Some(id))?;

        let entry = self
            .entries
            .get_mut(&id)
            .ok_or(TreeError::MissingEntryError { id })?;
        Ok(std::mem::replace(&mut entry.name, new_name.to_string()))
    }

    /// Moves an entry under a new parent and returns the previous parent.
    pub fn reparent(&mut self, id: EntryId, new_parent: EntryId) -> Result<EntryId, TreeError> {
        ensure!(id != ROOT_ENTRY_ID, RootEntrySnafu { operation: "moved" });
        let entry = self
            .entries
            .get(&id)
            .ok_or(TreeError::MissingEntryError { id })?;
        let old_parent = entry.parent.ok_or(TreeError::MissingEntryError { id })?;
        let name = entry.name.clone();

        self.ensure_directory(new_parent)?;
        ensure!(
            !self.is_ancestor(id, new_parent),
            CycleSnafu { id, new_parent }
        );
        self.ensure_name_free(new_parent, &name, Some(id))?;

        if let Some(parent_entry) = self.entries.get_mut(&old_parent) {
            parent_entry.children.retain(|child| *child != id);
        }
        if let Some(parent_entry) = self.entries.get_mut(&new_parent) {
            parent_entry.children.push(id);
        }
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.parent = Some(new_parent);
        }
        Ok(old_parent)
    }

    /// Replaces a file's content and returns the previous content.
    pub fn set_content(&mut self, id: EntryId, content: Content) -> Result<Content, TreeError> {
        let entry = self
            .entries
            .get_mut(&id)
            .ok_or(TreeError::MissingEntryError { id })?;
        match &mut entry.kind {
            EntryKind::File { content: current } => Ok(std::mem::replace(current, content)),
            EntryKind::Directory => NotAFileSnafu { id }.fail(),
        }
    }

    fn ensure_directory(&self, id: EntryId) -> Result<&Entry, TreeError> {
        let entry = self
            .entries
            .get(&id)
            .ok_or(TreeError::MissingEntryError { id })?;
        ensure!(entry.is_directory(), NotADirectorySnafu { id });
        Ok(entry)
    }

    fn ensure_name_free(
        &self,
        parent: EntryId,
        name: &str,
        except: Option<EntryId>,
    ) -> Result<(), TreeError> {
        match self.child_named(parent, name) {
            Some(existing) if Some(existing.id) != except => AlreadyExistsSnafu {
                parent,
                name: name.to_string(),
            }
            .fail(),
            _ => Ok(()),
        }
    }

    fn ensure_can_insert(&self, parent: EntryId, id: EntryId, name: &str) -> Result<(), TreeError> {
        ensure!(!name.is_empty() && !name.contains('/'), InvalidNameSnafu { name });
        self.ensure_directory(parent)?;
        ensure!(!self.entries.contains_key(&id), DuplicateIdSnafu { id });
        self.ensure_name_free(parent, name, None)
    }

    fn attach(&mut self, parent: EntryId, id: EntryId, name: String, kind: EntryKind) {
        match self.entries.get_mut(&parent) {
            Some(parent_entry) => parent_entry.children.push(id),
            None => {
                error!("Assumption that the parent {parent} of {id} exists failed");
                return;
            }
        }
        self.entries.insert(
            id,
            Entry {
                id,
                name,
                parent: Some(parent),
                children: Vec::new(),
                kind,
            },
        );
        self.next_id = self.next_id.max(id.value() + 1);
    }
}

#[derive(Debug, Snafu)]
pub enum TreeError {
    #[snafu(display("Entry {id} does not exist"))]
    MissingEntryError { id: EntryId },
    #[snafu(display("Entry {id} is not a directory"))]
    NotADirectoryError { id: EntryId },
    #[snafu(display("Entry {id} is not a file"))]
    NotAFileError { id: EntryId },
    #[snafu(display("'{name}' already exists in directory {parent}"))]
    AlreadyExistsError { parent: EntryId, name: String },
    #[snafu(display("Entry {id} is already present in the tree"))]
    DuplicateIdError { id: EntryId },
    #[snafu(display("'{name}' is not a valid entry name"))]
    InvalidNameError { name: String },
    #[snafu(display("The root entry cannot be {operation}"))]
    RootEntryError { operation: &'static str },
    #[snafu(display("Moving entry {id} under {new_parent} would make it its own ancestor"))]
    CycleError { id: EntryId, new_parent: EntryId },
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn sample_tree() -> (EntryTree, EntryId, EntryId) {
        let mut tree = EntryTree::new();
        let dir = tree.allocate_id();
        tree.insert_child(ROOT_ENTRY_ID, dir, "src", EntryKind::Directory)
            .unwrap();
        let file = tree.allocate_id();
        tree.insert_child(dir, file, "main.rs", EntryKind::file("fn main() {}"))
            .unwrap();
        (tree, dir, file)
    }

    #[test]
    fn resolves_entries_by_name_and_by_id_path() {
        let (tree, dir, file) = sample_tree();

        assert_eq!(tree.find_by_path("src/main.rs").map(Entry::id), Some(file));
        assert_eq!(tree.path_of(file).as_deref(), Some("src/main.rs"));

        let id_path = tree.id_path_of(file).unwrap();
        assert_eq!(id_path.ids(), &[ROOT_ENTRY_ID, dir, file]);
        assert_eq!(tree.find_entry(&id_path).map(Entry::id), Some(file));
    }

    #[test]
    fn id_path_survives_rename_but_not_move() {
        let (mut tree, dir, file) = sample_tree();
        let id_path = tree.id_path_of(file).unwrap();

        tree.rename(file, "lib.rs").unwrap();
        assert_eq!(tree.find_entry(&id_path).map(Entry::name), Some("lib.rs"));

        tree.reparent(file, ROOT_ENTRY_ID).unwrap();
        assert!(tree.find_entry(&id_path).is_none());
        assert!(tree.get(dir).unwrap().children().is_empty());
    }

    #[test]
    fn deeply_nested_directories_survive_remove_and_reinsert() {
        let mut tree = EntryTree::new();
        let top = tree.allocate_id();
        tree.insert_child(ROOT_ENTRY_ID, top, "d", EntryKind::Directory)
            .unwrap();
        let mut parent = top;
        for _ in 0..5_000 {
            let id = tree.allocate_id();
            tree.insert_child(parent, id, "d", EntryKind::Directory)
                .unwrap();
            parent = id;
        }
        let before = tree.clone();

        let snapshot = tree.remove(top).unwrap();
        assert_eq!(snapshot.ids().len(), 5_001);
        assert_eq!(tree.len(), 1);

        tree.insert_snapshot(ROOT_ENTRY_ID, &snapshot).unwrap();
        assert_eq!(tree, before);
    }

    #[test]
    fn remove_then_insert_snapshot_restores_the_subtree() {
        let (mut tree, dir, _) = sample_tree();
        let before = tree.clone();

        let snapshot = tree.remove(dir).unwrap();
        assert_eq!(tree.paths(), Vec::<String>::new());

        tree.insert_snapshot(ROOT_ENTRY_ID, &snapshot).unwrap();
        assert_eq!(tree, before);
        assert_eq!(tree.paths(), vec!["src", "src/main.rs"]);
    }

    #[test]
    fn insert_snapshot_is_all_or_nothing() {
        let (mut tree, dir, file) = sample_tree();
        let snapshot = EntrySnapshot {
            id: EntryId::from(50_u64),
            name: "docs".to_string(),
            kind: EntryKind::Directory,
            children: vec![EntrySnapshot {
                id: file,
                name: "clash.md".to_string(),
                kind: EntryKind::file(""),
                children: Vec::new(),
            }],
        };

        let result = tree.insert_snapshot(dir, &snapshot);
        assert!(matches!(result, Err(TreeError::DuplicateIdError { .. })));
        assert!(!tree.contains(EntryId::from(50_u64)));
    }

    #[test]
    fn allocated_ids_are_never_reused() {
        let (mut tree, _, file) = sample_tree();
        tree.remove(file).unwrap();
        let next = tree.allocate_id();
        assert!(next > file);
    }

    #[test]
    fn reparent_refuses_to_create_a_cycle() {
        let (mut tree, dir, _) = sample_tree();
        let nested = tree.allocate_id();
        tree.insert_child(dir, nested, "nested", EntryKind::Directory)
            .unwrap();

        let result = tree.reparent(dir, nested);
        assert!(matches!(result, Err(TreeError::CycleError { .. })));
        assert_eq!(tree.path_of(nested).as_deref(), Some("src/nested"));
    }

    #[test]
    fn set_content_returns_previous_content() {
        let (mut tree, dir, file) = sample_tree();
        let old = tree.set_content(file, Content::from("changed")).unwrap();
        assert_eq!(old, Content::from("fn main() {}"));
        assert!(matches!(
            tree.set_content(dir, Content::from("x")),
            Err(TreeError::NotAFileError { .. })
        ));
    }

    #[rstest]
    #[case("main.rs", true)]
    #[case("other.rs", false)]
    fn insert_rejects_taken_names(#[case] name: &str, #[case] taken: bool) {
        let (mut tree, dir, _) = sample_tree();
        let id = tree.allocate_id();
        let result = tree.insert_child(dir, id, name, EntryKind::file(""));
        assert_eq!(
            matches!(result, Err(TreeError::AlreadyExistsError { .. })),
            taken
        );
    }

    #[rstest]
    #[case("", None)]
    #[case("a", Some(("", "a")))]
    #[case("a/b/c", Some(("a/b", "c")))]
    fn split_path_separates_parent_and_name(
        #[case] path: &str,
        #[case] expected: Option<(&str, &str)>,
    ) {
        let expected = expected.map(|(p, n)| (p.to_string(), n.to_string()));
        assert_eq!(split_path(path), expected);
    }

    #[test]
    fn root_cannot_be_removed_or_renamed() {
        let mut tree = EntryTree::new();
        assert!(matches!(
            tree.remove(ROOT_ENTRY_ID),
            Err(TreeError::RootEntryError { .. })
        ));
        assert!(matches!(
            tree.rename(ROOT_ENTRY_ID, "x"),
            Err(TreeError::RootEntryError { .. })
        ));
    }
}
