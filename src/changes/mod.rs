mod change;
mod change_set;
mod structural_change;

pub use change::{Change, ChangeId, ChangeKind, ChangeSetId, Timestamp};
pub use change_set::ChangeSet;
pub use structural_change::{ChangeError, Conflict, StructuralChange};
