mod chain_revert;
mod change_reverter;
mod change_set_reverter;
mod entry_history_reverter;
mod reverter;

pub use chain_revert::ChainRevert;
pub use change_reverter::ChangeReverter;
pub use change_set_reverter::ChangeSetReverter;
pub use entry_history_reverter::EntryHistoryReverter;
pub use reverter::{RevertTarget, Reverter, ReverterError, ReverterTrait};
pub(crate) use reverter::{
    AdapterIoSnafu, ApplyConflictSnafu, FileListingSnafu, TargetLookupSnafu,
    UnknownPathSnafu,
};
