mod local_history;

pub use local_history::{HistoryError, LocalHistory};
