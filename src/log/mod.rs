mod chain;
mod change_log;

pub use chain::Chain;
pub use change_log::{ChangeLog, LogError};
