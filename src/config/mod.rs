mod history_config;

pub use history_config::{HistoryConfig, HistoryConfigError};
