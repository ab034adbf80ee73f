//! On-disk form of the change log.

mod log_file;

pub use log_file::StorageError;
