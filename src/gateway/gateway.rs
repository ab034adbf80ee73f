use std::collections::HashSet;

use snafu::Snafu;

use crate::tree::Content;

/// Adapter that performs the real storage work behind a revert.
///
/// Paths are the `/`-joined entry names used by [`crate::tree::EntryTree`].
/// Calls may block; the revert engine makes them one at a time and in the
/// same order as it mutates the tree.
pub trait Gateway {
    /// Clears read-only flags. Returns `false` if any file stays read-only.
    fn ensure_files_are_writable(&mut self, files: &[String]) -> bool;

    /// Every real file at or below `path`.
    fn get_all_files_from(&self, path: &str) -> Result<HashSet<String>, GatewayError>;

    fn create_file(&mut self, path: &str, content: &Content) -> Result<(), GatewayError>;

    fn create_directory(&mut self, path: &str) -> Result<(), GatewayError>;

    fn delete(&mut self, path: &str) -> Result<(), GatewayError>;

    fn rename(&mut self, path: &str, new_name: &str) -> Result<(), GatewayError>;

    fn move_entry(&mut self, path: &str, new_parent: &str) -> Result<(), GatewayError>;

    fn write_content(&mut self, path: &str, content: &Content) -> Result<(), GatewayError>;
}

#[derive(Debug, Snafu)]
pub enum GatewayError {
    #[snafu(display("Failed to {operation} '{path}'"))]
    IoError {
        operation: &'static str,
        path: String,
        source: std::io::Error,
    },
}
