use std::collections::HashSet;
use std::io;

use crate::gateway::{Gateway, GatewayError};
use crate::tree::Content;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum GatewayCall {
    EnsureWritable(Vec<String>),
    CreateFile(String, Content),
    CreateDirectory(String),
    Delete(String),
    Rename(String, String),
    Move(String, String),
    WriteContent(String, Content),
}

/// Records every call instead of touching storage.
#[derive(Debug, Default)]
pub(crate) struct RecordingGateway {
    pub calls: Vec<GatewayCall>,
    pub read_only: HashSet<String>,
    pub fail_on_path: Option<String>,
    pub fail_listing: bool,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mutations(&self) -> Vec<&GatewayCall> {
        self.calls
            .iter()
            .filter(|call| !matches!(call, GatewayCall::EnsureWritable(_)))
            .collect()
    }

    fn record(
        &mut self,
        operation: &'static str,
        path: &str,
        call: GatewayCall,
    ) -> Result<(), GatewayError> {
        if self.fail_on_path.as_deref() == Some(path) {
            return Err(GatewayError::IoError {
                operation,
                path: path.to_string(),
                source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
            });
        }
        self.calls.push(call);
        Ok(())
    }
}

impl Gateway for RecordingGateway {
    fn ensure_files_are_writable(&mut self, files: &[String]) -> bool {
        let mut sorted = files.to_vec();
        sorted.sort();
        self.calls.push(GatewayCall::EnsureWritable(sorted));
        files.iter().all(|file| !self.read_only.contains(file))
    }

    fn get_all_files_from(&self, path: &str) -> Result<HashSet<String>, GatewayError> {
        if self.fail_listing {
            return Err(GatewayError::IoError {
                operation: "list",
                path: path.to_string(),
                source: io::Error::other("listing failed"),
            });
        }
        Ok(HashSet::from([path.to_string()]))
    }

    fn create_file(&mut self, path: &str, content: &Content) -> Result<(), GatewayError> {
        self.record(
            "create",
            path,
            GatewayCall::CreateFile(path.to_string(), content.clone()),
        )
    }

    fn create_directory(&mut self, path: &str) -> Result<(), GatewayError> {
        self.record(
            "create directory",
            path,
            GatewayCall::CreateDirectory(path.to_string()),
        )
    }

    fn delete(&mut self, path: &str) -> Result<(), GatewayError> {
        self.record("delete", path, GatewayCall::Delete(path.to_string()))
    }

    fn rename(&mut self, path: &str, new_name: &str) -> Result<(), GatewayError> {
        self.record(
            "rename",
            path,
            GatewayCall::Rename(path.to_string(), new_name.to_string()),
        )
    }

    fn move_entry(&mut self, path: &str, new_parent: &str) -> Result<(), GatewayError> {
        self.record(
            "move",
            path,
            GatewayCall::Move(path.to_string(), new_parent.to_string()),
        )
    }

    fn write_content(&mut self, path: &str, content: &Content) -> Result<(), GatewayError> {
        self.record(
            "write",
            path,
            GatewayCall::WriteContent(path.to_string(), content.clone()),
        )
    }
}
