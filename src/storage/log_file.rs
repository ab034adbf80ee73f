use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use compio::fs;
use snafu::{ResultExt, Snafu};
use tracing::{debug, info};

use crate::ext::BestEffortPathExt;
use crate::log::{ChangeLog, LogError};

impl ChangeLog {
    /// Reads a log written by [`ChangeLog::write`]. A missing file is an
    /// empty log.
    pub async fn read(path: &Path) -> Result<Self, StorageError> {
        debug!("Reading change log from {}", path.best_effort_path_display());
        let bytes = match fs::read(path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!("No existing change log found, starting fresh");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(StorageError::ReadError {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let (log, _) = bincode::decode_from_slice::<Self, _>(&bytes, bincode::config::standard())
            .context(DecodeSnafu {
                path: path.to_path_buf(),
            })?;
        log.validate().context(InvalidLogSnafu {
            path: path.to_path_buf(),
        })?;

        debug!("Read change log with {} change sets", log.len());
        Ok(log)
    }

    pub async fn write(&self, path: &Path) -> Result<(), StorageError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.context(WriteSnafu {
                path: parent.to_path_buf(),
            })?;
        }

        let bytes = bincode::encode_to_vec(self, bincode::config::standard()).context(EncodeSnafu)?;
        let size = bytes.len();
        fs::write(path, bytes).await.0.context(WriteSnafu {
            path: path.to_path_buf(),
        })?;

        info!(
            "Wrote change log ({size} bytes) to {}",
            path.best_effort_path_display()
        );
        Ok(())
    }
}

#[derive(Debug, Snafu)]
pub enum StorageError {
    #[snafu(display("Failed to read the change log from {}", path.best_effort_path_display()))]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("Failed to write the change log to {}", path.best_effort_path_display()))]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("The change log at {} is corrupted", path.best_effort_path_display()))]
    DecodeError {
        path: PathBuf,
        source: bincode::error::DecodeError,
    },
    #[snafu(display("Failed to encode the change log"))]
    EncodeError {
        source: bincode::error::EncodeError,
    },
    #[snafu(display("The change log at {} is inconsistent", path.best_effort_path_display()))]
    InvalidLogError { path: PathBuf, source: LogError },
}
