use compio::{fs::File, io::AsyncReadExt, io::BufReader};
use hashlink::LinkedHashMap;
use saphyr::{LoadableYamlNode, Scalar, Yaml};
use snafu::prelude::*;
use std::{
    borrow::Cow,
    io::{Cursor, ErrorKind},
    path::{Path, PathBuf},
};
use tracing::{debug, info};

use crate::ext::BestEffortPathExt;

const CONFIG_FILE_NAME: &str = "localhist.yaml";
const DEFAULT_LOG_FILE: &str = ".localhist/changes.bin";

fn get_config_file_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE_NAME)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryConfig {
    log_file: PathBuf,
    ensure_writable: bool,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            log_file: PathBuf::from(DEFAULT_LOG_FILE),
            ensure_writable: true,
        }
    }
}

impl HistoryConfig {
    pub fn new(log_file: impl Into<PathBuf>, ensure_writable: bool) -> Self {
        Self {
            log_file: log_file.into(),
            ensure_writable,
        }
    }

    /// Reads `localhist.yaml` from `root`. A missing file means defaults.
    /// The log file path is resolved against `root`.
    pub async fn read(root: &Path) -> Result<Self, HistoryConfigError> {
        let path = get_config_file_path(root);
        let config = match Self::from_path(&path).await {
            Err(HistoryConfigError::ReadError { source, .. })
                if source.kind() == ErrorKind::NotFound =>
            {
                info!(
                    "No config file at {}, using defaults",
                    path.best_effort_path_display()
                );
                Self::default()
            }
            other => other?,
        };
        Ok(config.resolved_against(root))
    }

    pub async fn from_path(path: &Path) -> Result<Self, HistoryConfigError> {
        debug!("Opening config file: {}", path.best_effort_path_display());
        let file = File::open(path).await.context(ReadSnafu {
            file_path: path.best_effort_path_display(),
        })?;

        let cursor = Cursor::new(file);
        let mut reader = BufReader::new(cursor);
        let res = reader.read_to_string(String::new()).await;
        match res.0 {
            Ok(n) => debug!("Successfully read config file: {n} bytes"),
            _ => {
                res.0.context(ReadSnafu {
                    file_path: path.best_effort_path_display(),
                })?;
            }
        }
        res.1.as_str().try_into()
    }

    pub fn log_file(&self) -> &Path {
        &self.log_file
    }

    pub fn ensure_writable(&self) -> bool {
        self.ensure_writable
    }

    fn resolved_against(self, root: &Path) -> Self {
        Self {
            log_file: root.join(&self.log_file),
            ..self
        }
    }

    fn parse_history_section(
        section: &LinkedHashMap<Yaml, Yaml>,
    ) -> Result<Self, HistoryConfigError> {
        let mut config = Self::default();

        if let Some(value) = section.get(&Yaml::Value(Scalar::String(Cow::Borrowed("logFile")))) {
            let log_file = value.as_str().context(InvalidValueSnafu { key: "logFile" })?;
            config.log_file = PathBuf::from(log_file);
        }

        if let Some(value) =
            section.get(&Yaml::Value(Scalar::String(Cow::Borrowed("ensureWritable"))))
        {
            config.ensure_writable = value.as_bool().context(InvalidValueSnafu {
                key: "ensureWritable",
            })?;
        }

        Ok(config)
    }
}

impl TryFrom<&str> for HistoryConfig {
    type Error = HistoryConfigError;

    fn try_from(contents: &str) -> Result<Self, Self::Error> {
        let contents_vec =
            Yaml::load_from_str(contents).map_err(|e| HistoryConfigError::ParseError { source: e })?;
        let contents = contents_vec
            .first()
            .ok_or(HistoryConfigError::MalformedConfig)?;

        let top_level = contents
            .as_mapping()
            .ok_or(HistoryConfigError::TopLevelNotMap)?;

        match top_level.get(&Yaml::Value(Scalar::String(Cow::Borrowed("history")))) {
            Some(section) => {
                let section = section
                    .as_mapping()
                    .ok_or(HistoryConfigError::HistoryNotMap)?;
                Self::parse_history_section(section)
            }
            None => Ok(Self::default()),
        }
    }
}

#[derive(Debug, Snafu)]
pub enum HistoryConfigError {
    #[snafu(display("Failed to read the config file: {}", file_path))]
    ReadError {
        file_path: String,
        source: std::io::Error,
    },
    #[snafu(display("Failed to parse the config file"))]
    ParseError { source: saphyr::ScanError },
    #[snafu(display("Improperly formatted config file"))]
    MalformedConfig,
    #[snafu(display("Top level of config should be a map"))]
    TopLevelNotMap,
    #[snafu(display("History section should be a map"))]
    HistoryNotMap,
    #[snafu(display("Invalid value for '{}'", key))]
    InvalidValueError { key: &'static str },
}
