//! Device-side results file.
//!
//! One line per completed loop iteration: `timestamp,source,classification`.
//! The file is only ever appended to.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tokio::io::AsyncWriteExt;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalEntry {
    pub timestamp: String,
    pub source: String,
    pub classification: String,
}

impl LocalEntry {
    pub fn new(timestamp: impl Into<String>, source: impl Into<String>, classification: impl Into<String>) -> Self {
        Self { timestamp: timestamp.into(), source: source.into(), classification: classification.into() }
    }
}

impl fmt::Display for LocalEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.timestamp, self.source, self.classification)
    }
}

impl FromStr for LocalEntry {
    type Err = Error;

    /// the label is the last field, so it may itself contain commas
    fn from_str(line: &str) -> Result<Self> {
        let mut fields = line.trim_end_matches(['\r', '\n']).splitn(3, ',');
        match (fields.next(), fields.next(), fields.next()) {
            (Some(ts), Some(source), Some(label)) if !ts.is_empty() && !source.is_empty() => {
                Ok(LocalEntry::new(ts, source, label))
            }
            _ => Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("malformed local log line: {:?}", line),
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LocalLog {
    path: PathBuf,
}

impl LocalLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, entry: &LocalEntry) -> Result<()> {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(format!("{}\n", entry).as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// every entry in file order; a missing file is an empty log
    pub async fn read_all(&self) -> Result<Vec<LocalEntry>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(str::parse)
            .collect()
    }
}
