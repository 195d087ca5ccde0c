//! ==============================================================================
//! store.rs - result store and image store for the ingestion server
//! ==============================================================================
//!
//! on-disk layout (under `storage.data_dir`):
//!
//! ```text
//!     data/
//!     ├── images/             <- one jpeg per accepted upload
//!     │   └── plant_20240101_120000_000000.jpg
//!     └── results.json        <- json array of ResultRecord, 4-space indent
//! ```
//!
//! results.json is rewritten in full on every append. the read-append-write
//! sequence runs under the store's mutex, so two uploads handled at the same
//! time cannot drop each other's record. the file format is unchanged by this.
//!
//! ==============================================================================

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::domain::ResultRecord;
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct ResultStore {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl ResultStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), write_lock: Arc::new(Mutex::new(())) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raw entries in file order. Missing file, bytes that are not json, or
    /// json that is not an array all read as empty.
    async fn load_entries(&self) -> Result<Vec<serde_json::Value>> {
        let content = match tokio::fs::read(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice::<serde_json::Value>(&content) {
            Ok(serde_json::Value::Array(entries)) => Ok(entries),
            Ok(other) => {
                tracing::warn!(
                    "[STORE] {} holds a json {} instead of an array - treating as empty",
                    self.path.display(),
                    json_kind(&other)
                );
                Ok(Vec::new())
            }
            Err(e) => {
                tracing::warn!("[STORE] {} is malformed ({}) - treating as empty", self.path.display(), e);
                Ok(Vec::new())
            }
        }
    }

    /// Records in file order. Entries that don't have the record shape stay
    /// in the file but are left out here.
    pub async fn load(&self) -> Result<Vec<ResultRecord>> {
        let entries = self.load_entries().await?;
        let total = entries.len();
        let records: Vec<ResultRecord> =
            entries.into_iter().filter_map(|entry| serde_json::from_value(entry).ok()).collect();

        if records.len() < total {
            tracing::debug!(
                "[STORE] Skipped {} entries in {} that are not result records",
                total - records.len(),
                self.path.display()
            );
        }
        Ok(records)
    }

    /// Read, push, rewrite; returns the new entry count. Existing entries are
    /// written back exactly as they were read, whatever their shape.
    pub async fn append(&self, record: ResultRecord) -> Result<usize> {
        let _guard = self.write_lock.lock().await;

        let mut entries = self.load_entries().await?;
        entries.push(serde_json::to_value(&record)?);
        // readers never see a half-written file
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, to_pretty_json(&entries)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        tracing::debug!("[STORE] {} now holds {} entries", self.path.display(), entries.len());
        Ok(entries.len())
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

fn to_pretty_json<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut out, formatter);
    value.serialize(&mut ser).map_err(Error::Json)?;
    Ok(out)
}

/// Flat directory of uploaded images.
#[derive(Debug, Clone)]
pub struct ImageStore {
    dir: PathBuf,
}

impl ImageStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn ensure_dir(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    pub fn path_of(&self, filename: &str) -> PathBuf {
        self.dir.join(filename)
    }

    /// Write a new image. `Ok(None)` when the name is already taken; an
    /// existing file is never overwritten.
    pub async fn save_new(&self, filename: &str, bytes: &[u8]) -> Result<Option<PathBuf>> {
        let path = self.path_of(filename);
        let mut file = match tokio::fs::OpenOptions::new().write(true).create_new(true).open(&path).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        file.write_all(bytes).await?;
        file.flush().await?;
        tracing::info!("[STORE] Image saved to {}", path.display());
        Ok(Some(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(n: usize) -> ResultRecord {
        ResultRecord {
            timestamp: format!("2024-01-01T12:00:00.{:06}", n),
            image_filename: format!("plant_20240101_120000_{:06}.jpg", n),
            classification: "Qualidade Padrão".into(),
            processed_by: "remote_server".into(),
        }
    }

    #[tokio::test]
    async fn missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = ResultStore::new(dir.path().join("results.json"));
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.json");
        std::fs::write(&path, "{ not json").unwrap();
        let store = ResultStore::new(&path);
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn non_array_json_is_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.json");
        std::fs::write(&path, r#"{"timestamp": "2024-01-01T12:00:00.000000"}"#).unwrap();
        let store = ResultStore::new(&path);
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn append_keeps_entries_of_any_shape() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.json");
        std::fs::write(
            &path,
            r#"[
    {
        "timestamp": "2023-12-31T08:00:00.000000",
        "image_filename": "plant_20231231_080000_000000.jpg",
        "classification": "Boa"
    },
    {
        "timestamp": "2023-12-31T09:00:00.000000",
        "image_filename": "plant_20231231_090000_000000.jpg",
        "classification": "Excelente",
        "processed_by": "remote_server",
        "note": "manual"
    }
]"#,
        )
        .unwrap();
        let store = ResultStore::new(&path);

        assert_eq!(store.append(record(1)).await.unwrap(), 3);

        let raw: Vec<serde_json::Value> = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw.len(), 3);
        assert_eq!(raw[0]["classification"], "Boa");
        assert!(raw[0].get("processed_by").is_none());
        assert_eq!(raw[1]["note"], "manual");
        assert_eq!(raw[2]["image_filename"], record(1).image_filename);

        // the typed view skips only the entry without processed_by
        let records = store.load().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].classification, "Excelente");
        assert_eq!(records[1], record(1));
    }

    #[tokio::test]
    async fn append_writes_indented_array() {
        let dir = TempDir::new().unwrap();
        let store = ResultStore::new(dir.path().join("results.json"));
        assert_eq!(store.append(record(1)).await.unwrap(), 1);
        assert_eq!(store.append(record(2)).await.unwrap(), 2);

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(raw.starts_with("[\n    {\n        \"timestamp\""));
        assert_eq!(store.load().await.unwrap(), vec![record(1), record(2)]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_appends_are_not_lost() {
        let dir = TempDir::new().unwrap();
        let store = ResultStore::new(dir.path().join("results.json"));

        let handles: Vec<_> = (0..20)
            .map(|n| {
                let store = store.clone();
                tokio::spawn(async move { store.append(record(n)).await })
            })
            .collect();
        for h in handles {
            h.await.unwrap().unwrap();
        }

        let mut names: Vec<_> = store.load().await.unwrap().into_iter().map(|r| r.image_filename).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 20);
    }

    #[tokio::test]
    async fn images_are_never_overwritten() {
        let dir = TempDir::new().unwrap();
        let images = ImageStore::new(dir.path().join("images"));
        images.ensure_dir().await.unwrap();
        let path = images.save_new("plant_x.jpg", b"\xFF\xD8data").await.unwrap().unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"\xFF\xD8data");

        // second write under the same name is refused, content untouched
        assert!(images.save_new("plant_x.jpg", b"other").await.unwrap().is_none());
        assert_eq!(std::fs::read(images.path_of("plant_x.jpg")).unwrap(), b"\xFF\xD8data");
    }
}
