//! Baseline persistence: the last observed snapshot as a JSON file.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::types::{PersistenceError, PersistenceResult, Snapshot};

/// Loads and stores the snapshot used as "previous" in the next comparison.
pub trait BaselineStore {
    /// Load the stored baseline. A store with nothing in it yields an empty snapshot.
    fn load_baseline(&self) -> PersistenceResult<Snapshot>;
    /// Replace the stored baseline.
    fn store_baseline(&self, snapshot: &Snapshot) -> PersistenceResult<()>;
}

/// Baseline kept as pretty-printed JSON keyed by member name.
///
/// Writes go to `<file>.tmp` first and are renamed over the target, so a
/// crash mid-write leaves the previous baseline intact.
#[derive(Debug, Clone)]
pub struct JsonBaselineStore {
    path: PathBuf,
}

impl JsonBaselineStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serialize a snapshot to any writer.
    pub fn write_to<W: Write>(snapshot: &Snapshot, writer: &mut W) -> serde_json::Result<()> {
        serde_json::to_writer_pretty(writer, snapshot)
    }

    /// Deserialize a snapshot from any reader.
    pub fn read_from<R: Read>(reader: &mut R) -> serde_json::Result<Snapshot> {
        serde_json::from_reader(reader)
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }

    fn io_err(&self, source: std::io::Error) -> PersistenceError {
        PersistenceError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }

    fn json_err(&self, source: serde_json::Error) -> PersistenceError {
        PersistenceError::Json {
            path: self.path.display().to_string(),
            source,
        }
    }
}

impl BaselineStore for JsonBaselineStore {
    fn load_baseline(&self) -> PersistenceResult<Snapshot> {
        let mut file = match std::fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No baseline at {}, starting empty", self.path.display());
                return Ok(Snapshot::new());
            }
            Err(e) => return Err(self.io_err(e)),
        };

        let mut raw = String::new();
        file.read_to_string(&mut raw).map_err(|e| self.io_err(e))?;
        if raw.trim().is_empty() {
            return Ok(Snapshot::new());
        }

        let snapshot = Self::read_from(&mut raw.as_bytes()).map_err(|e| self.json_err(e))?;
        tracing::debug!(
            "Loaded baseline with {} members from {}",
            snapshot.len(),
            self.path.display()
        );
        Ok(snapshot)
    }

    fn store_baseline(&self, snapshot: &Snapshot) -> PersistenceResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
            }
        }

        let tmp = self.tmp_path();
        let mut buf = Vec::new();
        Self::write_to(snapshot, &mut buf).map_err(|e| self.json_err(e))?;
        buf.push(b'\n');

        std::fs::write(&tmp, &buf).map_err(|e| self.io_err(e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| self.io_err(e))?;

        tracing::debug!(
            "Stored baseline with {} members to {}",
            snapshot.len(),
            self.path.display()
        );
        Ok(())
    }
}
