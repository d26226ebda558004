use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use super::{SnapshotSource, SourceError};
use crate::topology::{RawSnapshot, SnapshotError};

/// Replays snapshots from a JSON file holding either one snapshot object or
/// an array of them.
pub struct FileSource {
    path: PathBuf,
    name: String,
    items: Vec<Value>,
    cursor: usize,
}

impl FileSource {
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let raw = fs::read_to_string(path).map_err(|source| SourceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let value: Value = serde_json::from_str(&raw).map_err(|source| SourceError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        let items = match value {
            Value::Array(items) => items,
            single => vec![single],
        };
        if items.is_empty() {
            return Err(SourceError::Empty(path.to_path_buf()));
        }

        debug!(path = %path.display(), count = items.len(), "snapshot file loaded");
        Ok(Self {
            name: format!("file {}", path.display()),
            path: path.to_path_buf(),
            items,
            cursor: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.items.len() - self.cursor
    }

    fn take(&mut self, index: usize) -> Result<RawSnapshot, SourceError> {
        let item = self.items.get(index).cloned().ok_or(SourceError::Exhausted)?;
        self.cursor = index + 1;
        serde_json::from_value(item)
            .map_err(SnapshotError::from)
            .map_err(SourceError::from)
    }
}

impl SnapshotSource for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn next_snapshot(&mut self) -> Result<RawSnapshot, SourceError> {
        self.take(self.cursor)
    }

    fn reset(&mut self) -> Result<RawSnapshot, SourceError> {
        self.take(0)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    fn write(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    const SNAPSHOT: &str = r#"{"nodes": [{"id": "S0", "type": "server"}], "links": [], "containers": {}}"#;

    #[test]
    fn single_object_is_one_snapshot() {
        let file = write(SNAPSHOT);
        let mut source = FileSource::open(file.path()).unwrap();
        assert_eq!(source.len(), 1);
        assert!(source.next_snapshot().unwrap().nodes.is_some());
        assert!(matches!(source.next_snapshot(), Err(SourceError::Exhausted)));
    }

    #[test]
    fn arrays_replay_in_order_and_rewind() {
        let file = write(&format!(
            r#"[{SNAPSHOT}, {{"nodes": [], "links": [], "step": 7}}]"#
        ));
        let mut source = FileSource::open(file.path()).unwrap();
        assert_eq!(source.next_snapshot().unwrap().step, None);
        assert_eq!(source.next_snapshot().unwrap().step, Some(7));
        assert_eq!(source.remaining(), 0);

        assert_eq!(source.reset().unwrap().step, None);
        assert_eq!(source.remaining(), 1);
        assert!(matches!(source.burst(), Err(SourceError::Unsupported { .. })));
    }

    #[test]
    fn malformed_items_are_reported_and_skipped() {
        let file = write(&format!(r#"[42, {SNAPSHOT}]"#));
        let mut source = FileSource::open(file.path()).unwrap();
        assert!(matches!(source.next_snapshot(), Err(SourceError::Snapshot(_))));
        assert!(source.next_snapshot().is_ok());
    }

    #[test]
    fn unreadable_files_fail_to_open() {
        assert!(matches!(
            FileSource::open(Path::new("/definitely/not/here.json")),
            Err(SourceError::Io { .. })
        ));
        let file = write("[]");
        assert!(matches!(
            FileSource::open(file.path()),
            Err(SourceError::Empty(_))
        ));
        let file = write("{");
        assert!(matches!(
            FileSource::open(file.path()),
            Err(SourceError::Json { .. })
        ));
    }
}
