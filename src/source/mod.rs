//! Producers of raw snapshots.

mod demo;
mod file;

use std::path::PathBuf;

use thiserror::Error;

use crate::topology::{RawSnapshot, SnapshotError};

pub use demo::{DemoConfig, DemoSource};
pub use file::FileSource;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read snapshots from {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path} is not valid JSON")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{0} holds no snapshots")]
    Empty(PathBuf),
    /// The item could be read but is not shaped like a snapshot.
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error("no more snapshots")]
    Exhausted,
    #[error("{source_name} does not support {operation}")]
    Unsupported {
        source_name: String,
        operation: &'static str,
    },
}

/// Anything that can hand the viewer one snapshot at a time. Sources move
/// between the UI thread and the loader thread, hence `Send`.
pub trait SnapshotSource: Send {
    fn name(&self) -> &str;

    /// The next snapshot in order; [`SourceError::Exhausted`] once there is
    /// none left.
    fn next_snapshot(&mut self) -> Result<RawSnapshot, SourceError>;

    /// Rewinds to the initial state and returns its snapshot.
    fn reset(&mut self) -> Result<RawSnapshot, SourceError>;

    /// Injects a traffic surge and returns the resulting snapshot.
    fn burst(&mut self) -> Result<RawSnapshot, SourceError> {
        Err(SourceError::Unsupported {
            source_name: self.name().to_owned(),
            operation: "traffic bursts",
        })
    }
}
