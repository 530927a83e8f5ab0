//! Hot-swappable state loaded from a JSON file.
//!
//! Readers take an `Arc` to the current snapshot and keep using it for as long
//! as they like; a reload parses the whole file into a new value and swaps the
//! pointer. A reader therefore sees either the old or the new state, never a
//! mix of both.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;

use super::error::LoadError;

/// State that can be parsed from a watched file.
pub trait SnapshotSource: Sized + Send + Sync + 'static {
    /// Human-readable name used in logs.
    const KIND: &'static str;

    /// Parse the full file contents.
    ///
    /// # Errors
    /// Returns the JSON error if the contents do not match the expected shape.
    fn parse(raw: &[u8]) -> Result<Self, serde_json::Error>;

    /// Number of top-level entries, for logging.
    fn entries(&self) -> usize;
}

pub struct SnapshotFile<T> {
    path: PathBuf,
    current: ArcSwap<T>,
}

impl<T: SnapshotSource> SnapshotFile<T> {
    /// Read `path` once and start serving it.
    ///
    /// # Errors
    /// Returns `LoadError` if the file is missing or malformed.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, LoadError> {
        let path = path.into();
        let snapshot = read_snapshot::<T>(&path)?;
        tracing::info!(
            path = %path.display(),
            entries = snapshot.entries(),
            "Loaded {}",
            T::KIND
        );
        Ok(Self::with_snapshot(path, snapshot))
    }

    /// Serve `snapshot` until the first reload of `path`.
    pub fn with_snapshot(path: impl Into<PathBuf>, snapshot: T) -> Self {
        Self {
            path: path.into(),
            current: ArcSwap::from_pointee(snapshot),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The snapshot in effect right now.
    #[must_use]
    pub fn snapshot(&self) -> Arc<T> {
        self.current.load_full()
    }

    /// Re-read the file and swap it in. On error the current snapshot stays.
    ///
    /// # Errors
    /// Returns `LoadError` if the file is missing or malformed.
    pub fn reload(&self) -> Result<(), LoadError> {
        let next = read_snapshot::<T>(&self.path)?;
        tracing::info!(
            path = %self.path.display(),
            entries = next.entries(),
            "Reloaded {}",
            T::KIND
        );
        self.replace(next);
        Ok(())
    }

    pub fn replace(&self, snapshot: T) {
        self.current.store(Arc::new(snapshot));
    }
}

fn read_snapshot<T: SnapshotSource>(path: &Path) -> Result<T, LoadError> {
    let raw = std::fs::read(path).map_err(|source| LoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    T::parse(&raw).map_err(|source| LoadError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
