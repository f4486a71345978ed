use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

use log::{debug, trace};

use super::loader::{load_file, TableSchema};
use super::model::LoadedTable;
use crate::error::{DashboardError, Result};

// ---------------------------------------------------------------------------
// FileCache – memoised loads keyed by path and schema
// ---------------------------------------------------------------------------

struct CacheEntry {
    modified: Option<SystemTime>,
    loaded: Arc<LoadedTable>,
}

/// Memoised table loads.
///
/// An entry is reused while the file's modification time is unchanged and
/// re-read otherwise. Cached tables are immutable and shared via `Arc`.
#[derive(Default)]
pub struct FileCache {
    entries: Mutex<HashMap<(PathBuf, String), CacheEntry>>,
}

impl FileCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached table for `path`, loading it when absent or stale.
    pub fn get_or_load(&self, path: &Path, schema: &TableSchema) -> Result<Arc<LoadedTable>> {
        let modified = std::fs::metadata(path)
            .map_err(|e| DashboardError::unavailable(path, e))?
            .modified()
            .ok();
        let key = (canonical(path), schema.fingerprint());

        {
            let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(entry) = entries.get(&key) {
                if entry.modified.is_some() && entry.modified == modified {
                    trace!("cache hit for {}", path.display());
                    return Ok(Arc::clone(&entry.loaded));
                }
                debug!("{} changed on disk, reloading", path.display());
            }
        }

        let loaded = Arc::new(load_file(path, schema)?);
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                key,
                CacheEntry {
                    modified,
                    loaded: Arc::clone(&loaded),
                },
            );
        Ok(loaded)
    }

    /// Forget every entry loaded from `path`.
    pub fn invalidate(&self, path: &Path) {
        let path = canonical(path);
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(p, _), _| *p != path);
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Canonical form of `path` for cache keys; the raw path when it cannot be
/// resolved, so the loader still reports the missing file.
fn canonical(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
