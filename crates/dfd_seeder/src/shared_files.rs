//! The peer's table of locally-shared files (spec §5, "Shared-files
//! map"): read by every seeder connection, mutated only by the command
//! handler (`index`/`remove` commands). Modeled as an immutable
//! snapshot behind a mutex with copy-on-write updates, so a seeder
//! holds the lock only long enough to clone the `Arc` and never reads
//! through it while contended.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use dfd_core::FileId;
use parking_lot::Mutex;

#[derive(Debug, Clone)]
pub struct SharedFile {
    pub path: PathBuf,
    pub size: u64,
    /// The base name handed to peers in `DOWNLOAD_CONFIRM`.
    pub name: String,
}

#[derive(Default)]
pub struct SharedFiles {
    inner: Mutex<Arc<HashMap<FileId, SharedFile>>>,
}

impl SharedFiles {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Arc::new(HashMap::new())),
        }
    }

    /// A cheap, point-in-time snapshot for a seeder task to read from
    /// without holding the lock across an await.
    pub fn snapshot(&self) -> Arc<HashMap<FileId, SharedFile>> {
        self.inner.lock().clone()
    }

    pub fn insert(&self, file_id: FileId, entry: SharedFile) {
        let mut guard = self.inner.lock();
        let mut next = HashMap::clone(&guard);
        next.insert(file_id, entry);
        *guard = Arc::new(next);
    }

    /// Returns `true` if the file was present and removed.
    pub fn remove(&self, file_id: FileId) -> bool {
        let mut guard = self.inner.lock();
        if !guard.contains_key(&file_id) {
            return false;
        }
        let mut next = HashMap::clone(&guard);
        next.remove(&file_id);
        *guard = Arc::new(next);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_snapshot_sees_the_entry() {
        let files = SharedFiles::new();
        files.insert(
            FileId::new(1),
            SharedFile {
                path: "/tmp/a".into(),
                size: 10,
                name: "a".into(),
            },
        );
        assert_eq!(files.snapshot().len(), 1);
    }

    #[test]
    fn remove_unknown_is_noop() {
        let files = SharedFiles::new();
        assert!(!files.remove(FileId::new(1)));
    }

    #[test]
    fn old_snapshots_are_unaffected_by_later_writes() {
        let files = SharedFiles::new();
        files.insert(
            FileId::new(1),
            SharedFile {
                path: "/tmp/a".into(),
                size: 1,
                name: "a".into(),
            },
        );
        let snap = files.snapshot();
        files.remove(FileId::new(1));
        assert_eq!(snap.len(), 1);
        assert_eq!(files.snapshot().len(), 0);
    }
}
