//! Served-file inventory and space accounting.
//!
//! The inventory is owned by the dispatcher task alone. Transfer workers
//! only ever see snapshots (a destination path and a byte count), so none
//! of this needs locking.

use std::io::ErrorKind;
use std::path::Path;

use tracing::{debug, warn};

use muster_proto::{NodeError, NodeResult};

/// One served file.
#[derive(Debug, Clone)]
pub struct FileRecord {
    /// File name without directory components. Unique within the
    /// inventory and never contains `/`.
    pub basename: String,
    /// Size in bytes at index time, or the announced size for uploads.
    pub size: u64,
}

/// The list of served files plus the space accounting.
///
/// Invariants: at most one of `available_space` and `negative_space` is
/// nonzero, and the record sizes plus available space minus negative
/// space always equal the configured maximum.
#[derive(Debug)]
pub struct Inventory {
    records: Vec<FileRecord>,
    available_space: u64,
    negative_space: u64,
}

impl Inventory {
    /// Enumerate regular files at the top level of `dir` and set up the
    /// space accounting against `max_space`. Nested directories and
    /// non-regular entries are ignored.
    pub fn index(dir: &Path, max_space: u64) -> NodeResult<Self> {
        if !dir.is_dir() {
            return Err(NodeError::BadSharedFolder(dir.display().to_string()));
        }

        let mut inv = Self {
            records: Vec::new(),
            available_space: max_space,
            negative_space: 0,
        };

        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let basename = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(name) => {
                    warn!("skipping non-UTF-8 file name {:?}", name);
                    continue;
                }
            };
            let size = entry.metadata()?.len();
            inv.charge(size);
            inv.records.push(FileRecord { basename, size });
        }

        debug!(
            "indexed {} files: {} bytes available, {} bytes over",
            inv.records.len(),
            inv.available_space,
            inv.negative_space
        );
        Ok(inv)
    }

    pub fn available_space(&self) -> u64 {
        self.available_space
    }

    pub fn negative_space(&self) -> u64 {
        self.negative_space
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Exact basename match.
    pub fn find(&self, basename: &str) -> Option<&FileRecord> {
        self.records.iter().find(|r| r.basename == basename)
    }

    /// Every basename containing `pattern` as a contiguous substring, in
    /// insertion order. An empty pattern matches all.
    pub fn search(&self, pattern: &str) -> Vec<&str> {
        self.records
            .iter()
            .filter(|r| r.basename.contains(pattern))
            .map(|r| r.basename.as_str())
            .collect()
    }

    /// Remove `basename`: unlink its file under `dir` and credit the
    /// recorded size back. Absent basenames are a no-op, and so is a
    /// record whose on-disk file already vanished.
    pub fn remove(&mut self, dir: &Path, basename: &str) {
        let Some(pos) = self.records.iter().position(|r| r.basename == basename) else {
            return;
        };
        let record = self.records.remove(pos);
        self.credit(record.size);

        let path = dir.join(&record.basename);
        match std::fs::remove_file(&path) {
            Ok(()) => debug!("removed {}", path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("failed to remove {}: {}", path.display(), e),
        }
    }

    /// Debit `size` for an incoming upload. Succeeds only when the whole
    /// amount fits in the available space.
    pub fn reserve(&mut self, size: u64) -> bool {
        if self.available_space >= size {
            self.available_space -= size;
            true
        } else {
            false
        }
    }

    /// Add the record for a reserved upload that has not been written yet.
    pub fn register_basename(&mut self, basename: String, size: u64) {
        self.records.push(FileRecord { basename, size });
    }

    /// Debit `size` from available space, spilling the overflow into
    /// negative space.
    fn charge(&mut self, size: u64) {
        if self.available_space >= size {
            self.available_space -= size;
        } else {
            self.negative_space += size - self.available_space;
            self.available_space = 0;
        }
    }

    /// Credit `size` bytes back, consuming negative space first.
    fn credit(&mut self, size: u64) {
        if self.negative_space >= size {
            self.negative_space -= size;
        } else {
            self.available_space += size - self.negative_space;
            self.negative_space = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(name);
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn assert_invariants(inv: &Inventory, max_space: u64) {
        assert!(inv.available_space() == 0 || inv.negative_space() == 0);
        let total: u64 = inv.records.iter().map(|r| r.size).sum();
        assert_eq!(
            total + inv.available_space() - inv.negative_space(),
            max_space
        );
        for record in &inv.records {
            assert!(!record.basename.is_empty());
            assert!(!record.basename.contains('/'));
        }
    }

    #[test]
    fn test_index_counts_regular_files_only() {
        let dir = scratch_dir("muster_test_inv_index");
        std::fs::write(dir.join("a.txt"), b"12345").unwrap();
        std::fs::write(dir.join("b.txt"), b"123").unwrap();
        std::fs::create_dir(dir.join("nested")).unwrap();
        std::fs::write(dir.join("nested").join("c.txt"), b"ignored").unwrap();

        let inv = Inventory::index(&dir, 100).unwrap();
        assert_eq!(inv.len(), 2);
        assert_eq!(inv.available_space(), 92);
        assert_eq!(inv.negative_space(), 0);
        assert_invariants(&inv, 100);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_index_overflow_goes_negative() {
        let dir = scratch_dir("muster_test_inv_overflow");
        std::fs::write(dir.join("big.bin"), vec![0u8; 30]).unwrap();

        let inv = Inventory::index(&dir, 10).unwrap();
        assert_eq!(inv.available_space(), 0);
        assert_eq!(inv.negative_space(), 20);
        assert_invariants(&inv, 10);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_index_rejects_missing_dir() {
        let missing = std::env::temp_dir().join("muster_test_inv_no_such_dir");
        let _ = std::fs::remove_dir_all(&missing);
        assert!(matches!(
            Inventory::index(&missing, 100).unwrap_err(),
            NodeError::BadSharedFolder(_)
        ));
    }

    #[test]
    fn test_search_substring_and_empty_pattern() {
        let dir = scratch_dir("muster_test_inv_search");
        for name in ["notes.txt", "note.md", "song.mp3"] {
            std::fs::write(dir.join(name), b"x").unwrap();
        }

        let mut inv = Inventory::index(&dir, 100).unwrap();
        // Insertion order comes from the directory scan; rebuild it
        // deterministically for the assertions below.
        inv.records.sort_by(|a, b| a.basename.cmp(&b.basename));

        assert_eq!(inv.search("note"), vec!["note.md", "notes.txt"]);
        assert_eq!(inv.search("mp3"), vec!["song.mp3"]);
        assert_eq!(inv.search(""), vec!["note.md", "notes.txt", "song.mp3"]);
        assert!(inv.search("zzz").is_empty());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_remove_credits_negative_space_first() {
        let dir = scratch_dir("muster_test_inv_credit");
        std::fs::write(dir.join("a.bin"), vec![0u8; 30]).unwrap();
        std::fs::write(dir.join("b.bin"), vec![0u8; 30]).unwrap();

        // 60 bytes indexed against a 50-byte maximum: 10 bytes over
        let mut inv = Inventory::index(&dir, 50).unwrap();
        assert_eq!(inv.negative_space(), 10);

        inv.remove(&dir, "a.bin");
        assert_eq!(inv.negative_space(), 0);
        assert_eq!(inv.available_space(), 20);
        assert!(!dir.join("a.bin").exists());
        assert_invariants(&inv, 50);

        inv.remove(&dir, "b.bin");
        assert_eq!(inv.available_space(), 50);
        assert_invariants(&inv, 50);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let dir = scratch_dir("muster_test_inv_remove_absent");
        std::fs::write(dir.join("a.txt"), b"12345").unwrap();

        let mut inv = Inventory::index(&dir, 100).unwrap();
        inv.remove(&dir, "no-such-file");
        assert_eq!(inv.len(), 1);
        assert_eq!(inv.available_space(), 95);
        assert_invariants(&inv, 100);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_remove_tolerates_vanished_file() {
        let dir = scratch_dir("muster_test_inv_remove_vanished");
        std::fs::write(dir.join("gone.txt"), b"12345").unwrap();

        let mut inv = Inventory::index(&dir, 100).unwrap();
        std::fs::remove_file(dir.join("gone.txt")).unwrap();

        inv.remove(&dir, "gone.txt");
        assert_eq!(inv.len(), 0);
        assert_eq!(inv.available_space(), 100);
        assert_invariants(&inv, 100);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_reserve_boundary() {
        let dir = scratch_dir("muster_test_inv_reserve");
        let mut inv = Inventory::index(&dir, 100).unwrap();

        assert!(!inv.reserve(101));
        assert_eq!(inv.available_space(), 100);

        assert!(inv.reserve(100));
        assert_eq!(inv.available_space(), 0);

        assert!(inv.reserve(0));
        assert!(!inv.reserve(1));

        inv.register_basename("upload.bin".to_string(), 100);
        assert_invariants(&inv, 100);
        assert!(inv.find("upload.bin").is_some());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
