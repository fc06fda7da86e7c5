//! LRU-bounded map of `File`s, enforcing a global memory byte budget and
//! orchestrating disk spill (spec §4.C).

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::SystemTime;

use log::{debug, warn};
use parking_lot::Mutex;

use super::file::{File, Range};
use crate::errors::QsfsError;

struct Entry {
    file: File,
    /// Number of open host-visible file handles referencing this key; while
    /// nonzero the entry can never be evicted (spec §3 Cache invariants).
    open_count: u32,
}

struct Inner {
    /// Most-recently-used key first.
    order: Vec<String>,
    entries: HashMap<String, Entry>,
    /// Sum of `cached_size` over all entries.
    size: u64,
}

impl Inner {
    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            let k = self.order.remove(pos);
            self.order.insert(0, k);
        } else {
            self.order.insert(0, key.to_string());
        }
    }

    fn recompute_size(&mut self) {
        self.size = self.entries.values().map(|e| e.file.cached_size()).sum();
    }
}

/// The page cache: one `File` per object-store key, bounded by `capacity`
/// bytes of memory residency, with disk fallback for overflow.
pub struct Cache {
    inner: Mutex<Inner>,
    capacity: u64,
    disk_dir: Option<PathBuf>,
}

impl Cache {
    pub fn new(capacity: u64, disk_dir: Option<PathBuf>) -> Self {
        Cache {
            inner: Mutex::new(Inner {
                order: Vec::new(),
                entries: HashMap::new(),
                size: 0,
            }),
            capacity,
            disk_dir,
        }
    }

    pub fn size(&self) -> u64 {
        self.inner.lock().size
    }

    pub fn has_file(&self, key: &str) -> bool {
        self.inner.lock().entries.contains_key(key)
    }

    /// Probe the disk-cache directory's free space before committing to a
    /// disk-backed spill (spec §4.C "sanity probe").
    fn is_safe_disk_space(&self, needed: u64) -> bool {
        let Some(dir) = &self.disk_dir else {
            return false;
        };
        match nix::sys::statvfs::statvfs(dir) {
            Ok(stat) => {
                let free = stat.blocks_available() as u64 * stat.fragment_size();
                free > needed
            }
            Err(e) => {
                warn!("statvfs({}) failed: {e}", dir.display());
                false
            }
        }
    }

    /// Evict least-recently-used files (skipping `key_to_spare` and any open
    /// file) until at least `bytes_needed` bytes of headroom exist under
    /// `capacity`, or report failure.
    pub fn free(&self, bytes_needed: u64, key_to_spare: &str) -> bool {
        let mut inner = self.inner.lock();
        if inner.size + bytes_needed <= self.capacity {
            return true;
        }
        let candidates: Vec<String> = inner.order.iter().rev().cloned().collect();
        for key in candidates {
            if inner.size + bytes_needed <= self.capacity {
                break;
            }
            if key == key_to_spare {
                continue;
            }
            let Some(entry) = inner.entries.get(&key) else {
                continue;
            };
            if entry.open_count > 0 {
                continue;
            }
            inner.entries.remove(&key);
            inner.order.retain(|k| k != &key);
            debug!("evicted {key} from cache");
        }
        inner.recompute_size();
        inner.size + bytes_needed <= self.capacity
    }

    fn ensure_entry<'a>(inner: &'a mut Inner, key: &str) -> &'a mut Entry {
        inner.entries.entry(key.to_string()).or_insert_with(|| Entry {
            file: File::new(key),
            open_count: 0,
        })
    }

    /// Read `[offset, len)` from `key`, reporting which sub-ranges were not
    /// resident so the caller (`Drive`) can fetch them through the transfer
    /// engine and write them back via [`Cache::write`].
    pub fn read(&self, key: &str, offset: u64, len: u64, out: &mut [u8]) -> Result<(u64, Vec<Range>), QsfsError> {
        let mut inner = self.inner.lock();
        inner.touch(key);
        let entry = Self::ensure_entry(&mut inner, key);
        let available = entry.file.read(offset, len, out)?;
        let (_, _, missing) = entry.file.read_ranges(offset, len);
        Ok((available, missing))
    }

    pub fn has_file_data(&self, key: &str, offset: u64, len: u64) -> bool {
        let mut inner = self.inner.lock();
        let entry = Self::ensure_entry(&mut inner, key);
        entry.file.has_data(offset, len)
    }

    pub fn get_unloaded_ranges(&self, key: &str, total_size: u64) -> Vec<Range> {
        let mut inner = self.inner.lock();
        let entry = Self::ensure_entry(&mut inner, key);
        entry.file.unloaded_ranges(total_size)
    }

    /// Write `data` into `key` at `offset`, spilling to disk (or failing)
    /// when the write would push the cache past `capacity`.
    pub fn write(&self, key: &str, offset: u64, data: &[u8], mtime: SystemTime) -> Result<(), QsfsError> {
        let needed = data.len() as u64;
        if !self.free(needed, key) {
            let mut inner = self.inner.lock();
            let disk_backed_already = inner
                .entries
                .get(key)
                .map(|e| e.file.is_disk_backed())
                .unwrap_or(false);
            drop(inner);
            if !disk_backed_already {
                if !self.is_safe_disk_space(needed) {
                    return Err(QsfsError::OutOfSpace);
                }
                let Some(dir) = self.disk_dir.clone() else {
                    return Err(QsfsError::OutOfSpace);
                };
                let mut inner = self.inner.lock();
                inner.touch(key);
                let entry = Self::ensure_entry(&mut inner, key);
                entry.file.set_disk_backed(dir);
            }
        }

        let mut inner = self.inner.lock();
        inner.touch(key);
        let entry = Self::ensure_entry(&mut inner, key);
        entry.file.write(offset, data, mtime)?;
        inner.recompute_size();
        Ok(())
    }

    pub fn resize(&self, key: &str, new_size: u64, mtime: SystemTime) -> Result<(), QsfsError> {
        let mut inner = self.inner.lock();
        inner.touch(key);
        let entry = Self::ensure_entry(&mut inner, key);
        entry.file.resize(new_size)?;
        entry.file.set_mtime(mtime);
        inner.recompute_size();
        Ok(())
    }

    pub fn set_time(&self, key: &str, mtime: SystemTime) {
        let mut inner = self.inner.lock();
        if let Some(entry) = inner.entries.get_mut(key) {
            entry.file.set_mtime(mtime);
        }
    }

    pub fn set_file_open(&self, key: &str, open: bool) {
        let mut inner = self.inner.lock();
        let entry = Self::ensure_entry(&mut inner, key);
        if open {
            entry.open_count += 1;
        } else {
            entry.open_count = entry.open_count.saturating_sub(1);
        }
    }

    pub fn rename(&self, old_key: &str, new_key: &str) {
        let mut inner = self.inner.lock();
        if let Some(entry) = inner.entries.remove(old_key) {
            inner.entries.insert(new_key.to_string(), entry);
        }
        for k in inner.order.iter_mut() {
            if k == old_key {
                *k = new_key.to_string();
            }
        }
    }

    pub fn erase(&self, key: &str) {
        let mut inner = self.inner.lock();
        inner.entries.remove(key);
        inner.order.retain(|k| k != key);
        inner.recompute_size();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn t(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn lru_eviction_respects_capacity_and_open_files() {
        let cache = Cache::new(100, None);

        cache.write("/a", 0, &vec![0u8; 60], t(1)).unwrap();
        assert!(cache.has_file("/a"));
        assert_eq!(cache.size(), 60);

        // second write evicts /a to make room under the 100 B budget
        cache.write("/b", 0, &vec![0u8; 60], t(2)).unwrap();
        assert!(!cache.has_file("/a"));
        assert!(cache.has_file("/b"));
        assert_eq!(cache.size(), 60);

        cache.set_file_open("/b", true);
        let err = cache.write("/c", 0, &vec![0u8; 60], t(3));
        assert!(err.is_err(), "no disk dir configured, so spill must fail");
        assert!(cache.has_file("/b"));
        assert_eq!(cache.size(), 60);
    }

    #[test]
    fn disk_fallback_keeps_memory_size_flat() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::new(100, Some(dir.path().to_path_buf()));

        cache.write("/a", 0, &vec![0u8; 60], t(1)).unwrap();
        cache.write("/b", 0, &vec![0u8; 60], t(2)).unwrap();
        assert!(!cache.has_file("/a"));
        cache.set_file_open("/b", true);

        cache.write("/c", 0, &vec![0u8; 60], t(3)).unwrap();
        assert!(cache.has_file("/b"));
        assert_eq!(cache.size(), 60, "disk-backed /c must not count toward memory size");
        assert_eq!(cache.get_unloaded_ranges("/c", 60), vec![]);
    }

    #[test]
    fn read_reports_missing_ranges_for_transfer_fill() {
        let cache = Cache::new(1024, None);
        let mut out = [0u8; 10];
        let (available, missing) = cache.read("/f", 0, 10, &mut out).unwrap();
        assert_eq!(available, 0);
        assert_eq!(missing, vec![Range { offset: 0, len: 10 }]);

        cache.write("/f", 0, b"0123456789", t(1)).unwrap();
        let (available, missing) = cache.read("/f", 0, 10, &mut out).unwrap();
        assert_eq!(available, 10);
        assert!(missing.is_empty());
        assert_eq!(&out, b"0123456789");
    }
}
