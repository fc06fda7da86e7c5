//! LRU-bounded table of [`FileMetaData`], independent of the page cache
//! (spec §4.D).

use std::collections::HashMap;

use log::{debug, warn};
use parking_lot::Mutex;

use super::file_meta_data::FileMetaData;

struct Inner {
    order: Vec<String>,
    entries: HashMap<String, FileMetaData>,
}

/// Bounded store of per-path metadata, evicted least-recently-used first,
/// skipping entries currently marked open.
pub struct Manager {
    inner: Mutex<Inner>,
    max_entries: usize,
}

impl Manager {
    pub fn new(max_entries: usize) -> Self {
        Manager {
            inner: Mutex::new(Inner {
                order: Vec::new(),
                entries: HashMap::new(),
            }),
            max_entries,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn touch(inner: &mut Inner, path: &str) {
        if let Some(pos) = inner.order.iter().position(|k| k == path) {
            let k = inner.order.remove(pos);
            inner.order.insert(0, k);
        } else {
            inner.order.insert(0, path.to_string());
        }
    }

    /// Evict the single least-recently-used entry that is neither open nor
    /// `path_to_spare`. Returns `false` if no entry could be freed.
    fn free_one(inner: &mut Inner, path_to_spare: &str) -> bool {
        for key in inner.order.iter().rev().cloned().collect::<Vec<_>>() {
            if key == path_to_spare {
                continue;
            }
            let Some(meta) = inner.entries.get(&key) else {
                continue;
            };
            if meta.file_open {
                continue;
            }
            inner.entries.remove(&key);
            inner.order.retain(|k| k != &key);
            debug!("evicted metadata for {key}");
            return true;
        }
        false
    }

    pub fn add(&self, meta: FileMetaData) -> bool {
        let mut inner = self.inner.lock();
        let path = meta.path.clone();
        if !inner.entries.contains_key(&path) && inner.entries.len() >= self.max_entries {
            if !Self::free_one(&mut inner, &path) {
                warn!("metadata manager full, cannot add {path}");
                return false;
            }
        }
        Self::touch(&mut inner, &path);
        inner.entries.insert(path, meta);
        true
    }

    pub fn get(&self, path: &str) -> Option<FileMetaData> {
        let mut inner = self.inner.lock();
        if inner.entries.contains_key(path) {
            Self::touch(&mut inner, path);
        }
        inner.entries.get(path).cloned()
    }

    pub fn has(&self, path: &str) -> bool {
        self.inner.lock().entries.contains_key(path)
    }

    pub fn erase(&self, path: &str) {
        let mut inner = self.inner.lock();
        inner.entries.remove(path);
        inner.order.retain(|k| k != path);
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.order.clear();
    }

    /// Rename updates both the index key and the metadata's own `path`
    /// field atomically under the manager's lock (spec §4.D).
    pub fn rename(&self, old_path: &str, new_path: &str) {
        if old_path == new_path {
            return;
        }
        let mut inner = self.inner.lock();
        if inner.entries.contains_key(new_path) {
            warn!("rename target {new_path} already exists, skipping");
            return;
        }
        if let Some(mut meta) = inner.entries.remove(old_path) {
            meta.path = new_path.to_string();
            inner.entries.insert(new_path.to_string(), meta);
            for k in inner.order.iter_mut() {
                if k == old_path {
                    *k = new_path.to_string();
                }
            }
        }
    }

    pub fn access(&self, path: &str, uid: u32, gid: u32, amode: i32) -> Option<bool> {
        self.get(path).map(|m| m.access(uid, gid, amode))
    }

    pub fn set_file_open(&self, path: &str, open: bool) {
        let mut inner = self.inner.lock();
        if let Some(meta) = inner.entries.get_mut(path) {
            meta.file_open = open;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::FileType;
    use std::time::SystemTime;

    fn meta(path: &str) -> FileMetaData {
        FileMetaData::new(path, 0, SystemTime::now(), SystemTime::now(), 0, 0, 0o644, FileType::File)
    }

    #[test]
    fn eviction_skips_open_entries() {
        let mgr = Manager::new(1);
        assert!(mgr.add(meta("/a")));
        mgr.set_file_open("/a", true);
        assert!(!mgr.add(meta("/b")), "full manager with only an open entry must reject insert");
        assert!(mgr.has("/a"));
        assert!(!mgr.has("/b"));

        mgr.set_file_open("/a", false);
        assert!(mgr.add(meta("/b")));
        assert!(!mgr.has("/a"));
        assert!(mgr.has("/b"));
    }

    #[test]
    fn rename_updates_index_and_path() {
        let mgr = Manager::new(4);
        mgr.add(meta("/a"));
        mgr.rename("/a", "/b");
        assert!(!mgr.has("/a"));
        let got = mgr.get("/b").unwrap();
        assert_eq!(got.path, "/b");
    }
}
