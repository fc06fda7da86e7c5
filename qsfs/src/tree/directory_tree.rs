//! Flat-map representation of the directory tree.
//!
//! The original Node/parent/children graph (spec §3 Node, §9 "Cyclic
//! parent/child references") is modeled here as two hash maps guarded by one
//! lock instead of an `Rc`/`Weak` object graph: `metas` holds every attached
//! or orphaned path's metadata, and `children` holds the parent-path →
//! child-path multimap. A path is "in the tree" (resolvable by [`find`])
//! only once every ancestor up to the root has itself been grown; until
//! then it is an orphan that [`children_range`] on its parent can still see
//! once the parent calls `grow`, matching the listing-driven population the
//! host callback surface relies on.
//!
//! [`find`]: DirectoryTree::find
//! [`children_range`]: DirectoryTree::children_range

use std::collections::{BTreeSet, HashMap};
use std::time::SystemTime;

use parking_lot::Mutex;

use crate::metadata::{FileMetaData, FileType};

pub const ROOT_PATH: &str = "/";

struct Inner {
    metas: HashMap<String, FileMetaData>,
    /// parent path -> full paths of children grown under it so far.
    children: HashMap<String, BTreeSet<String>>,
}

pub struct DirectoryTree {
    inner: Mutex<Inner>,
}

impl DirectoryTree {
    pub fn new(mtime: SystemTime, uid: u32, gid: u32, mode: u32) -> Self {
        let root = FileMetaData::new(ROOT_PATH, 0, mtime, mtime, uid, gid, mode, FileType::Directory);
        let mut metas = HashMap::new();
        metas.insert(ROOT_PATH.to_string(), root);
        DirectoryTree {
            inner: Mutex::new(Inner {
                metas,
                children: HashMap::new(),
            }),
        }
    }

    fn is_attached(metas: &HashMap<String, FileMetaData>, path: &str) -> bool {
        if path == ROOT_PATH {
            return true;
        }
        match metas.get(path) {
            Some(meta) => Self::is_attached(metas, meta.dir_name()),
            None => false,
        }
    }

    /// Insert or refresh one path's metadata, linking it under its parent's
    /// child set (spec §4.E `grow`).
    pub fn grow(&self, meta: FileMetaData) {
        let mut inner = self.inner.lock();
        let dir = meta.dir_name().to_string();
        let path = meta.path.clone();
        inner.children.entry(dir).or_default().insert(path.clone());
        inner.metas.insert(path, meta);
    }

    pub fn grow_many(&self, metas: Vec<FileMetaData>) {
        for meta in metas {
            self.grow(meta);
        }
    }

    /// Resolve `path` only if every ancestor up to the root has been grown;
    /// otherwise the path is still an orphan (spec §4.E listing protocol).
    pub fn find(&self, path: &str) -> Option<FileMetaData> {
        let inner = self.inner.lock();
        let meta = inner.metas.get(path)?;
        if Self::is_attached(&inner.metas, path) {
            Some(meta.clone())
        } else {
            None
        }
    }

    /// Direct children recorded under `dir_path`, whether or not `dir_path`
    /// itself has been grown yet (used to absorb listing results that
    /// arrive out of order).
    pub fn children_range(&self, dir_path: &str) -> Vec<FileMetaData> {
        let inner = self.inner.lock();
        inner
            .children
            .get(dir_path)
            .into_iter()
            .flatten()
            .filter_map(|child_path| inner.metas.get(child_path).cloned())
            .collect()
    }

    pub fn has(&self, path: &str) -> bool {
        self.inner.lock().metas.contains_key(path)
    }

    /// Atomic rename: both maps are updated while holding the single lock,
    /// so no external observer ever sees both keys present (spec §8).
    pub fn rename(&self, old_path: &str, new_path: &str) {
        if old_path == new_path {
            return;
        }
        let mut inner = self.inner.lock();
        let Some(mut meta) = inner.metas.remove(old_path) else {
            return;
        };
        let old_dir = meta.dir_name().to_string();
        if let Some(set) = inner.children.get_mut(&old_dir) {
            set.remove(old_path);
        }
        meta.path = new_path.to_string();
        let new_dir = meta.dir_name().to_string();
        inner.children.entry(new_dir).or_default().insert(new_path.to_string());
        inner.metas.insert(new_path.to_string(), meta);

        // Re-home any children that were recorded under the old path (the
        // renamed entry was itself a directory).
        if let Some(old_children) = inner.children.remove(old_path) {
            inner.children.insert(new_path.to_string(), old_children);
        }
    }

    pub fn erase(&self, path: &str) {
        let mut inner = self.inner.lock();
        if let Some(meta) = inner.metas.remove(path) {
            let dir = meta.dir_name().to_string();
            if let Some(set) = inner.children.get_mut(&dir) {
                set.remove(path);
            }
        }
        inner.children.remove(path);
    }

    pub fn set_mtime(&self, path: &str, mtime: SystemTime) {
        let mut inner = self.inner.lock();
        if let Some(meta) = inner.metas.get_mut(path) {
            meta.mtime = mtime;
        }
    }

    pub fn mutate<F: FnOnce(&mut FileMetaData)>(&self, path: &str, f: F) -> bool {
        let mut inner = self.inner.lock();
        match inner.metas.get_mut(path) {
            Some(meta) => {
                f(meta);
                true
            }
            None => false,
        }
    }

    /// Paths still awaiting upload, used to flush outstanding writes on
    /// unmount (spec §4.I `destroy`).
    pub fn dirty_paths(&self) -> Vec<String> {
        self.inner
            .lock()
            .metas
            .values()
            .filter(|meta| meta.need_upload)
            .map(|meta| meta.path.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_meta(path: &str) -> FileMetaData {
        FileMetaData::new(path, 0, SystemTime::now(), SystemTime::now(), 0, 0, 0o644, FileType::File)
    }

    fn dir_meta(path: &str) -> FileMetaData {
        FileMetaData::directory(path, 0, 0, 0o755)
    }

    #[test]
    fn orphan_reparenting_scenario() {
        let tree = DirectoryTree::new(SystemTime::now(), 0, 0, 0o755);

        tree.grow(file_meta("/a/b/c.txt"));
        assert!(tree.find("/a/b/c.txt").is_none(), "parent /a/b/ not yet grown");
        assert_eq!(tree.children_range("/a/b/").len(), 1);

        tree.grow(dir_meta("/a/b/"));
        // still orphaned until /a/ itself exists
        assert!(tree.find("/a/b/").is_none());
        assert!(tree.find("/a/b/c.txt").is_none());

        tree.grow(dir_meta("/a/"));
        assert!(tree.find("/a/").is_some());
        assert!(tree.find("/a/b/").is_some());
        assert!(tree.find("/a/b/c.txt").is_some());
    }

    #[test]
    fn rename_is_atomic_under_one_lock() {
        let tree = DirectoryTree::new(SystemTime::now(), 0, 0, 0o755);
        tree.grow(file_meta("/old.txt"));
        tree.rename("/old.txt", "/new.txt");
        assert!(!tree.has("/old.txt"));
        assert!(tree.has("/new.txt"));
        assert_eq!(tree.find("/new.txt").unwrap().path, "/new.txt");
    }
}
