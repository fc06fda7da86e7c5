//! Glues the cache, directory tree, metadata manager, and transfer engine
//! together behind [`fuser::Filesystem`] (spec §4.I Drive).

use std::collections::{HashMap, HashSet};
use std::ffi::OsStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use fuser::{
    FileType as FuserFileType, Filesystem, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory,
    ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, Request, TimeOrNow,
};
use log::{error, warn};
use parking_lot::Mutex;

use crate::cache::Cache;
use crate::client::{ByteRange, GetObjectRequest, ListObjectsRequest, ObjectStoreClient, PutObjectRequest};
use crate::config::Config;
use crate::defaults::{DIRECTORY_MIME_TYPE, NAME_MAX};
use crate::errors::QsfsError;
use crate::metadata::{FileMetaData, FileType, Manager};
use crate::transfer::TransferEngine;
use crate::tree::DirectoryTree;

const TTL: Duration = Duration::from_secs(1);
const ROOT_INO: u64 = 1;

struct InodeTable {
    next: u64,
    path_to_ino: HashMap<String, u64>,
    ino_to_path: HashMap<u64, String>,
}

impl InodeTable {
    fn new() -> Self {
        let mut path_to_ino = HashMap::new();
        let mut ino_to_path = HashMap::new();
        path_to_ino.insert("/".to_string(), ROOT_INO);
        ino_to_path.insert(ROOT_INO, "/".to_string());
        InodeTable { next: ROOT_INO + 1, path_to_ino, ino_to_path }
    }

    fn ino_for(&mut self, path: &str) -> u64 {
        if let Some(ino) = self.path_to_ino.get(path) {
            return *ino;
        }
        let ino = self.next;
        self.next += 1;
        self.path_to_ino.insert(path.to_string(), ino);
        self.ino_to_path.insert(ino, path.to_string());
        ino
    }

    fn path_for(&self, ino: u64) -> Option<String> {
        self.ino_to_path.get(&ino).cloned()
    }

    fn rename(&mut self, old_path: &str, new_path: &str) {
        if let Some(ino) = self.path_to_ino.remove(old_path) {
            self.path_to_ino.insert(new_path.to_string(), ino);
            self.ino_to_path.insert(ino, new_path.to_string());
        }
    }

    fn forget(&mut self, path: &str) {
        if let Some(ino) = self.path_to_ino.remove(path) {
            self.ino_to_path.remove(&ino);
        }
    }
}

/// The mounted filesystem. Owns every process-wide singleton (spec §9
/// "Global singletons") and is constructed once at mount, dropped on
/// unmount.
pub struct Drive {
    tree: DirectoryTree,
    metadata: Manager,
    cache: Arc<Cache>,
    engine: Arc<TransferEngine>,
    client: Arc<dyn ObjectStoreClient>,
    inodes: Mutex<InodeTable>,
    listed_dirs: Mutex<HashSet<String>>,
    next_fh: AtomicU64,
    uid: u32,
    gid: u32,
    total_capacity_bytes: u64,
}

impl Drive {
    pub fn new(config: &Config, client: Arc<dyn ObjectStoreClient>) -> Self {
        let uid = nix::unistd::getuid().as_raw();
        let gid = nix::unistd::getgid().as_raw();
        let now = SystemTime::now();
        let engine = Arc::new(TransferEngine::new(
            Arc::clone(&client),
            config.transfer_pool_size,
            config.transfer_buffer_size * config.transfer_pool_size as u64,
            config.max_retries,
        ));
        Drive {
            tree: DirectoryTree::new(now, uid, gid, 0o755),
            metadata: Manager::new(config.max_metadata_entries),
            cache: Arc::new(Cache::new(config.cache_capacity_bytes, config.disk_dir.clone())),
            engine,
            client,
            inodes: Mutex::new(InodeTable::new()),
            listed_dirs: Mutex::new(HashSet::new()),
            next_fh: AtomicU64::new(1),
            uid,
            gid,
            total_capacity_bytes: config.cache_capacity_bytes,
        }
    }

    fn ino_for_path(&self, path: &str) -> u64 {
        self.inodes.lock().ino_for(path)
    }

    fn path_for_ino(&self, ino: u64) -> Option<String> {
        self.inodes.lock().path_for(ino)
    }

    fn child_path(parent_path: &str, name: &OsStr) -> String {
        let name = name.to_string_lossy();
        if parent_path.ends_with('/') {
            format!("{parent_path}{name}")
        } else {
            format!("{parent_path}/{name}")
        }
    }

    /// Looks up a child under either its file form or its directory form
    /// (trailing `/`), since the caller doesn't yet know the type.
    fn resolve_child(&self, parent_path: &str, name: &OsStr) -> Option<FileMetaData> {
        let base = Self::child_path(parent_path, name);
        self.tree.find(&base).or_else(|| self.tree.find(&format!("{base}/")))
    }

    /// Lists `dir_path` through the object-store adapter and grows the tree
    /// with the results, once per directory (spec §4.E listing protocol).
    fn ensure_listed(&self, dir_path: &str) {
        if self.listed_dirs.lock().contains(dir_path) {
            return;
        }
        let prefix = dir_path.trim_start_matches('/').to_string();
        let mut marker: Option<String> = None;
        let mut grown = Vec::new();
        loop {
            let response = match self.client.list_objects(ListObjectsRequest {
                prefix: prefix.clone(),
                delimiter: Some('/'),
                max_keys: None,
                marker: marker.clone(),
            }) {
                Ok(response) => response,
                Err(err) => {
                    warn!("list_objects({dir_path}) failed: {err}");
                    return;
                }
            };

            for object in response.objects {
                grown.push(Self::object_summary_to_meta(&object, self.uid, self.gid));
            }
            for common_prefix in response.common_prefixes {
                let path = format!("/{common_prefix}");
                grown.push(FileMetaData::new(
                    path,
                    0,
                    SystemTime::UNIX_EPOCH,
                    SystemTime::UNIX_EPOCH,
                    self.uid,
                    self.gid,
                    0o755,
                    FileType::Directory,
                ));
            }

            if !response.is_truncated {
                break;
            }
            marker = response.next_marker;
            if marker.is_none() {
                break;
            }
        }

        self.tree.grow_many(grown);
        self.listed_dirs.lock().insert(dir_path.to_string());
    }

    fn object_summary_to_meta(object: &crate::client::ObjectSummary, uid: u32, gid: u32) -> FileMetaData {
        let path = format!("/{}", object.key);
        let is_directory = path.ends_with('/');
        let mtime = object.last_modified.unwrap_or_else(SystemTime::now);
        let mut meta = FileMetaData::new(
            path,
            object.size,
            mtime,
            mtime,
            uid,
            gid,
            if is_directory { 0o755 } else { 0o644 },
            if is_directory { FileType::Directory } else { FileType::File },
        );
        meta.etag = object.etag.clone();
        meta
    }

    fn errno_reply_error(&self, err: &QsfsError) -> i32 {
        error!("{err}");
        err.to_errno()
    }

    /// Permission-checks `path` against `req`'s uid/gid for `mask`
    /// (`libc::{R,W,X}_OK`), mirroring the dedicated `access()` callback's
    /// own check (spec §4.I step 2).
    fn check_access(&self, req: &Request<'_>, path: &str, mask: i32) -> bool {
        self.tree.find(path).map(|m| m.access(req.uid(), req.gid(), mask)).unwrap_or(false)
    }

    /// Fills every byte range `cache.read` reports missing by fetching it
    /// from the object store (spec §4.C `read`).
    fn fill_cache_gaps(&self, path: &str, offset: u64, len: u64, out: &mut [u8]) -> Result<u64, QsfsError> {
        let (available, missing) = self.cache.read(path, offset, len, out)?;
        if missing.is_empty() {
            return Ok(available);
        }
        for range in missing {
            let bytes = self
                .engine
                .fetch_range(path, range.offset, range.len)
                .map_err(QsfsError::Store)?;
            self.cache.write(path, range.offset, &bytes, SystemTime::now())?;
        }
        let (available, _) = self.cache.read(path, offset, len, out)?;
        Ok(available)
    }

    fn upload_dirty_file(&self, path: &str, size: u64) {
        let cache = Arc::clone(&self.cache);
        let path_owned = path.to_string();
        let source: Arc<crate::transfer::UploadSource> = Arc::new(move |offset, len| {
            let mut buf = vec![0u8; len];
            let _ = cache.read(&path_owned, offset, len as u64, &mut buf);
            buf
        });
        let handle = self.engine.upload_file(path, size, source);
        handle.wait_until_finished();
        if handle.status() != crate::transfer::TransferStatus::Completed {
            warn!("upload of {path} did not complete (status {:?})", handle.status());
        }
    }
}

impl Filesystem for Drive {
    fn init(&mut self, _req: &Request<'_>, _config: &mut fuser::KernelConfig) -> Result<(), i32> {
        if let Err(err) = self.client.head_object("") {
            warn!("bucket reachability check failed at mount: {err}");
        }
        Ok(())
    }

    fn destroy(&mut self) {
        for path in self.tree.dirty_paths() {
            if let Some(meta) = self.tree.find(&path) {
                self.upload_dirty_file(&path, meta.size);
                self.tree.mutate(&path, |m| m.need_upload = false);
            }
        }
        self.listed_dirs.lock().clear();
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(parent_path) = self.path_for_ino(parent) else {
            reply.error(libc::ENOENT);
            return;
        };
        self.ensure_listed(&parent_path);
        match self.resolve_child(&parent_path, name) {
            Some(meta) => {
                let ino = self.ino_for_path(&meta.path);
                reply.entry(&TTL, &meta.to_file_attr(ino), 0);
            }
            None => reply.error(libc::ENOENT),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        let Some(path) = self.path_for_ino(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.tree.find(&path) {
            Some(meta) => reply.attr(&TTL, &meta.to_file_attr(ino)),
            None => reply.error(libc::ENOENT),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn setattr(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let Some(path) = self.path_for_ino(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        if !self.check_access(req, &path, libc::W_OK) {
            reply.error(libc::EACCES);
            return;
        }
        let now = SystemTime::now();
        let resolve_time = |t: Option<TimeOrNow>| match t {
            Some(TimeOrNow::SpecificTime(t)) => Some(t),
            Some(TimeOrNow::Now) => Some(now),
            None => None,
        };
        let new_atime = resolve_time(atime);
        let new_mtime = resolve_time(mtime);

        let updated = self.tree.mutate(&path, |meta| {
            if let Some(mode) = mode {
                meta.mode = mode & 0o7777;
            }
            if let Some(uid) = uid {
                meta.uid = uid;
            }
            if let Some(gid) = gid {
                meta.gid = gid;
            }
            if let Some(size) = size {
                meta.size = size;
            }
            if let Some(atime) = new_atime {
                meta.atime = atime;
            }
            if let Some(mtime) = new_mtime {
                meta.mtime = mtime;
            }
            meta.ctime = now;
            meta.need_upload = true;
        });
        if !updated {
            reply.error(libc::ENOENT);
            return;
        }
        if let Some(size) = size {
            if let Err(err) = self.cache.resize(&path, size, now) {
                reply.error(self.errno_reply_error(&err));
                return;
            }
        }
        match self.tree.find(&path) {
            Some(meta) => reply.attr(&TTL, &meta.to_file_attr(ino)),
            None => reply.error(libc::ENOENT),
        }
    }

    fn readlink(&mut self, req: &Request<'_>, ino: u64, reply: ReplyData) {
        let Some(path) = self.path_for_ino(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        if !self.check_access(req, &path, libc::R_OK) {
            reply.error(libc::EACCES);
            return;
        }
        match self.client.get_object(GetObjectRequest { key: path, range: None }) {
            Ok(response) => reply.data(&response.body),
            Err(err) => reply.error(err.kind.to_errno()),
        }
    }

    fn mknod(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        _rdev: u32,
        reply: ReplyEntry,
    ) {
        let Some(parent_path) = self.path_for_ino(parent) else {
            reply.error(libc::ENOENT);
            return;
        };
        if !self.check_access(req, &parent_path, libc::W_OK) {
            reply.error(libc::EACCES);
            return;
        }
        let path = Self::child_path(&parent_path, name);
        let now = SystemTime::now();
        let meta = FileMetaData::new(path.clone(), 0, now, now, req.uid(), req.gid(), mode & 0o7777, FileType::File);
        self.tree.grow(meta.clone());
        self.metadata.add(meta.clone());
        let ino = self.ino_for_path(&path);
        reply.entry(&TTL, &meta.to_file_attr(ino), 0);
    }

    fn mkdir(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, mode: u32, _umask: u32, reply: ReplyEntry) {
        let Some(parent_path) = self.path_for_ino(parent) else {
            reply.error(libc::ENOENT);
            return;
        };
        if !self.check_access(req, &parent_path, libc::W_OK) {
            reply.error(libc::EACCES);
            return;
        }
        let path = Self::child_path(&parent_path, name);
        let meta = FileMetaData::directory(path.clone(), req.uid(), req.gid(), mode & 0o7777);
        let full_path = meta.path.clone();
        self.tree.grow(meta.clone());
        let put = self.client.put_object(PutObjectRequest {
            key: full_path.clone(),
            body: Vec::new(),
            content_type: Some(DIRECTORY_MIME_TYPE.to_string()),
        });
        if let Err(err) = put {
            self.tree.erase(&full_path);
            reply.error(err.kind.to_errno());
            return;
        }
        let ino = self.ino_for_path(&full_path);
        reply.entry(&TTL, &meta.to_file_attr(ino), 0);
    }

    fn unlink(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some(parent_path) = self.path_for_ino(parent) else {
            reply.error(libc::ENOENT);
            return;
        };
        if !self.check_access(req, &parent_path, libc::W_OK) {
            reply.error(libc::EACCES);
            return;
        }
        let Some(meta) = self.resolve_child(&parent_path, name) else {
            reply.error(libc::ENOENT);
            return;
        };
        if let Err(err) = self.client.delete_object(&meta.path) {
            reply.error(err.kind.to_errno());
            return;
        }
        self.tree.erase(&meta.path);
        self.metadata.erase(&meta.path);
        self.cache.erase(&meta.path);
        self.inodes.lock().forget(&meta.path);
        reply.ok();
    }

    fn rmdir(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some(parent_path) = self.path_for_ino(parent) else {
            reply.error(libc::ENOENT);
            return;
        };
        if !self.check_access(req, &parent_path, libc::W_OK) {
            reply.error(libc::EACCES);
            return;
        }
        let Some(meta) = self.resolve_child(&parent_path, name) else {
            reply.error(libc::ENOENT);
            return;
        };
        self.ensure_listed(&meta.path);
        if !self.tree.children_range(&meta.path).is_empty() {
            reply.error(libc::ENOTEMPTY);
            return;
        }
        if let Err(err) = self.client.delete_object(&meta.path) {
            reply.error(err.kind.to_errno());
            return;
        }
        self.tree.erase(&meta.path);
        self.inodes.lock().forget(&meta.path);
        reply.ok();
    }

    fn symlink(&mut self, req: &Request<'_>, parent: u64, link_name: &OsStr, target: &std::path::Path, reply: ReplyEntry) {
        let Some(parent_path) = self.path_for_ino(parent) else {
            reply.error(libc::ENOENT);
            return;
        };
        if !self.check_access(req, &parent_path, libc::W_OK) {
            reply.error(libc::EACCES);
            return;
        }
        let path = Self::child_path(&parent_path, link_name);
        let body = target.to_string_lossy().into_owned().into_bytes();
        if let Err(err) = self.client.put_object(PutObjectRequest {
            key: path.clone(),
            body: body.clone(),
            content_type: Some(crate::defaults::SYMLINK_MIME_TYPE.to_string()),
        }) {
            reply.error(err.kind.to_errno());
            return;
        }
        let now = SystemTime::now();
        let meta = FileMetaData::new(path.clone(), body.len() as u64, now, now, req.uid(), req.gid(), 0o777, FileType::SymLink);
        self.tree.grow(meta.clone());
        let ino = self.ino_for_path(&path);
        reply.entry(&TTL, &meta.to_file_attr(ino), 0);
    }

    fn rename(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        let (Some(parent_path), Some(new_parent_path)) = (self.path_for_ino(parent), self.path_for_ino(newparent)) else {
            reply.error(libc::ENOENT);
            return;
        };
        if !self.check_access(req, &parent_path, libc::W_OK) || !self.check_access(req, &new_parent_path, libc::W_OK) {
            reply.error(libc::EACCES);
            return;
        }
        let Some(meta) = self.resolve_child(&parent_path, name) else {
            reply.error(libc::ENOENT);
            return;
        };
        let new_path = Self::child_path(&new_parent_path, newname);
        let new_path = if meta.path.ends_with('/') { format!("{new_path}/") } else { new_path };

        self.tree.rename(&meta.path, &new_path);
        self.metadata.rename(&meta.path, &new_path);
        self.cache.rename(&meta.path, &new_path);
        self.inodes.lock().rename(&meta.path, &new_path);
        reply.ok();
    }

    fn link(&mut self, req: &Request<'_>, ino: u64, newparent: u64, newname: &OsStr, reply: ReplyEntry) {
        let (Some(path), Some(new_parent_path)) = (self.path_for_ino(ino), self.path_for_ino(newparent)) else {
            reply.error(libc::ENOENT);
            return;
        };
        if !self.check_access(req, &new_parent_path, libc::W_OK) {
            reply.error(libc::EACCES);
            return;
        }
        let Some(mut meta) = self.tree.find(&path) else {
            reply.error(libc::ENOENT);
            return;
        };
        let new_path = Self::child_path(&new_parent_path, newname);
        meta.path = new_path.clone();
        meta.numlink += 1;
        self.tree.grow(meta.clone());
        let new_ino = self.ino_for_path(&new_path);
        reply.entry(&TTL, &meta.to_file_attr(new_ino), 0);
    }

    fn open(&mut self, req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        let Some(path) = self.path_for_ino(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let mask = match flags & libc::O_ACCMODE {
            libc::O_RDONLY => libc::R_OK,
            libc::O_WRONLY => libc::W_OK,
            _ => libc::R_OK | libc::W_OK,
        };
        if !self.check_access(req, &path, mask) {
            reply.error(libc::EACCES);
            return;
        }
        self.metadata.set_file_open(&path, true);
        self.cache.set_file_open(&path, true);
        let fh = self.next_fh.fetch_add(1, Ordering::Relaxed);
        reply.opened(fh, 0);
    }

    fn read(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let Some(path) = self.path_for_ino(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        if !self.check_access(req, &path, libc::R_OK) {
            reply.error(libc::EACCES);
            return;
        }
        let Some(meta) = self.tree.find(&path) else {
            reply.error(libc::ENOENT);
            return;
        };
        let offset = offset as u64;
        if offset >= meta.size {
            reply.data(&[]);
            return;
        }
        let len = (size as u64).min(meta.size - offset);
        let mut out = vec![0u8; len as usize];
        match self.fill_cache_gaps(&path, offset, len, &mut out) {
            Ok(available) => reply.data(&out[..available as usize]),
            Err(err) => reply.error(self.errno_reply_error(&err)),
        }
    }

    fn write(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let Some(path) = self.path_for_ino(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        if !self.check_access(req, &path, libc::W_OK) {
            reply.error(libc::EACCES);
            return;
        }
        let now = SystemTime::now();
        if let Err(err) = self.cache.write(&path, offset as u64, data, now) {
            reply.error(self.errno_reply_error(&err));
            return;
        }
        let new_size = offset as u64 + data.len() as u64;
        self.tree.mutate(&path, |meta| {
            if new_size > meta.size {
                meta.size = new_size;
            }
            meta.mtime = now;
            meta.need_upload = true;
        });
        reply.written(data.len() as u32);
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        let Some(path) = self.path_for_ino(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        self.metadata.set_file_open(&path, false);
        self.cache.set_file_open(&path, false);
        if let Some(meta) = self.tree.find(&path) {
            if meta.need_upload {
                self.upload_dirty_file(&path, meta.size);
                self.tree.mutate(&path, |m| m.need_upload = false);
            }
        }
        reply.ok();
    }

    fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: ReplyStatfs) {
        let block_size = crate::defaults::BLOCK_SIZE as u64;
        let total_blocks = self.total_capacity_bytes / block_size;
        let used_blocks = self.cache.size() / block_size;
        let free_blocks = total_blocks.saturating_sub(used_blocks);
        reply.statfs(total_blocks, free_blocks, free_blocks, 1_000_000, 1_000_000, block_size as u32, NAME_MAX, 0);
    }

    fn readdir(&mut self, _req: &Request<'_>, ino: u64, _fh: u64, offset: i64, mut reply: ReplyDirectory) {
        let Some(path) = self.path_for_ino(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        self.ensure_listed(&path);
        let mut entries: Vec<(u64, FuserFileType, String)> = vec![
            (ino, FuserFileType::Directory, ".".to_string()),
            (ino, FuserFileType::Directory, "..".to_string()),
        ];
        for child in self.tree.children_range(&path) {
            let child_ino = self.ino_for_path(&child.path);
            entries.push((child_ino, child.file_type.to_fuser(), child.base_name().to_string()));
        }

        for (idx, (child_ino, kind, name)) in entries.into_iter().enumerate().skip(offset as usize) {
            if reply.add(child_ino, (idx + 1) as i64, kind, &name) {
                break;
            }
        }
        reply.ok();
    }

    fn access(&mut self, _req: &Request<'_>, ino: u64, mask: i32, reply: ReplyEmpty) {
        let Some(path) = self.path_for_ino(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.metadata.access(&path, self.uid, self.gid, mask).or_else(|| self.tree.find(&path).map(|m| m.access(self.uid, self.gid, mask))) {
            Some(true) => reply.ok(),
            Some(false) => reply.error(libc::EACCES),
            None => reply.error(libc::ENOENT),
        }
    }

    fn create(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        let Some(parent_path) = self.path_for_ino(parent) else {
            reply.error(libc::ENOENT);
            return;
        };
        if !self.check_access(req, &parent_path, libc::W_OK) {
            reply.error(libc::EACCES);
            return;
        }
        let path = Self::child_path(&parent_path, name);
        let now = SystemTime::now();
        let meta = FileMetaData::new(path.clone(), 0, now, now, req.uid(), req.gid(), mode & 0o7777, FileType::File);
        self.tree.grow(meta.clone());
        self.metadata.add(meta.clone());
        self.metadata.set_file_open(&path, true);
        self.cache.set_file_open(&path, true);
        let ino = self.ino_for_path(&path);
        let fh = self.next_fh.fetch_add(1, Ordering::Relaxed);
        reply.created(&TTL, &meta.to_file_attr(ino), 0, fh, 0);
    }
}
