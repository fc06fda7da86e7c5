//! Per-path stat record (spec §3 FileMetaData / §4.D stat translation).

use std::time::SystemTime;

use crate::defaults::BLOCK_SIZE;

/// POSIX file type, distinct from `mode`'s permission bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    File,
    Directory,
    SymLink,
    Block,
    Character,
    Fifo,
    Socket,
}

impl FileType {
    fn type_bits(self) -> u32 {
        match self {
            FileType::File => libc::S_IFREG,
            FileType::Directory => libc::S_IFDIR,
            FileType::SymLink => libc::S_IFLNK,
            FileType::Block => libc::S_IFBLK,
            FileType::Character => libc::S_IFCHR,
            FileType::Fifo => libc::S_IFIFO,
            FileType::Socket => libc::S_IFSOCK,
        }
    }

    pub fn to_fuser(self) -> fuser::FileType {
        match self {
            FileType::File => fuser::FileType::RegularFile,
            FileType::Directory => fuser::FileType::Directory,
            FileType::SymLink => fuser::FileType::Symlink,
            FileType::Block => fuser::FileType::BlockDevice,
            FileType::Character => fuser::FileType::CharDevice,
            FileType::Fifo => fuser::FileType::NamedPipe,
            FileType::Socket => fuser::FileType::Socket,
        }
    }
}

/// One path's metadata: size, times, ownership, permission bits, type, and
/// the bookkeeping flags the rest of the filesystem relies on.
#[derive(Debug, Clone)]
pub struct FileMetaData {
    pub path: String,
    pub size: u64,
    pub atime: SystemTime,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
    pub uid: u32,
    pub gid: u32,
    pub mode: u32,
    pub file_type: FileType,
    pub mime_type: String,
    pub etag: Option<String>,
    pub encrypted: bool,
    pub dev: u64,
    pub numlink: u32,
    pub need_upload: bool,
    pub file_open: bool,
}

impl FileMetaData {
    pub fn new(
        path: impl Into<String>,
        size: u64,
        atime: SystemTime,
        mtime: SystemTime,
        uid: u32,
        gid: u32,
        mode: u32,
        file_type: FileType,
    ) -> Self {
        let mut path = path.into();
        let numlink = if file_type == FileType::Directory {
            if !path.ends_with('/') {
                path.push('/');
            }
            2
        } else {
            1
        };
        FileMetaData {
            path,
            size,
            atime,
            mtime,
            ctime: mtime,
            uid,
            gid,
            mode,
            file_type,
            mime_type: String::new(),
            etag: None,
            encrypted: false,
            dev: 0,
            numlink,
            need_upload: false,
            file_open: false,
        }
    }

    pub fn directory(path: impl Into<String>, uid: u32, gid: u32, mode: u32) -> Self {
        let now = SystemTime::now();
        FileMetaData::new(path, 0, now, now, uid, gid, mode, FileType::Directory)
    }

    /// OR the type bits onto the permission bits (spec §4.D stat translation).
    pub fn mode_with_type(&self) -> u32 {
        self.file_type.type_bits() | self.mode
    }

    /// `blocks = size/512 + 1`, `blksize` fixed at [`BLOCK_SIZE`].
    pub fn blocks(&self) -> u64 {
        self.size / 512 + 1
    }

    pub fn blksize(&self) -> u32 {
        BLOCK_SIZE
    }

    pub fn dir_name(&self) -> &str {
        let trimmed = self.path.trim_end_matches('/');
        match trimmed.rfind('/') {
            Some(0) => "/",
            Some(idx) => &trimmed[..idx + 1],
            None => "/",
        }
    }

    pub fn base_name(&self) -> &str {
        let trimmed = self.path.trim_end_matches('/');
        match trimmed.rfind('/') {
            Some(idx) => &trimmed[idx + 1..],
            None => trimmed,
        }
    }

    /// Translate to the stat buffer the host callback surface expects
    /// (spec §4.D "Stat translation").
    pub fn to_file_attr(&self, ino: u64) -> fuser::FileAttr {
        fuser::FileAttr {
            ino,
            size: self.size,
            blocks: self.blocks(),
            atime: self.atime,
            mtime: self.mtime,
            ctime: self.ctime,
            crtime: self.ctime,
            kind: self.file_type.to_fuser(),
            perm: (self.mode & 0o7777) as u16,
            nlink: self.numlink,
            uid: self.uid,
            gid: self.gid,
            rdev: self.dev as u32,
            blksize: self.blksize(),
            flags: 0,
        }
    }

    /// Owner/group/other access check against `amode` (a bitwise-or of
    /// `libc::{R,W,X,F}_OK`), mirroring the original adapter's resolution
    /// order: owner bits win on uid match, then group, then other; `uid==0`
    /// always passes existence and execute if any execute bit is set.
    pub fn access(&self, uid: u32, gid: u32, amode: i32) -> bool {
        if amode & libc::F_OK != 0 {
            return true;
        }
        let mut ok = false;
        if amode & libc::R_OK != 0 {
            if (uid == self.uid || uid == 0) && self.mode & libc::S_IRUSR != 0 {
                ok = true;
            } else if (gid == self.gid || gid == 0) && self.mode & libc::S_IRGRP != 0 {
                ok = true;
            } else if self.mode & libc::S_IROTH != 0 {
                ok = true;
            } else {
                return false;
            }
        }
        if amode & libc::W_OK != 0 {
            if (uid == self.uid || uid == 0) && self.mode & libc::S_IWUSR != 0 {
                ok = true;
            } else if (gid == self.gid || gid == 0) && self.mode & libc::S_IWGRP != 0 {
                ok = true;
            } else if self.mode & libc::S_IWOTH != 0 {
                ok = true;
            } else {
                return false;
            }
        }
        if amode & libc::X_OK != 0 {
            if uid == 0 {
                let any_x = self.mode & (libc::S_IXUSR | libc::S_IXGRP | libc::S_IXOTH) != 0;
                if any_x {
                    ok = true;
                } else {
                    return false;
                }
            } else if uid == self.uid && self.mode & libc::S_IXUSR != 0 {
                ok = true;
            } else if gid == self.gid && self.mode & libc::S_IXGRP != 0 {
                ok = true;
            } else if self.mode & libc::S_IXOTH != 0 {
                ok = true;
            } else {
                return false;
            }
        }
        ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(mode: u32, uid: u32, gid: u32) -> FileMetaData {
        FileMetaData::new("/f", 0, SystemTime::now(), SystemTime::now(), uid, gid, mode, FileType::File)
    }

    #[test]
    fn owner_read_write_other_denied() {
        let m = meta(0o600, 1, 1);
        assert!(m.access(1, 1, libc::R_OK | libc::W_OK));
        assert!(!m.access(2, 2, libc::R_OK));
    }

    #[test]
    fn other_bits_grant_access() {
        let m = meta(0o644, 1, 1);
        assert!(m.access(2, 2, libc::R_OK));
        assert!(!m.access(2, 2, libc::W_OK));
    }

    #[test]
    fn root_always_passes_execute_if_any_x_bit_set() {
        let m = meta(0o100, 1, 1);
        assert!(m.access(0, 0, libc::X_OK));
        let m2 = meta(0o600, 1, 1);
        assert!(!m2.access(0, 0, libc::X_OK));
    }

    #[test]
    fn directory_gets_numlink_two_and_trailing_slash() {
        let d = FileMetaData::directory("/a/b", 0, 0, 0o755);
        assert_eq!(d.numlink, 2);
        assert!(d.path.ends_with('/'));
    }

    #[test]
    fn dir_name_and_base_name() {
        let m = meta(0o644, 0, 0);
        let m = FileMetaData { path: "/a/b/c.txt".into(), ..m };
        assert_eq!(m.dir_name(), "/a/b/");
        assert_eq!(m.base_name(), "c.txt");
    }
}
