//! Opaque wrappers for the structures and callbacks passed through the operation contract.
//!
//! The kernel layer owns the real `struct stat`, `struct statvfs`, `struct flock` and
//! `struct fuse_file_info` layouts; filesystems only see these wrappers.

use std::fmt;

use libc::c_int;
use vfuse_platform::{BlkCnt, FsFilCnt, WidthError};

const S_IFMT: u32 = 0o170_000;
const S_IFDIR: u32 = 0o040_000;
const S_IFREG: u32 = 0o100_000;
const S_IFLNK: u32 = 0o120_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Timespec {
    pub sec: i64,
    pub nsec: i64,
}

impl Timespec {
    pub const fn new(sec: i64, nsec: i64) -> Self {
        Self { sec, nsec }
    }
}

/// File type and permission bits (`mode_t`)
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Mode(u32);

impl Mode {
    pub const fn new(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn directory(perm: u32) -> Self {
        Self(S_IFDIR | (perm & 0o7777))
    }

    pub const fn regular(perm: u32) -> Self {
        Self(S_IFREG | (perm & 0o7777))
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn permissions(self) -> u32 {
        self.0 & 0o7777
    }

    pub fn is_dir(self) -> bool {
        self.0 & S_IFMT == S_IFDIR
    }

    pub fn is_regular(self) -> bool {
        self.0 & S_IFMT == S_IFREG
    }

    pub fn is_symlink(self) -> bool {
        self.0 & S_IFMT == S_IFLNK
    }
}

impl fmt::Debug for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Mode({:#o})", self.0)
    }
}

/// `struct stat` as filled in by `getattr`/`fgetattr`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stat {
    pub mode: Mode,
    pub nlink: u64,
    pub uid: u32,
    pub gid: u32,
    pub rdev: u64,
    pub size: i64,
    pub blksize: i64,
    /// Unset until a filesystem reports it; sized by the native `blkcnt_t` width
    pub blocks: Option<BlkCnt>,
    pub atime: Timespec,
    pub mtime: Timespec,
    pub ctime: Timespec,
}

impl Stat {
    pub fn set_blocks(&mut self, blocks: i64) -> Result<&mut Self, WidthError> {
        self.blocks = Some(BlkCnt::new(blocks)?);
        Ok(self)
    }
}

/// `struct statvfs` as filled in by `statfs`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Statvfs {
    pub bsize: u64,
    pub frsize: u64,
    pub blocks: u64,
    pub bfree: u64,
    pub bavail: u64,
    pub files: Option<FsFilCnt>,
    pub ffree: Option<FsFilCnt>,
    pub favail: Option<FsFilCnt>,
    pub fsid: u64,
    pub flag: u64,
    pub namemax: u64,
}

impl Statvfs {
    pub fn set_files(&mut self, files: u64) -> Result<&mut Self, WidthError> {
        self.files = Some(FsFilCnt::new(files)?);
        Ok(self)
    }

    pub fn set_ffree(&mut self, ffree: u64) -> Result<&mut Self, WidthError> {
        self.ffree = Some(FsFilCnt::new(ffree)?);
        Ok(self)
    }

    pub fn set_favail(&mut self, favail: u64) -> Result<&mut Self, WidthError> {
        self.favail = Some(FsFilCnt::new(favail)?);
        Ok(self)
    }
}

/// `struct fuse_file_info`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileInfo {
    /// Open flags (`O_RDONLY`, `O_APPEND`, ...)
    pub flags: c_int,
    /// Handle chosen by the filesystem in `open`/`create`/`opendir`
    pub fh: u64,
    pub direct_io: bool,
    pub keep_cache: bool,
    pub nonseekable: bool,
    pub flush: bool,
    pub lock_owner: u64,
}

impl FileInfo {
    pub fn with_flags(flags: c_int) -> Self {
        Self {
            flags,
            ..Self::default()
        }
    }
}

/// `fcntl` lock command passed to `lock`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlockCommand {
    GetLock,
    SetLock,
    SetLockWait,
}

impl FlockCommand {
    pub fn from_raw(cmd: c_int) -> Option<Self> {
        match cmd {
            libc::F_GETLK => Some(FlockCommand::GetLock),
            libc::F_SETLK => Some(FlockCommand::SetLock),
            libc::F_SETLKW => Some(FlockCommand::SetLockWait),
            _ => None,
        }
    }

    pub fn as_raw(self) -> c_int {
        match self {
            FlockCommand::GetLock => libc::F_GETLK,
            FlockCommand::SetLock => libc::F_SETLK,
            FlockCommand::SetLockWait => libc::F_SETLKW,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum LockType {
    Read,
    Write,
    #[default]
    Unlock,
}

/// `struct flock`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flock {
    pub lock_type: LockType,
    pub whence: c_int,
    pub start: i64,
    pub len: i64,
    pub pid: i32,
}

/// The two timestamps passed to `utimens`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeBuffer {
    pub access: Timespec,
    pub modification: Timespec,
}

/// Receives directory entries during `readdir`.
pub trait DirectoryFiller {
    /// Returns `false` once the kernel buffer is full.
    fn add(&mut self, name: &str, stat: Option<&Stat>) -> bool;
}

/// Receives an attribute value during `getxattr`.
pub trait XattrFiller {
    fn set(&mut self, value: &[u8]);
}

/// Receives attribute names during `listxattr`.
pub trait XattrListFiller {
    /// Returns `false` once the kernel buffer is full.
    fn add(&mut self, name: &str) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub stat: Option<Stat>,
}

/// Collects directory entries, optionally up to a fixed count
#[derive(Debug, Clone, Default)]
pub struct DirectoryListing {
    entries: Vec<DirEntry>,
    limit: Option<usize>,
}

impl DirectoryListing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            entries: Vec::new(),
            limit: Some(limit),
        }
    }

    pub fn entries(&self) -> &[DirEntry] {
        &self.entries
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }
}

impl DirectoryFiller for DirectoryListing {
    fn add(&mut self, name: &str, stat: Option<&Stat>) -> bool {
        if self.limit.is_some_and(|limit| self.entries.len() >= limit) {
            return false;
        }
        self.entries.push(DirEntry {
            name: name.to_string(),
            stat: stat.cloned(),
        });
        true
    }
}

#[derive(Debug, Clone, Default)]
pub struct XattrValue {
    value: Option<Vec<u8>>,
}

impl XattrValue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self) -> Option<&[u8]> {
        self.value.as_deref()
    }
}

impl XattrFiller for XattrValue {
    fn set(&mut self, value: &[u8]) {
        self.value = Some(value.to_vec());
    }
}

#[derive(Debug, Clone, Default)]
pub struct XattrNames {
    names: Vec<String>,
}

impl XattrNames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

impl XattrListFiller for XattrNames {
    fn add(&mut self, name: &str) -> bool {
        self.names.push(name.to_string());
        true
    }
}
