//! The filesystem operation contract.
//!
//! [`Filesystem`] is the callback surface the kernel layer drives. Status operations
//! follow the FUSE convention: a non-negative value on success (a byte count for
//! `read`, `write`, `readlink` and `getxattr`), a negated errno on failure.
//!
//! [`Operation`] is the matching static schema: one entry per callback with its name,
//! result shape and neutral value.

use std::fmt;
use std::path::Path;

use libc::c_int;

use crate::types::{
    DirectoryFiller, FileInfo, Flock, FlockCommand, Mode, Stat, Statvfs, TimeBuffer,
    XattrFiller, XattrListFiller,
};

/// Returned by operations a filesystem does not implement
pub const NOT_IMPLEMENTED: c_int = -libc::ENOSYS;

/// Returned in place of any status result whose computation faulted.
///
/// A deliberate departure from reporting `0` for a faulted status operation: a fault
/// surfaces to the kernel as an I/O error instead of passing for success.
pub const FAULT_STATUS: c_int = -libc::EIO;

/// A userspace filesystem.
///
/// Every method has a default, so implementations only override what they support.
/// Methods may be called concurrently from several kernel worker threads.
pub trait Filesystem: Send + Sync {
    fn access(&self, _path: &str, _mask: c_int) -> c_int {
        NOT_IMPLEMENTED
    }

    /// Called after the kernel has released the mount point.
    fn after_unmount(&self, _mount_point: &Path) {}

    /// Called before the mount is handed to the kernel.
    fn before_mount(&self, _mount_point: &Path) {}

    /// Map a file block index to a device block index, in place.
    fn bmap(&self, _path: &str, _block_size: u64, _index: &mut u64) -> c_int {
        NOT_IMPLEMENTED
    }

    fn chmod(&self, _path: &str, _mode: Mode) -> c_int {
        NOT_IMPLEMENTED
    }

    fn chown(&self, _path: &str, _uid: u32, _gid: u32) -> c_int {
        NOT_IMPLEMENTED
    }

    fn create(&self, _path: &str, _mode: Mode, _info: &mut FileInfo) -> c_int {
        NOT_IMPLEMENTED
    }

    /// Called once when the session is torn down.
    fn destroy(&self) {}

    /// `getattr` on an open file. Falls back to [`Filesystem::getattr`].
    fn fgetattr(&self, path: &str, stat: &mut Stat, _info: &FileInfo) -> c_int {
        self.getattr(path, stat)
    }

    fn flush(&self, _path: &str, _info: &FileInfo) -> c_int {
        NOT_IMPLEMENTED
    }

    fn fsync(&self, _path: &str, _datasync: bool, _info: &FileInfo) -> c_int {
        NOT_IMPLEMENTED
    }

    fn fsyncdir(&self, _path: &str, _datasync: bool, _info: &FileInfo) -> c_int {
        NOT_IMPLEMENTED
    }

    /// `truncate` on an open file. Falls back to [`Filesystem::truncate`].
    fn ftruncate(&self, path: &str, size: u64, _info: &FileInfo) -> c_int {
        self.truncate(path, size)
    }

    fn getattr(&self, _path: &str, _stat: &mut Stat) -> c_int {
        NOT_IMPLEMENTED
    }

    /// Filesystem name reported to the kernel (`fsname`)
    fn get_name(&self) -> Option<String> {
        None
    }

    /// Extra mount options
    fn get_options(&self) -> Option<Vec<String>> {
        None
    }

    fn getxattr(
        &self,
        _path: &str,
        _name: &str,
        _filler: &mut dyn XattrFiller,
        _size: u64,
        _position: u64,
    ) -> c_int {
        NOT_IMPLEMENTED
    }

    /// Called once the kernel has accepted the mount.
    fn init(&self) {}

    fn link(&self, _path: &str, _target: &str) -> c_int {
        NOT_IMPLEMENTED
    }

    fn listxattr(&self, _path: &str, _filler: &mut dyn XattrListFiller) -> c_int {
        NOT_IMPLEMENTED
    }

    fn lock(
        &self,
        _path: &str,
        _info: &FileInfo,
        _command: FlockCommand,
        _flock: &mut Flock,
    ) -> c_int {
        NOT_IMPLEMENTED
    }

    fn mkdir(&self, _path: &str, _mode: Mode) -> c_int {
        NOT_IMPLEMENTED
    }

    fn mknod(&self, _path: &str, _mode: Mode, _dev: u64) -> c_int {
        NOT_IMPLEMENTED
    }

    fn open(&self, _path: &str, _info: &mut FileInfo) -> c_int {
        NOT_IMPLEMENTED
    }

    fn opendir(&self, _path: &str, _info: &mut FileInfo) -> c_int {
        NOT_IMPLEMENTED
    }

    /// Read up to `buffer.len()` bytes at `offset`; returns the count read.
    fn read(&self, _path: &str, _buffer: &mut [u8], _offset: u64, _info: &FileInfo) -> c_int {
        NOT_IMPLEMENTED
    }

    fn readdir(&self, _path: &str, _filler: &mut dyn DirectoryFiller) -> c_int {
        NOT_IMPLEMENTED
    }

    fn readlink(&self, _path: &str, _buffer: &mut [u8]) -> c_int {
        NOT_IMPLEMENTED
    }

    fn release(&self, _path: &str, _info: &FileInfo) -> c_int {
        NOT_IMPLEMENTED
    }

    fn releasedir(&self, _path: &str, _info: &FileInfo) -> c_int {
        NOT_IMPLEMENTED
    }

    fn removexattr(&self, _path: &str, _name: &str) -> c_int {
        NOT_IMPLEMENTED
    }

    fn rename(&self, _path: &str, _new_path: &str) -> c_int {
        NOT_IMPLEMENTED
    }

    fn rmdir(&self, _path: &str) -> c_int {
        NOT_IMPLEMENTED
    }

    fn setxattr(
        &self,
        _path: &str,
        _name: &str,
        _value: &[u8],
        _flags: c_int,
        _position: u32,
    ) -> c_int {
        NOT_IMPLEMENTED
    }

    fn statfs(&self, _path: &str, _statvfs: &mut Statvfs) -> c_int {
        NOT_IMPLEMENTED
    }

    fn symlink(&self, _path: &str, _target: &str) -> c_int {
        NOT_IMPLEMENTED
    }

    fn truncate(&self, _path: &str, _size: u64) -> c_int {
        NOT_IMPLEMENTED
    }

    fn unlink(&self, _path: &str) -> c_int {
        NOT_IMPLEMENTED
    }

    fn utimens(&self, _path: &str, _times: &mut TimeBuffer) -> c_int {
        NOT_IMPLEMENTED
    }

    /// Write `data` at `offset`; returns the count written.
    fn write(&self, _path: &str, _data: &[u8], _offset: u64, _info: &FileInfo) -> c_int {
        NOT_IMPLEMENTED
    }
}

/// What an operation hands back to the kernel layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultShape {
    /// `c_int` status or byte count
    Status,
    /// `Option<String>`
    Name,
    /// `Option<Vec<String>>`
    Options,
    /// Lifecycle hook, no result
    Unit,
}

macro_rules! operations {
    ($($variant:ident => $name:literal, $shape:ident;)+) => {
        /// One entry per [`Filesystem`] callback.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Operation {
            $($variant,)+
        }

        impl Operation {
            pub const ALL: &'static [Operation] = &[$(Operation::$variant,)+];

            /// Name used in diagnostics
            pub fn name(self) -> &'static str {
                match self {
                    $(Operation::$variant => $name,)+
                }
            }

            pub fn shape(self) -> ResultShape {
                match self {
                    $(Operation::$variant => ResultShape::$shape,)+
                }
            }
        }
    };
}

operations! {
    Access => "access", Status;
    AfterUnmount => "after_unmount", Unit;
    BeforeMount => "before_mount", Unit;
    Bmap => "bmap", Status;
    Chmod => "chmod", Status;
    Chown => "chown", Status;
    Create => "create", Status;
    Destroy => "destroy", Unit;
    Fgetattr => "fgetattr", Status;
    Flush => "flush", Status;
    Fsync => "fsync", Status;
    Fsyncdir => "fsyncdir", Status;
    Ftruncate => "ftruncate", Status;
    Getattr => "getattr", Status;
    GetName => "get_name", Name;
    GetOptions => "get_options", Options;
    Getxattr => "getxattr", Status;
    Init => "init", Unit;
    Link => "link", Status;
    Listxattr => "listxattr", Status;
    Lock => "lock", Status;
    Mkdir => "mkdir", Status;
    Mknod => "mknod", Status;
    Open => "open", Status;
    Opendir => "opendir", Status;
    Read => "read", Status;
    Readdir => "readdir", Status;
    Readlink => "readlink", Status;
    Release => "release", Status;
    Releasedir => "releasedir", Status;
    Removexattr => "removexattr", Status;
    Rename => "rename", Status;
    Rmdir => "rmdir", Status;
    Setxattr => "setxattr", Status;
    Statfs => "statfs", Status;
    Symlink => "symlink", Status;
    Truncate => "truncate", Status;
    Unlink => "unlink", Status;
    Utimens => "utimens", Status;
    Write => "write", Status;
}

impl Operation {
    /// Status returned when the operation faults: [`FAULT_STATUS`] for every status
    /// operation. Name and option queries fall back to `None`, hooks to doing nothing.
    pub fn neutral_status(self) -> c_int {
        FAULT_STATUS
    }

    pub fn is_lifecycle(self) -> bool {
        self.shape() == ResultShape::Unit
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|op| op.name() == name)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    struct Bare;
    impl Filesystem for Bare {}

    struct StatOnly;
    impl Filesystem for StatOnly {
        fn getattr(&self, _path: &str, stat: &mut Stat) -> c_int {
            stat.size = 99;
            0
        }

        fn truncate(&self, _path: &str, size: u64) -> c_int {
            size as c_int
        }
    }

    #[test]
    fn test_schema_covers_every_callback() {
        assert_eq!(Operation::ALL.len(), 40);
        let names: HashSet<_> = Operation::ALL.iter().map(|op| op.name()).collect();
        assert_eq!(names.len(), Operation::ALL.len());
    }

    #[test]
    fn test_lifecycle_hooks() {
        let hooks: Vec<_> = Operation::ALL
            .iter()
            .filter(|op| op.is_lifecycle())
            .map(|op| op.name())
            .collect();
        assert_eq!(hooks, vec!["after_unmount", "before_mount", "destroy", "init"]);
    }

    #[test]
    fn test_name_lookup() {
        assert_eq!(Operation::from_name("getattr"), Some(Operation::Getattr));
        assert_eq!(Operation::from_name("get_options"), Some(Operation::GetOptions));
        assert_eq!(Operation::from_name("ioctl"), None);
        assert_eq!(Operation::Readdir.to_string(), "readdir");
    }

    #[test]
    fn test_defaults_are_not_implemented() {
        let fs = Bare;
        let mut stat = Stat::default();
        assert_eq!(fs.getattr("/", &mut stat), NOT_IMPLEMENTED);
        assert_eq!(fs.unlink("/a"), NOT_IMPLEMENTED);
        assert_eq!(fs.get_name(), None);
        assert_eq!(fs.get_options(), None);
        fs.init();
        fs.destroy();
    }

    #[test]
    fn test_open_file_variants_fall_back() {
        let fs = StatOnly;
        let mut stat = Stat::default();
        assert_eq!(fs.fgetattr("/f", &mut stat, &FileInfo::default()), 0);
        assert_eq!(stat.size, 99);
        assert_eq!(fs.ftruncate("/f", 12, &FileInfo::default()), 12);
    }

    #[test]
    fn test_neutral_status_is_eio() {
        assert!(Operation::ALL
            .iter()
            .filter(|op| op.shape() == ResultShape::Status)
            .all(|op| op.neutral_status() == -libc::EIO));
        // Never mistaken for success
        assert_ne!(FAULT_STATUS, 0);
        assert!(FAULT_STATUS < 0);
    }
}
