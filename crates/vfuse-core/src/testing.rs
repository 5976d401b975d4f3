//! Test helpers for code built on the dispatch decorator.
//!
//! - [`RecordingSink`]: a [`DiagnosticSink`] that keeps every event in memory.
//! - [`FaultingFilesystem`]: panics in every operation.
//! - [`invoke`]: drives any [`Operation`] with synthetic arguments.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use libc::c_int;

use crate::contract::{Filesystem, Operation, ResultShape};
use crate::diagnostics::{DiagnosticKind, DiagnosticSink, Fault};
use crate::types::{
    DirectoryFiller, DirectoryListing, FileInfo, Flock, FlockCommand, Mode, Stat, Statvfs,
    TimeBuffer, XattrFiller, XattrListFiller, XattrNames, XattrValue,
};

/// One diagnostic as seen by a [`RecordingSink`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticEvent {
    pub kind: DiagnosticKind,
    pub filesystem: String,
    pub method: String,
    /// Rendered arguments, rendered result or fault detail
    pub detail: Option<String>,
    pub thread: ThreadId,
}

#[derive(Debug)]
pub struct RecordingSink {
    events: Mutex<Vec<DiagnosticEvent>>,
    enter: AtomicBool,
    exit: AtomicBool,
    fault: AtomicBool,
    checks: AtomicUsize,
}

impl Default for RecordingSink {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingSink {
    /// Every kind enabled
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            enter: AtomicBool::new(true),
            exit: AtomicBool::new(true),
            fault: AtomicBool::new(true),
            checks: AtomicUsize::new(0),
        }
    }

    pub fn set_enabled(&self, kind: DiagnosticKind, enabled: bool) {
        self.flag(kind).store(enabled, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<DiagnosticEvent> {
        self.lock().clone()
    }

    pub fn events_for(&self, method: &str) -> Vec<DiagnosticEvent> {
        self.lock()
            .iter()
            .filter(|e| e.method == method)
            .cloned()
            .collect()
    }

    /// `(kind, method)` pairs in arrival order
    pub fn kinds(&self) -> Vec<(DiagnosticKind, String)> {
        self.lock()
            .iter()
            .map(|e| (e.kind, e.method.clone()))
            .collect()
    }

    /// How many times `enabled` was asked
    pub fn enabled_checks(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn flag(&self, kind: DiagnosticKind) -> &AtomicBool {
        match kind {
            DiagnosticKind::Enter => &self.enter,
            DiagnosticKind::Exit => &self.exit,
            DiagnosticKind::Fault => &self.fault,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<DiagnosticEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, kind: DiagnosticKind, filesystem: &str, method: &str, detail: Option<String>) {
        self.lock().push(DiagnosticEvent {
            kind,
            filesystem: filesystem.to_string(),
            method: method.to_string(),
            detail,
            thread: thread::current().id(),
        });
    }
}

impl DiagnosticSink for RecordingSink {
    fn enabled(&self, kind: DiagnosticKind) -> bool {
        self.checks.fetch_add(1, Ordering::SeqCst);
        self.flag(kind).load(Ordering::SeqCst)
    }

    fn method_enter(&self, filesystem: &str, method: &str, arguments: Option<&str>) {
        self.record(
            DiagnosticKind::Enter,
            filesystem,
            method,
            arguments.map(str::to_string),
        );
    }

    fn method_exit(&self, filesystem: &str, method: &str, result: Option<&str>) {
        self.record(
            DiagnosticKind::Exit,
            filesystem,
            method,
            result.map(str::to_string),
        );
    }

    fn method_fault(&self, filesystem: &str, method: &str, fault: &Fault) {
        self.record(
            DiagnosticKind::Fault,
            filesystem,
            method,
            Some(fault.detail().to_string()),
        );
    }
}

/// Panics with `"<op> exploded"` in every operation.
#[derive(Debug, Clone, Copy, Default)]
pub struct FaultingFilesystem;

fn explode(op: Operation) -> ! {
    panic!("{op} exploded")
}

impl Filesystem for FaultingFilesystem {
    fn access(&self, _: &str, _: c_int) -> c_int {
        explode(Operation::Access)
    }
    fn after_unmount(&self, _: &Path) {
        explode(Operation::AfterUnmount)
    }
    fn before_mount(&self, _: &Path) {
        explode(Operation::BeforeMount)
    }
    fn bmap(&self, _: &str, _: u64, _: &mut u64) -> c_int {
        explode(Operation::Bmap)
    }
    fn chmod(&self, _: &str, _: Mode) -> c_int {
        explode(Operation::Chmod)
    }
    fn chown(&self, _: &str, _: u32, _: u32) -> c_int {
        explode(Operation::Chown)
    }
    fn create(&self, _: &str, _: Mode, _: &mut FileInfo) -> c_int {
        explode(Operation::Create)
    }
    fn destroy(&self) {
        explode(Operation::Destroy)
    }
    fn fgetattr(&self, _: &str, _: &mut Stat, _: &FileInfo) -> c_int {
        explode(Operation::Fgetattr)
    }
    fn flush(&self, _: &str, _: &FileInfo) -> c_int {
        explode(Operation::Flush)
    }
    fn fsync(&self, _: &str, _: bool, _: &FileInfo) -> c_int {
        explode(Operation::Fsync)
    }
    fn fsyncdir(&self, _: &str, _: bool, _: &FileInfo) -> c_int {
        explode(Operation::Fsyncdir)
    }
    fn ftruncate(&self, _: &str, _: u64, _: &FileInfo) -> c_int {
        explode(Operation::Ftruncate)
    }
    fn getattr(&self, _: &str, _: &mut Stat) -> c_int {
        explode(Operation::Getattr)
    }
    fn get_name(&self) -> Option<String> {
        explode(Operation::GetName)
    }
    fn get_options(&self) -> Option<Vec<String>> {
        explode(Operation::GetOptions)
    }
    fn getxattr(&self, _: &str, _: &str, _: &mut dyn XattrFiller, _: u64, _: u64) -> c_int {
        explode(Operation::Getxattr)
    }
    fn init(&self) {
        explode(Operation::Init)
    }
    fn link(&self, _: &str, _: &str) -> c_int {
        explode(Operation::Link)
    }
    fn listxattr(&self, _: &str, _: &mut dyn XattrListFiller) -> c_int {
        explode(Operation::Listxattr)
    }
    fn lock(&self, _: &str, _: &FileInfo, _: FlockCommand, _: &mut Flock) -> c_int {
        explode(Operation::Lock)
    }
    fn mkdir(&self, _: &str, _: Mode) -> c_int {
        explode(Operation::Mkdir)
    }
    fn mknod(&self, _: &str, _: Mode, _: u64) -> c_int {
        explode(Operation::Mknod)
    }
    fn open(&self, _: &str, _: &mut FileInfo) -> c_int {
        explode(Operation::Open)
    }
    fn opendir(&self, _: &str, _: &mut FileInfo) -> c_int {
        explode(Operation::Opendir)
    }
    fn read(&self, _: &str, _: &mut [u8], _: u64, _: &FileInfo) -> c_int {
        explode(Operation::Read)
    }
    fn readdir(&self, _: &str, _: &mut dyn DirectoryFiller) -> c_int {
        explode(Operation::Readdir)
    }
    fn readlink(&self, _: &str, _: &mut [u8]) -> c_int {
        explode(Operation::Readlink)
    }
    fn release(&self, _: &str, _: &FileInfo) -> c_int {
        explode(Operation::Release)
    }
    fn releasedir(&self, _: &str, _: &FileInfo) -> c_int {
        explode(Operation::Releasedir)
    }
    fn removexattr(&self, _: &str, _: &str) -> c_int {
        explode(Operation::Removexattr)
    }
    fn rename(&self, _: &str, _: &str) -> c_int {
        explode(Operation::Rename)
    }
    fn rmdir(&self, _: &str) -> c_int {
        explode(Operation::Rmdir)
    }
    fn setxattr(&self, _: &str, _: &str, _: &[u8], _: c_int, _: u32) -> c_int {
        explode(Operation::Setxattr)
    }
    fn statfs(&self, _: &str, _: &mut Statvfs) -> c_int {
        explode(Operation::Statfs)
    }
    fn symlink(&self, _: &str, _: &str) -> c_int {
        explode(Operation::Symlink)
    }
    fn truncate(&self, _: &str, _: u64) -> c_int {
        explode(Operation::Truncate)
    }
    fn unlink(&self, _: &str) -> c_int {
        explode(Operation::Unlink)
    }
    fn utimens(&self, _: &str, _: &mut TimeBuffer) -> c_int {
        explode(Operation::Utimens)
    }
    fn write(&self, _: &str, _: &[u8], _: u64, _: &FileInfo) -> c_int {
        explode(Operation::Write)
    }
}

/// What an operation returned, whatever its shape
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    Status(c_int),
    Name(Option<String>),
    Options(Option<Vec<String>>),
    Unit,
}

impl Invocation {
    /// The value a contained fault in `op` must produce
    pub fn neutral(op: Operation) -> Self {
        match op.shape() {
            ResultShape::Status => Invocation::Status(op.neutral_status()),
            ResultShape::Name => Invocation::Name(None),
            ResultShape::Options => Invocation::Options(None),
            ResultShape::Unit => Invocation::Unit,
        }
    }
}

/// Path used for every synthetic call
pub const INVOKE_PATH: &str = "/vfuse/target";

/// Call `op` on `fs` with synthetic arguments.
pub fn invoke(fs: &dyn Filesystem, op: Operation) -> Invocation {
    let path = INVOKE_PATH;
    let mount_point = Path::new("/mnt/vfuse");
    let mode = Mode::regular(0o644);
    let info = FileInfo::with_flags(libc::O_RDWR);
    let mut open_info = info;
    let mut stat = Stat::default();
    let mut statvfs = Statvfs::default();
    let mut buffer = [0u8; 64];

    let status = match op {
        Operation::AfterUnmount => {
            fs.after_unmount(mount_point);
            return Invocation::Unit;
        }
        Operation::BeforeMount => {
            fs.before_mount(mount_point);
            return Invocation::Unit;
        }
        Operation::Destroy => {
            fs.destroy();
            return Invocation::Unit;
        }
        Operation::Init => {
            fs.init();
            return Invocation::Unit;
        }
        Operation::GetName => return Invocation::Name(fs.get_name()),
        Operation::GetOptions => return Invocation::Options(fs.get_options()),

        Operation::Access => fs.access(path, libc::R_OK),
        Operation::Bmap => {
            let mut index = 3;
            fs.bmap(path, 4096, &mut index)
        }
        Operation::Chmod => fs.chmod(path, mode),
        Operation::Chown => fs.chown(path, 1000, 1000),
        Operation::Create => fs.create(path, mode, &mut open_info),
        Operation::Fgetattr => fs.fgetattr(path, &mut stat, &info),
        Operation::Flush => fs.flush(path, &info),
        Operation::Fsync => fs.fsync(path, false, &info),
        Operation::Fsyncdir => fs.fsyncdir(path, true, &info),
        Operation::Ftruncate => fs.ftruncate(path, 0, &info),
        Operation::Getattr => fs.getattr(path, &mut stat),
        Operation::Getxattr => {
            let mut value = XattrValue::new();
            fs.getxattr(path, "user.sample", &mut value, 64, 0)
        }
        Operation::Link => fs.link(path, "/vfuse/link"),
        Operation::Listxattr => {
            let mut names = XattrNames::new();
            fs.listxattr(path, &mut names)
        }
        Operation::Lock => {
            let mut flock = Flock::default();
            fs.lock(path, &info, FlockCommand::GetLock, &mut flock)
        }
        Operation::Mkdir => fs.mkdir(path, Mode::directory(0o755)),
        Operation::Mknod => fs.mknod(path, mode, 0),
        Operation::Open => fs.open(path, &mut open_info),
        Operation::Opendir => fs.opendir(path, &mut open_info),
        Operation::Read => fs.read(path, &mut buffer, 0, &info),
        Operation::Readdir => {
            let mut listing = DirectoryListing::new();
            fs.readdir(path, &mut listing)
        }
        Operation::Readlink => fs.readlink(path, &mut buffer),
        Operation::Release => fs.release(path, &info),
        Operation::Releasedir => fs.releasedir(path, &info),
        Operation::Removexattr => fs.removexattr(path, "user.sample"),
        Operation::Rename => fs.rename(path, "/vfuse/renamed"),
        Operation::Rmdir => fs.rmdir(path),
        Operation::Setxattr => fs.setxattr(path, "user.sample", b"value", 0, 0),
        Operation::Statfs => fs.statfs(path, &mut statvfs),
        Operation::Symlink => fs.symlink(path, "/vfuse/target"),
        Operation::Truncate => fs.truncate(path, 0),
        Operation::Unlink => fs.unlink(path),
        Operation::Utimens => {
            let mut times = TimeBuffer::default();
            fs.utimens(path, &mut times)
        }
        Operation::Write => fs.write(path, b"bytes", 0, &info),
    };
    Invocation::Status(status)
}
