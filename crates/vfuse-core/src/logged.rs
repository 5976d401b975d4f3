//! The dispatch decorator.
//!
//! [`LoggedFilesystem`] wraps any [`Filesystem`] and is itself a [`Filesystem`]. Every call
//! goes through [`LoggedFilesystem::dispatch`]:
//!
//! 1. entry diagnostic with the rendered arguments, if the sink wants it
//! 2. the wrapped call, with panics caught
//! 3. exit diagnostic with the result, or a fault diagnostic and the neutral value
//!
//! Nothing raised by the wrapped filesystem or by the sink escapes.

use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use libc::c_int;

use crate::contract::{Filesystem, Operation};
use crate::diagnostics::{
    contain, render_arguments, ByteCount, DiagnosticKind, DiagnosticSink, Opaque,
    RenderOptions, Reportable, TracingSink,
};
use crate::session::SessionGuard;
use crate::types::{
    DirectoryFiller, FileInfo, Flock, FlockCommand, Mode, Stat, Statvfs, TimeBuffer,
    XattrFiller, XattrListFiller,
};

pub struct LoggedFilesystem {
    label: String,
    inner: Arc<dyn Filesystem>,
    sink: Arc<dyn DiagnosticSink>,
    render: RenderOptions,
    session: Mutex<Option<SessionGuard>>,
}

impl LoggedFilesystem {
    /// Wrap `fs`, labelled with its type name, reporting to [`TracingSink`].
    pub fn new<F: Filesystem + 'static>(fs: F) -> Self {
        Self::wrap(Arc::new(fs), std::any::type_name::<F>())
    }

    pub fn wrap(inner: Arc<dyn Filesystem>, label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            inner,
            sink: Arc::new(TracingSink),
            render: RenderOptions::default(),
            session: Mutex::new(None),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_render_options(mut self, render: RenderOptions) -> Self {
        self.render = render;
        self
    }

    /// Attach a session registration, released by [`Filesystem::destroy`].
    pub fn with_session(self, guard: SessionGuard) -> Self {
        *self.session.lock().unwrap_or_else(PoisonError::into_inner) = Some(guard);
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn inner(&self) -> &Arc<dyn Filesystem> {
        &self.inner
    }

    /// Whether a session registration is still held
    pub fn holds_session(&self) -> bool {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Invoke, log, contain.
    ///
    /// `args` is only rendered when the sink has entry diagnostics enabled. `neutral` is
    /// returned if `call` panics.
    pub fn dispatch<T: Reportable>(
        &self,
        op: Operation,
        neutral: T,
        args: &[&dyn fmt::Debug],
        call: impl FnOnce() -> T,
    ) -> T {
        self.notify(DiagnosticKind::Enter, |sink| {
            let rendered = self
                .render
                .arguments
                .then(|| render_arguments(args, self.render.max_len));
            sink.method_enter(&self.label, op.name(), rendered.as_deref());
        });

        match contain(call) {
            Ok(result) => {
                self.notify(DiagnosticKind::Exit, |sink| {
                    sink.method_exit(&self.label, op.name(), result.report().as_deref());
                });
                result
            }
            Err(fault) => {
                self.notify(DiagnosticKind::Fault, |sink| {
                    sink.method_fault(&self.label, op.name(), &fault);
                });
                neutral
            }
        }
    }

    fn status(
        &self,
        op: Operation,
        args: &[&dyn fmt::Debug],
        call: impl FnOnce() -> c_int,
    ) -> c_int {
        self.dispatch(op, op.neutral_status(), args, call)
    }

    // A panicking sink is dropped on the floor so it cannot mask the result.
    fn notify(&self, kind: DiagnosticKind, emit: impl FnOnce(&dyn DiagnosticSink)) {
        let sink = self.sink.as_ref();
        let _ = contain(|| {
            if sink.enabled(kind) {
                emit(sink);
            }
        });
    }

    fn release_session(&self) {
        let guard = self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(guard);
    }
}

impl fmt::Debug for LoggedFilesystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggedFilesystem")
            .field("label", &self.label)
            .field("render", &self.render)
            .field("session", &self.holds_session())
            .finish()
    }
}

/// Releases the session when `destroy` leaves, however it leaves.
struct ReleaseOnExit<'a>(&'a LoggedFilesystem);

impl Drop for ReleaseOnExit<'_> {
    fn drop(&mut self) {
        self.0.release_session();
    }
}

impl Filesystem for LoggedFilesystem {
    fn access(&self, path: &str, mask: c_int) -> c_int {
        self.status(Operation::Access, &[&path, &mask], || {
            self.inner.access(path, mask)
        })
    }

    fn after_unmount(&self, mount_point: &Path) {
        self.dispatch(Operation::AfterUnmount, (), &[&mount_point], || {
            self.inner.after_unmount(mount_point)
        })
    }

    fn before_mount(&self, mount_point: &Path) {
        self.dispatch(Operation::BeforeMount, (), &[&mount_point], || {
            self.inner.before_mount(mount_point)
        })
    }

    fn bmap(&self, path: &str, block_size: u64, index: &mut u64) -> c_int {
        let requested = *index;
        self.status(Operation::Bmap, &[&path, &block_size, &requested], || {
            self.inner.bmap(path, block_size, index)
        })
    }

    fn chmod(&self, path: &str, mode: Mode) -> c_int {
        self.status(Operation::Chmod, &[&path, &mode], || {
            self.inner.chmod(path, mode)
        })
    }

    fn chown(&self, path: &str, uid: u32, gid: u32) -> c_int {
        self.status(Operation::Chown, &[&path, &uid, &gid], || {
            self.inner.chown(path, uid, gid)
        })
    }

    fn create(&self, path: &str, mode: Mode, info: &mut FileInfo) -> c_int {
        let before = *info;
        self.status(Operation::Create, &[&path, &mode, &before], || {
            self.inner.create(path, mode, info)
        })
    }

    fn destroy(&self) {
        let _release = ReleaseOnExit(self);
        self.dispatch(Operation::Destroy, (), &[], || self.inner.destroy())
    }

    fn fgetattr(&self, path: &str, stat: &mut Stat, info: &FileInfo) -> c_int {
        self.status(Operation::Fgetattr, &[&path, &Opaque("Stat"), info], || {
            self.inner.fgetattr(path, stat, info)
        })
    }

    fn flush(&self, path: &str, info: &FileInfo) -> c_int {
        self.status(Operation::Flush, &[&path, info], || {
            self.inner.flush(path, info)
        })
    }

    fn fsync(&self, path: &str, datasync: bool, info: &FileInfo) -> c_int {
        self.status(Operation::Fsync, &[&path, &datasync, info], || {
            self.inner.fsync(path, datasync, info)
        })
    }

    fn fsyncdir(&self, path: &str, datasync: bool, info: &FileInfo) -> c_int {
        self.status(Operation::Fsyncdir, &[&path, &datasync, info], || {
            self.inner.fsyncdir(path, datasync, info)
        })
    }

    fn ftruncate(&self, path: &str, size: u64, info: &FileInfo) -> c_int {
        self.status(Operation::Ftruncate, &[&path, &size, info], || {
            self.inner.ftruncate(path, size, info)
        })
    }

    fn getattr(&self, path: &str, stat: &mut Stat) -> c_int {
        self.status(Operation::Getattr, &[&path, &Opaque("Stat")], || {
            self.inner.getattr(path, stat)
        })
    }

    fn get_name(&self) -> Option<String> {
        self.dispatch(Operation::GetName, None, &[], || self.inner.get_name())
    }

    fn get_options(&self) -> Option<Vec<String>> {
        self.dispatch(Operation::GetOptions, None, &[], || {
            self.inner.get_options()
        })
    }

    fn getxattr(
        &self,
        path: &str,
        name: &str,
        filler: &mut dyn XattrFiller,
        size: u64,
        position: u64,
    ) -> c_int {
        self.status(
            Operation::Getxattr,
            &[&path, &name, &Opaque("XattrFiller"), &size, &position],
            || self.inner.getxattr(path, name, filler, size, position),
        )
    }

    fn init(&self) {
        self.dispatch(Operation::Init, (), &[], || self.inner.init())
    }

    fn link(&self, path: &str, target: &str) -> c_int {
        self.status(Operation::Link, &[&path, &target], || {
            self.inner.link(path, target)
        })
    }

    fn listxattr(&self, path: &str, filler: &mut dyn XattrListFiller) -> c_int {
        self.status(
            Operation::Listxattr,
            &[&path, &Opaque("XattrListFiller")],
            || self.inner.listxattr(path, filler),
        )
    }

    fn lock(&self, path: &str, info: &FileInfo, command: FlockCommand, flock: &mut Flock) -> c_int {
        let requested = *flock;
        self.status(Operation::Lock, &[&path, info, &command, &requested], || {
            self.inner.lock(path, info, command, flock)
        })
    }

    fn mkdir(&self, path: &str, mode: Mode) -> c_int {
        self.status(Operation::Mkdir, &[&path, &mode], || {
            self.inner.mkdir(path, mode)
        })
    }

    fn mknod(&self, path: &str, mode: Mode, dev: u64) -> c_int {
        self.status(Operation::Mknod, &[&path, &mode, &dev], || {
            self.inner.mknod(path, mode, dev)
        })
    }

    fn open(&self, path: &str, info: &mut FileInfo) -> c_int {
        let before = *info;
        self.status(Operation::Open, &[&path, &before], || {
            self.inner.open(path, info)
        })
    }

    fn opendir(&self, path: &str, info: &mut FileInfo) -> c_int {
        let before = *info;
        self.status(Operation::Opendir, &[&path, &before], || {
            self.inner.opendir(path, info)
        })
    }

    fn read(&self, path: &str, buffer: &mut [u8], offset: u64, info: &FileInfo) -> c_int {
        let size = ByteCount(buffer.len());
        self.status(Operation::Read, &[&path, &size, &offset, info], || {
            self.inner.read(path, buffer, offset, info)
        })
    }

    fn readdir(&self, path: &str, filler: &mut dyn DirectoryFiller) -> c_int {
        self.status(
            Operation::Readdir,
            &[&path, &Opaque("DirectoryFiller")],
            || self.inner.readdir(path, filler),
        )
    }

    fn readlink(&self, path: &str, buffer: &mut [u8]) -> c_int {
        let size = ByteCount(buffer.len());
        self.status(Operation::Readlink, &[&path, &size], || {
            self.inner.readlink(path, buffer)
        })
    }

    fn release(&self, path: &str, info: &FileInfo) -> c_int {
        self.status(Operation::Release, &[&path, info], || {
            self.inner.release(path, info)
        })
    }

    fn releasedir(&self, path: &str, info: &FileInfo) -> c_int {
        self.status(Operation::Releasedir, &[&path, info], || {
            self.inner.releasedir(path, info)
        })
    }

    fn removexattr(&self, path: &str, name: &str) -> c_int {
        self.status(Operation::Removexattr, &[&path, &name], || {
            self.inner.removexattr(path, name)
        })
    }

    fn rename(&self, path: &str, new_path: &str) -> c_int {
        self.status(Operation::Rename, &[&path, &new_path], || {
            self.inner.rename(path, new_path)
        })
    }

    fn rmdir(&self, path: &str) -> c_int {
        self.status(Operation::Rmdir, &[&path], || self.inner.rmdir(path))
    }

    fn setxattr(
        &self,
        path: &str,
        name: &str,
        value: &[u8],
        flags: c_int,
        position: u32,
    ) -> c_int {
        self.status(
            Operation::Setxattr,
            &[&path, &name, &ByteCount(value.len()), &flags, &position],
            || self.inner.setxattr(path, name, value, flags, position),
        )
    }

    fn statfs(&self, path: &str, statvfs: &mut Statvfs) -> c_int {
        self.status(Operation::Statfs, &[&path, &Opaque("Statvfs")], || {
            self.inner.statfs(path, statvfs)
        })
    }

    fn symlink(&self, path: &str, target: &str) -> c_int {
        self.status(Operation::Symlink, &[&path, &target], || {
            self.inner.symlink(path, target)
        })
    }

    fn truncate(&self, path: &str, size: u64) -> c_int {
        self.status(Operation::Truncate, &[&path, &size], || {
            self.inner.truncate(path, size)
        })
    }

    fn unlink(&self, path: &str) -> c_int {
        self.status(Operation::Unlink, &[&path], || self.inner.unlink(path))
    }

    fn utimens(&self, path: &str, times: &mut TimeBuffer) -> c_int {
        let requested = *times;
        self.status(Operation::Utimens, &[&path, &requested], || {
            self.inner.utimens(path, times)
        })
    }

    fn write(&self, path: &str, data: &[u8], offset: u64, info: &FileInfo) -> c_int {
        self.status(
            Operation::Write,
            &[&path, &ByteCount(data.len()), &offset, info],
            || self.inner.write(path, data, offset, info),
        )
    }
}
