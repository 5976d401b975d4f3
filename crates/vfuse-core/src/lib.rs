//! # vfuse-core
//!
//! The in-process half of a userspace filesystem adapter.
//!
//! - [`Filesystem`]: the operation contract a concrete filesystem implements.
//! - [`LoggedFilesystem`]: wraps any [`Filesystem`], logs every call and keeps panics
//!   from reaching the kernel layer.
//! - [`SessionBuilder`] / [`SessionRegistry`]: mount bookkeeping around the decorator.
//!
//! ```ignore
//! use vfuse_core::{SessionBuilder, SessionRegistry};
//!
//! let registry = SessionRegistry::new();
//! let session = SessionBuilder::new(MemoryFs::default(), "/mnt/mem").open(&registry)?;
//! // hand session.filesystem() to the kernel layer ...
//! session.close();
//! ```

pub mod contract;
pub mod diagnostics;
pub mod logged;
pub mod session;
pub mod testing;
pub mod types;

pub use contract::{Filesystem, Operation, ResultShape, FAULT_STATUS, NOT_IMPLEMENTED};
pub use diagnostics::{
    DiagnosticKind, DiagnosticSink, Fault, NullSink, RenderOptions, Reportable, TracingSink,
};
pub use logged::LoggedFilesystem;
pub use session::{Session, SessionBuilder, SessionError, SessionGuard, SessionRegistry};
pub use types::{
    DirEntry, DirectoryFiller, DirectoryListing, FileInfo, Flock, FlockCommand, LockType, Mode,
    Stat, Statvfs, TimeBuffer, Timespec, XattrFiller, XattrListFiller, XattrNames, XattrValue,
};
pub use vfuse_platform::{BlkCnt, FsFilCnt};
