//! # vfuse-platform
//!
//! Platform facts and native integer widths for metadata exchanged with the kernel.
//!
//! - [`Platform`]: OS family and CPU architecture, detected once per process.
//! - [`MetadataType`] / [`resolve_width`]: byte width of `blkcnt_t`, `fsfilcnt_t`, ...
//!   for the running platform, resolved once and cached.
//! - [`NativeInt`] ([`BlkCnt`], [`FsFilCnt`]): values checked against that width at
//!   construction time.

pub mod native;
pub mod platform;
pub mod width;

pub use native::{BlkCnt, BlkCntKind, FsFilCnt, FsFilCntKind, NativeInt, NativeKind};
pub use platform::{Arch, OsFamily, Platform};
pub use width::{resolve_width, resolved_table, MetadataType, WidthTable, UNSUPPORTED};

use thiserror::Error;

/// Errors raised while constructing or marshalling native metadata values
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WidthError {
    #[error("{kind} has no native representation on this platform")]
    Unsupported { kind: MetadataType },

    #[error("{width} is not a valid native width for {kind}")]
    InvalidWidth { kind: MetadataType, width: usize },

    #[error("value {value} exceeds native capacity of {kind} ({width} bytes)")]
    OutOfRange {
        kind: MetadataType,
        value: i128,
        width: usize,
    },

    #[error("{kind} needs a {expected}-byte buffer, got {actual} bytes")]
    BufferSize {
        kind: MetadataType,
        expected: usize,
        actual: usize,
    },
}

/// Errors raised when the running platform cannot host the adapter at all
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("no native width for {kind} on {platform}")]
    Unsupported {
        platform: Platform,
        kind: MetadataType,
    },
}

pub type Result<T> = std::result::Result<T, WidthError>;
