//! Native width table for kernel-exchanged metadata integers.
//!
//! The table is a pure function of `(MetadataType, Platform)`. The running process only
//! ever has one platform, so the widths for it are resolved once into [`resolved_table`]
//! and every later lookup is an array read.

use once_cell::sync::Lazy;
use std::fmt;

use crate::platform::{Arch, OsFamily, Platform};
use crate::PlatformError;

/// Width marker for combinations with no native representation
pub const UNSUPPORTED: usize = 0;

static RESOLVED: Lazy<WidthTable> = Lazy::new(|| {
    let table = WidthTable::build(*Platform::current());
    for kind in MetadataType::ALL {
        let width = table.width(kind);
        if width == UNSUPPORTED {
            vfuse_config::log_platform_warn!(
                "No native width for metadata type",
                kind = kind.c_name(),
                platform = tracing::field::display(table.platform()),
            );
        } else {
            vfuse_config::log_platform_debug!(
                "Resolved native width",
                kind = kind.c_name(),
                width = width,
                platform = tracing::field::display(table.platform()),
            );
        }
    }
    table
});

/// Abstract metadata integers whose C type size varies by platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetadataType {
    /// `blkcnt_t`: 512-byte block count in `struct stat`
    BlkCnt,
    /// `fsfilcnt_t`: inode counts in `struct statvfs`
    FsFilCnt,
}

impl MetadataType {
    pub const COUNT: usize = 2;
    pub const ALL: [MetadataType; Self::COUNT] = [MetadataType::BlkCnt, MetadataType::FsFilCnt];

    fn index(self) -> usize {
        match self {
            MetadataType::BlkCnt => 0,
            MetadataType::FsFilCnt => 1,
        }
    }

    /// Name of the C typedef
    pub fn c_name(self) -> &'static str {
        match self {
            MetadataType::BlkCnt => "blkcnt_t",
            MetadataType::FsFilCnt => "fsfilcnt_t",
        }
    }

    /// `blkcnt_t` is signed, `fsfilcnt_t` is not
    pub fn is_signed(self) -> bool {
        match self {
            MetadataType::BlkCnt => true,
            MetadataType::FsFilCnt => false,
        }
    }

    /// Byte width of this type on `platform`, or [`UNSUPPORTED`]
    pub fn width_on(self, platform: &Platform) -> usize {
        let lp64_linux = matches!(
            platform.arch(),
            Arch::X86_64 | Arch::Aarch64 | Arch::PowerPc64
        );
        match (self, platform.os()) {
            (_, OsFamily::MacOs) => 4,

            (MetadataType::BlkCnt, OsFamily::FreeBsd) => 8,
            (MetadataType::FsFilCnt, OsFamily::FreeBsd) => platform.native_long_bytes(),

            (MetadataType::BlkCnt, OsFamily::Linux) => match platform.arch() {
                Arch::X86 | Arch::PowerPc => platform.long_long_bytes(),
                _ if lp64_linux => platform.native_long_bytes(),
                _ => UNSUPPORTED,
            },
            (MetadataType::FsFilCnt, OsFamily::Linux) => match platform.arch() {
                Arch::X86 | Arch::PowerPc => platform.long_long_bytes(),
                _ if lp64_linux => platform.long_long_bytes(),
                _ => UNSUPPORTED,
            },

            (_, OsFamily::Other) => UNSUPPORTED,
        }
    }

    /// Width on the running platform, from the process-wide table
    pub fn resolved_width(self) -> usize {
        RESOLVED.width(self)
    }
}

impl fmt::Display for MetadataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.c_name())
    }
}

/// Widths of every [`MetadataType`] for a single platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidthTable {
    platform: Platform,
    widths: [usize; MetadataType::COUNT],
}

impl WidthTable {
    pub fn build(platform: Platform) -> Self {
        let mut widths = [UNSUPPORTED; MetadataType::COUNT];
        for kind in MetadataType::ALL {
            widths[kind.index()] = kind.width_on(&platform);
        }
        Self { platform, widths }
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    pub fn width(&self, kind: MetadataType) -> usize {
        self.widths[kind.index()]
    }

    pub fn is_supported(&self, kind: MetadataType) -> bool {
        self.width(kind) != UNSUPPORTED
    }

    /// Fail on the first metadata type without a native width
    pub fn ensure_complete(&self) -> Result<(), PlatformError> {
        match MetadataType::ALL.into_iter().find(|k| !self.is_supported(*k)) {
            Some(kind) => Err(PlatformError::Unsupported {
                platform: self.platform,
                kind,
            }),
            None => Ok(()),
        }
    }
}

/// The running process's table, built on first access
pub fn resolved_table() -> &'static WidthTable {
    &RESOLVED
}

/// Byte width of `kind` on the running platform (0 when unsupported)
pub fn resolve_width(kind: MetadataType) -> usize {
    kind.resolved_width()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn platform(os: &str, arch: &str, word: u8) -> Platform {
        Platform::from_target(os, arch, word)
    }

    #[test]
    fn test_macos_widths() {
        for arch in ["x86_64", "aarch64"] {
            let p = platform("macos", arch, 8);
            assert_eq!(MetadataType::BlkCnt.width_on(&p), 4);
            assert_eq!(MetadataType::FsFilCnt.width_on(&p), 4);
        }
    }

    #[test]
    fn test_freebsd_widths_follow_word_size() {
        let p64 = platform("freebsd", "x86_64", 8);
        assert_eq!(MetadataType::BlkCnt.width_on(&p64), 8);
        assert_eq!(MetadataType::FsFilCnt.width_on(&p64), 8);

        let p32 = platform("freebsd", "x86", 4);
        assert_eq!(MetadataType::BlkCnt.width_on(&p32), 8);
        assert_eq!(MetadataType::FsFilCnt.width_on(&p32), 4);
    }

    #[test]
    fn test_linux_widths() {
        for arch in ["x86", "powerpc"] {
            let p = platform("linux", arch, 4);
            assert_eq!(MetadataType::BlkCnt.width_on(&p), 8);
            assert_eq!(MetadataType::FsFilCnt.width_on(&p), 8);
        }
        for arch in ["x86_64", "aarch64", "powerpc64"] {
            let p = platform("linux", arch, 8);
            assert_eq!(MetadataType::BlkCnt.width_on(&p), 8);
            assert_eq!(MetadataType::FsFilCnt.width_on(&p), 8);
        }
    }

    #[test]
    fn test_absent_combinations_are_unsupported() {
        let riscv = platform("linux", "riscv64", 8);
        assert_eq!(MetadataType::BlkCnt.width_on(&riscv), UNSUPPORTED);
        assert_eq!(MetadataType::FsFilCnt.width_on(&riscv), UNSUPPORTED);

        let windows = platform("windows", "x86_64", 8);
        for kind in MetadataType::ALL {
            assert_eq!(kind.width_on(&windows), UNSUPPORTED);
        }
    }

    #[test]
    fn test_table_ensure_complete() {
        assert!(WidthTable::build(platform("linux", "x86_64", 8))
            .ensure_complete()
            .is_ok());

        let err = WidthTable::build(platform("linux", "riscv64", 8))
            .ensure_complete()
            .unwrap_err();
        assert!(matches!(
            err,
            PlatformError::Unsupported {
                kind: MetadataType::BlkCnt,
                ..
            }
        ));
    }

    #[test]
    fn test_resolution_is_repeatable() {
        for kind in MetadataType::ALL {
            let first = resolve_width(kind);
            for _ in 0..16 {
                assert_eq!(resolve_width(kind), first);
            }
            assert_eq!(first, kind.width_on(Platform::current()));
        }
    }

    #[test]
    fn test_resolved_table_is_for_current_platform() {
        assert_eq!(resolved_table().platform(), Platform::current());
        assert!(std::ptr::eq(resolved_table(), resolved_table()));
    }
}
