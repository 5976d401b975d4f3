//! Platform descriptor: which OS family and CPU architecture we run on.

use once_cell::sync::Lazy;
use std::fmt;

/// Detected once, never mutated
static CURRENT: Lazy<Platform> = Lazy::new(Platform::detect);

/// Operating system families with a userspace filesystem bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OsFamily {
    Linux,
    MacOs,
    FreeBsd,
    Other,
}

impl OsFamily {
    /// Map a `std::env::consts::OS` style name
    pub fn from_target(os: &str) -> Self {
        match os {
            "linux" => OsFamily::Linux,
            "macos" => OsFamily::MacOs,
            "freebsd" => OsFamily::FreeBsd,
            _ => OsFamily::Other,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OsFamily::Linux => "linux",
            OsFamily::MacOs => "macos",
            OsFamily::FreeBsd => "freebsd",
            OsFamily::Other => "other",
        }
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// CPU architectures the width table knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    X86,
    X86_64,
    PowerPc,
    PowerPc64,
    Aarch64,
    Other,
}

impl Arch {
    /// Map a `std::env::consts::ARCH` style name
    pub fn from_target(arch: &str) -> Self {
        match arch {
            "x86" => Arch::X86,
            "x86_64" => Arch::X86_64,
            "powerpc" => Arch::PowerPc,
            "powerpc64" => Arch::PowerPc64,
            "aarch64" => Arch::Aarch64,
            _ => Arch::Other,
        }
    }

    /// Word width in bytes, when the architecture fixes it
    pub fn word_bytes(self) -> Option<u8> {
        match self {
            Arch::X86 | Arch::PowerPc => Some(4),
            Arch::X86_64 | Arch::PowerPc64 | Arch::Aarch64 => Some(8),
            Arch::Other => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Arch::X86 => "x86",
            Arch::X86_64 => "x86_64",
            Arch::PowerPc => "powerpc",
            Arch::PowerPc64 => "powerpc64",
            Arch::Aarch64 => "aarch64",
            Arch::Other => "other",
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// OS family, CPU architecture and word width of a process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Platform {
    os: OsFamily,
    arch: Arch,
    word_bytes: u8,
}

impl Platform {
    /// Build a descriptor. Known architectures override `word_bytes` with their own width.
    pub fn new(os: OsFamily, arch: Arch, word_bytes: u8) -> Self {
        Self {
            os,
            arch,
            word_bytes: arch.word_bytes().unwrap_or(word_bytes),
        }
    }

    /// Build from target names, e.g. `("linux", "x86_64", 8)`
    pub fn from_target(os: &str, arch: &str, word_bytes: u8) -> Self {
        Self::new(OsFamily::from_target(os), Arch::from_target(arch), word_bytes)
    }

    /// Probe the running process. Prefer [`Platform::current`], which caches this.
    pub fn detect() -> Self {
        Self::from_target(
            std::env::consts::OS,
            std::env::consts::ARCH,
            (usize::BITS / 8) as u8,
        )
    }

    /// The process-wide descriptor, resolved on first use
    pub fn current() -> &'static Platform {
        &CURRENT
    }

    pub fn os(&self) -> OsFamily {
        self.os
    }

    pub fn arch(&self) -> Arch {
        self.arch
    }

    pub fn word_bytes(&self) -> u8 {
        self.word_bytes
    }

    /// `sizeof(long)` under the platform's C ABI (LP64 / ILP32)
    pub fn native_long_bytes(&self) -> usize {
        self.word_bytes as usize
    }

    /// `sizeof(long long)`
    pub fn long_long_bytes(&self) -> usize {
        8
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.os, self.arch)
    }
}
