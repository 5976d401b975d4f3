//! Opaque metadata values sized by the native width table.
//!
//! A value is checked against its width when it is built. A type with no native width on
//! this platform cannot be built at all, so a bad width never reaches the kernel.

use std::fmt;
use std::marker::PhantomData;

use crate::platform::Platform;
use crate::width::{MetadataType, UNSUPPORTED};
use crate::{Result, WidthError};

/// Marker for a metadata typedef. Implemented by uninhabited kind types only.
pub trait NativeKind: Copy + Eq + std::hash::Hash + fmt::Debug + 'static {
    const TYPE: MetadataType;
    /// Short label used by `Debug`
    const LABEL: &'static str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlkCntKind {}

impl NativeKind for BlkCntKind {
    const TYPE: MetadataType = MetadataType::BlkCnt;
    const LABEL: &'static str = "BlkCnt";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FsFilCntKind {}

impl NativeKind for FsFilCntKind {
    const TYPE: MetadataType = MetadataType::FsFilCnt;
    const LABEL: &'static str = "FsFilCnt";
}

/// An integer carried at the native width of its metadata type.
///
/// Held as `i128` so both a signed and an unsigned 8-byte typedef keep their full range.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeInt<K: NativeKind> {
    value: i128,
    width: usize,
    _kind: PhantomData<K>,
}

/// `blkcnt_t`
pub type BlkCnt = NativeInt<BlkCntKind>;
/// `fsfilcnt_t`
pub type FsFilCnt = NativeInt<FsFilCntKind>;

impl<K: NativeKind> NativeInt<K> {
    /// Build at the running platform's width
    pub fn new(value: impl Into<i128>) -> Result<Self> {
        Self::with_width(value, K::TYPE.resolved_width())
    }

    pub fn zero() -> Result<Self> {
        Self::new(0)
    }

    /// Build at the width `platform` would use
    pub fn on_platform(value: impl Into<i128>, platform: &Platform) -> Result<Self> {
        Self::with_width(value, K::TYPE.width_on(platform))
    }

    /// Build at an explicit width
    pub fn with_width(value: impl Into<i128>, width: usize) -> Result<Self> {
        let value = value.into();
        check_width::<K>(width)?;
        if !fits(value, width, K::TYPE.is_signed()) {
            return Err(WidthError::OutOfRange {
                kind: K::TYPE,
                value,
                width,
            });
        }
        Ok(Self {
            value,
            width,
            _kind: PhantomData,
        })
    }

    pub fn value(&self) -> i128 {
        self.value
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn metadata_type(&self) -> MetadataType {
        K::TYPE
    }

    /// Write the value in native byte order; `out` must be exactly `width` bytes
    pub fn write_native(&self, out: &mut [u8]) -> Result<()> {
        if out.len() != self.width {
            return Err(WidthError::BufferSize {
                kind: K::TYPE,
                expected: self.width,
                actual: out.len(),
            });
        }
        // The range check at construction makes these truncations lossless.
        match self.width {
            1 => out.copy_from_slice(&(self.value as i8).to_ne_bytes()),
            2 => out.copy_from_slice(&(self.value as i16).to_ne_bytes()),
            4 => out.copy_from_slice(&(self.value as i32).to_ne_bytes()),
            _ if K::TYPE.is_signed() => out.copy_from_slice(&(self.value as i64).to_ne_bytes()),
            _ => out.copy_from_slice(&(self.value as u64).to_ne_bytes()),
        }
        Ok(())
    }

    pub fn to_native_bytes(&self) -> Vec<u8> {
        let mut out = vec![0u8; self.width];
        // Sized from self.width, so it cannot fail.
        let _ = self.write_native(&mut out);
        out
    }

    /// Read a value written by the kernel at the running platform's width
    pub fn read_native(bytes: &[u8]) -> Result<Self> {
        Self::read_native_with_width(bytes, K::TYPE.resolved_width())
    }

    pub fn read_native_with_width(bytes: &[u8], width: usize) -> Result<Self> {
        check_width::<K>(width)?;
        if bytes.len() != width {
            return Err(WidthError::BufferSize {
                kind: K::TYPE,
                expected: width,
                actual: bytes.len(),
            });
        }

        let signed = K::TYPE.is_signed();
        let raw: i128 = match width {
            1 if signed => i8::from_ne_bytes(array(bytes)) as i128,
            1 => u8::from_ne_bytes(array(bytes)) as i128,
            2 if signed => i16::from_ne_bytes(array(bytes)) as i128,
            2 => u16::from_ne_bytes(array(bytes)) as i128,
            4 if signed => i32::from_ne_bytes(array(bytes)) as i128,
            4 => u32::from_ne_bytes(array(bytes)) as i128,
            _ if signed => i64::from_ne_bytes(array(bytes)) as i128,
            _ => u64::from_ne_bytes(array(bytes)) as i128,
        };
        Self::with_width(raw, width)
    }
}

impl<K: NativeKind> fmt::Debug for NativeInt<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", K::LABEL, self.value)
    }
}

impl<K: NativeKind> fmt::Display for NativeInt<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl<K: NativeKind> From<NativeInt<K>> for i128 {
    fn from(v: NativeInt<K>) -> Self {
        v.value
    }
}

fn check_width<K: NativeKind>(width: usize) -> Result<()> {
    match width {
        UNSUPPORTED => Err(WidthError::Unsupported { kind: K::TYPE }),
        1 | 2 | 4 | 8 => Ok(()),
        _ => Err(WidthError::InvalidWidth {
            kind: K::TYPE,
            width,
        }),
    }
}

fn fits(value: i128, width: usize, signed: bool) -> bool {
    let bits = (width * 8) as u32;
    if signed {
        let max = (1i128 << (bits - 1)) - 1;
        let min = -(1i128 << (bits - 1));
        (min..=max).contains(&value)
    } else {
        (0..(1i128 << bits)).contains(&value)
    }
}

fn array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    out
}
