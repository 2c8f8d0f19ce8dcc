//! Word size and byte order of a target.

use std::fmt;

use gimli::RunTimeEndian;

use super::Address;
use crate::error::{KestrelError, Result};

/// Word size and endianness of a debugging target
///
/// Both properties are fixed for the lifetime of a
/// [`Program`](crate::program::Program). The word size is always 4 or 8;
/// [`Platform::new`] rejects anything else as a malformed target so no query
/// ever runs against an address width we can't represent.
///
/// ## Example
///
/// ```rust
/// use kestrel_core::types::Platform;
///
/// let platform = Platform::new(4, true)?;
/// assert_eq!(platform.word_mask(), 0xffff_ffff);
/// assert_eq!(platform.mask(0x1_2345_6789), 0x2345_6789);
/// # Ok::<(), kestrel_core::error::KestrelError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Platform
{
    word_size: u8,
    little_endian: bool,
}

impl Platform
{
    /// Validate and build a platform description.
    ///
    /// ## Errors
    ///
    /// `MalformedTarget` if `word_size` is not 4 or 8.
    pub fn new(word_size: u8, little_endian: bool) -> Result<Self>
    {
        match word_size {
            4 | 8 => Ok(Self {
                word_size,
                little_endian,
            }),
            other => Err(KestrelError::MalformedTarget(format!(
                "unsupported word size {other} (expected 4 or 8)"
            ))),
        }
    }

    /// The platform this crate was compiled for.
    ///
    /// Live targets (the running kernel, a local process) share the host's
    /// word size and byte order.
    pub const fn host() -> Self
    {
        Self {
            word_size: if cfg!(target_pointer_width = "64") { 8 } else { 4 },
            little_endian: cfg!(target_endian = "little"),
        }
    }

    /// Size of a target machine word in bytes (4 or 8).
    pub const fn word_size(self) -> u8
    {
        self.word_size
    }

    pub const fn is_little_endian(self) -> bool
    {
        self.little_endian
    }

    /// All-ones value as wide as a target word.
    pub const fn word_mask(self) -> u64
    {
        if self.word_size == 8 {
            u64::MAX
        } else {
            u32::MAX as u64
        }
    }

    /// Truncate `value` to the target word width.
    pub const fn mask(self, value: u64) -> u64
    {
        value & self.word_mask()
    }

    /// Add two values with wraparound at the target word width.
    pub const fn wrapping_add(self, lhs: u64, rhs: u64) -> u64
    {
        lhs.wrapping_add(rhs) & self.word_mask()
    }

    /// Truncate an address to the target word width.
    pub const fn mask_address(self, address: Address) -> Address
    {
        address.masked(self.word_mask())
    }

    /// Decode one target word from the start of `bytes`.
    ///
    /// Returns `None` if `bytes` is shorter than a word.
    pub fn read_word(self, bytes: &[u8]) -> Option<u64>
    {
        match self.word_size {
            8 => {
                let raw: [u8; 8] = bytes.get(..8)?.try_into().ok()?;
                Some(if self.little_endian {
                    u64::from_le_bytes(raw)
                } else {
                    u64::from_be_bytes(raw)
                })
            }
            _ => {
                let raw: [u8; 4] = bytes.get(..4)?.try_into().ok()?;
                Some(u64::from(if self.little_endian {
                    u32::from_le_bytes(raw)
                } else {
                    u32::from_be_bytes(raw)
                }))
            }
        }
    }

    /// Byte order in the form `gimli` expects.
    pub const fn endian(self) -> RunTimeEndian
    {
        if self.little_endian {
            RunTimeEndian::Little
        } else {
            RunTimeEndian::Big
        }
    }
}

impl fmt::Display for Platform
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let order = if self.little_endian { "little-endian" } else { "big-endian" };
        write!(f, "{}-bit {order}", u32::from(self.word_size) * 8)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_rejects_odd_word_sizes()
    {
        for size in [0, 1, 2, 3, 5, 16] {
            let err = Platform::new(size, true).unwrap_err();
            assert!(err.is_malformed(), "word size {size} should be malformed");
        }
    }

    #[test]
    fn test_word_mask_matches_width()
    {
        assert_eq!(Platform::new(4, true).unwrap().word_mask(), (1u64 << 32) - 1);
        assert_eq!(Platform::new(8, false).unwrap().word_mask(), u64::MAX);
    }

    #[test]
    fn test_wrapping_add_on_narrow_target()
    {
        let platform = Platform::new(4, true).unwrap();
        assert_eq!(platform.wrapping_add(0xffff_fff0, 0x20), 0x10);
    }

    #[test]
    fn test_read_word_respects_byte_order()
    {
        let bytes = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];
        assert_eq!(Platform::new(4, true).unwrap().read_word(&bytes), Some(0x0403_0201));
        assert_eq!(Platform::new(4, false).unwrap().read_word(&bytes), Some(0x0102_0304));
        assert_eq!(
            Platform::new(8, true).unwrap().read_word(&bytes),
            Some(0x0807_0605_0403_0201)
        );
        assert_eq!(Platform::new(8, true).unwrap().read_word(&bytes[..7]), None);
    }

    #[test]
    fn test_display()
    {
        assert_eq!(Platform::new(8, true).unwrap().to_string(), "64-bit little-endian");
        assert_eq!(Platform::new(4, false).unwrap().to_string(), "32-bit big-endian");
    }
}
