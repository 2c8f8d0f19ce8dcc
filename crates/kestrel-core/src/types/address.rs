//! Target address type.

use std::fmt;

/// Strongly typed virtual address in the target's address space
///
/// The value is always stored as a `u64`, even for 32-bit targets. Code that
/// performs arithmetic on behalf of a specific target should go through
/// [`Platform::mask`](super::Platform::mask) (or [`Address::masked`]) so the
/// result wraps at the target's word width instead of growing past it.
///
/// ## Example
///
/// ```rust
/// use kestrel_core::types::Address;
///
/// let addr = Address::new(0x7fff_1000);
/// assert_eq!(addr.value(), 0x7fff_1000);
/// assert_eq!(addr.to_string(), "0x7fff1000");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address(u64);

impl Address
{
    /// The null address (0x0)
    pub const ZERO: Self = Address(0);

    /// Create a new address from a `u64` value
    pub const fn new(value: u64) -> Self
    {
        Address(value)
    }

    /// Get the raw `u64` value of this address
    pub const fn value(self) -> u64
    {
        self.0
    }

    /// Restrict this address to the bits selected by `mask`
    ///
    /// ```rust
    /// use kestrel_core::types::Address;
    ///
    /// let addr = Address::new(0x1_0000_0010);
    /// assert_eq!(addr.masked(0xffff_ffff), Address::new(0x10));
    /// ```
    #[must_use]
    pub const fn masked(self, mask: u64) -> Self
    {
        Address(self.0 & mask)
    }
}

impl fmt::Display for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "0x{:x}", self.0)
    }
}

impl fmt::LowerHex for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        fmt::LowerHex::fmt(&self.0, f)
    }
}
