//! # Error Types
//!
//! Error handling for program construction and queries.
//!
//! We use `thiserror` to automatically generate `Error` trait implementations
//! and nice error messages.
//!
//! Lookups that can legitimately come up empty (an address outside every
//! mapping, a symbol that isn't defined, a cleanup that was never registered)
//! are not errors: they return `Option` or `bool`.

use std::io;

use thiserror::Error;

/// Main error type for program operations
///
/// ## Error Categories
///
/// 1. **Acquisition errors**: PermissionDenied, TargetNotFound, ProcessNotFound, AttachFailed, Io
/// 2. **Malformed targets**: MalformedTarget (bad word size, truncated notes, unparsable maps)
/// 3. **Allocation errors**: AllocationFailed (cleanup chain or mapping list growth)
/// 4. **Memory faults**: Fault (address not backed by any segment)
/// 5. **Caller errors**: InvalidArgument
#[derive(Error, Debug)]
pub enum KestrelError
{
    /// Insufficient privilege to read the target
    ///
    /// For the live kernel this usually means `/proc/kcore` needs root (or
    /// `CAP_SYS_RAWIO`). For a live process it means attaching was refused
    /// (`/proc/<pid>/mem` is gated by ptrace access mode checks).
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The target (core dump file, kernel memory device) doesn't exist
    #[error("Target not found: {0}")]
    TargetNotFound(String),

    /// The process with the given PID doesn't exist or has exited
    #[error("Process not found: PID {0}")]
    ProcessNotFound(u32),

    /// Attaching to a live target failed for a reason other than privilege
    #[error("Failed to attach: {0}")]
    AttachFailed(String),

    /// The target produced data we can't trust
    ///
    /// Examples:
    /// - Word size other than 4 or 8
    /// - Truncated VMCOREINFO or `NT_FILE` note
    /// - Unparsable `/proc/<pid>/maps` line
    /// - Invalid ELF or DWARF structures
    #[error("Malformed target: {0}")]
    MalformedTarget(String),

    /// Growing an internal collection failed
    ///
    /// Registration of a cleanup entry must never be silently dropped, so
    /// allocation failure is surfaced instead of aborting.
    #[error("Allocation failed: {0}")]
    AllocationFailed(String),

    /// No segment backs the requested address
    #[error("Address not mapped: 0x{address:x}")]
    Fault
    {
        /// First address that could not be read
        address: u64,
    },

    /// Invalid argument passed by the caller
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// I/O error that doesn't fit a more specific category
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl KestrelError
{
    /// Classify an I/O error raised while acquiring `what`.
    ///
    /// `NotFound` and `PermissionDenied` become their own variants so callers
    /// can tell "no such target" apart from "not allowed" without matching on
    /// `io::ErrorKind` themselves.
    pub fn from_io(what: impl AsRef<str>, err: io::Error) -> Self
    {
        let what = what.as_ref();
        match err.kind() {
            io::ErrorKind::NotFound => KestrelError::TargetNotFound(format!("{what}: {err}")),
            io::ErrorKind::PermissionDenied => KestrelError::PermissionDenied(format!("{what}: {err}")),
            _ => KestrelError::Io(err),
        }
    }

    /// Returns `true` for errors that mean the target can't be trusted.
    pub fn is_malformed(&self) -> bool
    {
        matches!(self, KestrelError::MalformedTarget(_))
    }
}

impl From<object::read::Error> for KestrelError
{
    fn from(err: object::read::Error) -> Self
    {
        KestrelError::MalformedTarget(err.to_string())
    }
}

impl From<std::collections::TryReserveError> for KestrelError
{
    fn from(err: std::collections::TryReserveError) -> Self
    {
        KestrelError::AllocationFailed(err.to_string())
    }
}

/// Convenience type alias for `Result<T, KestrelError>`
///
/// ```rust
/// use kestrel_core::error::Result;
/// fn foo() -> Result<()>
/// {
///     Ok(())
/// }
/// ```
pub type Result<T> = std::result::Result<T, KestrelError>;
