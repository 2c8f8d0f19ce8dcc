//! # Types
//!
//! Small value types shared by every part of the crate: addresses, process
//! identifiers, and the word size / byte order of a target.

pub mod address;
pub mod platform;
pub mod process;

pub use address::Address;
pub use platform::Platform;
pub use process::ProcessId;
