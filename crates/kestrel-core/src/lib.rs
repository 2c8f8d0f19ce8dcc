//! # kestrel-core
//!
//! Target representation for the Kestrel debugger.
//!
//! The central type is [`Program`]: one handle on a debugging target that
//! unifies access to its memory, types and symbols. A program can represent:
//!
//! - an ELF core dump, of a crashed process or of a kernel (vmcore)
//! - the running Linux kernel, through `/proc/kcore`
//! - a running process, through `/proc/<pid>/mem`
//! - a mock target assembled in memory, for tests
//!
//! ## Layout
//!
//! - [`program`]: the handle, its initializers and their configuration
//! - [`cleanup`]: the teardown chain every initializer registers into
//! - [`metadata`]: kernel info versus process file mappings
//! - [`memory`]: segment-based memory reader
//! - [`symbols`], [`type_index`]: the symbol and type lookups a program
//!   queries
//! - [`coredump`], [`memmap`], [`vmcoreinfo`]: parsers for the formats
//!   targets come in
//!
//! ## Platform Support
//!
//! Core dumps and mock targets work anywhere. The live kernel and live
//! process initializers read procfs and therefore need **Linux**.
//!
//! ## Example
//!
//! ```rust
//! use kestrel_core::prelude::*;
//!
//! let program = Program::from_mock(
//!     MockTarget::new(8, true).with_segment(MockSegment::new(0x1000, b"hello".to_vec())),
//! )?;
//! assert_eq!(program.read(Address::new(0x1000), 5)?, b"hello");
//! assert!(!program.is_kernel());
//! # Ok::<(), KestrelError>(())
//! ```

pub mod cleanup;
pub mod coredump;
pub mod elf;
pub mod error;
pub mod memmap;
pub mod memory;
pub mod metadata;
pub mod prelude;
pub mod program;
pub mod symbols;
pub mod type_index;
pub mod types;
pub mod vmcoreinfo;

// Re-export commonly used types
pub use error::{KestrelError, Result};
pub use program::{Program, ProgramConfig, ProgramFlags};
pub use types::{Address, Platform, ProcessId};
