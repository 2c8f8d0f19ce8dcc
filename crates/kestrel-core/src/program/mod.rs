//! # Program
//!
//! A handle on one debugging target.
//!
//! A [`Program`] unifies access to a target's memory, types and symbols,
//! whatever the target is:
//!
//! | initializer | target | metadata |
//! |---|---|---|
//! | [`Program::from_core_dump`] | ELF core dump file | kernel or process |
//! | [`Program::from_kernel`] | the running kernel (`/proc/kcore`) | kernel |
//! | [`Program::from_pid`] | a running process (`/proc/<pid>/mem`) | process |
//! | [`Program::from_mock`] | synthetic segments, types and symbols | either |
//!
//! Every initializer either returns a fully populated program or releases
//! everything it acquired and returns the error. Dropping the program runs its
//! cleanup chain once and then releases the reader, indices and metadata.
//!
//! ## Kind-specific accessors
//!
//! Kernel accessors ([`Program::osrelease`], [`Program::kaslr_offset`],
//! [`Program::kernel_address`]) and process accessors ([`Program::mappings`],
//! [`Program::mapping_for_address`]) panic on the wrong kind of program.
//! Check [`Program::is_kernel`] first, or use [`Program::kernel_info`] /
//! [`Program::process_mappings`], which return `None` instead.

mod builder;
mod config;
mod core_dump;
mod kernel;
mod mock;
mod process;
mod userspace;

use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;
use tracing::debug;

pub use builder::ProgramBuilder;
pub use config::{ProgramConfig, DEFAULT_DEBUG_INFO_DIR};
pub use mock::{MockSegment, MockTarget};

use crate::cleanup::{Cleanup, CleanupChain};
use crate::error::Result;
use crate::memory::MemoryReader;
use crate::metadata::{FileMapping, KernelInfo, MappingHit, ProcessMappings, TargetMetadata};
use crate::symbols::{Symbol, SymbolIndex};
use crate::type_index::{TypeDescriptor, TypeIndex};
use crate::types::{Address, Platform};

bitflags! {
    /// Properties of a program fixed at initialization.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ProgramFlags: u32
    {
        /// The target is a Linux kernel (core dump or live)
        const IS_LINUX_KERNEL = 1 << 0;
        /// The target is running; its memory may change between reads
        const IS_LIVE = 1 << 1;
    }
}

/// A debugging target
///
/// Created by one of the initializers; see the [module docs](self).
pub struct Program
{
    cleanup: CleanupChain,
    reader: MemoryReader,
    type_index: Box<dyn TypeIndex>,
    symbol_index: Box<dyn SymbolIndex>,
    metadata: TargetMetadata,
    flags: ProgramFlags,
    platform: Platform,
}

impl Program
{
    pub fn platform(&self) -> Platform
    {
        self.platform
    }

    /// Size of a target word in bytes (4 or 8).
    pub fn word_size(&self) -> u8
    {
        self.platform.word_size()
    }

    pub fn is_little_endian(&self) -> bool
    {
        self.platform.is_little_endian()
    }

    /// All-ones value as wide as a target word.
    ///
    /// ```rust
    /// use kestrel_core::program::{MockTarget, Program};
    ///
    /// let program = Program::from_mock(MockTarget::new(4, true))?;
    /// assert_eq!(program.word_mask(), 0xffff_ffff);
    /// # Ok::<(), kestrel_core::error::KestrelError>(())
    /// ```
    pub fn word_mask(&self) -> u64
    {
        self.platform.word_mask()
    }

    pub fn flags(&self) -> ProgramFlags
    {
        self.flags
    }

    pub fn is_kernel(&self) -> bool
    {
        self.flags.contains(ProgramFlags::IS_LINUX_KERNEL)
    }

    pub fn is_live(&self) -> bool
    {
        self.flags.contains(ProgramFlags::IS_LIVE)
    }

    pub fn metadata(&self) -> &TargetMetadata
    {
        &self.metadata
    }

    /// Kernel metadata, or `None` for a userspace program.
    pub fn kernel_info(&self) -> Option<&KernelInfo>
    {
        self.metadata.kernel()
    }

    /// File mappings, or `None` for a kernel program.
    pub fn process_mappings(&self) -> Option<&ProcessMappings>
    {
        self.metadata.process()
    }

    fn expect_kernel(&self, what: &str) -> &KernelInfo
    {
        match &self.metadata {
            TargetMetadata::Kernel(info) => info,
            TargetMetadata::Process(_) => panic!("{what} called on a userspace program"),
        }
    }

    fn expect_process(&self, what: &str) -> &ProcessMappings
    {
        match &self.metadata {
            TargetMetadata::Process(mappings) => mappings,
            TargetMetadata::Kernel(_) => panic!("{what} called on a kernel program"),
        }
    }

    /// Kernel release string.
    ///
    /// ## Panics
    ///
    /// If the program is not a kernel.
    pub fn osrelease(&self) -> &str
    {
        self.expect_kernel("osrelease").osrelease()
    }

    /// KASLR offset of the kernel image; zero when KASLR is off.
    ///
    /// ## Panics
    ///
    /// If the program is not a kernel.
    pub fn kaslr_offset(&self) -> u64
    {
        self.expect_kernel("kaslr_offset").kaslr_offset()
    }

    /// Runtime address of a kernel address as linked in `vmlinux`.
    ///
    /// ## Panics
    ///
    /// If the program is not a kernel.
    pub fn kernel_address(&self, linked: u64) -> u64
    {
        let offset = self.expect_kernel("kernel_address").kaslr_offset();
        self.platform.wrapping_add(linked, offset)
    }

    /// Mapped files, ordered by start address.
    ///
    /// ## Panics
    ///
    /// If the program is a kernel.
    pub fn mappings(&self) -> &[FileMapping]
    {
        self.expect_process("mappings").as_slice()
    }

    /// The mapping containing `address`, if any.
    ///
    /// ## Panics
    ///
    /// If the program is a kernel.
    pub fn mapping_for_address(&self, address: Address) -> Option<MappingHit<'_>>
    {
        let address = self.platform.mask_address(address);
        self.expect_process("mapping_for_address").lookup(address)
    }

    pub fn reader(&self) -> &MemoryReader
    {
        &self.reader
    }

    /// Fill `buf` with target memory at `address`.
    ///
    /// ## Errors
    ///
    /// `Fault` if any byte isn't mapped.
    pub fn read_memory(&self, address: Address, buf: &mut [u8]) -> Result<()>
    {
        self.reader.read(address, buf)
    }

    /// Read `len` bytes of target memory.
    pub fn read(&self, address: Address, len: usize) -> Result<Vec<u8>>
    {
        self.reader.read_vec(address, len)
    }

    /// Read one target word in target byte order.
    pub fn read_word(&self, address: Address) -> Result<u64>
    {
        self.reader.read_word(address)
    }

    /// Look up a type by name (`int`, `struct task_struct`).
    pub fn find_type(&self, name: &str) -> Result<Option<Arc<TypeDescriptor>>>
    {
        self.type_index.find(name)
    }

    pub fn find_symbol(&self, name: &str) -> Option<Symbol>
    {
        self.symbol_index.find(name)
    }

    pub fn symbol_at(&self, address: Address) -> Option<Symbol>
    {
        self.symbol_index.symbol_at(address)
    }

    pub fn symbol_count(&self) -> usize
    {
        self.symbol_index.len()
    }

    /// Register a teardown action to run when the program is dropped.
    ///
    /// ## Errors
    ///
    /// `AllocationFailed` if the chain can't grow.
    pub fn add_cleanup<C: Cleanup>(&mut self, cleanup: C) -> Result<()>
    {
        self.cleanup.register(cleanup)
    }

    /// Remove the most recently added matching entry without running it.
    pub fn remove_cleanup<C: Cleanup + PartialEq>(&mut self, cleanup: &C) -> bool
    {
        self.cleanup.unregister(cleanup)
    }
}

impl Drop for Program
{
    fn drop(&mut self)
    {
        debug!(cleanups = self.cleanup.len(), "releasing program");
        self.cleanup.run_all_and_clear();
    }
}

impl fmt::Debug for Program
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("Program")
            .field("platform", &self.platform)
            .field("flags", &self.flags)
            .field("metadata", &self.metadata)
            .field("reader", &self.reader)
            .field("symbols", &self.symbol_index.len())
            .field("cleanup", &self.cleanup)
            .finish_non_exhaustive()
    }
}
