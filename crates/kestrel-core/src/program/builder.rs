//! Staged construction of a [`Program`].

use tracing::debug;

use super::{Program, ProgramFlags};
use crate::cleanup::{Cleanup, CleanupChain};
use crate::error::{KestrelError, Result};
use crate::memory::MemoryReader;
use crate::metadata::TargetMetadata;
use crate::symbols::SymbolIndex;
use crate::type_index::TypeIndex;
use crate::types::Platform;

/// Collects cleanup entries while an initializer acquires resources
///
/// The builder owns the cleanup chain until [`ProgramBuilder::build`] hands it
/// to the finished program. If an initializer bails out with `?` first, the
/// builder is dropped and the chain runs every registered entry, newest
/// first, before the error reaches the caller.
///
/// ## Example
///
/// ```rust
/// use kestrel_core::cleanup::Release;
/// use kestrel_core::memory::MemoryReader;
/// use kestrel_core::metadata::{ProcessMappings, TargetMetadata};
/// use kestrel_core::program::{ProgramBuilder, ProgramFlags};
/// use kestrel_core::symbols::SymbolTable;
/// use kestrel_core::type_index::MockTypeIndex;
/// use kestrel_core::types::Platform;
///
/// let platform = Platform::new(8, true)?;
/// let mut builder = ProgramBuilder::new(platform);
/// builder.add_cleanup(Release::new("scratch buffer", vec![0u8; 16]))?;
/// let program = builder.build(
///     MemoryReader::new(platform),
///     Box::new(MockTypeIndex::default()),
///     Box::new(SymbolTable::new(platform)),
///     TargetMetadata::Process(ProcessMappings::new()),
///     ProgramFlags::empty(),
/// )?;
/// assert_eq!(program.word_size(), 8);
/// # Ok::<(), kestrel_core::error::KestrelError>(())
/// ```
#[derive(Debug)]
pub struct ProgramBuilder
{
    platform: Platform,
    cleanup: CleanupChain,
}

impl ProgramBuilder
{
    pub fn new(platform: Platform) -> Self
    {
        Self {
            platform,
            cleanup: CleanupChain::new(),
        }
    }

    pub fn platform(&self) -> Platform
    {
        self.platform
    }

    /// Register a teardown action for a resource just acquired.
    ///
    /// ## Errors
    ///
    /// `AllocationFailed` if the chain can't grow.
    pub fn add_cleanup<C: Cleanup>(&mut self, cleanup: C) -> Result<()>
    {
        self.cleanup.register(cleanup)
    }

    /// Withdraw the most recent matching entry without running it.
    pub fn remove_cleanup<C: Cleanup + PartialEq>(&mut self, cleanup: &C) -> bool
    {
        self.cleanup.unregister(cleanup)
    }

    /// Number of entries that would run if the builder were dropped now.
    pub fn pending_cleanups(&self) -> usize
    {
        self.cleanup.len()
    }

    /// Assemble the program.
    ///
    /// ## Errors
    ///
    /// `InvalidArgument` if the metadata variant disagrees with
    /// `IS_LINUX_KERNEL`, or the reader was built for another platform. The
    /// registered cleanups run before the error is returned.
    pub fn build(
        self,
        reader: MemoryReader,
        type_index: Box<dyn TypeIndex>,
        symbol_index: Box<dyn SymbolIndex>,
        metadata: TargetMetadata,
        flags: ProgramFlags,
    ) -> Result<Program>
    {
        let ProgramBuilder { platform, cleanup } = self;
        if flags.contains(ProgramFlags::IS_LINUX_KERNEL) != metadata.is_kernel() {
            return Err(KestrelError::InvalidArgument(format!(
                "flags {flags:?} don't match {} metadata",
                if metadata.is_kernel() { "kernel" } else { "process" }
            )));
        }
        if reader.platform() != platform {
            return Err(KestrelError::InvalidArgument(format!(
                "memory reader is {} but the program is {platform}",
                reader.platform()
            )));
        }
        debug!(%platform, ?flags, cleanups = cleanup.len(), "program ready");
        Ok(Program {
            cleanup,
            reader,
            type_index,
            symbol_index,
            metadata,
            flags,
            platform,
        })
    }
}
