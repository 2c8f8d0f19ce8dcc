//! Mock target initializer.

use std::sync::Arc;

use super::{Program, ProgramBuilder, ProgramFlags};
use crate::error::Result;
use crate::memory::MemoryReader;
use crate::metadata::{FileMapping, KernelInfo, ProcessMappings, TargetMetadata};
use crate::symbols::{Symbol, SymbolTable};
use crate::type_index::{MockTypeIndex, TypeDescriptor};
use crate::types::{Address, Platform};

/// A block of synthetic memory.
#[derive(Debug, Clone)]
pub struct MockSegment
{
    pub address: u64,
    pub data: Arc<[u8]>,
}

impl MockSegment
{
    pub fn new(address: u64, data: impl Into<Arc<[u8]>>) -> Self
    {
        Self {
            address,
            data: data.into(),
        }
    }
}

/// Description of a synthetic target for [`Program::from_mock`]
///
/// A mock target is a userspace target with no mappings unless
/// [`MockTarget::with_mappings`] or [`MockTarget::kernel`] says otherwise.
///
/// ## Example
///
/// ```rust
/// use kestrel_core::program::{MockSegment, MockTarget, Program};
/// use kestrel_core::symbols::Symbol;
/// use kestrel_core::types::Address;
///
/// let target = MockTarget::new(8, true)
///     .with_segment(MockSegment::new(0x1000, vec![0x2a, 0, 0, 0, 0, 0, 0, 0]))
///     .with_symbol(Symbol::new("answer", 0x1000, 8));
/// let program = Program::from_mock(target)?;
/// let answer = program.find_symbol("answer").unwrap();
/// assert_eq!(program.read_word(Address::new(answer.address))?, 42);
/// # Ok::<(), kestrel_core::error::KestrelError>(())
/// ```
#[derive(Debug)]
pub struct MockTarget
{
    word_size: u8,
    little_endian: bool,
    segments: Vec<MockSegment>,
    types: Vec<TypeDescriptor>,
    symbols: Vec<Symbol>,
    metadata: TargetMetadata,
}

impl MockTarget
{
    /// Start describing a target with the given word size and byte order.
    ///
    /// The word size is validated by [`Program::from_mock`].
    pub fn new(word_size: u8, little_endian: bool) -> Self
    {
        Self {
            word_size,
            little_endian,
            segments: Vec::new(),
            types: Vec::new(),
            symbols: Vec::new(),
            metadata: TargetMetadata::Process(ProcessMappings::new()),
        }
    }

    #[must_use]
    pub fn with_segment(mut self, segment: MockSegment) -> Self
    {
        self.segments.push(segment);
        self
    }

    #[must_use]
    pub fn with_type(mut self, descriptor: TypeDescriptor) -> Self
    {
        self.types.push(descriptor);
        self
    }

    #[must_use]
    pub fn with_symbol(mut self, symbol: Symbol) -> Self
    {
        self.symbols.push(symbol);
        self
    }

    /// Make this a userspace target with the given mappings.
    #[must_use]
    pub fn with_mappings(mut self, mappings: Vec<FileMapping>) -> Self
    {
        self.metadata = TargetMetadata::Process(ProcessMappings::from_unsorted(mappings));
        self
    }

    /// Make this a kernel target.
    ///
    /// Symbols are then treated as linked addresses and shifted by
    /// `kaslr_offset`.
    #[must_use]
    pub fn kernel(mut self, osrelease: impl Into<String>, kaslr_offset: u64) -> Self
    {
        self.metadata = TargetMetadata::Kernel(KernelInfo::new(osrelease, kaslr_offset));
        self
    }
}

impl Program
{
    /// Build a program over synthetic memory, types and symbols.
    ///
    /// ## Errors
    ///
    /// `MalformedTarget` if the word size isn't 4 or 8, or a segment doesn't
    /// fit the address space.
    pub fn from_mock(target: MockTarget) -> Result<Self>
    {
        let MockTarget {
            word_size,
            little_endian,
            segments,
            types,
            symbols,
            metadata,
        } = target;
        let platform = Platform::new(word_size, little_endian)?;
        let builder = ProgramBuilder::new(platform);

        let mut reader = MemoryReader::new(platform);
        for segment in segments {
            let size = segment.data.len() as u64;
            reader.add_segment(Address::new(segment.address), size, segment.data)?;
        }

        let mut symbol_table = SymbolTable::new(platform);
        let bias = metadata.kernel().map_or(0, KernelInfo::kaslr_offset);
        symbol_table.extend_biased(symbols, bias)?;

        let flags = if metadata.is_kernel() {
            ProgramFlags::IS_LINUX_KERNEL
        } else {
            ProgramFlags::empty()
        };
        builder.build(
            reader,
            Box::new(MockTypeIndex::new(types)),
            Box::new(symbol_table),
            metadata,
            flags,
        )
    }
}
