//! # Target Metadata
//!
//! Kind-specific information about a debugging target.
//!
//! A kernel target carries its release string and KASLR offset; a userspace
//! target carries the list of files mapped into its address space. A program
//! holds exactly one of the two, chosen when it is built, as a
//! [`TargetMetadata`] value.

use std::fmt;

use crate::elf::ElfFile;
use crate::error::{KestrelError, Result};
use crate::types::Address;

/// Kernel-specific metadata, extracted from VMCOREINFO.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelInfo
{
    osrelease: String,
    kaslr_offset: u64,
}

impl KernelInfo
{
    pub fn new(osrelease: impl Into<String>, kaslr_offset: u64) -> Self
    {
        Self {
            osrelease: osrelease.into(),
            kaslr_offset,
        }
    }

    /// Kernel release, as printed by `uname -r`.
    pub fn osrelease(&self) -> &str
    {
        &self.osrelease
    }

    /// Offset from the kernel image's link address to its load address.
    ///
    /// Non-zero only when KASLR was active.
    pub fn kaslr_offset(&self) -> u64
    {
        self.kaslr_offset
    }
}

/// One file mapped into a userspace target's address space
///
/// Parsed from the `NT_FILE` note of a core dump or from
/// `/proc/<pid>/maps` of a live process. The range is half-open:
/// `[start, end)`.
pub struct FileMapping
{
    path: String,
    elf: Option<ElfFile>,
    start: Address,
    end: Address,
    file_offset: u64,
}

impl FileMapping
{
    /// Create a mapping without an ELF handle.
    ///
    /// ## Errors
    ///
    /// `MalformedTarget` if `start > end`.
    pub fn new(path: impl Into<String>, start: u64, end: u64, file_offset: u64) -> Result<Self>
    {
        let path = path.into();
        if start > end {
            return Err(KestrelError::MalformedTarget(format!(
                "mapping of {path} ends before it starts (0x{start:x} > 0x{end:x})"
            )));
        }
        Ok(Self {
            path,
            elf: None,
            start: Address::new(start),
            end: Address::new(end),
            file_offset,
        })
    }

    /// Attach the parsed backing file.
    #[must_use]
    pub fn with_elf(mut self, elf: ElfFile) -> Self
    {
        self.elf = Some(elf);
        self
    }

    pub fn path(&self) -> &str
    {
        &self.path
    }

    /// Parsed backing file, if it could be opened as ELF.
    pub fn elf(&self) -> Option<&ElfFile>
    {
        self.elf.as_ref()
    }

    pub fn start(&self) -> Address
    {
        self.start
    }

    pub fn end(&self) -> Address
    {
        self.end
    }

    /// Offset into the backing file that corresponds to `start`.
    pub fn file_offset(&self) -> u64
    {
        self.file_offset
    }

    pub fn size(&self) -> u64
    {
        self.end.value() - self.start.value()
    }

    pub fn contains(&self, address: Address) -> bool
    {
        address >= self.start && address < self.end
    }
}

impl fmt::Debug for FileMapping
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("FileMapping")
            .field("path", &self.path)
            .field("start", &self.start)
            .field("end", &self.end)
            .field("file_offset", &self.file_offset)
            .field("has_elf", &self.elf.is_some())
            .finish()
    }
}

/// Result of attributing an address to a mapping.
#[derive(Debug, Clone, Copy)]
pub struct MappingHit<'a>
{
    /// Mapping that contains the address
    pub mapping: &'a FileMapping,
    /// Distance from the mapping's start
    pub offset: u64,
    /// Corresponding offset in the backing file
    pub file_offset: u64,
}

/// File mappings of a userspace target, ordered by start address.
#[derive(Debug, Default)]
pub struct ProcessMappings
{
    mappings: Vec<FileMapping>,
}

impl ProcessMappings
{
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Build from mappings in any order.
    pub fn from_unsorted(mut mappings: Vec<FileMapping>) -> Self
    {
        mappings.sort_by_key(FileMapping::start);
        Self { mappings }
    }

    /// Insert a mapping, keeping the list sorted by start address.
    ///
    /// ## Errors
    ///
    /// `AllocationFailed` if the list can't grow.
    pub fn insert(&mut self, mapping: FileMapping) -> Result<()>
    {
        self.mappings
            .try_reserve(1)
            .map_err(|err| KestrelError::AllocationFailed(format!("growing mapping list: {err}")))?;
        let index = self.mappings.partition_point(|existing| existing.start <= mapping.start);
        self.mappings.insert(index, mapping);
        Ok(())
    }

    pub fn as_slice(&self) -> &[FileMapping]
    {
        &self.mappings
    }

    pub fn len(&self) -> usize
    {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.mappings.is_empty()
    }

    /// Find the mapping containing `address`.
    ///
    /// Binary search on the sorted start addresses; `None` if the address
    /// falls before, between, or after every mapping.
    pub fn lookup(&self, address: Address) -> Option<MappingHit<'_>>
    {
        let index = self.mappings.partition_point(|mapping| mapping.start <= address);
        let mapping = self.mappings.get(index.checked_sub(1)?)?;
        if !mapping.contains(address) {
            return None;
        }
        let offset = address.value() - mapping.start.value();
        Some(MappingHit {
            mapping,
            offset,
            file_offset: mapping.file_offset.wrapping_add(offset),
        })
    }
}

/// Kind-specific metadata of a program.
#[derive(Debug)]
pub enum TargetMetadata
{
    /// The target is a Linux kernel
    Kernel(KernelInfo),
    /// The target is a userspace process
    Process(ProcessMappings),
}

impl TargetMetadata
{
    pub fn is_kernel(&self) -> bool
    {
        matches!(self, TargetMetadata::Kernel(_))
    }

    pub fn kernel(&self) -> Option<&KernelInfo>
    {
        match self {
            TargetMetadata::Kernel(info) => Some(info),
            TargetMetadata::Process(_) => None,
        }
    }

    pub fn process(&self) -> Option<&ProcessMappings>
    {
        match self {
            TargetMetadata::Process(mappings) => Some(mappings),
            TargetMetadata::Kernel(_) => None,
        }
    }
}
