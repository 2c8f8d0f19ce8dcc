//! Owned handles to ELF files mapped into a target.

use std::borrow::Cow;
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use object::elf::ELFMAG;
use object::{FileKind, Object, ObjectSection, ObjectSegment, ObjectSymbol, SymbolKind};

use crate::error::{KestrelError, Result};
use crate::types::Platform;

const DEFAULT_PAGE_SIZE: u64 = 4096;

/// A symbol defined by an ELF file, at its linked address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElfSymbol
{
    pub name: String,
    pub address: u64,
    pub size: u64,
}

/// Parsed ELF file backing a mapping
///
/// The file contents are held as shared bytes so the same file mapped at
/// several ranges (text, data, relro) is read from disk once. Each
/// [`FileMapping`](crate::metadata::FileMapping) still owns its own handle.
#[derive(Clone)]
pub struct ElfFile
{
    path: PathBuf,
    data: Arc<[u8]>,
    platform: Platform,
}

impl ElfFile
{
    /// Read and validate the ELF file at `path`.
    ///
    /// Only the magic is read until the file is known to be ELF, so data
    /// files and devices in a memory map cost one small read.
    ///
    /// ## Errors
    ///
    /// - `TargetNotFound` / `PermissionDenied` / `Io` if the file can't be read
    /// - `MalformedTarget` if it isn't a 32- or 64-bit ELF file
    /// - `AllocationFailed` if the contents don't fit in memory
    pub fn open(path: impl AsRef<Path>) -> Result<Self>
    {
        let path = path.as_ref();
        let io_error = |err| KestrelError::from_io(path.display().to_string(), err);
        let not_elf = || KestrelError::MalformedTarget(format!("{} is not an ELF file", path.display()));

        let mut file = File::open(path).map_err(io_error)?;
        let mut magic = [0u8; 4];
        match file.read_exact(&mut magic) {
            Ok(()) if magic == ELFMAG => {}
            Ok(()) => return Err(not_elf()),
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Err(not_elf()),
            Err(err) => return Err(io_error(err)),
        }

        let len = file.metadata().map_or(0, |metadata| metadata.len());
        let mut bytes = Vec::new();
        bytes.try_reserve_exact(usize::try_from(len).unwrap_or(0))?;
        bytes.extend_from_slice(&magic);
        file.read_to_end(&mut bytes).map_err(io_error)?;
        Self::from_bytes(path, bytes)
    }

    /// Validate ELF bytes that were already loaded.
    pub fn from_bytes(path: impl Into<PathBuf>, data: impl Into<Arc<[u8]>>) -> Result<Self>
    {
        let path = path.into();
        let data = data.into();
        let word_size = match FileKind::parse(&*data)? {
            FileKind::Elf32 => 4,
            FileKind::Elf64 => 8,
            other => {
                return Err(KestrelError::MalformedTarget(format!(
                    "{} is not an ELF file ({other:?})",
                    path.display()
                )))
            }
        };
        let file = object::File::parse(&*data)?;
        let platform = Platform::new(word_size, file.is_little_endian())?;
        Ok(Self { path, data, platform })
    }

    pub fn path(&self) -> &Path
    {
        &self.path
    }

    /// Word size and byte order declared by the ELF header.
    pub fn platform(&self) -> Platform
    {
        self.platform
    }

    /// Raw file contents.
    pub fn data(&self) -> &[u8]
    {
        &self.data
    }

    /// Parse the file with `object`.
    ///
    /// Parsing was validated in the constructor, so this only fails if the
    /// bytes were somehow inconsistent with that first pass.
    pub fn object(&self) -> Result<object::File<'_>>
    {
        Ok(object::File::parse(&*self.data)?)
    }

    pub fn has_debug_info(&self) -> bool
    {
        self.object()
            .map(|file| file.section_by_name(".debug_info").is_some())
            .unwrap_or(false)
    }

    /// Uncompressed bytes of the first section matching one of `names`.
    pub(crate) fn section_bytes(&self, names: &[&str]) -> Result<Option<Arc<[u8]>>>
    {
        let file = self.object()?;
        for name in names {
            if let Some(section) = file.section_by_name(name) {
                let data = section
                    .uncompressed_data()
                    .map_err(|err| KestrelError::MalformedTarget(format!("failed to read {name}: {err}")))?;
                return Ok(Some(match data {
                    Cow::Borrowed(bytes) => Arc::<[u8]>::from(bytes),
                    Cow::Owned(vec) => vec.into(),
                }));
            }
        }
        Ok(None)
    }

    /// Load bias for a mapping of this file that starts at file offset 0.
    ///
    /// The bias is the mapping's start minus the page-aligned link address of
    /// the first loadable segment. Position-dependent executables get a bias
    /// of zero; shared objects get their load base. Returns `None` for files
    /// without loadable segments (relocatable objects).
    pub fn load_bias(&self, mapping_start: u64) -> Option<u64>
    {
        let file = self.object().ok()?;
        let first = file
            .segments()
            .filter(|segment| segment.size() > 0)
            .min_by_key(|segment| segment.address())?;
        let linked = first.address() & !(DEFAULT_PAGE_SIZE - 1);
        Some(self.platform.mask(mapping_start.wrapping_sub(linked)))
    }

    /// Defined text and data symbols from `.symtab` and `.dynsym`.
    ///
    /// Duplicates between the two tables are kept; the symbol table collapses
    /// identical entries.
    pub fn symbols(&self) -> Result<Vec<ElfSymbol>>
    {
        let file = self.object()?;
        let mut symbols = Vec::new();
        for symbol in file.symbols().chain(file.dynamic_symbols()) {
            if symbol.is_undefined() || !matches!(symbol.kind(), SymbolKind::Text | SymbolKind::Data) {
                continue;
            }
            let Ok(name) = symbol.name() else {
                continue;
            };
            if name.is_empty() {
                continue;
            }
            symbols.try_reserve(1)?;
            symbols.push(ElfSymbol {
                name: name.to_string(),
                address: symbol.address(),
                size: symbol.size(),
            });
        }
        Ok(symbols)
    }
}

impl fmt::Debug for ElfFile
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("ElfFile")
            .field("path", &self.path)
            .field("len", &self.data.len())
            .field("platform", &self.platform)
            .finish()
    }
}
