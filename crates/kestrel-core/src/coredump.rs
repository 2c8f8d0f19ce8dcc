//! ELF core layout.
//!
//! Reads just enough of an ELF core (a crash dump or `/proc/kcore`) to build
//! a program: the class and byte order, the `PT_LOAD` segments, and the
//! `VMCOREINFO` and `NT_FILE` notes. The file is read through
//! [`object::read::ReadCache`], so only the headers and notes are pulled into
//! memory; segment contents stay on disk.

use std::fs::File;

use object::elf::{FileHeader32, FileHeader64, ET_CORE, PT_LOAD, PT_NOTE};
use object::read::elf::{FileHeader, ProgramHeader};
use object::read::ReadCache;
use object::{Endian, Endianness, FileKind};
use tracing::debug;

use crate::error::{KestrelError, Result};
use crate::memmap::NT_FILE;
use crate::types::Platform;

/// Note name of the kernel's VMCOREINFO blob.
const VMCOREINFO_NAME: &[u8] = b"VMCOREINFO";
/// Note name used by the kernel for process core notes.
const CORE_NAME: &[u8] = b"CORE";

/// One `PT_LOAD` program header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreSegment
{
    pub address: u64,
    pub file_offset: u64,
    pub file_size: u64,
    pub memory_size: u64,
}

/// Everything a program initializer needs from an ELF core.
#[derive(Debug, Clone)]
pub struct CoreLayout
{
    pub platform: Platform,
    pub segments: Vec<CoreSegment>,
    /// Descriptor of the `VMCOREINFO` note, present for kernel cores
    pub vmcoreinfo: Option<Vec<u8>>,
    /// Descriptor of the `NT_FILE` note, present for most userspace cores
    pub nt_file: Option<Vec<u8>>,
}

/// Parse the layout of the ELF core in `file`.
///
/// ## Errors
///
/// `MalformedTarget` if the file isn't a 32- or 64-bit ELF file of type
/// `ET_CORE`, or if its program headers or notes can't be parsed. I/O errors
/// surface as `MalformedTarget` too, since `object` doesn't keep them apart.
pub fn parse_core(file: &File) -> Result<CoreLayout>
{
    let cache = ReadCache::new(file);
    let layout = match FileKind::parse(&cache)? {
        FileKind::Elf32 => parse_with::<FileHeader32<Endianness>>(&cache, 4)?,
        FileKind::Elf64 => parse_with::<FileHeader64<Endianness>>(&cache, 8)?,
        other => return Err(KestrelError::MalformedTarget(format!("not an ELF core ({other:?})"))),
    };
    debug!(
        platform = %layout.platform,
        segments = layout.segments.len(),
        vmcoreinfo = layout.vmcoreinfo.is_some(),
        nt_file = layout.nt_file.is_some(),
        "parsed ELF core"
    );
    Ok(layout)
}

fn parse_with<Elf: FileHeader<Endian = Endianness>>(data: &ReadCache<&File>, word_size: u8) -> Result<CoreLayout>
{
    let header = Elf::parse(data)?;
    let endian = header.endian()?;
    if header.e_type(endian) != ET_CORE {
        return Err(KestrelError::MalformedTarget(format!(
            "ELF type {} is not ET_CORE",
            header.e_type(endian)
        )));
    }
    let platform = Platform::new(word_size, endian.is_little_endian())?;

    let mut layout = CoreLayout {
        platform,
        segments: Vec::new(),
        vmcoreinfo: None,
        nt_file: None,
    };
    for phdr in header.program_headers(endian, data)? {
        match phdr.p_type(endian) {
            PT_LOAD => {
                let segment = CoreSegment {
                    address: phdr.p_vaddr(endian).into(),
                    file_offset: phdr.p_offset(endian).into(),
                    file_size: phdr.p_filesz(endian).into(),
                    memory_size: phdr.p_memsz(endian).into(),
                };
                if segment.file_size > segment.memory_size {
                    return Err(KestrelError::MalformedTarget(format!(
                        "PT_LOAD at 0x{:x} has p_filesz larger than p_memsz",
                        segment.address
                    )));
                }
                layout.segments.try_reserve(1)?;
                layout.segments.push(segment);
            }
            PT_NOTE => {
                let Some(mut notes) = phdr.notes(endian, data)? else {
                    continue;
                };
                while let Some(note) = notes.next()? {
                    if note.name() == VMCOREINFO_NAME {
                        layout.vmcoreinfo = Some(note.desc().to_vec());
                    } else if note.name() == CORE_NAME && note.n_type(endian) == NT_FILE {
                        layout.nt_file = Some(note.desc().to_vec());
                    }
                }
            }
            _ => {}
        }
    }
    Ok(layout)
}
