//! Live kernel initializer and kernel debug info lookup.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use super::userspace::{report, tolerate};
use super::{Program, ProgramBuilder, ProgramConfig, ProgramFlags};
use crate::cleanup::Release;
use crate::coredump::{self, CoreLayout};
use crate::elf::ElfFile;
use crate::error::{KestrelError, Result};
use crate::memory::{FileSegment, MemoryReader};
use crate::metadata::{KernelInfo, TargetMetadata};
use crate::symbols::{SymbolIndex, SymbolTable};
use crate::type_index::DwarfTypeIndex;
use crate::types::{Address, Platform};
use crate::vmcoreinfo::parse_vmcoreinfo;

/// One file-backed segment per `PT_LOAD` of a core.
pub(super) fn core_reader(file: &Arc<File>, layout: &CoreLayout, platform: Platform) -> Result<MemoryReader>
{
    let mut reader = MemoryReader::new(platform);
    for segment in &layout.segments {
        reader.add_segment(
            Address::new(segment.address),
            segment.memory_size,
            FileSegment::new(Arc::clone(file), segment.file_offset, segment.file_size),
        )?;
    }
    Ok(reader)
}

/// Symbols and types for a kernel target.
///
/// `vmlinux` is preferred; its addresses are shifted by the KASLR offset. If
/// no candidate opens, `kallsyms` (already at runtime addresses) supplies
/// symbols when given. Without either, both indices are empty.
pub(super) fn kernel_indices(
    info: &KernelInfo,
    platform: Platform,
    config: &ProgramConfig,
    kallsyms: Option<&Path>,
) -> Result<(SymbolTable, DwarfTypeIndex)>
{
    let mut symbols = SymbolTable::new(platform);
    let mut types = DwarfTypeIndex::new();

    let vmlinux = config.vmlinux_candidates(info.osrelease()).into_iter().find_map(|candidate| {
        match ElfFile::open(&candidate) {
            Ok(elf) => Some(elf),
            Err(err) => {
                debug!(path = %candidate.display(), %err, "vmlinux candidate rejected");
                None
            }
        }
    });

    if let Some(elf) = vmlinux {
        let path = elf.path().display().to_string();
        tolerate(config, &path, symbols.add_elf(&elf, info.kaslr_offset()))?;
        if elf.has_debug_info() {
            tolerate(config, &path, types.add_file(&elf))?;
        } else {
            report(config, &path, &"no .debug_info section");
        }
        return Ok((symbols, types));
    }

    report(config, &format!("vmlinux-{}", info.osrelease()), &"not found");
    if let Some(path) = kallsyms {
        let display = path.display().to_string();
        let table = File::open(path)
            .map_err(|err| KestrelError::from_io(&display, err))
            .and_then(|file| SymbolTable::from_symbol_file(BufReader::new(file), platform));
        if let Some(table) = tolerate(config, &display, table)? {
            symbols = table;
        }
    }
    Ok((symbols, types))
}

impl Program
{
    /// Open the running kernel through `<proc_root>/kcore`.
    ///
    /// Word size and byte order are the host's. The kcore must carry a
    /// VMCOREINFO note.
    ///
    /// ## Errors
    ///
    /// - `TargetNotFound` if kcore doesn't exist
    /// - `PermissionDenied` if kcore can't be opened (usually needs root)
    /// - `MalformedTarget` if kcore isn't an ELF core or lacks VMCOREINFO
    pub fn from_kernel(config: &ProgramConfig) -> Result<Self>
    {
        let kcore_path = config.proc_path("kcore");
        let file = File::open(&kcore_path).map_err(|err| KestrelError::from_io(kcore_path.display().to_string(), err))?;
        let layout = coredump::parse_core(&file)?;
        let platform = Platform::host();
        if layout.platform != platform {
            debug!(kcore = %layout.platform, host = %platform, "kcore header disagrees with host");
        }

        let mut builder = ProgramBuilder::new(platform);
        let file = Arc::new(file);
        builder.add_cleanup(Release::new("kcore", Arc::clone(&file)))?;

        let note = layout.vmcoreinfo.as_deref().ok_or_else(|| {
            KestrelError::MalformedTarget(format!("{} has no VMCOREINFO note", kcore_path.display()))
        })?;
        let info = parse_vmcoreinfo(note)?;
        let reader = core_reader(&file, &layout, platform)?;
        let (symbols, types) = kernel_indices(&info, platform, config, Some(&config.proc_path("kallsyms")))?;
        debug!(osrelease = info.osrelease(), symbols = symbols.len(), "opened live kernel");

        builder.build(
            reader,
            Box::new(types),
            Box::new(symbols),
            TargetMetadata::Kernel(info),
            ProgramFlags::IS_LINUX_KERNEL | ProgramFlags::IS_LIVE,
        )
    }
}
