//! Mappings, symbols and types of a userspace target.

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use super::ProgramConfig;
use crate::elf::ElfFile;
use crate::error::{KestrelError, Result};
use crate::memmap::MappedRange;
use crate::metadata::{FileMapping, ProcessMappings};
use crate::symbols::{SymbolIndex, SymbolTable};
use crate::type_index::DwarfTypeIndex;
use crate::types::Platform;

pub(super) struct UserspaceIndex
{
    pub mappings: ProcessMappings,
    pub symbols: SymbolTable,
    pub types: DwarfTypeIndex,
}

/// Report a problem with one backing file without failing the program.
pub(super) fn report(config: &ProgramConfig, path: &str, problem: &dyn std::fmt::Display)
{
    if config.verbose {
        warn!(path, %problem, "missing debug information");
    } else {
        debug!(path, %problem, "missing debug information");
    }
}

/// Pass through allocation failures; report anything else and carry on.
pub(super) fn tolerate<T>(config: &ProgramConfig, path: &str, result: Result<T>) -> Result<Option<T>>
{
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err @ KestrelError::AllocationFailed(_)) => Err(err),
        Err(err) => {
            report(config, path, &err);
            Ok(None)
        }
    }
}

/// Turn parsed map ranges into file mappings and index their backing files.
///
/// Each distinct path is opened once. Its symbols are loaded with the bias
/// of the mapping that starts at file offset 0, and files carrying
/// `.debug_info` feed the type index.
pub(super) fn load_userspace(ranges: Vec<MappedRange>, platform: Platform, config: &ProgramConfig) -> Result<UserspaceIndex>
{
    let mut files: HashMap<String, Option<ElfFile>> = HashMap::new();
    let mut mappings = ProcessMappings::new();
    for range in ranges {
        let elf = files
            .entry(range.path.clone())
            .or_insert_with(|| match ElfFile::open(&range.path) {
                Ok(elf) => Some(elf),
                Err(err) => {
                    report(config, &range.path, &err);
                    None
                }
            })
            .clone();
        let mut mapping = FileMapping::new(range.path, range.start, range.end, range.file_offset)?;
        if let Some(elf) = elf {
            mapping = mapping.with_elf(elf);
        }
        mappings.insert(mapping)?;
    }

    let mut symbols = SymbolTable::new(platform);
    let mut types = DwarfTypeIndex::new();
    let mut indexed = HashSet::new();
    for mapping in mappings.as_slice() {
        let Some(elf) = mapping.elf() else {
            continue;
        };
        if mapping.file_offset() != 0 || !indexed.insert(mapping.path()) {
            continue;
        }
        match elf.load_bias(mapping.start().value()) {
            Some(bias) => {
                tolerate(config, mapping.path(), symbols.add_elf(elf, bias))?;
            }
            None => report(config, mapping.path(), &"no loadable segments"),
        }
        if elf.has_debug_info() {
            tolerate(config, mapping.path(), types.add_file(elf))?;
        } else {
            report(config, mapping.path(), &"no .debug_info section");
        }
    }
    debug!(
        mappings = mappings.len(),
        files = files.len(),
        symbols = symbols.len(),
        debug_files = types.file_count(),
        "indexed userspace target"
    );

    Ok(UserspaceIndex { mappings, symbols, types })
}
