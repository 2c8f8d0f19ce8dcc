//! Live process initializer.

use std::fs::{self, File};
use std::io;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use super::userspace::load_userspace;
use super::{Program, ProgramBuilder, ProgramConfig, ProgramFlags};
use crate::cleanup::Release;
use crate::error::{KestrelError, Result};
use crate::memmap::parse_proc_maps;
use crate::memory::{FileSegment, MemoryReader};
use crate::metadata::TargetMetadata;
use crate::types::{Address, Platform, ProcessId};

/// Classify a failure to open one of a process's procfs files.
fn attach_error(pid: ProcessId, path: &Path, err: io::Error) -> KestrelError
{
    match KestrelError::from_io(path.display().to_string(), err) {
        KestrelError::TargetNotFound(_) => KestrelError::ProcessNotFound(pid.0),
        KestrelError::Io(err) => KestrelError::AttachFailed(format!("{}: {err}", path.display())),
        other => other,
    }
}

impl Program
{
    /// Attach to a running process through `<proc_root>/<pid>`.
    ///
    /// Memory is read from `mem`, which covers the whole address space;
    /// mappings come from the file-backed lines of `maps`. Word size and
    /// byte order are the host's.
    ///
    /// ## Errors
    ///
    /// - `ProcessNotFound` if the process doesn't exist
    /// - `PermissionDenied` if `maps` or `mem` can't be opened (ptrace access
    ///   checks failed)
    /// - `AttachFailed` for other failures opening them
    /// - `MalformedTarget` if `maps` can't be parsed
    pub fn from_pid(pid: ProcessId, config: &ProgramConfig) -> Result<Self>
    {
        let dir = config.proc_path(pid.to_string());
        fs::metadata(&dir).map_err(|err| attach_error(pid, &dir, err))?;

        let maps_path = dir.join("maps");
        let maps = fs::read_to_string(&maps_path).map_err(|err| attach_error(pid, &maps_path, err))?;

        let platform = Platform::host();
        let mut builder = ProgramBuilder::new(platform);
        let mem_path = dir.join("mem");
        let mem = Arc::new(File::open(&mem_path).map_err(|err| attach_error(pid, &mem_path, err))?);
        builder.add_cleanup(Release::new("process memory", Arc::clone(&mem)))?;

        let mut reader = MemoryReader::new(platform);
        reader.add_segment_range(
            Address::ZERO,
            Address::new(platform.word_mask()),
            FileSegment::new(mem, 0, u64::MAX),
        )?;

        let userspace = load_userspace(parse_proc_maps(&maps)?, platform, config)?;
        debug!(%pid, mappings = userspace.mappings.len(), "attached to process");
        builder.build(
            reader,
            Box::new(userspace.types),
            Box::new(userspace.symbols),
            TargetMetadata::Process(userspace.mappings),
            ProgramFlags::IS_LIVE,
        )
    }
}
