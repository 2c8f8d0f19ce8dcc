//! Core dump initializer.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use super::kernel::{core_reader, kernel_indices};
use super::userspace::load_userspace;
use super::{Program, ProgramBuilder, ProgramConfig, ProgramFlags};
use crate::cleanup::Release;
use crate::coredump;
use crate::error::{KestrelError, Result};
use crate::memmap::parse_nt_file;
use crate::metadata::TargetMetadata;
use crate::vmcoreinfo::parse_vmcoreinfo;

impl Program
{
    /// Open an ELF core dump.
    ///
    /// A `VMCOREINFO` note makes it a kernel core; otherwise it is a
    /// userspace core whose mappings come from the `NT_FILE` note (no note
    /// means no mappings). Word size and byte order come from the ELF header.
    ///
    /// ## Errors
    ///
    /// - `TargetNotFound` / `PermissionDenied` if the file can't be opened
    /// - `MalformedTarget` if it isn't an ELF core, or a note is corrupt
    ///
    /// ## Example
    ///
    /// ```rust,no_run
    /// use kestrel_core::program::{Program, ProgramConfig};
    ///
    /// let program = Program::from_core_dump("/var/crash/vmcore", &ProgramConfig::default())?;
    /// if program.is_kernel() {
    ///     println!("kernel {}", program.osrelease());
    /// }
    /// # Ok::<(), kestrel_core::error::KestrelError>(())
    /// ```
    pub fn from_core_dump(path: impl AsRef<Path>, config: &ProgramConfig) -> Result<Self>
    {
        let path = path.as_ref();
        let file = File::open(path).map_err(|err| KestrelError::from_io(path.display().to_string(), err))?;
        let layout = coredump::parse_core(&file)?;
        let platform = layout.platform;

        let mut builder = ProgramBuilder::new(platform);
        let file = Arc::new(file);
        builder.add_cleanup(Release::new("core dump", Arc::clone(&file)))?;
        let reader = core_reader(&file, &layout, platform)?;

        if let Some(note) = &layout.vmcoreinfo {
            let info = parse_vmcoreinfo(note)?;
            let (symbols, types) = kernel_indices(&info, platform, config, None)?;
            debug!(path = %path.display(), osrelease = info.osrelease(), "opened kernel core dump");
            return builder.build(
                reader,
                Box::new(types),
                Box::new(symbols),
                TargetMetadata::Kernel(info),
                ProgramFlags::IS_LINUX_KERNEL,
            );
        }

        let ranges = match &layout.nt_file {
            Some(desc) => parse_nt_file(desc, platform)?,
            None => {
                debug!(path = %path.display(), "core dump has no NT_FILE note");
                Vec::new()
            }
        };
        let userspace = load_userspace(ranges, platform, config)?;
        debug!(path = %path.display(), mappings = userspace.mappings.len(), "opened userspace core dump");
        builder.build(
            reader,
            Box::new(userspace.types),
            Box::new(userspace.symbols),
            TargetMetadata::Process(userspace.mappings),
            ProgramFlags::empty(),
        )
    }
}
