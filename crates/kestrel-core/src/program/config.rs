//! Options shared by the program initializers.

use std::env;
use std::path::{Path, PathBuf};

/// Default location of separate kernel debug info (Debian/Fedora layout).
pub const DEFAULT_DEBUG_INFO_DIR: &str = "/usr/lib/debug/lib/modules";

/// Configuration passed to [`Program`](super::Program) initializers
///
/// ## Example
///
/// ```rust
/// use kestrel_core::program::ProgramConfig;
///
/// let config = ProgramConfig::default().with_proc_root("/tmp/fake-proc").verbose(true);
/// assert_eq!(config.proc_path("kcore").to_str(), Some("/tmp/fake-proc/kcore"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramConfig
{
    /// Report missing debug information as warnings instead of debug logs
    pub verbose: bool,
    /// Directory standing in for `/proc`
    pub proc_root: PathBuf,
    /// Explicit `vmlinux` to use for kernel targets
    pub vmlinux: Option<PathBuf>,
    /// Directories searched for `<osrelease>/vmlinux`
    pub debug_info_dirs: Vec<PathBuf>,
}

impl Default for ProgramConfig
{
    fn default() -> Self
    {
        Self {
            verbose: false,
            proc_root: PathBuf::from("/proc"),
            vmlinux: None,
            debug_info_dirs: vec![PathBuf::from(DEFAULT_DEBUG_INFO_DIR)],
        }
    }
}

impl ProgramConfig
{
    /// Build a configuration from the environment.
    ///
    /// - `KESTREL_VERBOSE`: `1`, `true` or `yes` enables verbose diagnostics
    /// - `KESTREL_PROC_ROOT`: replaces `/proc`
    /// - `KESTREL_VMLINUX`: path to the kernel image with debug info
    /// - `KESTREL_DEBUG_INFO_DIRS`: colon-separated list of debug info roots
    pub fn from_env() -> Self
    {
        let mut config = Self::default();
        if let Ok(value) = env::var("KESTREL_VERBOSE") {
            config.verbose = matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Some(root) = env::var_os("KESTREL_PROC_ROOT") {
            config.proc_root = PathBuf::from(root);
        }
        if let Some(vmlinux) = env::var_os("KESTREL_VMLINUX") {
            config.vmlinux = Some(PathBuf::from(vmlinux));
        }
        if let Some(dirs) = env::var_os("KESTREL_DEBUG_INFO_DIRS") {
            config.debug_info_dirs = env::split_paths(&dirs).filter(|dir| !dir.as_os_str().is_empty()).collect();
        }
        config
    }

    #[must_use]
    pub fn verbose(mut self, verbose: bool) -> Self
    {
        self.verbose = verbose;
        self
    }

    #[must_use]
    pub fn with_proc_root(mut self, root: impl Into<PathBuf>) -> Self
    {
        self.proc_root = root.into();
        self
    }

    #[must_use]
    pub fn with_vmlinux(mut self, path: impl Into<PathBuf>) -> Self
    {
        self.vmlinux = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_debug_info_dirs(mut self, dirs: impl IntoIterator<Item = PathBuf>) -> Self
    {
        self.debug_info_dirs = dirs.into_iter().collect();
        self
    }

    /// Path of `relative` under the proc root.
    pub fn proc_path(&self, relative: impl AsRef<Path>) -> PathBuf
    {
        self.proc_root.join(relative)
    }

    /// Places to look for the `vmlinux` of `osrelease`, in search order.
    pub fn vmlinux_candidates(&self, osrelease: &str) -> Vec<PathBuf>
    {
        let mut candidates: Vec<PathBuf> = self.vmlinux.iter().cloned().collect();
        candidates.extend(self.debug_info_dirs.iter().map(|dir| dir.join(osrelease).join("vmlinux")));
        candidates.push(PathBuf::from(format!("/boot/vmlinux-{osrelease}")));
        candidates.push(Path::new("/lib/modules").join(osrelease).join("build/vmlinux"));
        candidates
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_defaults()
    {
        let config = ProgramConfig::default();
        assert!(!config.verbose);
        assert_eq!(config.proc_root, Path::new("/proc"));
        assert_eq!(config.debug_info_dirs, [PathBuf::from(DEFAULT_DEBUG_INFO_DIR)]);
    }

    #[test]
    fn test_vmlinux_candidate_order()
    {
        let config = ProgramConfig::default()
            .with_vmlinux("/srv/vmlinux")
            .with_debug_info_dirs([PathBuf::from("/dbg")]);
        let candidates = config.vmlinux_candidates("6.1.0");
        assert_eq!(
            candidates,
            [
                PathBuf::from("/srv/vmlinux"),
                PathBuf::from("/dbg/6.1.0/vmlinux"),
                PathBuf::from("/boot/vmlinux-6.1.0"),
                PathBuf::from("/lib/modules/6.1.0/build/vmlinux"),
            ]
        );
    }
}
