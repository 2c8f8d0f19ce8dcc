//! Process identifier type.

use std::fmt;
use std::str::FromStr;

/// Process identifier (PID)
///
/// A PID names a running process on the host. Wrapping it keeps PIDs from
/// being confused with addresses, sizes, or word values, all of which are
/// plain integers too.
///
/// ## Example
///
/// ```rust,no_run
/// use kestrel_core::program::{Program, ProgramConfig};
/// use kestrel_core::types::ProcessId;
///
/// let program = Program::from_pid(ProcessId::from(12345), &ProgramConfig::default())?;
/// println!("{} mappings", program.mappings().len());
/// # Ok::<(), kestrel_core::error::KestrelError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessId(pub u32);

impl From<u32> for ProcessId
{
    fn from(pid: u32) -> Self
    {
        ProcessId(pid)
    }
}

impl From<ProcessId> for u32
{
    fn from(pid: ProcessId) -> Self
    {
        pid.0
    }
}

impl FromStr for ProcessId
{
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        s.trim().parse().map(ProcessId)
    }
}

impl fmt::Display for ProcessId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.0)
    }
}
