//! VMCOREINFO note parsing.
//!
//! The note body is plain text, one `KEY=VALUE` pair per line:
//!
//! ```text
//! OSRELEASE=6.1.0-13-amd64
//! PAGESIZE=4096
//! KERNELOFFSET=1e000000
//! ```

use tracing::debug;

use crate::error::{KestrelError, Result};
use crate::metadata::KernelInfo;

/// Size of the kernel's release buffer, including the terminating NUL.
pub const OSRELEASE_CAPACITY: usize = 128;

/// Extract the release string and KASLR offset from a VMCOREINFO note.
///
/// `OSRELEASE` is required and is truncated to fit
/// [`OSRELEASE_CAPACITY`]. `KERNELOFFSET` is hexadecimal and defaults to zero
/// when absent (KASLR disabled).
///
/// ## Errors
///
/// `MalformedTarget` if `OSRELEASE` is missing or empty, or if
/// `KERNELOFFSET` isn't a hexadecimal number.
pub fn parse_vmcoreinfo(desc: &[u8]) -> Result<KernelInfo>
{
    let mut osrelease = None;
    let mut kaslr_offset = 0;

    for line in desc.split(|&byte| byte == b'\n') {
        let line = trim_nul(line);
        let Some(eq) = line.iter().position(|&byte| byte == b'=') else {
            continue;
        };
        let (key, value) = (&line[..eq], &line[eq + 1..]);
        match key {
            b"OSRELEASE" => osrelease = Some(truncate_release(value)),
            b"KERNELOFFSET" => {
                let text = std::str::from_utf8(value)
                    .map_err(|_| KestrelError::MalformedTarget("VMCOREINFO KERNELOFFSET is not text".to_string()))?;
                kaslr_offset = u64::from_str_radix(text.trim(), 16).map_err(|err| {
                    KestrelError::MalformedTarget(format!("VMCOREINFO has invalid KERNELOFFSET {text:?}: {err}"))
                })?;
            }
            _ => {}
        }
    }

    let osrelease = osrelease
        .filter(|release| !release.is_empty())
        .ok_or_else(|| KestrelError::MalformedTarget("VMCOREINFO does not contain valid OSRELEASE".to_string()))?;
    debug!(%osrelease, kaslr_offset, "parsed VMCOREINFO");
    Ok(KernelInfo::new(osrelease, kaslr_offset))
}

fn trim_nul(bytes: &[u8]) -> &[u8]
{
    let end = bytes.iter().position(|&byte| byte == 0).unwrap_or(bytes.len());
    &bytes[..end]
}

/// Decode and truncate a release string without splitting a character.
fn truncate_release(value: &[u8]) -> String
{
    let text = String::from_utf8_lossy(value);
    let limit = OSRELEASE_CAPACITY - 1;
    if text.len() <= limit {
        return text.into_owned();
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}
