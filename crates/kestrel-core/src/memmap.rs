//! Parsers for userspace memory maps.
//!
//! Two sources describe which files a process has mapped:
//!
//! - the `NT_FILE` note of an ELF core dump (binary, target word size and
//!   byte order), and
//! - `/proc/<pid>/maps` of a live process (text).
//!
//! Both produce [`MappedRange`] values, which initializers turn into
//! [`FileMapping`](crate::metadata::FileMapping)s once the backing files are
//! opened.

use crate::error::{KestrelError, Result};
use crate::types::Platform;

/// `n_type` of the core dump note listing mapped files ("FILE").
pub const NT_FILE: u32 = 0x4649_4c45;

/// A file-backed range before its backing file has been opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedRange
{
    pub path: String,
    pub start: u64,
    pub end: u64,
    pub file_offset: u64,
}

fn truncated() -> KestrelError
{
    KestrelError::MalformedTarget("NT_FILE note is truncated".to_string())
}

/// Parse the descriptor of an `NT_FILE` note.
///
/// Layout, in target words: `count`, `page_size`, then `count` triples of
/// `(start, end, file_offset_in_pages)`, followed by `count` NUL-terminated
/// paths.
///
/// ## Errors
///
/// `MalformedTarget` if the note is truncated, a range is inverted, or an
/// offset overflows.
pub fn parse_nt_file(desc: &[u8], platform: Platform) -> Result<Vec<MappedRange>>
{
    let word = usize::from(platform.word_size());
    let read = |index: usize| -> Result<u64> {
        let start = index.checked_mul(word).ok_or_else(truncated)?;
        desc.get(start..).and_then(|rest| platform.read_word(rest)).ok_or_else(truncated)
    };

    let count = usize::try_from(read(0)?).map_err(|_| truncated())?;
    let page_size = read(1)?;
    let table_words = count.checked_mul(3).and_then(|n| n.checked_add(2)).ok_or_else(truncated)?;
    let strings_start = table_words.checked_mul(word).ok_or_else(truncated)?;
    if strings_start > desc.len() {
        return Err(truncated());
    }

    let mut paths = desc[strings_start..].split(|&byte| byte == 0);
    let mut ranges = Vec::new();
    ranges.try_reserve(count)?;
    for i in 0..count {
        let start = read(2 + 3 * i)?;
        let end = read(3 + 3 * i)?;
        let pages = read(4 + 3 * i)?;
        let path = paths.next().ok_or_else(truncated)?;
        if start > end {
            return Err(KestrelError::MalformedTarget(format!(
                "NT_FILE entry {i} ends before it starts (0x{start:x} > 0x{end:x})"
            )));
        }
        let file_offset = pages
            .checked_mul(page_size)
            .ok_or_else(|| KestrelError::MalformedTarget(format!("NT_FILE entry {i} file offset overflows")))?;
        ranges.push(MappedRange {
            path: String::from_utf8_lossy(path).into_owned(),
            start,
            end,
            file_offset,
        });
    }
    // The last path must be NUL-terminated, so at least an empty trailer remains.
    if count > 0 && paths.next().is_none() {
        return Err(truncated());
    }
    Ok(ranges)
}

/// Parse `/proc/<pid>/maps`, keeping only file-backed ranges.
///
/// Each line looks like:
///
/// ```text
/// 7f2c4a000000-7f2c4a022000 r--p 00000000 08:01 1835023    /usr/lib/x86_64-linux-gnu/libc.so.6
/// ```
///
/// Anonymous mappings and pseudo-files (`[heap]`, `[stack]`, `[vdso]`) are
/// skipped.
///
/// ## Errors
///
/// `MalformedTarget` if a line doesn't follow the format above.
pub fn parse_proc_maps(text: &str) -> Result<Vec<MappedRange>>
{
    let mut ranges = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let malformed = || KestrelError::MalformedTarget(format!("invalid maps line: {line:?}"));

        let mut rest = line;
        let mut fields = [""; 5];
        for field in &mut fields {
            rest = rest.trim_start();
            let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
            *field = &rest[..end];
            rest = &rest[end..];
        }
        let [range, _perms, offset, _dev, _inode] = fields;
        let path = rest.trim();

        let (start, end) = range.split_once('-').ok_or_else(malformed)?;
        let start = u64::from_str_radix(start, 16).map_err(|_| malformed())?;
        let end = u64::from_str_radix(end, 16).map_err(|_| malformed())?;
        let file_offset = u64::from_str_radix(offset, 16).map_err(|_| malformed())?;
        if start > end {
            return Err(malformed());
        }
        if !path.starts_with('/') {
            continue;
        }

        ranges.try_reserve(1)?;
        ranges.push(MappedRange {
            path: path.to_string(),
            start,
            end,
            file_offset,
        });
    }
    Ok(ranges)
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn nt_file_64(entries: &[(u64, u64, u64, &str)], page_size: u64) -> Vec<u8>
    {
        let mut desc = Vec::new();
        desc.extend((entries.len() as u64).to_le_bytes());
        desc.extend(page_size.to_le_bytes());
        for (start, end, pages, _) in entries {
            desc.extend(start.to_le_bytes());
            desc.extend(end.to_le_bytes());
            desc.extend(pages.to_le_bytes());
        }
        for (_, _, _, path) in entries {
            desc.extend(path.as_bytes());
            desc.push(0);
        }
        desc
    }

    #[test]
    fn test_nt_file_64()
    {
        let desc = nt_file_64(
            &[(0x40_0000, 0x40_1000, 0, "/bin/true"), (0x7f00_0000, 0x7f00_2000, 3, "/lib/libc.so.6")],
            0x1000,
        );
        let ranges = parse_nt_file(&desc, Platform::new(8, true).unwrap()).unwrap();
        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges[0].path, "/bin/true");
        assert_eq!(ranges[1].start, 0x7f00_0000);
        assert_eq!(ranges[1].file_offset, 0x3000);
    }

    #[test]
    fn test_nt_file_32_big_endian()
    {
        let mut desc = Vec::new();
        for word in [1u32, 0x1000, 0x8000, 0x9000, 2] {
            desc.extend(word.to_be_bytes());
        }
        desc.extend(b"/a.out\0");
        let ranges = parse_nt_file(&desc, Platform::new(4, false).unwrap()).unwrap();
        assert_eq!(
            ranges,
            [MappedRange {
                path: "/a.out".to_string(),
                start: 0x8000,
                end: 0x9000,
                file_offset: 0x2000,
            }]
        );
    }

    #[test]
    fn test_nt_file_truncated()
    {
        let platform = Platform::new(8, true).unwrap();
        let desc = nt_file_64(&[(0x1000, 0x2000, 0, "/x")], 0x1000);
        for len in [0, 8, 20, 40, desc.len() - 1] {
            assert!(parse_nt_file(&desc[..len], platform).unwrap_err().is_malformed(), "len {len}");
        }
    }

    #[test]
    fn test_nt_file_huge_count()
    {
        let mut desc = Vec::new();
        desc.extend(u64::MAX.to_le_bytes());
        desc.extend(0x1000u64.to_le_bytes());
        assert!(parse_nt_file(&desc, Platform::new(8, true).unwrap()).is_err());
    }

    #[test]
    fn test_nt_file_empty()
    {
        let desc = nt_file_64(&[], 0x1000);
        assert!(parse_nt_file(&desc, Platform::new(8, true).unwrap()).unwrap().is_empty());
    }

    #[test]
    fn test_proc_maps()
    {
        let text = "\
55d0c6a00000-55d0c6a02000 r--p 00000000 08:01 1311 /usr/bin/cat
55d0c6a02000-55d0c6a07000 r-xp 00002000 08:01 1311 /usr/bin/cat
55d0c7c3c000-55d0c7c5d000 rw-p 00000000 00:00 0                          [heap]
7f1e2b400000-7f1e2b428000 r--p 00000000 08:01 4242                       /usr/lib/my lib.so (deleted)
7f1e2b600000-7f1e2b601000 rw-p 00000000 00:00 0
7ffd6a1f1000-7ffd6a1f3000 r-xp 00000000 00:00 0                          [vdso]
";
        let ranges = parse_proc_maps(text).unwrap();
        assert_eq!(ranges.len(), 3);
        assert_eq!(ranges[1].file_offset, 0x2000);
        assert_eq!(ranges[2].path, "/usr/lib/my lib.so (deleted)");
    }

    #[test]
    fn test_proc_maps_malformed()
    {
        assert!(parse_proc_maps("nonsense").unwrap_err().is_malformed());
        assert!(parse_proc_maps("2000-1000 r--p 0 00:00 0 /x").unwrap_err().is_malformed());
        assert!(parse_proc_maps("1000-2000 r--p zz 00:00 0 /x").unwrap_err().is_malformed());
    }
}
