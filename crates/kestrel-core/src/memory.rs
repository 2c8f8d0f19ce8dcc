//! # Memory Reader
//!
//! Reads target memory from a set of segments, each mapping a range of target
//! addresses onto a byte source: an in-memory buffer (mock targets), a region
//! of a core dump (`PT_LOAD`), `/proc/kcore`, or `/proc/<pid>/mem`.
//!
//! Segments are kept sorted by start address. A read may span adjacent
//! segments; any byte not covered by a segment faults the whole read. Where
//! segments overlap, the most recently added one wins.
//!
//! All address arithmetic wraps at the target's word width, so a read that
//! runs past the top of a 32-bit address space continues at address 0.

use std::fmt;
use std::fs::File;
use std::io;
use std::os::unix::fs::FileExt;
use std::sync::Arc;

use tracing::trace;

use crate::error::{KestrelError, Result};
use crate::types::{Address, Platform};

/// Random-access byte source behind a segment.
///
/// `offset` is relative to the start of the segment.
pub trait SegmentSource: Send + Sync
{
    /// Fill `buf` with the bytes at `offset`.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()>;
}

impl SegmentSource for Arc<[u8]>
{
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()>
    {
        read_slice(self, offset, buf)
    }
}

impl SegmentSource for Vec<u8>
{
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()>
    {
        read_slice(self, offset, buf)
    }
}

fn read_slice(data: &[u8], offset: u64, buf: &mut [u8]) -> io::Result<()>
{
    let bytes = usize::try_from(offset)
        .ok()
        .and_then(|start| data.get(start..)?.get(..buf.len()))
        .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "read past end of buffer"))?;
    buf.copy_from_slice(bytes);
    Ok(())
}

/// Segment backed by a region of an open file
///
/// The first `file_size` bytes of the segment come from the file starting at
/// `file_offset`; anything past that reads as zeroes (the `p_filesz` /
/// `p_memsz` gap of a core dump segment).
#[derive(Debug, Clone)]
pub struct FileSegment
{
    file: Arc<File>,
    file_offset: u64,
    file_size: u64,
}

impl FileSegment
{
    pub fn new(file: Arc<File>, file_offset: u64, file_size: u64) -> Self
    {
        Self {
            file,
            file_offset,
            file_size,
        }
    }
}

impl SegmentSource for FileSegment
{
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()>
    {
        let in_file = self.file_size.saturating_sub(offset);
        let split = usize::try_from(in_file).map_or(buf.len(), |n| n.min(buf.len()));
        let (head, tail) = buf.split_at_mut(split);
        if !head.is_empty() {
            let position = self
                .file_offset
                .checked_add(offset)
                .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "file offset overflows"))?;
            self.file.read_exact_at(head, position)?;
        }
        tail.fill(0);
        Ok(())
    }
}

struct Segment
{
    start: u64,
    /// Inclusive, so a segment can cover the whole address space
    last: u64,
    /// Insertion order; higher wins on overlap
    sequence: usize,
    source: Box<dyn SegmentSource>,
}

/// Segment-based reader over a target's address space.
pub struct MemoryReader
{
    platform: Platform,
    segments: Vec<Segment>,
}

impl MemoryReader
{
    pub fn new(platform: Platform) -> Self
    {
        Self {
            platform,
            segments: Vec::new(),
        }
    }

    pub fn platform(&self) -> Platform
    {
        self.platform
    }

    /// Map `size` bytes starting at `start` onto `source`.
    ///
    /// Empty segments are ignored.
    ///
    /// ## Errors
    ///
    /// - `MalformedTarget` if the segment extends past the top of the address space
    /// - `AllocationFailed` if the segment list can't grow
    pub fn add_segment(&mut self, start: Address, size: u64, source: impl SegmentSource + 'static) -> Result<()>
    {
        if size == 0 {
            return Ok(());
        }
        let last = start.value().checked_add(size - 1).ok_or_else(|| {
            KestrelError::MalformedTarget(format!("segment at {start} of size 0x{size:x} overflows"))
        })?;
        self.add_segment_range(start, Address::new(last), source)
    }

    /// Map the inclusive range `[start, last]` onto `source`.
    ///
    /// ## Errors
    ///
    /// `MalformedTarget` if the range is inverted or wider than the target's
    /// words; `AllocationFailed` if the segment list can't grow.
    pub fn add_segment_range(&mut self, start: Address, last: Address, source: impl SegmentSource + 'static) -> Result<()>
    {
        let (start, last) = (start.value(), last.value());
        if start > last || last > self.platform.word_mask() {
            return Err(KestrelError::MalformedTarget(format!(
                "segment 0x{start:x}-0x{last:x} doesn't fit a {} address space",
                self.platform
            )));
        }
        self.segments
            .try_reserve(1)
            .map_err(|err| KestrelError::AllocationFailed(format!("growing segment list: {err}")))?;
        let index = self.segments.partition_point(|segment| segment.start <= start);
        let sequence = self.segments.len();
        self.segments.insert(
            index,
            Segment {
                start,
                last,
                sequence,
                source: Box::new(source),
            },
        );
        trace!(start = %Address::new(start), last = %Address::new(last), "added segment");
        Ok(())
    }

    pub fn segment_count(&self) -> usize
    {
        self.segments.len()
    }

    /// The segment that serves `address`, and the last address it serves
    /// before a newer segment takes over.
    fn segment_for(&self, address: u64) -> Option<(&Segment, u64)>
    {
        let index = self.segments.partition_point(|segment| segment.start <= address);
        let (before, after) = self.segments.split_at(index);
        let segment = before
            .iter()
            .filter(|segment| address <= segment.last)
            .max_by_key(|segment| segment.sequence)?;
        // `after` only holds segments starting above `address`
        let last = after
            .iter()
            .take_while(|next| next.start <= segment.last)
            .find(|next| next.sequence > segment.sequence)
            .map_or(segment.last, |next| next.start - 1);
        Some((segment, last))
    }

    /// Fill `buf` with target memory starting at `address`.
    ///
    /// ## Errors
    ///
    /// `Fault` with the first address that no segment covers, or whose
    /// source failed to read.
    pub fn read(&self, address: Address, buf: &mut [u8]) -> Result<()>
    {
        let mut address = self.platform.mask(address.value());
        let mut done = 0;
        while done < buf.len() {
            let (segment, last) = self.segment_for(address).ok_or(KestrelError::Fault { address })?;
            let remaining = buf.len() - done;
            let available = last - address;
            let chunk = usize::try_from(available).map_or(remaining, |n| n.saturating_add(1).min(remaining));
            segment
                .source
                .read_at(address - segment.start, &mut buf[done..done + chunk])
                .map_err(|err| {
                    trace!(address = %Address::new(address), %err, "segment read failed");
                    KestrelError::Fault { address }
                })?;
            done += chunk;
            address = self.platform.wrapping_add(address, chunk as u64);
        }
        Ok(())
    }

    /// Read `len` bytes into a new buffer.
    ///
    /// ## Errors
    ///
    /// `AllocationFailed` if the buffer can't be allocated, otherwise as
    /// [`MemoryReader::read`].
    pub fn read_vec(&self, address: Address, len: usize) -> Result<Vec<u8>>
    {
        let mut buf = Vec::new();
        buf.try_reserve_exact(len)?;
        buf.resize(len, 0);
        self.read(address, &mut buf)?;
        Ok(buf)
    }

    /// Read one target word, decoded in target byte order.
    pub fn read_word(&self, address: Address) -> Result<u64>
    {
        let mut raw = [0u8; 8];
        let word = &mut raw[..usize::from(self.platform.word_size())];
        self.read(address, word)?;
        self.platform
            .read_word(word)
            .ok_or(KestrelError::Fault { address: address.value() })
    }
}

impl fmt::Debug for MemoryReader
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let ranges: Vec<_> = self
            .segments
            .iter()
            .map(|segment| format!("0x{:x}-0x{:x}", segment.start, segment.last))
            .collect();
        f.debug_struct("MemoryReader")
            .field("platform", &self.platform)
            .field("segments", &ranges)
            .finish()
    }
}
