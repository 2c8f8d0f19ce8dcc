//! Shared fixtures: synthetic ELF cores and a fake procfs.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use kestrel_core::elf::{ElfFile, ElfSymbol};
use kestrel_core::memmap::NT_FILE;
use kestrel_core::program::ProgramConfig;
use kestrel_core::types::Platform;
use tempfile::TempDir;

const ET_CORE: u16 = 4;
const ET_EXEC: u16 = 2;
const PT_LOAD: u32 = 1;
const PT_NOTE: u32 = 4;

struct Load
{
    vaddr: u64,
    data: Vec<u8>,
    memsz: u64,
}

struct Note
{
    name: Vec<u8>,
    n_type: u32,
    desc: Vec<u8>,
}

/// Assembles a minimal ELF core image in memory.
pub struct CoreBuilder
{
    word_size: u8,
    little_endian: bool,
    e_type: u16,
    loads: Vec<Load>,
    notes: Vec<Note>,
}

impl CoreBuilder
{
    pub fn new(word_size: u8, little_endian: bool) -> Self
    {
        Self {
            word_size,
            little_endian,
            e_type: ET_CORE,
            loads: Vec::new(),
            notes: Vec::new(),
        }
    }

    /// A core with the host's word size and byte order.
    pub fn host() -> Self
    {
        let host = Platform::host();
        Self::new(host.word_size(), host.is_little_endian())
    }

    /// Mark the image as an executable instead of a core.
    pub fn executable(mut self) -> Self
    {
        self.e_type = ET_EXEC;
        self
    }

    pub fn load(self, vaddr: u64, data: &[u8]) -> Self
    {
        let memsz = data.len() as u64;
        self.load_with_memsz(vaddr, data, memsz)
    }

    pub fn load_with_memsz(mut self, vaddr: u64, data: &[u8], memsz: u64) -> Self
    {
        self.loads.push(Load {
            vaddr,
            data: data.to_vec(),
            memsz,
        });
        self
    }

    pub fn note(mut self, name: &[u8], n_type: u32, desc: &[u8]) -> Self
    {
        self.notes.push(Note {
            name: name.to_vec(),
            n_type,
            desc: desc.to_vec(),
        });
        self
    }

    pub fn vmcoreinfo(self, text: &str) -> Self
    {
        self.note(b"VMCOREINFO", 0, text.as_bytes())
    }

    /// Add an `NT_FILE` note listing `(start, end, page_offset, path)` entries.
    pub fn nt_file(self, page_size: u64, entries: &[(u64, u64, u64, &str)]) -> Self
    {
        let mut desc = Vec::new();
        self.put_word(&mut desc, entries.len() as u64);
        self.put_word(&mut desc, page_size);
        for &(start, end, page_offset, _) in entries {
            self.put_word(&mut desc, start);
            self.put_word(&mut desc, end);
            self.put_word(&mut desc, page_offset);
        }
        for &(_, _, _, path) in entries {
            desc.extend_from_slice(path.as_bytes());
            desc.push(0);
        }
        self.note(b"CORE", NT_FILE, &desc)
    }

    fn put_u16(&self, out: &mut Vec<u8>, value: u16)
    {
        if self.little_endian {
            out.extend_from_slice(&value.to_le_bytes());
        } else {
            out.extend_from_slice(&value.to_be_bytes());
        }
    }

    fn put_u32(&self, out: &mut Vec<u8>, value: u32)
    {
        if self.little_endian {
            out.extend_from_slice(&value.to_le_bytes());
        } else {
            out.extend_from_slice(&value.to_be_bytes());
        }
    }

    fn put_u64(&self, out: &mut Vec<u8>, value: u64)
    {
        if self.little_endian {
            out.extend_from_slice(&value.to_le_bytes());
        } else {
            out.extend_from_slice(&value.to_be_bytes());
        }
    }

    fn put_word(&self, out: &mut Vec<u8>, value: u64)
    {
        if self.word_size == 8 {
            self.put_u64(out, value);
        } else {
            self.put_u32(out, u32::try_from(value).unwrap());
        }
    }

    fn note_segment(&self) -> Vec<u8>
    {
        let mut out = Vec::new();
        for note in &self.notes {
            self.put_u32(&mut out, u32::try_from(note.name.len() + 1).unwrap());
            self.put_u32(&mut out, u32::try_from(note.desc.len()).unwrap());
            self.put_u32(&mut out, note.n_type);
            out.extend_from_slice(&note.name);
            out.push(0);
            pad4(&mut out);
            out.extend_from_slice(&note.desc);
            pad4(&mut out);
        }
        out
    }

    #[allow(clippy::too_many_arguments)]
    fn put_phdr(&self, out: &mut Vec<u8>, p_type: u32, offset: u64, vaddr: u64, filesz: u64, memsz: u64, align: u64)
    {
        if self.word_size == 8 {
            self.put_u32(out, p_type);
            self.put_u32(out, 4); // PF_R
            self.put_u64(out, offset);
            self.put_u64(out, vaddr);
            self.put_u64(out, 0);
            self.put_u64(out, filesz);
            self.put_u64(out, memsz);
            self.put_u64(out, align);
        } else {
            self.put_word(out, u64::from(p_type));
            self.put_word(out, offset);
            self.put_word(out, vaddr);
            self.put_word(out, 0);
            self.put_word(out, filesz);
            self.put_word(out, memsz);
            self.put_word(out, 4);
            self.put_word(out, align);
        }
    }

    pub fn build(&self) -> Vec<u8>
    {
        let (ehsize, phentsize) = if self.word_size == 8 { (64u64, 56u64) } else { (52, 32) };
        let notes = self.note_segment();
        let phnum = self.loads.len() as u64 + u64::from(!notes.is_empty());
        let data_start = ehsize + phnum * phentsize;

        let mut out = Vec::new();
        out.extend_from_slice(&[0x7f, b'E', b'L', b'F']);
        out.push(if self.word_size == 8 { 2 } else { 1 });
        out.push(if self.little_endian { 1 } else { 2 });
        out.push(1);
        out.extend_from_slice(&[0; 9]);
        self.put_u16(&mut out, self.e_type);
        self.put_u16(&mut out, 62);
        self.put_u32(&mut out, 1);
        self.put_word(&mut out, 0);
        self.put_word(&mut out, ehsize);
        self.put_word(&mut out, 0);
        self.put_u32(&mut out, 0);
        self.put_u16(&mut out, u16::try_from(ehsize).unwrap());
        self.put_u16(&mut out, u16::try_from(phentsize).unwrap());
        self.put_u16(&mut out, u16::try_from(phnum).unwrap());
        self.put_u16(&mut out, 0);
        self.put_u16(&mut out, 0);
        self.put_u16(&mut out, 0);
        assert_eq!(out.len() as u64, ehsize);

        let mut offset = data_start;
        if !notes.is_empty() {
            let size = notes.len() as u64;
            self.put_phdr(&mut out, PT_NOTE, offset, 0, size, 0, 4);
            offset += size;
        }
        for load in &self.loads {
            let size = load.data.len() as u64;
            self.put_phdr(&mut out, PT_LOAD, offset, load.vaddr, size, load.memsz, 1);
            offset += size;
        }
        assert_eq!(out.len() as u64, data_start);

        out.extend_from_slice(&notes);
        for load in &self.loads {
            out.extend_from_slice(&load.data);
        }
        out
    }

    /// Write the image to `dir/name` and return its path.
    pub fn write_to(&self, dir: &Path, name: &str) -> PathBuf
    {
        let path = dir.join(name);
        fs::write(&path, self.build()).unwrap();
        path
    }
}

fn pad4(out: &mut Vec<u8>)
{
    while out.len() % 4 != 0 {
        out.push(0);
    }
}

/// A directory laid out like `/proc`.
pub struct FakeProc
{
    dir: TempDir,
}

impl FakeProc
{
    pub fn new() -> Self
    {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn root(&self) -> &Path
    {
        self.dir.path()
    }

    /// Write `contents` to `relative`, creating parent directories.
    pub fn write(&self, relative: &str, contents: &[u8]) -> PathBuf
    {
        let path = self.dir.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, contents).unwrap();
        path
    }

    /// Configuration rooted here that finds no kernel debug info.
    pub fn config(&self) -> ProgramConfig
    {
        ProgramConfig::default()
            .with_proc_root(self.root())
            .with_debug_info_dirs(Vec::new())
    }
}

/// The running test binary, parsed.
pub fn current_exe_elf() -> ElfFile
{
    ElfFile::open(std::env::current_exe().unwrap()).unwrap()
}

/// A mangled Rust function of `elf` whose name maps to a single address.
pub fn distinct_symbol(elf: &ElfFile) -> ElfSymbol
{
    let symbols = elf.symbols().unwrap();
    symbols
        .iter()
        .find(|symbol| {
            symbol.name.starts_with("_ZN")
                && symbol.size > 0
                && symbols
                    .iter()
                    .filter(|other| other.name == symbol.name)
                    .all(|other| other.address == symbol.address)
        })
        .cloned()
        .expect("test binary has no distinct Rust symbol")
}

/// Link address of the lowest loadable segment, rounded down to a page.
pub fn first_load_page(elf: &ElfFile) -> u64
{
    use object::{Object, ObjectSegment};

    let file = object::File::parse(elf.data()).unwrap();
    let lowest = file
        .segments()
        .filter(|segment| segment.size() > 0)
        .map(|segment| segment.address())
        .min()
        .unwrap();
    lowest & !0xfff
}
