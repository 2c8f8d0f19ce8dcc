//! # Symbol Index
//!
//! Name and address lookup for a program's symbols.
//!
//! [`SymbolIndex`] is the seam a program queries through; [`SymbolTable`] is
//! the implementation every initializer uses. It is filled from:
//!
//! - ELF symbol tables of mapped files (userspace targets), shifted by each
//!   file's load bias
//! - `vmlinux` (kernel targets), shifted by the KASLR offset
//! - `/proc/kallsyms`, whose addresses are already live
//! - caller-supplied symbols (mock targets)
//!
//! ## Example
//!
//! ```rust
//! use kestrel_core::symbols::{Symbol, SymbolIndex, SymbolTable};
//! use kestrel_core::types::{Address, Platform};
//!
//! let mut table = SymbolTable::new(Platform::new(8, true)?);
//! table.insert(Symbol::new("main", 0x1000, 0x40))?;
//! assert_eq!(table.find("main").map(|symbol| symbol.address), Some(0x1000));
//! assert_eq!(table.symbol_at(Address::new(0x1010)).map(|symbol| symbol.name), Some("main".to_string()));
//! # Ok::<(), kestrel_core::error::KestrelError>(())
//! ```

pub mod demangle;
pub mod kallsyms;

use std::collections::HashMap;
use std::io::BufRead;

use smallvec::SmallVec;
use tracing::debug;

use crate::elf::ElfFile;
use crate::error::Result;
use crate::types::{Address, Platform};
use demangle::{demangled_name, language_of, SymbolLanguage};

/// A named address in the target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Symbol
{
    pub name: String,
    pub address: u64,
    /// Size in bytes; zero when unknown (kallsyms entries)
    pub size: u64,
}

impl Symbol
{
    pub fn new(name: impl Into<String>, address: u64, size: u64) -> Self
    {
        Self {
            name: name.into(),
            address,
            size,
        }
    }

    /// Returns `true` if `address` falls inside this symbol.
    ///
    /// A symbol of unknown size covers only its own address.
    pub fn covers(&self, address: u64) -> bool
    {
        match address.checked_sub(self.address) {
            Some(0) => true,
            Some(offset) => offset < self.size,
            None => false,
        }
    }
}

/// Symbol lookup as seen by a program.
pub trait SymbolIndex: Send
{
    /// Find a symbol by raw or demangled name.
    fn find(&self, name: &str) -> Option<Symbol>;

    /// Find the symbol containing `address`, preferring the nearest start
    /// when symbols nest.
    fn symbol_at(&self, address: Address) -> Option<Symbol>;

    /// Number of distinct symbols.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool
    {
        self.len() == 0
    }
}

/// In-memory symbol table
///
/// Symbols are stored once, ordered by address; the name index maps raw and
/// demangled names to positions in that list. Inserting a symbol that is
/// already present (same name, address and size) is a no-op, which collapses
/// the overlap between `.symtab` and `.dynsym`.
#[derive(Debug)]
pub struct SymbolTable
{
    platform: Platform,
    by_address: Vec<Symbol>,
    by_name: HashMap<String, SmallVec<[Symbol; 1]>>,
    /// Largest size seen; bounds how far back `symbol_at` looks
    max_size: u64,
}

impl SymbolTable
{
    pub fn new(platform: Platform) -> Self
    {
        Self {
            platform,
            by_address: Vec::new(),
            by_name: HashMap::new(),
            max_size: 0,
        }
    }

    /// Add one symbol. Its address is masked to the target word width.
    ///
    /// ## Errors
    ///
    /// `AllocationFailed` if the table can't grow.
    pub fn insert(&mut self, mut symbol: Symbol) -> Result<()>
    {
        symbol.address = self.platform.mask(symbol.address);
        if self
            .by_name
            .get(&symbol.name)
            .is_some_and(|existing| existing.contains(&symbol))
        {
            return Ok(());
        }

        self.by_address.try_reserve(1)?;
        let index = self.by_address.partition_point(|existing| existing.address <= symbol.address);
        self.by_address.insert(index, symbol.clone());
        self.max_size = self.max_size.max(symbol.size);

        if language_of(&symbol.name) == SymbolLanguage::Rust {
            if let Some(demangled) = demangled_name(&symbol.name) {
                self.by_name.entry(demangled).or_default().push(symbol.clone());
            }
        }
        self.by_name.entry(symbol.name.clone()).or_default().push(symbol);
        Ok(())
    }

    /// Add `symbols`, shifting each by `bias` with wraparound.
    pub fn extend_biased(&mut self, symbols: impl IntoIterator<Item = Symbol>, bias: u64) -> Result<()>
    {
        for mut symbol in symbols {
            symbol.address = self.platform.wrapping_add(symbol.address, bias);
            self.insert(symbol)?;
        }
        Ok(())
    }

    /// Add the symbols defined by an ELF file loaded with `bias`.
    pub fn add_elf(&mut self, elf: &ElfFile, bias: u64) -> Result<()>
    {
        let before = self.len();
        let symbols = elf
            .symbols()?
            .into_iter()
            .map(|symbol| Symbol::new(symbol.name, symbol.address, symbol.size));
        self.extend_biased(symbols, bias)?;
        debug!(
            path = %elf.path().display(),
            bias = %Address::new(bias),
            added = self.len() - before,
            "loaded ELF symbols"
        );
        Ok(())
    }

    /// Build a table from a `/proc/kallsyms` or `System.map` listing.
    ///
    /// ## Errors
    ///
    /// As [`kallsyms::parse_symbol_file`].
    pub fn from_symbol_file(reader: impl BufRead, platform: Platform) -> Result<Self>
    {
        let mut table = Self::new(platform);
        for (name, addresses) in kallsyms::parse_symbol_file(reader)? {
            for address in addresses {
                table.insert(Symbol::new(name.clone(), address, 0))?;
            }
        }
        debug!(symbols = table.len(), "loaded symbol file");
        Ok(table)
    }

    /// All symbols, ordered by address.
    pub fn iter(&self) -> impl Iterator<Item = &Symbol>
    {
        self.by_address.iter()
    }
}

impl SymbolIndex for SymbolTable
{
    fn find(&self, name: &str) -> Option<Symbol>
    {
        self.by_name.get(name)?.first().cloned()
    }

    fn symbol_at(&self, address: Address) -> Option<Symbol>
    {
        let address = self.platform.mask(address.value());
        let end = self.by_address.partition_point(|symbol| symbol.address <= address);
        // Walk back past labels and nested symbols that stop short; nothing
        // further than the largest size away can cover the address.
        let reach = self.max_size.max(1);
        self.by_address[..end]
            .iter()
            .rev()
            .take_while(|symbol| address - symbol.address < reach)
            .find(|symbol| symbol.covers(address))
            .cloned()
    }

    fn len(&self) -> usize
    {
        self.by_address.len()
    }
}
