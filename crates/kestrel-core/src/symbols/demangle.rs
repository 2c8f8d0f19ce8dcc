//! Symbol demangling utilities.
//!
//! Compilers "mangle" symbol names to encode namespaces and types. The symbol
//! table indexes every symbol under its raw name and, when the raw name is a
//! Rust symbol, under its demangled path as well, so both
//! `_ZN5alloc5alloc8box_free17h0123456789abcdefE` and `alloc::alloc::box_free`
//! find the same entry.
//!
//! - **Rust**: legacy (`_ZN...E` with a hash suffix) and v0 (`_R...`)
//! - **C**: unmangled, indexed as-is (this covers the whole kernel)

use rustc_demangle::try_demangle;

/// Language a symbol name appears to come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolLanguage
{
    Rust,
    Cpp,
    C,
}

/// Guess the language of a raw symbol name from its mangling prefix.
pub fn language_of(raw: &str) -> SymbolLanguage
{
    if raw.starts_with("_R") || (raw.starts_with("_ZN") && try_demangle(raw).is_ok()) {
        SymbolLanguage::Rust
    } else if raw.starts_with("_Z") {
        SymbolLanguage::Cpp
    } else {
        SymbolLanguage::C
    }
}

/// Demangled form of a Rust symbol, without the trailing hash.
///
/// Returns `None` for names that aren't Rust-mangled, or whose demangled
/// form is identical to the raw name.
///
/// ## Example
///
/// ```rust
/// use kestrel_core::symbols::demangle::demangled_name;
///
/// assert_eq!(
///     demangled_name("_ZN4core3ptr13drop_in_place17h0123456789abcdefE").as_deref(),
///     Some("core::ptr::drop_in_place")
/// );
/// assert_eq!(demangled_name("schedule"), None);
/// ```
pub fn demangled_name(raw: &str) -> Option<String>
{
    let demangled = try_demangle(raw).ok()?;
    let name = format!("{demangled:#}");
    (name != raw).then_some(name)
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_language_detection()
    {
        assert_eq!(language_of("_ZN3foo3bar17h0123456789abcdefE"), SymbolLanguage::Rust);
        assert_eq!(language_of("_Z3fooi"), SymbolLanguage::Cpp);
        assert_eq!(language_of("start_kernel"), SymbolLanguage::C);
    }

    #[test]
    fn test_plain_names_are_not_demangled()
    {
        assert_eq!(demangled_name("init_task"), None);
        assert_eq!(demangled_name(""), None);
    }
}
