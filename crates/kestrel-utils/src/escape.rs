//! # String Escaping
//!
//! C-style escaping for bytes read out of a target.
//!
//! Target memory is not UTF-8 in general, so strings are escaped byte by
//! byte: the named C escapes (`\0 \a \b \t \n \v \f \r`), printable ASCII
//! verbatim, and `\xNN` for everything else. Quotes and backslashes are
//! escaped only when asked for.
//!
//! ## Example
//!
//! ```rust
//! use kestrel_utils::escape::c_string;
//!
//! assert_eq!(c_string(b"say \"hi\"\n\xff"), r#""say \"hi\"\n\xff""#);
//! ```

use std::fmt::Write;

/// Which optional escapes to apply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EscapeOptions
{
    pub single_quote: bool,
    pub double_quote: bool,
    pub backslash: bool,
}

impl EscapeOptions
{
    /// Only the mandatory escapes.
    pub const NONE: Self = Self {
        single_quote: false,
        double_quote: false,
        backslash: false,
    };

    /// Escapes for the inside of a C string literal.
    pub const C_STRING: Self = Self {
        single_quote: false,
        double_quote: true,
        backslash: true,
    };

    /// Escapes for the inside of a C character literal.
    pub const C_CHAR: Self = Self {
        single_quote: true,
        double_quote: false,
        backslash: true,
    };
}

fn push_escaped(out: &mut String, c: u8, options: EscapeOptions)
{
    match c {
        0 => out.push_str("\\0"),
        7 => out.push_str("\\a"),
        8 => out.push_str("\\b"),
        b'\t' => out.push_str("\\t"),
        b'\n' => out.push_str("\\n"),
        11 => out.push_str("\\v"),
        12 => out.push_str("\\f"),
        b'\r' => out.push_str("\\r"),
        b'"' if options.double_quote => out.push_str("\\\""),
        b'\'' if options.single_quote => out.push_str("\\'"),
        b'\\' if options.backslash => out.push_str("\\\\"),
        b' '..=b'~' => out.push(char::from(c)),
        _ => {
            // Writing to a String can't fail
            let _ = write!(out, "\\x{c:02x}");
        }
    }
}

/// Escape a single byte.
///
/// ```rust
/// use kestrel_utils::escape::{escape_character, EscapeOptions};
///
/// assert_eq!(escape_character(b'\'', EscapeOptions::C_CHAR), "\\'");
/// assert_eq!(escape_character(b'\'', EscapeOptions::NONE), "'");
/// ```
pub fn escape_character(c: u8, options: EscapeOptions) -> String
{
    let mut out = String::new();
    push_escaped(&mut out, c, options);
    out
}

/// Escape every byte of `buffer`.
pub fn escape_string(buffer: &[u8], options: EscapeOptions) -> String
{
    let mut out = String::with_capacity(buffer.len());
    for &c in buffer {
        push_escaped(&mut out, c, options);
    }
    out
}

/// Format `buffer` as a double-quoted C string literal.
pub fn c_string(buffer: &[u8]) -> String
{
    let mut out = String::with_capacity(buffer.len() + 2);
    out.push('"');
    for &c in buffer {
        push_escaped(&mut out, c, EscapeOptions::C_STRING);
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_named_escapes()
    {
        let all = escape_string(&[0, 7, 8, 9, 10, 11, 12, 13], EscapeOptions::NONE);
        assert_eq!(all, r"\0\a\b\t\n\v\f\r");
    }

    #[test]
    fn test_optional_escapes()
    {
        assert_eq!(escape_string(br#"'"\"#, EscapeOptions::NONE), r#"'"\"#);
        assert_eq!(escape_string(br#"'"\"#, EscapeOptions::C_STRING), r#"'\"\\"#);
        assert_eq!(escape_string(br#"'"\"#, EscapeOptions::C_CHAR), r#"\'"\\"#);
    }

    #[test]
    fn test_non_printable_uses_hex()
    {
        assert_eq!(escape_character(0x7f, EscapeOptions::NONE), r"\x7f");
        assert_eq!(escape_character(0x1b, EscapeOptions::NONE), r"\x1b");
        assert_eq!(escape_character(b'~', EscapeOptions::NONE), "~");
    }

    #[test]
    fn test_c_string_quotes()
    {
        assert_eq!(c_string(b""), r#""""#);
        assert_eq!(c_string(b"a\\b"), r#""a\\b""#);
    }
}
