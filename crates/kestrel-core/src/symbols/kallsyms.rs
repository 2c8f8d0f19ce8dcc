//! `/proc/kallsyms` and `System.map` parsing.
//!
//! Both files list one symbol per line:
//!
//! ```text
//! ffffffff81000000 T _text
//! ffffffffc0a1b000 t ext4_fill_super	[ext4]
//! ```
//!
//! `/proc/kallsyms` shows `(null)` or all-zero addresses to readers without
//! `CAP_SYSLOG`; both parse as address 0.

use std::collections::HashMap;
use std::io::BufRead;

use crate::error::{KestrelError, Result};

/// Parse a symbol listing into a map from name to every address it appears at.
///
/// ## Errors
///
/// - `Io` if reading fails
/// - `MalformedTarget` for a line with fewer than three fields or a
///   non-hexadecimal address
pub fn parse_symbol_file(reader: impl BufRead) -> Result<HashMap<String, Vec<u64>>>
{
    let mut symbols: HashMap<String, Vec<u64>> = HashMap::new();
    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        let mut fields = line.split_whitespace();
        let Some(address) = fields.next() else {
            continue;
        };
        let (Some(_kind), Some(name)) = (fields.next(), fields.next()) else {
            return Err(KestrelError::MalformedTarget(format!(
                "symbol file line {}: expected ADDRESS TYPE NAME",
                number + 1
            )));
        };
        let address = if address == "(null)" {
            0
        } else {
            u64::from_str_radix(address, 16).map_err(|err| {
                KestrelError::MalformedTarget(format!("symbol file line {}: bad address {address:?}: {err}", number + 1))
            })?
        };
        symbols.entry(name.to_string()).or_default().push(address);
    }
    Ok(symbols)
}
