//! A1-style cell address parsing and formatting.

use std::sync::LazyLock;

use regex::Regex;

static A1_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\$?([A-Za-z]{1,3})\$?([0-9]+)$").expect("valid regex"));

/// Canonicalize an A1 address: uppercase, `$` markers stripped.
/// Returns `None` if the input is not a valid A1 address.
pub fn normalize(addr: &str) -> Option<String> {
    let (col, row) = parse(addr)?;
    Some(format(col, row))
}

/// Parse an A1 address into 1-based `(column, row)`.
pub fn parse(addr: &str) -> Option<(u32, u32)> {
    let caps = A1_RE.captures(addr.trim())?;
    let col = column_index(&caps[1])?;
    let row: u32 = caps[2].parse().ok()?;
    if row == 0 {
        return None;
    }
    Some((col, row))
}

/// Format 1-based `(column, row)` as an A1 address.
pub fn format(col: u32, row: u32) -> String {
    format!("{}{row}", column_letters(col))
}

/// 1-based column index for a letter run (`A` → 1, `AA` → 27).
fn column_index(letters: &str) -> Option<u32> {
    let mut col: u32 = 0;
    for c in letters.chars() {
        let v = (c.to_ascii_uppercase() as u32).checked_sub('A' as u32)?;
        if v > 25 {
            return None;
        }
        col = col.checked_mul(26)?.checked_add(v + 1)?;
    }
    if col == 0 { None } else { Some(col) }
}

/// Letter run for a 1-based column index (1 → `A`, 27 → `AA`).
fn column_letters(mut col: u32) -> String {
    let mut out = String::new();
    while col > 0 {
        let rem = (col - 1) % 26;
        out.insert(0, (b'A' + rem as u8) as char);
        col = (col - 1) / 26;
    }
    out
}

/// The address one column to the right (`F3` → `G3`).
pub fn shift_right(addr: &str) -> Option<String> {
    let (col, row) = parse(addr)?;
    Some(format(col + 1, row))
}
