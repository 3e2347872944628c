//! Text normalization for comparing student cell entries against answers.
//!
//! Graders never compare raw cell text. Every comparison goes through one of
//! these passes so that `"= $B$30 * 12"` and `"=B30*12"` grade identically.
//!
//! Each pass is a pure function `&str -> String` and is idempotent: applying
//! a normalizer to its own output returns the same string.

use std::sync::LazyLock;

use regex::Regex;

// ---------------------------------------------------------------------------
// Formula normalization
// ---------------------------------------------------------------------------

/// Canonicalize a formula or plain cell entry for comparison.
///
/// Trims, drops `$` anchors and internal whitespace, uppercases, and strips
/// parentheses that wrap the entire expression. Plain text entries run
/// through the same pipeline, so `"slope"` becomes `"SLOPE"` and a numeric
/// entry rendered as `"123"` passes through unchanged.
pub fn normalize_formula(raw: &str) -> String {
    let mut s: String = raw
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '$')
        .collect();
    s.make_ascii_uppercase();

    let body = strip_wrapping_parens(&s);
    if let Some(rest) = body.strip_prefix('=') {
        let inner = strip_wrapping_parens(rest);
        if inner.len() != rest.len() {
            return format!("={inner}");
        }
    }
    body.to_string()
}

/// Strip parentheses that wrap the whole string, repeatedly.
///
/// `"((A1+B2))"` becomes `"A1+B2"`, while `"(5/9)*(A40-32)"` is left alone
/// because its first parenthesis closes before the end.
fn strip_wrapping_parens(s: &str) -> &str {
    let mut out = s;
    while wraps_entirely(out) {
        out = &out[1..out.len() - 1];
    }
    out
}

fn wraps_entirely(s: &str) -> bool {
    let bytes = s.as_bytes();
    if s.len() < 2 || bytes[0] != b'(' || bytes[s.len() - 1] != b')' {
        return false;
    }

    let mut depth = 0usize;
    for (i, b) in bytes.iter().enumerate() {
        match b {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return i == s.len() - 1;
                }
            }
            _ => {}
        }
    }
    false
}

// ---------------------------------------------------------------------------
// Unit text normalization
// ---------------------------------------------------------------------------

/// Synonyms applied to whole `/`-delimited tokens only, so `"hours"` is
/// never rewritten even though it starts with `"hr"`... it doesn't, but
/// `"hr"` inside a longer token is left alone all the same.
const UNIT_SYNONYMS: &[(&str, &str)] = &[("hr", "h"), ("day", "d"), ("year", "yr")];

/// Canonicalize a unit label such as `"mg / day"`.
///
/// Lowercases, drops whitespace, and rewrites whole `/`-delimited tokens
/// through the synonym table: `hr -> h`, `day -> d`, `year -> yr`. Tokens
/// outside the table pass through, so `"hours/day"` becomes `"hours/d"`.
pub fn normalize_unit_text(raw: &str) -> String {
    let lowered: String = raw
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    map_unit_tokens(&lowered, UNIT_SYNONYMS)
}

/// Canonicalize a time-denominated unit label.
///
/// Same as [`normalize_unit_text`] with one extra rewrite: a bare `y` token
/// becomes `yr`, so `"y/d"` and `"year/day"` both normalize to `"yr/d"`.
pub fn normalize_time_unit(raw: &str) -> String {
    let base = normalize_unit_text(raw);
    map_unit_tokens(&base, &[("y", "yr")])
}

fn map_unit_tokens(text: &str, table: &[(&str, &str)]) -> String {
    text.split('/')
        .map(|token| {
            table
                .iter()
                .find(|(from, _)| *from == token)
                .map(|(_, to)| *to)
                .unwrap_or(token)
        })
        .collect::<Vec<_>>()
        .join("/")
}

// ---------------------------------------------------------------------------
// Temperature formula normalization
// ---------------------------------------------------------------------------

/// Canonicalize a Fahrenheit-to-Celsius conversion formula.
///
/// Runs [`normalize_formula`] first, then collapses the accepted operator
/// orderings of the `5/9` conversion onto one spelling:
/// `(A40-32)*5/9`, `(A40-32)*(5/9)`, and `5/9*(A40-32)` all become
/// `(5/9)*(A40-32)`. Formulas outside that family, such as the
/// Celsius-to-Fahrenheit `(9/5)*C41+32`, are left as normalized.
pub fn normalize_temp_formula(raw: &str) -> String {
    static FACTOR_LAST_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"^(=?)\(([A-Z]{1,3}[0-9]+)-32\)\*\(?5/9\)?$").expect("valid regex")
    });
    static FACTOR_FIRST_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"^(=?)\(?5/9\)?\*\(([A-Z]{1,3}[0-9]+)-32\)$").expect("valid regex")
    });

    let formula = normalize_formula(raw);

    if let Some(caps) = FACTOR_LAST_RE.captures(&formula) {
        return format!("{}(5/9)*({}-32)", &caps[1], &caps[2]);
    }
    if let Some(caps) = FACTOR_FIRST_RE.captures(&formula) {
        return format!("{}(5/9)*({}-32)", &caps[1], &caps[2]);
    }
    formula
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formula_strips_dollars_and_spaces() {
        assert_eq!(normalize_formula("= $B$30 * 12"), "=B30*12");
    }

    #[test]
    fn formula_uppercases() {
        assert_eq!(
            normalize_formula("=slope(b2:b25,a2:a25)"),
            "=SLOPE(B2:B25,A2:A25)"
        );
    }

    #[test]
    fn formula_passes_plain_number_through() {
        assert_eq!(normalize_formula("123"), "123");
        assert_eq!(normalize_formula("  123  "), "123");
    }

    #[test]
    fn formula_uppercases_booleans() {
        assert_eq!(normalize_formula("true"), "TRUE");
    }

    #[test]
    fn formula_strips_wrapping_parens() {
        assert_eq!(normalize_formula("(=A1+B2)"), "=A1+B2");
        assert_eq!(normalize_formula("=(A1+B2)"), "=A1+B2");
        assert_eq!(normalize_formula("((A1+B2))"), "A1+B2");
    }

    #[test]
    fn formula_keeps_non_wrapping_parens() {
        // First paren closes before the end, so nothing is stripped.
        assert_eq!(normalize_formula("(5/9)*(A40-32)"), "(5/9)*(A40-32)");
        assert_eq!(normalize_formula("=(A10+B10)/2"), "=(A10+B10)/2");
    }

    #[test]
    fn formula_empty_input() {
        assert_eq!(normalize_formula(""), "");
        assert_eq!(normalize_formula("   "), "");
    }

    #[test]
    fn formula_is_idempotent() {
        for input in ["= $B$30 * 12", "(=A1+B2)", "slope", "", "123"] {
            let once = normalize_formula(input);
            assert_eq!(normalize_formula(&once), once, "input: {input:?}");
        }
    }

    #[test]
    fn unit_text_lowercases_and_strips_spaces() {
        assert_eq!(normalize_unit_text("  MG / MCG "), "mg/mcg");
    }

    #[test]
    fn unit_text_rewrites_whole_tokens_only() {
        assert_eq!(normalize_unit_text("Hr/Day"), "h/d");
        assert_eq!(normalize_unit_text("HOURS / DAY"), "hours/d");
        assert_eq!(normalize_unit_text("year"), "yr");
        // No synonym touches these.
        assert_eq!(normalize_unit_text("mcg / mg"), "mcg/mg");
    }

    #[test]
    fn unit_text_is_idempotent() {
        for input in ["Hr/Day", "HOURS / DAY", "mcg/mg", ""] {
            let once = normalize_unit_text(input);
            assert_eq!(normalize_unit_text(&once), once, "input: {input:?}");
        }
    }

    #[test]
    fn time_unit_expands_bare_y() {
        assert_eq!(normalize_time_unit("y/d"), "yr/d");
        assert_eq!(normalize_time_unit("Year/Day"), "yr/d");
        assert_eq!(normalize_time_unit("hr"), "h");
        assert_eq!(normalize_time_unit("HR / D"), "h/d");
    }

    #[test]
    fn time_unit_is_idempotent() {
        for input in ["y/d", "hr", "yr/d"] {
            let once = normalize_time_unit(input);
            assert_eq!(normalize_time_unit(&once), once, "input: {input:?}");
        }
    }

    #[test]
    fn temp_formula_canonicalizes_factor_last() {
        assert_eq!(normalize_temp_formula("=(A40-32)*5/9"), "=(5/9)*(A40-32)");
        assert_eq!(normalize_temp_formula("(A40-32)*(5/9)"), "(5/9)*(A40-32)");
    }

    #[test]
    fn temp_formula_canonicalizes_factor_first() {
        assert_eq!(normalize_temp_formula("=5/9*(A40-32)"), "=(5/9)*(A40-32)");
        assert_eq!(
            normalize_temp_formula("= (5/9) * (A40 - 32)"),
            "=(5/9)*(A40-32)"
        );
    }

    #[test]
    fn temp_formula_leaves_other_directions_alone() {
        assert_eq!(normalize_temp_formula("(9/5)*C41+32"), "(9/5)*C41+32");
        assert_eq!(normalize_temp_formula("=C41*9/5+32"), "=C41*9/5+32");
    }

    #[test]
    fn temp_formula_is_idempotent() {
        for input in ["=(A40-32)*5/9", "5/9*(A40-32)", "(9/5)*C41+32"] {
            let once = normalize_temp_formula(input);
            assert_eq!(normalize_temp_formula(&once), once, "input: {input:?}");
        }
    }
}
