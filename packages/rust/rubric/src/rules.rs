//! Rubric rule evaluation.
//!
//! A rule inspects one graded region of one tab and produces a
//! [`ScoreRecord`]. Rules never fail on malformed input: anything blank,
//! unreadable, or wrong scores zero with a feedback code. Only rubric
//! misconfiguration is an error, caught by [`validate_tabs`] before a run.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use sheetgrader_normalize::{normalize_formula, normalize_temp_formula, normalize_time_unit};
use sheetgrader_rates::{RateTable, country_entry, is_valid_code};
use sheetgrader_shared::{Result, ScoreRecord, SheetGraderError};
use sheetgrader_workbook::{Sheet, addr};

/// Feedback codes shared across rule kinds. Kind-specific mismatch codes
/// live on each rule as its `fail_code`.
pub mod codes {
    pub const TAB_MISSING: &str = "TAB_MISSING";
    pub const CELL_BLANK: &str = "CELL_BLANK";
    pub const FORMULA_MISSING: &str = "FORMULA_MISSING";
    pub const DATE_MISSING: &str = "DATE_MISSING";
    pub const DATE_UNPARSABLE: &str = "DATE_UNPARSABLE";
    pub const COUNTRY_BLANK: &str = "COUNTRY_BLANK";
    pub const COUNTRY_UNKNOWN: &str = "COUNTRY_UNKNOWN";
    pub const CODE_BLANK: &str = "CODE_BLANK";
    pub const RATE_MISSING: &str = "RATE_MISSING";
    pub const RATE_NOT_NUMERIC: &str = "RATE_NOT_NUMERIC";
    pub const RATE_UNRESOLVABLE: &str = "RATE_UNRESOLVABLE";
}

// ---------------------------------------------------------------------------
// Rule definitions
// ---------------------------------------------------------------------------

/// What a rule checks. Accepted pattern sets are pre-normalized canonical
/// strings (uppercase, no `$`, no spaces, no leading `=`).
#[derive(Debug, Clone, Copy)]
pub enum RuleKind {
    /// Cell is non-empty; with `name_like`, it must also look like a
    /// first-and-last name.
    Presence { cell: &'static str, name_like: bool },
    /// Normalized formula text equals one of the accepted patterns.
    FormulaPattern {
        cell: &'static str,
        accepted: &'static [&'static str],
    },
    /// Normalized formula text contains a fragment. Used to decompose
    /// partial-credit ladders into independently scored sub-rules.
    FormulaContains {
        cell: &'static str,
        fragment: &'static str,
    },
    /// Like `FormulaPattern` but through the temperature normalizer, so the
    /// known-equivalent operator orderings all match.
    TempFormula {
        cell: &'static str,
        accepted: &'static [&'static str],
    },
    /// Normalized unit label equals one of the accepted labels.
    UnitText {
        cell: &'static str,
        accepted: &'static [&'static str],
    },
    /// Date in the cell is within the configured window of "now".
    DateWithin { cell: &'static str },
    /// Cell names a country on the approved list.
    CountryValid { cell: &'static str },
    /// Cell holds the currency code of the country named in `country_cell`.
    CurrencyCodeMatches {
        cell: &'static str,
        country_cell: &'static str,
    },
    /// Numeric rate in the cell is within `tolerance_pct` of the live rate
    /// for the code in `code_cell`.
    RateWithin {
        cell: &'static str,
        code_cell: &'static str,
        tolerance_pct: f64,
    },
    /// Sheet carries at least `min_count` chart objects.
    ChartPresent { min_count: usize },
}

/// One graded region of a tab.
#[derive(Debug, Clone, Copy)]
pub struct RuleSpec {
    /// Stable rule identifier.
    pub id: &'static str,
    pub kind: RuleKind,
    /// Points awarded on success. All-or-nothing per rule.
    pub points: f64,
    /// Where the writer records this rule's points in the grade workbook;
    /// rendered feedback goes one column to the right.
    pub score_cell: &'static str,
    /// Feedback code for the "present but wrong" outcome. Blank or
    /// unreadable cells use the shared codes above instead.
    pub fail_code: &'static str,
}

/// Ordered rules for one required tab.
#[derive(Debug, Clone, Copy)]
pub struct TabRubric {
    pub tab: &'static str,
    pub rules: &'static [RuleSpec],
}

impl TabRubric {
    /// Maximum points across this tab's rules.
    pub fn max_points(&self) -> f64 {
        self.rules.iter().map(|r| r.points).sum()
    }
}

// ---------------------------------------------------------------------------
// Grade context
// ---------------------------------------------------------------------------

/// Run-scoped inputs to rule evaluation: the date window, a fixed "now",
/// and the lookup outcome for rate-dependent rules (`None` when the rate
/// table could not be fetched).
#[derive(Debug, Clone)]
pub struct GradeContext {
    pub now: DateTime<Utc>,
    pub date_window_days: i64,
    pub rates: Option<RateTable>,
}

impl GradeContext {
    pub fn new(date_window_days: i64, rates: Option<RateTable>) -> Self {
        Self {
            now: Utc::now(),
            date_window_days,
            rates,
        }
    }

    /// Pin "now", making date rules deterministic.
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Evaluate one rule against a sheet snapshot.
pub fn evaluate(rule: &RuleSpec, tab: &str, sheet: &Sheet, ctx: &GradeContext) -> ScoreRecord {
    match rule.kind {
        RuleKind::Presence { cell, name_like } => eval_presence(rule, tab, sheet, cell, name_like),
        RuleKind::FormulaPattern { cell, accepted } => {
            eval_formula_pattern(rule, tab, sheet, cell, accepted)
        }
        RuleKind::FormulaContains { cell, fragment } => {
            eval_formula_contains(rule, tab, sheet, cell, fragment)
        }
        RuleKind::TempFormula { cell, accepted } => {
            eval_temp_formula(rule, tab, sheet, cell, accepted)
        }
        RuleKind::UnitText { cell, accepted } => eval_unit_text(rule, tab, sheet, cell, accepted),
        RuleKind::DateWithin { cell } => eval_date_within(rule, tab, sheet, cell, ctx),
        RuleKind::CountryValid { cell } => eval_country_valid(rule, tab, sheet, cell),
        RuleKind::CurrencyCodeMatches { cell, country_cell } => {
            eval_code_matches(rule, tab, sheet, cell, country_cell)
        }
        RuleKind::RateWithin {
            cell,
            code_cell,
            tolerance_pct,
        } => eval_rate_within(rule, tab, sheet, cell, code_cell, tolerance_pct, ctx),
        RuleKind::ChartPresent { min_count } => eval_chart_present(rule, tab, sheet, min_count),
    }
}

fn eval_presence(
    rule: &RuleSpec,
    tab: &str,
    sheet: &Sheet,
    cell: &str,
    name_like: bool,
) -> ScoreRecord {
    let text = resolved_entry(sheet, cell);
    let trimmed = text.trim();

    if trimmed.is_empty() {
        return ScoreRecord::zero(rule.id, tab, rule.points, codes::CELL_BLANK)
            .with_param("cell", cell);
    }
    if name_like && !looks_like_name(trimmed) {
        return ScoreRecord::zero(rule.id, tab, rule.points, rule.fail_code)
            .with_param("cell", cell)
            .with_param("found", trimmed);
    }
    ScoreRecord::full(rule.id, tab, rule.points)
}

fn eval_formula_pattern(
    rule: &RuleSpec,
    tab: &str,
    sheet: &Sheet,
    cell: &str,
    accepted: &[&str],
) -> ScoreRecord {
    let raw = sheet.entry_text(cell);
    if raw.trim().is_empty() {
        return ScoreRecord::zero(rule.id, tab, rule.points, codes::FORMULA_MISSING)
            .with_param("cell", cell);
    }

    let candidate = canonical_formula(&raw);
    if accepted.iter().any(|a| candidate == *a) {
        return ScoreRecord::full(rule.id, tab, rule.points);
    }

    ScoreRecord::zero(rule.id, tab, rule.points, rule.fail_code)
        .with_param("cell", cell)
        .with_param("found", raw.trim())
        .with_param("expected", format!("={}", accepted.first().copied().unwrap_or_default()))
}

fn eval_formula_contains(
    rule: &RuleSpec,
    tab: &str,
    sheet: &Sheet,
    cell: &str,
    fragment: &str,
) -> ScoreRecord {
    let raw = sheet.entry_text(cell);
    if raw.trim().is_empty() {
        return ScoreRecord::zero(rule.id, tab, rule.points, codes::FORMULA_MISSING)
            .with_param("cell", cell);
    }

    if canonical_formula(&raw).contains(fragment) {
        return ScoreRecord::full(rule.id, tab, rule.points);
    }
    ScoreRecord::zero(rule.id, tab, rule.points, rule.fail_code)
        .with_param("cell", cell)
        .with_param("fragment", fragment)
}

fn eval_temp_formula(
    rule: &RuleSpec,
    tab: &str,
    sheet: &Sheet,
    cell: &str,
    accepted: &[&str],
) -> ScoreRecord {
    let raw = sheet.entry_text(cell);
    if raw.trim().is_empty() {
        return ScoreRecord::zero(rule.id, tab, rule.points, codes::FORMULA_MISSING)
            .with_param("cell", cell);
    }

    let candidate = canonical_temp_formula(&raw);
    if accepted.iter().any(|a| candidate == *a) {
        return ScoreRecord::full(rule.id, tab, rule.points);
    }
    ScoreRecord::zero(rule.id, tab, rule.points, rule.fail_code)
        .with_param("cell", cell)
        .with_param("found", raw.trim())
}

fn eval_unit_text(
    rule: &RuleSpec,
    tab: &str,
    sheet: &Sheet,
    cell: &str,
    accepted: &[&str],
) -> ScoreRecord {
    let raw = resolved_entry(sheet, cell);
    if raw.trim().is_empty() {
        return ScoreRecord::zero(rule.id, tab, rule.points, codes::CELL_BLANK)
            .with_param("cell", cell);
    }

    let candidate = normalize_time_unit(&raw);
    if accepted.iter().any(|a| candidate == *a) {
        return ScoreRecord::full(rule.id, tab, rule.points);
    }
    ScoreRecord::zero(rule.id, tab, rule.points, rule.fail_code)
        .with_param("cell", cell)
        .with_param("found", raw.trim())
        .with_param("expected", accepted.first().copied().unwrap_or_default())
}

fn eval_date_within(
    rule: &RuleSpec,
    tab: &str,
    sheet: &Sheet,
    cell: &str,
    ctx: &GradeContext,
) -> ScoreRecord {
    let raw = resolved_entry(sheet, cell);
    let trimmed = raw.trim();

    if trimmed.is_empty() {
        return ScoreRecord::zero(rule.id, tab, rule.points, codes::DATE_MISSING)
            .with_param("cell", cell);
    }
    let Some(date) = parse_date(trimmed, sheet.number(cell)) else {
        return ScoreRecord::zero(rule.id, tab, rule.points, codes::DATE_UNPARSABLE)
            .with_param("cell", cell)
            .with_param("found", trimmed);
    };

    let days_old = (ctx.now.date_naive() - date).num_days();
    if days_old.abs() <= ctx.date_window_days {
        return ScoreRecord::full(rule.id, tab, rule.points);
    }
    ScoreRecord::zero(rule.id, tab, rule.points, rule.fail_code)
        .with_param("cell", cell)
        .with_param("days", days_old.to_string())
        .with_param("window", ctx.date_window_days.to_string())
}

fn eval_country_valid(rule: &RuleSpec, tab: &str, sheet: &Sheet, cell: &str) -> ScoreRecord {
    let raw = resolved_entry(sheet, cell);
    let trimmed = raw.trim();

    if trimmed.is_empty() {
        return ScoreRecord::zero(rule.id, tab, rule.points, codes::COUNTRY_BLANK)
            .with_param("cell", cell);
    }
    if country_entry(trimmed).is_some() {
        return ScoreRecord::full(rule.id, tab, rule.points);
    }
    ScoreRecord::zero(rule.id, tab, rule.points, rule.fail_code)
        .with_param("cell", cell)
        .with_param("found", trimmed)
}

fn eval_code_matches(
    rule: &RuleSpec,
    tab: &str,
    sheet: &Sheet,
    cell: &str,
    country_cell: &str,
) -> ScoreRecord {
    let country_raw = resolved_entry(sheet, country_cell);
    let Some((country, expected)) = country_entry(country_raw.trim()) else {
        return ScoreRecord::zero(rule.id, tab, rule.points, codes::COUNTRY_UNKNOWN)
            .with_param("cell", cell);
    };

    let code_raw = resolved_entry(sheet, cell);
    let code = code_raw.trim();
    if code.is_empty() {
        return ScoreRecord::zero(rule.id, tab, rule.points, codes::CODE_BLANK)
            .with_param("cell", cell);
    }
    if code.eq_ignore_ascii_case(expected) {
        return ScoreRecord::full(rule.id, tab, rule.points);
    }
    ScoreRecord::zero(rule.id, tab, rule.points, rule.fail_code)
        .with_param("cell", cell)
        .with_param("found", code)
        .with_param("expected", expected)
        .with_param("country", country)
}

#[allow(clippy::too_many_arguments)]
fn eval_rate_within(
    rule: &RuleSpec,
    tab: &str,
    sheet: &Sheet,
    cell: &str,
    code_cell: &str,
    tolerance_pct: f64,
    ctx: &GradeContext,
) -> ScoreRecord {
    let Some(table) = ctx.rates.as_ref() else {
        return ScoreRecord::zero(rule.id, tab, rule.points, codes::RATE_UNRESOLVABLE)
            .with_param("cell", cell);
    };

    let code_raw = resolved_entry(sheet, code_cell);
    let code = code_raw.trim();
    if code.is_empty() || !is_valid_code(code) {
        return ScoreRecord::zero(rule.id, tab, rule.points, codes::RATE_UNRESOLVABLE)
            .with_param("cell", cell);
    }

    let raw = resolved_entry(sheet, cell);
    if raw.trim().is_empty() {
        return ScoreRecord::zero(rule.id, tab, rule.points, codes::RATE_MISSING)
            .with_param("cell", cell);
    }
    let Some(candidate) = numeric_entry(sheet, cell) else {
        return ScoreRecord::zero(rule.id, tab, rule.points, codes::RATE_NOT_NUMERIC)
            .with_param("cell", cell)
            .with_param("found", raw.trim());
    };

    let live = match table.rate(code) {
        Some(r) if r > 0.0 => r,
        _ => {
            return ScoreRecord::zero(rule.id, tab, rule.points, codes::RATE_UNRESOLVABLE)
                .with_param("cell", cell);
        }
    };

    let deviation_pct = ((candidate - live) / live).abs() * 100.0;
    if deviation_pct <= tolerance_pct {
        return ScoreRecord::full(rule.id, tab, rule.points);
    }
    ScoreRecord::zero(rule.id, tab, rule.points, rule.fail_code)
        .with_param("cell", cell)
        .with_param("found", trim_float(candidate))
        .with_param("expected", format!("{live:.4}"))
        .with_param("tolerance", trim_float(tolerance_pct))
}

fn eval_chart_present(rule: &RuleSpec, tab: &str, sheet: &Sheet, min_count: usize) -> ScoreRecord {
    if sheet.charts.len() >= min_count {
        return ScoreRecord::full(rule.id, tab, rule.points);
    }
    ScoreRecord::zero(rule.id, tab, rule.points, rule.fail_code)
        .with_param("tab", tab)
        .with_param("expected", min_count.to_string())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Entry text with one-hop resolution of simple cell references, so a
/// student linking `=F27` to a list entry grades like the typed value.
fn resolved_entry(sheet: &Sheet, cell: &str) -> String {
    let raw = sheet.entry_text(cell);
    if let Some(target) = raw.strip_prefix('=') {
        if let Some(key) = addr::normalize(target.trim()) {
            return sheet.entry_text(&key);
        }
    }
    raw
}

fn numeric_entry(sheet: &Sheet, cell: &str) -> Option<f64> {
    if let Some(n) = sheet.number(cell) {
        return Some(n);
    }
    resolved_entry(sheet, cell).trim().parse().ok()
}

/// Canonical comparable form of a formula entry: normalized, leading `=`
/// dropped. Accepted patterns are written in this form.
fn canonical_formula(raw: &str) -> String {
    normalize_formula(raw).trim_start_matches('=').to_string()
}

fn canonical_temp_formula(raw: &str) -> String {
    normalize_temp_formula(raw).trim_start_matches('=').to_string()
}

/// At least two whitespace-separated tokens, each starting with a letter.
fn looks_like_name(text: &str) -> bool {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    tokens.len() >= 2
        && tokens
            .iter()
            .all(|t| t.chars().next().is_some_and(char::is_alphabetic))
}

const DATE_FORMATS: &[&str] = &["%m/%d/%Y", "%Y-%m-%d", "%m/%d/%y", "%m-%d-%Y"];

/// Parse a date from cell text, falling back to a spreadsheet serial number
/// (days since 1899-12-30) for numeric date cells.
fn parse_date(text: &str, numeric: Option<f64>) -> Option<NaiveDate> {
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, fmt) {
            return Some(date);
        }
    }
    if let Some(serial) = numeric {
        if (20000.0..80000.0).contains(&serial) {
            let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
            return epoch.checked_add_signed(Duration::days(serial as i64));
        }
    }
    None
}

fn trim_float(n: f64) -> String {
    if n.fract() == 0.0 {
        format!("{n:.0}")
    } else {
        format!("{n}")
    }
}

// ---------------------------------------------------------------------------
// Rubric validation
// ---------------------------------------------------------------------------

/// Check a rubric for configuration errors: invalid cell addresses,
/// non-positive points, duplicate rule ids, and accepted patterns that are
/// not already in canonical form. Run once before grading starts.
pub fn validate_tabs(tabs: &[TabRubric]) -> Result<()> {
    let mut seen_ids: Vec<&str> = Vec::new();

    for tab in tabs {
        for rule in tab.rules {
            if seen_ids.contains(&rule.id) {
                return Err(misconfigured(rule.id, "duplicate rule id"));
            }
            seen_ids.push(rule.id);

            if rule.points <= 0.0 {
                return Err(misconfigured(rule.id, "points must be positive"));
            }
            check_addr(rule.id, rule.score_cell)?;

            match rule.kind {
                RuleKind::Presence { cell, .. }
                | RuleKind::DateWithin { cell }
                | RuleKind::CountryValid { cell } => check_addr(rule.id, cell)?,
                RuleKind::FormulaContains { cell, fragment } => {
                    check_addr(rule.id, cell)?;
                    if fragment.is_empty() {
                        return Err(misconfigured(rule.id, "empty formula fragment"));
                    }
                }
                RuleKind::FormulaPattern { cell, accepted } => {
                    check_addr(rule.id, cell)?;
                    check_patterns(rule.id, accepted, canonical_formula)?;
                }
                RuleKind::TempFormula { cell, accepted } => {
                    check_addr(rule.id, cell)?;
                    check_patterns(rule.id, accepted, canonical_temp_formula)?;
                }
                RuleKind::UnitText { cell, accepted } => {
                    check_addr(rule.id, cell)?;
                    check_patterns(rule.id, accepted, |s| normalize_time_unit(s))?;
                }
                RuleKind::CurrencyCodeMatches { cell, country_cell } => {
                    check_addr(rule.id, cell)?;
                    check_addr(rule.id, country_cell)?;
                }
                RuleKind::RateWithin {
                    cell,
                    code_cell,
                    tolerance_pct,
                } => {
                    check_addr(rule.id, cell)?;
                    check_addr(rule.id, code_cell)?;
                    if tolerance_pct <= 0.0 {
                        return Err(misconfigured(rule.id, "tolerance must be positive"));
                    }
                }
                RuleKind::ChartPresent { min_count } => {
                    if min_count == 0 {
                        return Err(misconfigured(rule.id, "min_count must be at least 1"));
                    }
                }
            }
        }
    }
    Ok(())
}

fn check_addr(rule_id: &str, a1: &str) -> Result<()> {
    if addr::normalize(a1).is_none() {
        return Err(misconfigured(rule_id, &format!("invalid cell address {a1:?}")));
    }
    Ok(())
}

fn check_patterns(rule_id: &str, accepted: &[&str], canon: impl Fn(&str) -> String) -> Result<()> {
    if accepted.is_empty() {
        return Err(misconfigured(rule_id, "empty accepted pattern set"));
    }
    for pattern in accepted {
        if canon(pattern) != *pattern {
            return Err(misconfigured(
                rule_id,
                &format!("accepted pattern {pattern:?} is not canonical"),
            ));
        }
    }
    Ok(())
}

fn misconfigured(rule_id: &str, message: &str) -> SheetGraderError {
    SheetGraderError::validation(format!("rubric rule {rule_id}: {message}"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use sheetgrader_workbook::ChartRef;
    use std::collections::HashMap;

    fn test_table() -> RateTable {
        RateTable {
            base: "USD".into(),
            rates: HashMap::from([
                ("DKK".to_string(), 6.87),
                ("JMD".to_string(), 155.3),
                ("EUR".to_string(), 0.92),
            ]),
        }
    }

    fn ctx() -> GradeContext {
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap();
        GradeContext::new(21, Some(test_table())).with_now(now)
    }

    fn spec(id: &'static str, kind: RuleKind, points: f64, fail_code: &'static str) -> RuleSpec {
        RuleSpec {
            id,
            kind,
            points,
            score_cell: "B2",
            fail_code,
        }
    }

    #[test]
    fn presence_blank_and_name_shape() {
        let mut sheet = Sheet::new("T");
        sheet.set_text("B1", "Ada Lovelace");
        sheet.set_text("B3", "Ada");

        let rule = spec(
            "p",
            RuleKind::Presence {
                cell: "B1",
                name_like: true,
            },
            1.0,
            "NAME_NOT_RECOGNIZED",
        );
        assert_eq!(evaluate(&rule, "T", &sheet, &ctx()).points_awarded, 1.0);

        let single = spec(
            "p2",
            RuleKind::Presence {
                cell: "B3",
                name_like: true,
            },
            1.0,
            "NAME_NOT_RECOGNIZED",
        );
        let record = evaluate(&single, "T", &sheet, &ctx());
        assert_eq!(record.points_awarded, 0.0);
        assert_eq!(record.feedback_code.as_deref(), Some("NAME_NOT_RECOGNIZED"));

        let blank = spec(
            "p3",
            RuleKind::Presence {
                cell: "B9",
                name_like: false,
            },
            1.0,
            "NAME_NOT_RECOGNIZED",
        );
        let record = evaluate(&blank, "T", &sheet, &ctx());
        assert_eq!(record.feedback_code.as_deref(), Some(codes::CELL_BLANK));
    }

    #[test]
    fn formula_pattern_accepts_normalized_variants() {
        let rule = spec(
            "f",
            RuleKind::FormulaPattern {
                cell: "B30",
                accepted: &["SLOPE(B19:B26,A19:A26)"],
            },
            1.0,
            "FORMULA_MISMATCH",
        );

        for formula in [
            "=SLOPE(B19:B26,A19:A26)",
            "=slope(b19:b26,a19:a26)",
            "= SLOPE( $B$19:$B$26 , $A$19:$A$26 )",
            "(=SLOPE(B19:B26,A19:A26))",
        ] {
            let mut sheet = Sheet::new("T");
            sheet.set_formula("B30", formula);
            let record = evaluate(&rule, "T", &sheet, &ctx());
            assert_eq!(record.points_awarded, 1.0, "formula: {formula}");
        }
    }

    #[test]
    fn formula_pattern_rejects_wrong_text() {
        let mut sheet = Sheet::new("T");
        sheet.set_formula("B30", "=SLOPE(B1:B8,A1:A8)");

        let rule = spec(
            "f",
            RuleKind::FormulaPattern {
                cell: "B30",
                accepted: &["SLOPE(B19:B26,A19:A26)"],
            },
            1.0,
            "FORMULA_MISMATCH",
        );
        let record = evaluate(&rule, "T", &sheet, &ctx());
        assert_eq!(record.points_awarded, 0.0);
        assert_eq!(record.feedback_code.as_deref(), Some("FORMULA_MISMATCH"));
    }

    #[test]
    fn formula_contains_fragment() {
        let mut sheet = Sheet::new("T");
        sheet.set_formula("B30", "=slope(B1:B8,A1:A8)");

        let rule = spec(
            "c",
            RuleKind::FormulaContains {
                cell: "B30",
                fragment: "SLOPE(",
            },
            1.0,
            "FORMULA_FRAGMENT_MISSING",
        );
        assert_eq!(evaluate(&rule, "T", &sheet, &ctx()).points_awarded, 1.0);

        let missing = spec(
            "c2",
            RuleKind::FormulaContains {
                cell: "B31",
                fragment: "INTERCEPT(",
            },
            1.0,
            "FORMULA_FRAGMENT_MISSING",
        );
        let record = evaluate(&missing, "T", &sheet, &ctx());
        assert_eq!(record.feedback_code.as_deref(), Some(codes::FORMULA_MISSING));
    }

    #[test]
    fn temp_formula_orderings_score_equally() {
        let rule = spec(
            "t",
            RuleKind::TempFormula {
                cell: "B8",
                accepted: &["(5/9)*(A8-32)"],
            },
            2.0,
            "TEMP_FORMULA_MISMATCH",
        );

        for formula in ["=(A8-32)*5/9", "=(A8-32)*(5/9)", "=5/9*(A8-32)", "=(5/9)*(A8-32)"] {
            let mut sheet = Sheet::new("T");
            sheet.set_formula("B8", formula);
            let record = evaluate(&rule, "T", &sheet, &ctx());
            assert_eq!(record.points_awarded, 2.0, "formula: {formula}");
        }

        // Wrong direction gets nothing.
        let mut sheet = Sheet::new("T");
        sheet.set_formula("B8", "=(9/5)*A8+32");
        let record = evaluate(&rule, "T", &sheet, &ctx());
        assert_eq!(record.points_awarded, 0.0);
    }

    #[test]
    fn unit_text_whole_token_matching() {
        let rule = spec(
            "u",
            RuleKind::UnitText {
                cell: "B9",
                accepted: &["h/d"],
            },
            1.0,
            "UNIT_TEXT_MISMATCH",
        );

        let mut sheet = Sheet::new("T");
        sheet.set_text("B9", "Hr / Day");
        assert_eq!(evaluate(&rule, "T", &sheet, &ctx()).points_awarded, 1.0);

        // "hours" is not a synonym token; no credit.
        sheet.set_text("B9", "hours/day");
        let record = evaluate(&rule, "T", &sheet, &ctx());
        assert_eq!(record.points_awarded, 0.0);
        assert_eq!(record.feedback_code.as_deref(), Some("UNIT_TEXT_MISMATCH"));
    }

    #[test]
    fn date_within_window_and_too_old() {
        let rule = spec("d", RuleKind::DateWithin { cell: "B17" }, 0.5, "DATE_TOO_OLD");

        // 9 days old: full points.
        let mut sheet = Sheet::new("T");
        sheet.set_text("B17", "3/1/2026");
        assert_eq!(evaluate(&rule, "T", &sheet, &ctx()).points_awarded, 0.5);

        // 25 days old against a 21 day window: zero with DATE_TOO_OLD.
        sheet.set_text("B17", "2/13/2026");
        let record = evaluate(&rule, "T", &sheet, &ctx());
        assert_eq!(record.points_awarded, 0.0);
        assert_eq!(record.feedback_code.as_deref(), Some("DATE_TOO_OLD"));
        assert!(record.feedback_params.iter().any(|(k, v)| k == "days" && v == "25"));
    }

    #[test]
    fn date_unparsable_is_distinct_from_too_old() {
        let rule = spec("d", RuleKind::DateWithin { cell: "B17" }, 0.5, "DATE_TOO_OLD");

        let mut sheet = Sheet::new("T");
        sheet.set_text("B17", "soon");
        let record = evaluate(&rule, "T", &sheet, &ctx());
        assert_eq!(record.feedback_code.as_deref(), Some(codes::DATE_UNPARSABLE));

        sheet.set_text("B17", "2026-03-05");
        assert_eq!(evaluate(&rule, "T", &sheet, &ctx()).points_awarded, 0.5);
    }

    #[test]
    fn numeric_serial_date_parses() {
        let rule = spec("d", RuleKind::DateWithin { cell: "B17" }, 0.5, "DATE_TOO_OLD");

        // 2026-03-05 is serial 46086 from the 1899-12-30 epoch.
        let mut sheet = Sheet::new("T");
        sheet.set_number("B17", 46086.0);
        assert_eq!(evaluate(&rule, "T", &sheet, &ctx()).points_awarded, 0.5);
    }

    #[test]
    fn country_rules() {
        let rule = spec("co", RuleKind::CountryValid { cell: "B16" }, 1.0, "COUNTRY_NOT_APPROVED");

        let mut sheet = Sheet::new("T");
        sheet.set_text("B16", "denmark");
        assert_eq!(evaluate(&rule, "T", &sheet, &ctx()).points_awarded, 1.0);

        sheet.set_text("B16", "Atlantis");
        let record = evaluate(&rule, "T", &sheet, &ctx());
        assert_eq!(record.feedback_code.as_deref(), Some("COUNTRY_NOT_APPROVED"));
    }

    #[test]
    fn currency_code_matching_with_reference_hop() {
        let rule = spec(
            "cd",
            RuleKind::CurrencyCodeMatches {
                cell: "B18",
                country_cell: "B16",
            },
            1.0,
            "CODE_MISMATCH",
        );

        // Country cell links to a list entry elsewhere on the sheet.
        let mut sheet = Sheet::new("T");
        sheet.set_text("F27", "Denmark");
        sheet.set_formula("B16", "=$F$27");
        sheet.set_text("B18", "dkk");
        assert_eq!(evaluate(&rule, "T", &sheet, &ctx()).points_awarded, 1.0);

        sheet.set_text("B18", "EUR");
        let record = evaluate(&rule, "T", &sheet, &ctx());
        assert_eq!(record.feedback_code.as_deref(), Some("CODE_MISMATCH"));
        assert!(record.feedback_params.iter().any(|(k, v)| k == "expected" && v == "DKK"));

        sheet.set_text("B16", "Narnia");
        let record = evaluate(&rule, "T", &sheet, &ctx());
        assert_eq!(record.feedback_code.as_deref(), Some(codes::COUNTRY_UNKNOWN));
    }

    #[test]
    fn rate_within_tolerance() {
        let rule = spec(
            "r",
            RuleKind::RateWithin {
                cell: "B19",
                code_cell: "B18",
                tolerance_pct: 5.0,
            },
            1.0,
            "RATE_OUT_OF_RANGE",
        );

        let mut sheet = Sheet::new("T");
        sheet.set_text("B18", "DKK");
        sheet.set_number("B19", 6.9);
        assert_eq!(evaluate(&rule, "T", &sheet, &ctx()).points_awarded, 1.0);

        sheet.set_number("B19", 9.5);
        let record = evaluate(&rule, "T", &sheet, &ctx());
        assert_eq!(record.feedback_code.as_deref(), Some("RATE_OUT_OF_RANGE"));

        sheet.set_text("B19", "about seven");
        let record = evaluate(&rule, "T", &sheet, &ctx());
        assert_eq!(record.feedback_code.as_deref(), Some(codes::RATE_NOT_NUMERIC));
    }

    #[test]
    fn rate_unresolvable_without_table() {
        let rule = spec(
            "r",
            RuleKind::RateWithin {
                cell: "B19",
                code_cell: "B18",
                tolerance_pct: 5.0,
            },
            1.0,
            "RATE_OUT_OF_RANGE",
        );

        let mut sheet = Sheet::new("T");
        sheet.set_text("B18", "DKK");
        sheet.set_number("B19", 6.9);

        let no_rates = GradeContext::new(21, None);
        let record = evaluate(&rule, "T", &sheet, &no_rates);
        assert_eq!(record.points_awarded, 0.0);
        assert_eq!(record.feedback_code.as_deref(), Some(codes::RATE_UNRESOLVABLE));
    }

    #[test]
    fn chart_presence() {
        let rule = spec("ch", RuleKind::ChartPresent { min_count: 1 }, 2.0, "CHART_MISSING");

        let mut sheet = Sheet::new("Visualization");
        let record = evaluate(&rule, "Visualization", &sheet, &ctx());
        assert_eq!(record.feedback_code.as_deref(), Some("CHART_MISSING"));

        sheet.charts.push(ChartRef {
            name: "Usage".into(),
            image: None,
        });
        assert_eq!(evaluate(&rule, "Visualization", &sheet, &ctx()).points_awarded, 2.0);
    }

    #[test]
    fn awarded_points_never_exceed_max() {
        let mut sheet = Sheet::new("T");
        sheet.set_text("B1", "Ada Lovelace");
        sheet.set_formula("B30", "=SLOPE(B19:B26,A19:A26)");

        let rules = [
            spec("a", RuleKind::Presence { cell: "B1", name_like: true }, 1.0, "NAME_NOT_RECOGNIZED"),
            spec("b", RuleKind::FormulaContains { cell: "B30", fragment: "SLOPE(" }, 1.0, "FORMULA_FRAGMENT_MISSING"),
            spec("c", RuleKind::DateWithin { cell: "Z1" }, 0.5, "DATE_TOO_OLD"),
        ];
        for rule in &rules {
            let record = evaluate(rule, "T", &sheet, &ctx());
            assert!(record.points_awarded >= 0.0);
            assert!(record.points_awarded <= record.points_max);
        }
    }

    #[test]
    fn validate_catches_uncanonical_patterns() {
        const BAD: &[TabRubric] = &[TabRubric {
            tab: "T",
            rules: &[RuleSpec {
                id: "bad",
                kind: RuleKind::FormulaPattern {
                    cell: "B1",
                    accepted: &["slope(b1:b2, a1:a2)"],
                },
                points: 1.0,
                score_cell: "B2",
                fail_code: "FORMULA_MISMATCH",
            }],
        }];
        assert!(validate_tabs(BAD).is_err());
    }

    #[test]
    fn validate_catches_bad_addresses_and_duplicates() {
        const BAD_ADDR: &[TabRubric] = &[TabRubric {
            tab: "T",
            rules: &[RuleSpec {
                id: "x",
                kind: RuleKind::Presence { cell: "NOPE", name_like: false },
                points: 1.0,
                score_cell: "B2",
                fail_code: "CELL_BLANK",
            }],
        }];
        assert!(validate_tabs(BAD_ADDR).is_err());

        const DUP: &[TabRubric] = &[TabRubric {
            tab: "T",
            rules: &[
                RuleSpec {
                    id: "same",
                    kind: RuleKind::Presence { cell: "B1", name_like: false },
                    points: 1.0,
                    score_cell: "B2",
                    fail_code: "CELL_BLANK",
                },
                RuleSpec {
                    id: "same",
                    kind: RuleKind::Presence { cell: "B2", name_like: false },
                    points: 1.0,
                    score_cell: "B3",
                    fail_code: "CELL_BLANK",
                },
            ],
        }];
        assert!(validate_tabs(DUP).is_err());
    }
}
