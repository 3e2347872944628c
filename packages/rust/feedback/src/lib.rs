//! Feedback code rendering.
//!
//! Score records carry stable machine-readable codes plus template
//! parameters; this crate turns them into the instructor-facing text written
//! next to each score cell. An unknown code falls back to `[CODE] k=v` so a
//! missing template never hides a deduction.

use sheetgrader_shared::ScoreRecord;

/// Template table, one entry per feedback code. `{param}` placeholders are
/// substituted from the record's parameters.
const TEMPLATES: &[(&str, &str)] = &[
    ("TAB_MISSING", "Sheet '{tab}' was not found in the workbook"),
    ("CELL_BLANK", "{cell} is blank"),
    (
        "NAME_NOT_RECOGNIZED",
        "{cell} should contain a first and last name, found '{found}'",
    ),
    ("FORMULA_MISSING", "{cell} should contain a formula"),
    ("FORMULA_MISMATCH", "{cell}: expected {expected}, found '{found}'"),
    ("FORMULA_FRAGMENT_MISSING", "{cell} should use {fragment}"),
    (
        "TEMP_FORMULA_MISMATCH",
        "{cell}: not an accepted form of the temperature conversion, found '{found}'",
    ),
    ("UNIT_TEXT_MISMATCH", "{cell}: expected {expected}, found '{found}'"),
    ("DATE_MISSING", "{cell} should contain a date"),
    ("DATE_TOO_OLD", "{cell}: date is {days} days old, limit is {window} days"),
    ("DATE_UNPARSABLE", "{cell}: could not read '{found}' as a date"),
    ("COUNTRY_BLANK", "{cell}: no country selected"),
    (
        "COUNTRY_NOT_APPROVED",
        "{cell}: '{found}' is not on the approved country list",
    ),
    (
        "COUNTRY_UNKNOWN",
        "{cell}: currency code could not be checked because the selected country was not recognized",
    ),
    ("CODE_BLANK", "{cell}: no currency code entered"),
    ("CODE_MISMATCH", "{cell}: {country} uses {expected}, found '{found}'"),
    ("RATE_MISSING", "{cell}: no exchange rate entered"),
    ("RATE_NOT_NUMERIC", "{cell}: expected a numeric rate, found '{found}'"),
    (
        "RATE_OUT_OF_RANGE",
        "{cell}: rate {found} is more than {tolerance}% away from the live rate {expected}",
    ),
    (
        "RATE_UNRESOLVABLE",
        "{cell}: live exchange rate could not be fetched, no points awarded",
    ),
    ("CHART_MISSING", "Sheet '{tab}' should contain at least {expected} chart(s)"),
];

/// Render one feedback code with its parameters.
pub fn render(code: &str, params: &[(String, String)]) -> String {
    let Some((_, template)) = TEMPLATES.iter().find(|(c, _)| *c == code) else {
        return fallback(code, params);
    };

    let mut text = (*template).to_string();
    for (key, value) in params {
        text = text.replace(&format!("{{{key}}}"), value);
    }

    // A placeholder the record didn't fill means the params and template
    // disagree; surface that rather than emitting half-rendered text.
    if text.contains('{') {
        return format!("[FORMAT ERROR] {}", fallback(code, params));
    }
    text
}

/// Render the feedback for a score record, or `None` on full credit.
pub fn render_record(record: &ScoreRecord) -> Option<String> {
    record
        .feedback_code
        .as_deref()
        .map(|code| render(code, &record.feedback_params))
}

/// Join the rendered feedback of several records into one block of lines.
pub fn render_lines(records: &[ScoreRecord]) -> String {
    records
        .iter()
        .filter_map(render_record)
        .collect::<Vec<_>>()
        .join("\n")
}

fn fallback(code: &str, params: &[(String, String)]) -> String {
    if params.is_empty() {
        return format!("[{code}]");
    }
    let rendered: Vec<String> = params.iter().map(|(k, v)| format!("{k}={v}")).collect();
    format!("[{code}] {}", rendered.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn known_code_renders_template() {
        let text = render("DATE_TOO_OLD", &p(&[("cell", "B17"), ("days", "25"), ("window", "21")]));
        assert_eq!(text, "B17: date is 25 days old, limit is 21 days");
    }

    #[test]
    fn unknown_code_falls_back() {
        let text = render("NO_SUCH_CODE", &p(&[("cell", "B4")]));
        assert_eq!(text, "[NO_SUCH_CODE] cell=B4");
    }

    #[test]
    fn unknown_code_without_params() {
        assert_eq!(render("NO_SUCH_CODE", &[]), "[NO_SUCH_CODE]");
    }

    #[test]
    fn missing_param_is_flagged() {
        let text = render("DATE_TOO_OLD", &p(&[("cell", "B17")]));
        assert!(text.starts_with("[FORMAT ERROR]"));
        assert!(text.contains("DATE_TOO_OLD"));
    }

    #[test]
    fn record_rendering() {
        let full = ScoreRecord::full("r1", "Analysis", 1.0);
        assert_eq!(render_record(&full), None);

        let zero = ScoreRecord::zero("r2", "Analysis", 1.0, "CELL_BLANK").with_param("cell", "B10");
        assert_eq!(render_record(&zero).as_deref(), Some("B10 is blank"));
    }

    #[test]
    fn lines_skip_full_credit_records() {
        let records = vec![
            ScoreRecord::full("r1", "Analysis", 1.0),
            ScoreRecord::zero("r2", "Analysis", 1.0, "CELL_BLANK").with_param("cell", "B10"),
            ScoreRecord::zero("r3", "Analysis", 2.0, "FORMULA_MISSING").with_param("cell", "G18"),
        ];
        let block = render_lines(&records);
        assert_eq!(block, "B10 is blank\nG18 should contain a formula");
    }

    #[test]
    fn every_template_code_is_unique() {
        for (i, (code, _)) in TEMPLATES.iter().enumerate() {
            let dup = TEMPLATES.iter().skip(i + 1).any(|(c, _)| c == code);
            assert!(!dup, "duplicate template code {code}");
        }
    }
}
