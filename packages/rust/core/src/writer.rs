//! Grade-output writer: per-student grade workbooks, the master roster,
//! and the run summary.

use std::path::{Path, PathBuf};

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

use sheetgrader_rubric::TabRubric;
use sheetgrader_shared::{GradeResult, OutputMeta, Result, RunId, RunSummary, SheetGraderError};
use sheetgrader_workbook::{Sheet, WORKBOOK_EXT, Workbook, addr};

/// Label used for the roster totals footer. Rows carrying it are never
/// treated as student rows by the upsert scan.
const FOOTER_LABEL: &str = "Class Average";

// ---------------------------------------------------------------------------
// Course workspace layout
// ---------------------------------------------------------------------------

/// Directory layout of one course workspace under the workspace root.
#[derive(Debug, Clone)]
pub struct CoursePaths {
    /// `<workspace_root>/<Course_Label>/`
    pub root: PathBuf,
    /// Extraction area; run temp dirs live here as `run-<uuid>/`.
    pub submissions: PathBuf,
    /// Per-student grade workbooks.
    pub graded: PathBuf,
    /// Exported chart images.
    pub charts: PathBuf,
    /// Run transcripts.
    pub logs: PathBuf,
    course_component: String,
}

impl CoursePaths {
    pub fn new(workspace_root: &Path, course_label: &str) -> Self {
        let course_component = sanitize_component(course_label);
        let root = workspace_root.join(&course_component);
        Self {
            submissions: root.join("submissions"),
            graded: root.join("graded"),
            charts: root.join("charts"),
            logs: root.join("logs"),
            root,
            course_component,
        }
    }

    /// Create the full directory tree.
    pub fn ensure(&self) -> Result<()> {
        for dir in [
            &self.root,
            &self.submissions,
            &self.graded,
            &self.charts,
            &self.logs,
        ] {
            std::fs::create_dir_all(dir).map_err(|e| SheetGraderError::io(dir, e))?;
        }
        Ok(())
    }

    /// `<Course>_<TYPE>_Roster.wbk` at the course root.
    pub fn master_roster(&self, assignment_type: &str) -> PathBuf {
        self.root.join(format!(
            "{}_{}_Roster.{WORKBOOK_EXT}",
            self.course_component,
            assignment_type.to_uppercase()
        ))
    }

    pub fn run_summary(&self) -> PathBuf {
        self.root.join("run_summary.json")
    }

    pub fn run_log(&self, run_id: RunId) -> PathBuf {
        self.logs.join(format!("run-{run_id}.log"))
    }
}

/// Filesystem-safe path component: whitespace and separators become `_`,
/// other punctuation is dropped.
pub fn sanitize_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.trim().chars() {
        if c.is_alphanumeric() || c == '-' || c == '.' {
            out.push(c);
        } else if (c.is_whitespace() || c == '/' || c == '\\' || c == '_') && !out.ends_with('_') {
            out.push('_');
        }
    }
    out.trim_matches('_').to_string()
}

/// `<Student_Key>_<TYPE>_Grade.wbk`.
pub fn grade_workbook_name(student_key: &str, assignment_type: &str) -> String {
    format!(
        "{}_{}_Grade.{WORKBOOK_EXT}",
        sanitize_component(student_key),
        assignment_type.to_uppercase()
    )
}

// ---------------------------------------------------------------------------
// Per-student grade workbook
// ---------------------------------------------------------------------------

/// Build and save one student's grade workbook: a sheet per rubric tab with
/// points at each rule's score cell and rendered feedback one column to the
/// right, plus a `Summary` sheet. Overwrites any previous output.
#[instrument(skip_all, fields(student = %result.student_key))]
pub fn write_student_result(
    paths: &CoursePaths,
    assignment_type: &str,
    display_name: &str,
    tabs: &[TabRubric],
    result: &GradeResult,
) -> Result<PathBuf> {
    let mut wb = Workbook::new();

    for tab in tabs {
        let sheet = wb.add_sheet(tab.tab);
        sheet.set_text("A1", "Rule");
        sheet.set_text("B1", "Points");
        sheet.set_text("C1", "Feedback");

        for rule in tab.rules {
            let Some(record) = result.scores.iter().find(|s| s.rule_id == rule.id) else {
                continue;
            };
            if let Some((_, row)) = addr::parse(rule.score_cell) {
                sheet.set_text(&addr::format(1, row), rule.id);
            }
            sheet.set_number(rule.score_cell, record.points_awarded);
            if let Some(text) = sheetgrader_feedback::render_record(record) {
                if let Some(feedback_cell) = addr::shift_right(rule.score_cell) {
                    sheet.set_text(&feedback_cell, text);
                }
            }
        }
    }

    let summary = wb.add_sheet("Summary");
    summary.set_text("A1", "Student");
    summary.set_text("B1", &result.student_key);
    summary.set_text("A2", "Assignment");
    summary.set_text("B2", display_name);
    summary.set_text("A3", "Status");
    summary.set_text("B3", "graded");
    summary.set_text("A4", "Total");
    summary.set_number("B4", result.total);
    summary.set_text("A5", "Out Of");
    summary.set_number("B5", result.max_total);
    summary.set_text("A6", "Percent");
    summary.set_number("B6", percent(result.total, result.max_total));
    summary.set_text("A7", "Graded At");
    summary.set_text("B7", Utc::now().to_rfc3339());
    for (i, warning) in result.warnings.iter().enumerate() {
        let row = 9 + i;
        summary.set_text(&format!("A{row}"), "Warning");
        summary.set_text(&format!("B{row}"), warning);
    }

    let path = paths
        .graded
        .join(grade_workbook_name(&result.student_key, assignment_type));
    wb.save(&path)?;

    debug!(path = %path.display(), total = result.total, "wrote grade workbook");
    Ok(path)
}

// ---------------------------------------------------------------------------
// Master roster
// ---------------------------------------------------------------------------

/// Load (or create) the master roster and upsert one row per student, keyed
/// by student key, then recompute the totals footer. Rerunning the same
/// batch leaves exactly one row per student.
#[instrument(skip_all, fields(path = %master_path.display(), students = results.len()))]
pub fn update_master_roster(master_path: &Path, results: &[GradeResult]) -> Result<()> {
    let mut wb = if master_path.exists() {
        Workbook::load(master_path)?
    } else {
        Workbook::new()
    };

    let mut rows: Vec<(String, f64, f64)> = Vec::new();
    if let Some(sheet) = wb.sheet("Roster") {
        for row in 2..10_000u32 {
            let key = sheet.text(&format!("A{row}"));
            let key = key.trim();
            if key.is_empty() || key == FOOTER_LABEL {
                break;
            }
            let total = sheet.number(&format!("B{row}")).unwrap_or(0.0);
            let max = sheet.number(&format!("C{row}")).unwrap_or(0.0);
            rows.push((key.to_string(), total, max));
        }
    }

    for result in results {
        match rows.iter_mut().find(|(key, _, _)| *key == result.student_key) {
            Some(row) => {
                row.1 = result.total;
                row.2 = result.max_total;
            }
            None => rows.push((result.student_key.clone(), result.total, result.max_total)),
        }
    }

    // Rebuild the sheet from scratch so removed footer cells never linger.
    let mut sheet = Sheet::new("Roster");
    sheet.set_text("A1", "Student");
    sheet.set_text("B1", "Points");
    sheet.set_text("C1", "Out Of");
    sheet.set_text("D1", "Percent");

    for (i, (key, total, max)) in rows.iter().enumerate() {
        let row = i as u32 + 2;
        sheet.set_text(&format!("A{row}"), key);
        sheet.set_number(&format!("B{row}"), *total);
        sheet.set_number(&format!("C{row}"), *max);
        sheet.set_number(&format!("D{row}"), percent(*total, *max));
    }
    if !rows.is_empty() {
        let footer = rows.len() as u32 + 2;
        let count = rows.len() as f64;
        let sum_total: f64 = rows.iter().map(|r| r.1).sum();
        let sum_max: f64 = rows.iter().map(|r| r.2).sum();
        sheet.set_text(&format!("A{footer}"), FOOTER_LABEL);
        sheet.set_number(&format!("B{footer}"), round1(sum_total / count));
        sheet.set_number(&format!("C{footer}"), round1(sum_max / count));
        sheet.set_number(&format!("D{footer}"), percent(sum_total, sum_max));
    }

    match wb.sheets.iter_mut().find(|s| s.name == "Roster") {
        Some(slot) => *slot = sheet,
        None => wb.sheets.push(sheet),
    }
    wb.save(master_path)?;

    debug!(rows = rows.len(), "master roster updated");
    Ok(())
}

// ---------------------------------------------------------------------------
// Run summary and log
// ---------------------------------------------------------------------------

/// Serialize the run summary as pretty JSON, written via a temp file and
/// atomic rename.
pub fn write_run_summary(path: &Path, summary: &RunSummary) -> Result<()> {
    let json = serde_json::to_string_pretty(summary)
        .map_err(|e| SheetGraderError::validation(format!("run summary serialization: {e}")))?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("run_summary.json");
    let temp = path.with_file_name(format!(".{file_name}.tmp"));

    std::fs::write(&temp, &json).map_err(|e| SheetGraderError::io(&temp, e))?;
    std::fs::rename(&temp, path).map_err(|e| SheetGraderError::io(path, e))?;
    Ok(())
}

/// Write the run transcript, one log line per row.
pub fn write_run_log(path: &Path, lines: &[String]) -> Result<()> {
    let mut body = lines.join("\n");
    body.push('\n');
    std::fs::write(path, body).map_err(|e| SheetGraderError::io(path, e))
}

/// Checksum metadata for a written output file.
pub fn output_meta(path: &Path) -> Result<OutputMeta> {
    let bytes = std::fs::read(path).map_err(|e| SheetGraderError::io(path, e))?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(OutputMeta {
        filename: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        sha256: format!("{:x}", hasher.finalize()),
        size_bytes: bytes.len(),
    })
}

fn percent(total: f64, max: f64) -> f64 {
    if max > 0.0 { round1(total / max * 100.0) } else { 0.0 }
}

fn round1(n: f64) -> f64 {
    (n * 10.0).round() / 10.0
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
