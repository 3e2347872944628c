//! The eight-phase grading run: extract → import → grade → outputs.
//!
//! Only the run task mutates pipeline state; everything user-visible goes
//! through the [`RunTracker`]. Per-student problems are recorded on the
//! submission and never abort the batch.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, instrument, warn};

use sheetgrader_rates::{RateClient, RateTable};
use sheetgrader_rubric::{GradeContext, GraderRegistry, RuleKind, TabRubric};
use sheetgrader_shared::{
    CURRENT_SCHEMA_VERSION, GradeResult, PipelinePhase, Result, RunConfig, RunId, RunRequest,
    RunStatus, RunSummary, SheetGraderError, StudentSummary, Submission, SubmissionStatus,
};
use sheetgrader_workbook::Workbook;

use crate::extract;
use crate::state::RunTracker;
use crate::writer::{self, CoursePaths};

/// Cell anchor for chart images inserted into grade workbooks.
const IMAGE_ANCHOR: &str = "J4";

/// Everything the spawned run task needs.
pub(crate) struct RunArgs {
    pub run_id: RunId,
    pub request: RunRequest,
    pub config: RunConfig,
    pub tracker: RunTracker,
}

enum Outcome {
    Completed,
    Cancelled,
}

/// Run state accumulated across phases, kept so teardown can write the
/// summary and clean up on every exit path.
#[derive(Default)]
struct Scratch {
    paths: Option<CoursePaths>,
    temp_dir: Option<PathBuf>,
    submissions: Vec<Submission>,
    workbooks: Vec<Option<Workbook>>,
    results: Vec<GradeResult>,
    written: Vec<PathBuf>,
    /// student_key → course-relative path of the first exported chart image.
    exported: HashMap<String, String>,
    max_total: f64,
}

/// Drive one grading run to a terminal state.
#[instrument(skip_all, fields(
    run_id = %args.run_id,
    course = %args.request.course_label,
    assignment = %args.request.assignment_type,
))]
pub(crate) async fn execute(args: RunArgs) {
    let start = Instant::now();
    let started_at = Utc::now();
    let mut scratch = Scratch::default();

    let outcome = run_phases(&args, &mut scratch).await;

    // Temp cleanup runs on every exit path, behind the path guard.
    if let (Some(temp), Some(paths)) = (scratch.temp_dir.as_ref(), scratch.paths.as_ref()) {
        if !remove_run_temp(temp, &paths.root) {
            args.tracker
                .log(format!("cleanup refused for {}", temp.display()));
        }
    }

    let (status, run_error) = match &outcome {
        Ok(Outcome::Completed) => (RunStatus::Completed, None),
        Ok(Outcome::Cancelled) => (RunStatus::Cancelled, None),
        Err(e) => (RunStatus::Error, Some(e.to_string())),
    };
    args.tracker.log(format!(
        "run {status} in {:.1}s",
        start.elapsed().as_secs_f64()
    ));

    if let Some(paths) = scratch.paths.as_ref() {
        let logs = args.tracker.snapshot().logs;
        if let Err(e) = writer::write_run_log(&paths.run_log(args.run_id), &logs) {
            warn!(error = %e, "could not write run log");
        }
        let summary = build_summary(&args, &scratch, status, started_at);
        if let Err(e) = writer::write_run_summary(&paths.run_summary(), &summary) {
            warn!(error = %e, "could not write run summary");
        }
    }

    match &outcome {
        Err(e) => error!(error = %e, "run failed"),
        _ => info!(status = %status, elapsed_ms = start.elapsed().as_millis(), "run finished"),
    }
    args.tracker.finish(status, run_error);
}

// ---------------------------------------------------------------------------
// Phases
// ---------------------------------------------------------------------------

async fn run_phases(args: &RunArgs, scratch: &mut Scratch) -> Result<Outcome> {
    let RunArgs {
        run_id,
        request,
        config,
        tracker,
    } = args;

    let registry = Arc::new(GraderRegistry::new());
    let grader = registry.get(&request.assignment_type)?;
    let assignment_type = grader.assignment_type();
    let tabs = grader.tabs();
    scratch.max_total = grader.max_total();

    // --- Phase 1: Workspace ---
    tracker.enter_phase(PipelinePhase::Workspace);
    let workspace_root = request
        .workspace_override
        .clone()
        .unwrap_or_else(|| config.workspace_dir.clone());
    let paths = CoursePaths::new(&workspace_root, &request.course_label);
    paths.ensure()?;
    tracker.set_output_path(&paths.root);
    tracker.log(format!("workspace ready at {}", paths.root.display()));
    scratch.paths = Some(paths.clone());

    if tracker.cancelled() {
        return Ok(Outcome::Cancelled);
    }

    // --- Phase 2: Folders ---
    tracker.enter_phase(PipelinePhase::Folders);
    let temp_dir = paths.submissions.join(format!("run-{run_id}"));
    scratch.temp_dir = Some(temp_dir.clone());
    extract::extract_archive(&request.archive_path, &temp_dir)?;

    let mut submissions = extract::discover_submissions(&temp_dir)?;
    if submissions.is_empty() {
        return Err(SheetGraderError::validation(
            "archive contains no student folders",
        ));
    }
    submissions.sort_by(|a, b| a.student_key.cmp(&b.student_key));
    tracker.log(format!("{} student folders found", submissions.len()));
    info!(count = submissions.len(), "submissions discovered");
    scratch.workbooks = submissions.iter().map(|_| None).collect();
    scratch.submissions = submissions;

    if tracker.cancelled() {
        return Ok(Outcome::Cancelled);
    }

    // --- Phase 3: Import ---
    tracker.enter_phase(PipelinePhase::Import);
    let mut imported = 0usize;
    for idx in 0..scratch.submissions.len() {
        if tracker.cancelled() {
            return Ok(Outcome::Cancelled);
        }
        let submission = &mut scratch.submissions[idx];
        match extract::find_workbook(&submission.source_path) {
            None => {
                submission.status = SubmissionStatus::Failed;
                submission.failure = Some("no workbook file in folder".to_string());
                warn!(student = %submission.student_key, "no workbook file in folder");
                tracker.log(format!(
                    "{}: no workbook file found",
                    submission.student_key
                ));
            }
            Some(wb_path) => match Workbook::load(&wb_path) {
                Ok(wb) => {
                    submission.source_path = wb_path;
                    submission.status = SubmissionStatus::Validated;
                    scratch.workbooks[idx] = Some(wb);
                    imported += 1;
                }
                Err(e) => {
                    submission.status = SubmissionStatus::Failed;
                    submission.failure = Some(e.to_string());
                    warn!(student = %submission.student_key, error = %e, "workbook import failed");
                    tracker.log(format!(
                        "{}: workbook import failed",
                        submission.student_key
                    ));
                }
            },
        }
    }
    tracker.log(format!(
        "{imported} of {} workbooks imported",
        scratch.submissions.len()
    ));

    // --- Phase 4: Sheets ---
    tracker.enter_phase(PipelinePhase::Sheets);
    for idx in 0..scratch.submissions.len() {
        if tracker.cancelled() {
            return Ok(Outcome::Cancelled);
        }
        let Some(wb) = scratch.workbooks[idx].as_ref() else {
            continue;
        };
        let missing: Vec<&str> = tabs
            .iter()
            .filter(|t| wb.sheet(t.tab).is_none())
            .map(|t| t.tab)
            .collect();
        if !missing.is_empty() {
            let submission = &scratch.submissions[idx];
            warn!(student = %submission.student_key, ?missing, "required tabs missing");
            tracker.log(format!(
                "{}: missing tabs: {}",
                submission.student_key,
                missing.join(", ")
            ));
        }
    }
    tracker.log("sheet check complete");

    // --- Phase 5: Grade ---
    tracker.enter_phase(PipelinePhase::Grade);
    let rates = resolve_rates(tabs_need_rates(tabs), config, tracker).await;
    let ctx = Arc::new(GradeContext::new(config.date_window_days, rates));

    let workers = config.concurrency.max(1) as usize;
    let semaphore = Arc::new(Semaphore::new(workers));
    let validated: Vec<usize> = (0..scratch.submissions.len())
        .filter(|&i| scratch.submissions[i].status == SubmissionStatus::Validated)
        .collect();

    for batch in validated.chunks(workers) {
        let mut handles = Vec::with_capacity(batch.len());
        for &idx in batch {
            // Students already in flight finish; nothing new is dispatched
            // once cancellation has been requested.
            if tracker.cancelled() {
                break;
            }
            let Some(workbook) = scratch.workbooks[idx].take() else {
                continue;
            };
            let submission = scratch.submissions[idx].clone();
            let registry = Arc::clone(&registry);
            let ctx = Arc::clone(&ctx);
            let semaphore = Arc::clone(&semaphore);
            let tracker = tracker.clone();
            let paths = paths.clone();
            let assignment = request.assignment_type.clone();

            handles.push((
                idx,
                tokio::spawn(async move {
                    let Ok(_permit) = semaphore.acquire_owned().await else {
                        return grade_task_failed(submission, workbook, "worker pool closed");
                    };
                    grade_one(submission, workbook, &registry, &assignment, &ctx, &paths, &tracker)
                }),
            ));
        }

        for (idx, handle) in handles {
            match handle.await {
                Ok(out) => {
                    scratch.submissions[idx] = out.submission;
                    scratch.workbooks[idx] = Some(out.workbook);
                    if let Some(result) = out.result {
                        scratch.results.push(result);
                    }
                    if let Some(path) = out.written {
                        scratch.written.push(path);
                    }
                }
                Err(e) => {
                    scratch.submissions[idx].status = SubmissionStatus::Failed;
                    scratch.submissions[idx].failure =
                        Some(format!("grading task panicked: {e}"));
                    error!(
                        student = %scratch.submissions[idx].student_key,
                        error = %e,
                        "grading task panicked"
                    );
                }
            }
        }

        if tracker.cancelled() {
            return Ok(Outcome::Cancelled);
        }
    }
    let graded = scratch
        .submissions
        .iter()
        .filter(|s| s.status == SubmissionStatus::Graded)
        .count();
    tracker.log(format!(
        "graded {graded} of {} submissions",
        scratch.submissions.len()
    ));
    info!(graded, total = scratch.submissions.len(), "grading complete");

    // --- Phase 6: Charts ---
    tracker.enter_phase(PipelinePhase::Charts);
    let mut exported_count = 0usize;
    for idx in 0..scratch.submissions.len() {
        if tracker.cancelled() {
            return Ok(Outcome::Cancelled);
        }
        if scratch.submissions[idx].status != SubmissionStatus::Graded {
            continue;
        }
        let Some(workbook) = scratch.workbooks[idx].as_ref() else {
            continue;
        };
        let key = scratch.submissions[idx].student_key.clone();
        let Some(folder) = scratch.submissions[idx].source_path.parent() else {
            continue;
        };

        for sheet in &workbook.sheets {
            for chart in &sheet.charts {
                let Some(image) = chart.image.as_deref() else {
                    continue;
                };
                match export_chart_image(&paths, &key, folder, image) {
                    Ok(rel) => {
                        exported_count += 1;
                        scratch.exported.entry(key.clone()).or_insert(rel);
                    }
                    Err(e) => {
                        warn!(student = %key, chart = %chart.name, error = %e, "chart export failed");
                    }
                }
            }
        }
    }
    tracker.log(format!("{exported_count} chart images exported"));

    // --- Phase 7: Insert ---
    tracker.enter_phase(PipelinePhase::Insert);
    let mut inserted = 0usize;
    for idx in 0..scratch.submissions.len() {
        if tracker.cancelled() {
            return Ok(Outcome::Cancelled);
        }
        let key = &scratch.submissions[idx].student_key;
        let Some(rel) = scratch.exported.get(key) else {
            continue;
        };
        let grade_path = paths
            .graded
            .join(writer::grade_workbook_name(key, assignment_type));
        match insert_chart_image(&grade_path, rel) {
            Ok(()) => inserted += 1,
            Err(e) => warn!(student = %key, error = %e, "chart insert failed"),
        }
    }
    tracker.log(format!("{inserted} chart images inserted"));

    // --- Phase 8: Master ---
    tracker.enter_phase(PipelinePhase::Master);
    if scratch.results.is_empty() {
        tracker.log("no graded submissions, master roster unchanged");
    } else {
        let roster_path = paths.master_roster(assignment_type);
        writer::update_master_roster(&roster_path, &scratch.results)?;
        scratch.written.push(roster_path);
        tracker.log("master roster updated");
    }

    Ok(Outcome::Completed)
}

// ---------------------------------------------------------------------------
// Per-student grading task
// ---------------------------------------------------------------------------

struct TaskOutcome {
    submission: Submission,
    workbook: Workbook,
    result: Option<GradeResult>,
    written: Option<PathBuf>,
}

fn grade_one(
    mut submission: Submission,
    workbook: Workbook,
    registry: &GraderRegistry,
    assignment_type: &str,
    ctx: &GradeContext,
    paths: &CoursePaths,
    tracker: &RunTracker,
) -> TaskOutcome {
    let grader = match registry.get(assignment_type) {
        Ok(g) => g,
        Err(e) => return grade_task_failed(submission, workbook, &e.to_string()),
    };

    let result = grader.grade(&submission.student_key, &workbook, ctx);
    tracker.log(format!(
        "{}: {}/{}",
        submission.student_key, result.total, result.max_total
    ));

    // A write failure is a warning, not a grading failure.
    let written = match writer::write_student_result(
        paths,
        grader.assignment_type(),
        grader.display_name(),
        grader.tabs(),
        &result,
    ) {
        Ok(path) => Some(path),
        Err(e) => {
            warn!(student = %submission.student_key, error = %e, "grade workbook write failed");
            tracker.log(format!(
                "{}: grade workbook write failed: {e}",
                submission.student_key
            ));
            None
        }
    };

    submission.status = SubmissionStatus::Graded;
    TaskOutcome {
        submission,
        workbook,
        result: Some(result),
        written,
    }
}

fn grade_task_failed(mut submission: Submission, workbook: Workbook, reason: &str) -> TaskOutcome {
    submission.status = SubmissionStatus::Failed;
    submission.failure = Some(reason.to_string());
    TaskOutcome {
        submission,
        workbook,
        result: None,
        written: None,
    }
}

// ---------------------------------------------------------------------------
// Lookup resolution
// ---------------------------------------------------------------------------

fn tabs_need_rates(tabs: &[TabRubric]) -> bool {
    tabs.iter()
        .flat_map(|t| t.rules.iter())
        .any(|r| matches!(r.kind, RuleKind::RateWithin { .. }))
}

/// Resolve the exchange-rate table once for the whole batch. A lookup
/// failure never fails the run: affected rules score `RATE_UNRESOLVABLE`.
async fn resolve_rates(
    needed: bool,
    config: &RunConfig,
    tracker: &RunTracker,
) -> Option<RateTable> {
    if !needed {
        debug!("rubric has no rate rules, skipping lookup");
        return None;
    }
    let client = match RateClient::new(&config.rates) {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "lookup client build failed");
            tracker.log(format!("rate lookup unavailable: {e}"));
            return None;
        }
    };
    match client.table().await {
        Ok(table) => {
            tracker.log(format!(
                "exchange rates resolved ({} currencies)",
                table.rates.len()
            ));
            Some(table)
        }
        Err(e) => {
            warn!(error = %e, "rate lookup failed");
            tracker.log(format!("rate lookup failed, rate rules will not score: {e}"));
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Charts
// ---------------------------------------------------------------------------

/// Copy one rendered chart image from the student folder into `charts/`,
/// returning the course-relative destination path.
fn export_chart_image(
    paths: &CoursePaths,
    student_key: &str,
    folder: &Path,
    image: &str,
) -> Result<String> {
    let src = folder.join(image);
    if !src.is_file() {
        return Err(SheetGraderError::validation(format!(
            "chart image not found: {}",
            src.display()
        )));
    }
    let file_name = src
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "chart.png".to_string());
    let dest_dir = paths.charts.join(student_key);
    std::fs::create_dir_all(&dest_dir).map_err(|e| SheetGraderError::io(&dest_dir, e))?;
    let dest = dest_dir.join(&file_name);
    std::fs::copy(&src, &dest).map_err(|e| SheetGraderError::io(&dest, e))?;
    Ok(format!("charts/{student_key}/{file_name}"))
}

fn insert_chart_image(grade_path: &Path, image_rel: &str) -> Result<()> {
    let mut wb = Workbook::load(grade_path)?;
    wb.anchor_image(IMAGE_ANCHOR, image_rel);
    wb.save(grade_path)
}

// ---------------------------------------------------------------------------
// Teardown helpers
// ---------------------------------------------------------------------------

/// Delete the extraction temp directory, but only when it sits under the
/// course workspace root *and* its final component matches `run-<uuid v7>`.
/// Anything else is refused and logged. Never fatal.
pub(crate) fn remove_run_temp(temp_dir: &Path, workspace_root: &Path) -> bool {
    let name_ok = temp_dir
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(is_run_temp_name);
    if !name_ok || !temp_dir.starts_with(workspace_root) {
        error!(path = %temp_dir.display(), "refusing to delete unexpected temp path");
        return false;
    }
    if !temp_dir.exists() {
        return true;
    }
    match std::fs::remove_dir_all(temp_dir) {
        Ok(()) => {
            debug!(path = %temp_dir.display(), "temp directory removed");
            true
        }
        Err(e) => {
            warn!(path = %temp_dir.display(), error = %e, "temp cleanup failed");
            false
        }
    }
}

fn is_run_temp_name(name: &str) -> bool {
    name.strip_prefix("run-")
        .and_then(|rest| uuid::Uuid::parse_str(rest).ok())
        .is_some_and(|u| u.get_version_num() == 7)
}

fn build_summary(
    args: &RunArgs,
    scratch: &Scratch,
    status: RunStatus,
    started_at: DateTime<Utc>,
) -> RunSummary {
    let results: HashMap<&str, &GradeResult> = scratch
        .results
        .iter()
        .map(|r| (r.student_key.as_str(), r))
        .collect();

    let students = scratch
        .submissions
        .iter()
        .map(|s| {
            let (total, max_total) = match results.get(s.student_key.as_str()) {
                Some(r) => (r.total, r.max_total),
                None => (0.0, scratch.max_total),
            };
            StudentSummary {
                student_key: s.student_key.clone(),
                status: s.status,
                total,
                max_total,
            }
        })
        .collect();

    let outputs = scratch
        .written
        .iter()
        .filter_map(|path| match writer::output_meta(path) {
            Ok(meta) => Some(meta),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not checksum output");
                None
            }
        })
        .collect();

    RunSummary {
        schema_version: CURRENT_SCHEMA_VERSION,
        run_id: args.run_id,
        course_label: args.request.course_label.clone(),
        assignment_type: args.request.assignment_type.clone(),
        status,
        started_at,
        finished_at: Utc::now(),
        students,
        outputs,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Pipeline;
    use sheetgrader_shared::RatesConfig;
    use sheetgrader_workbook::ChartRef;
    use std::io::Write;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};
    use zip::write::SimpleFileOptions;

    fn temp_root(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("sg-pipeline-{tag}-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn run_config(workspace: &Path) -> RunConfig {
        RunConfig {
            workspace_dir: workspace.to_path_buf(),
            concurrency: 2,
            date_window_days: 21,
            rates: RatesConfig::default(),
        }
    }

    fn workbook_bytes(wb: &Workbook) -> Vec<u8> {
        let tmp = std::env::temp_dir().join(format!("sg-pipe-wb-{}.wbk", uuid::Uuid::now_v7()));
        wb.save(&tmp).unwrap();
        let bytes = std::fs::read(&tmp).unwrap();
        let _ = std::fs::remove_file(&tmp);
        bytes
    }

    fn write_zip(zip_path: &Path, entries: &[(&str, &[u8])]) {
        let file = std::fs::File::create(zip_path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        for (name, content) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(content).unwrap();
        }
        zip.finish().unwrap();
    }

    fn ma3_workbook(with_viz: bool) -> Workbook {
        let mut wb = Workbook::new();
        let analysis = wb.add_sheet("Analysis");
        analysis.set_text("B10", "Grace Hopper");
        for row in 14..=18 {
            analysis.set_formula(&format!("D{row}"), format!("=C{row}-B{row}"));
        }
        analysis.set_formula("G18", "=AVERAGE(D14:D18)");
        analysis.set_formula("G19", "=MEDIAN(D14:D18)");
        analysis.set_formula("G20", "=STDEV.S(D14:D18)");
        analysis.set_formula("G22", "=PERCENTILE.INC(D14:D18,0.9)");
        if with_viz {
            let viz = wb.add_sheet("Visualization");
            viz.set_text("B2", "Daily Energy Use");
            viz.set_text("B4", "kWh / day");
            viz.charts.push(ChartRef {
                name: "Usage".into(),
                image: Some("usage.png".into()),
            });
            viz.set_formula("E22", "=MIN(B12:B61)");
            viz.set_formula("E23", "=MAX(B12:B61)");
            viz.set_formula("E24", "=(E23-E22)/10");
        }
        wb
    }

    fn recent_date() -> String {
        (Utc::now() - chrono::Duration::days(3))
            .format("%m/%d/%Y")
            .to_string()
    }

    fn ma1_workbook() -> Workbook {
        let mut wb = Workbook::new();

        let income = wb.add_sheet("Income Analysis");
        income.set_text("B1", "Ada Lovelace");
        income.set_formula("B30", "=SLOPE(B19:B26,A19:A26)");
        income.set_formula("B31", "=INTERCEPT(B19:B26,A19:A26)");
        income.set_formula("B32", "=B30*A28+B31");
        income.charts.push(ChartRef {
            name: "BLS Scatter".into(),
            image: None,
        });

        let units = wb.add_sheet("Unit Conversions");
        units.set_text("B5", "mg/day");
        units.set_text("B6", "mcg/hr");
        units.set_formula("B7", "=B4*1000/24");
        units.set_formula("B8", "=(A8-32)*5/9");
        units.set_text("B9", "hr/day");

        let currency = wb.add_sheet("Currency Conversion");
        currency.set_text("B15", "Ada Lovelace");
        let date = recent_date();
        let blocks = [
            ("B", "Denmark", "DKK", 6.87),
            ("C", "Jamaica", "JMD", 155.3),
            ("D", "Oman", "OMR", 0.3845),
            ("E", "Estonia", "EUR", 0.92),
        ];
        for (col, country, code, rate) in blocks {
            currency.set_text(&format!("{col}16"), country);
            currency.set_text(&format!("{col}17"), &date);
            currency.set_text(&format!("{col}18"), code);
            currency.set_number(&format!("{col}19"), rate);
            currency.set_formula(&format!("{col}20"), format!("=B4*{col}19"));
            currency.set_formula(&format!("{col}21"), format!("=B5/{col}19"));
        }
        wb
    }

    #[tokio::test]
    async fn ma3_run_end_to_end() {
        let root = temp_root("ma3");
        let grace = workbook_bytes(&ma3_workbook(true));
        let mallory = workbook_bytes(&ma3_workbook(false));
        let png: &[u8] = b"\x89PNG fake image";

        let archive = root.join("batch.zip");
        write_zip(
            &archive,
            &[
                ("Grace Hopper 301/MA3.wbk", grace.as_slice()),
                ("Grace Hopper 301/usage.png", png),
                ("Mallory Quinn 302/MA3.wbk", mallory.as_slice()),
            ],
        );

        let workspace = root.join("ws");
        let pipeline = Pipeline::new(run_config(&workspace));
        pipeline
            .start(RunRequest {
                archive_path: archive,
                course_label: "BIO 101".into(),
                assignment_type: "ma3".into(),
                workspace_override: None,
            })
            .unwrap();
        pipeline.wait().await;

        let state = pipeline.snapshot();
        assert_eq!(state.status, RunStatus::Completed, "logs: {:?}", state.logs);
        assert_eq!(state.progress, 8);

        let course = workspace.join("BIO_101");
        assert_eq!(state.output_path.as_deref(), Some(course.as_path()));

        let grace_path = course.join("graded/Grace_Hopper_MA3_Grade.wbk");
        let mallory_path = course.join("graded/Mallory_Quinn_MA3_Grade.wbk");
        assert!(grace_path.exists());
        assert!(mallory_path.exists());

        // Graded totals land in the run summary.
        let summary: RunSummary = serde_json::from_str(
            &std::fs::read_to_string(course.join("run_summary.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(summary.status, RunStatus::Completed);
        assert_eq!(summary.students.len(), 2);
        let grace_row = summary
            .students
            .iter()
            .find(|s| s.student_key == "Grace_Hopper")
            .unwrap();
        assert_eq!(grace_row.total, 21.0);
        let mallory_row = summary
            .students
            .iter()
            .find(|s| s.student_key == "Mallory_Quinn")
            .unwrap();
        assert_eq!(mallory_row.total, 14.0);
        assert_eq!(mallory_row.max_total, 21.0);
        // Two grade workbooks plus the roster.
        assert_eq!(summary.outputs.len(), 3);

        // Chart image exported and anchored into the grade workbook.
        assert!(course.join("charts/Grace_Hopper/usage.png").exists());
        let graded = Workbook::load(&grace_path).unwrap();
        assert_eq!(graded.images.len(), 1);
        assert_eq!(graded.images[0].anchor, "J4");

        // Roster has one row per student.
        let roster = Workbook::load(&course.join("BIO_101_MA3_Roster.wbk")).unwrap();
        let sheet = roster.sheet("Roster").unwrap();
        assert_eq!(sheet.text("A2"), "Grace_Hopper");
        assert_eq!(sheet.text("A3"), "Mallory_Quinn");

        // Extraction temp is gone; the transcript is kept.
        assert_eq!(std::fs::read_dir(course.join("submissions")).unwrap().count(), 0);
        assert_eq!(std::fs::read_dir(course.join("logs")).unwrap().count(), 1);

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn ma1_run_resolves_rates_via_lookup() {
        let server = MockServer::start().await;
        let body = serde_json::json!({
            "result": "success",
            "base_code": "USD",
            "rates": { "USD": 1.0, "DKK": 6.87, "JMD": 155.3, "OMR": 0.3845, "EUR": 0.92 }
        });
        Mock::given(method("GET"))
            .and(path("/v6/latest/USD"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let root = temp_root("ma1");
        let archive = root.join("batch.zip");
        let ada = workbook_bytes(&ma1_workbook());
        write_zip(&archive, &[("Ada Lovelace 100/MA1.wbk", ada.as_slice())]);

        let workspace = root.join("ws");
        let mut config = run_config(&workspace);
        config.rates = RatesConfig {
            base_url: format!("{}/v6/latest/USD", server.uri()),
            timeout_secs: 5,
            max_retries: 2,
            backoff_base_ms: 1,
        };

        let pipeline = Pipeline::new(config);
        pipeline
            .start(RunRequest {
                archive_path: archive,
                course_label: "BIO 101".into(),
                assignment_type: "ma1".into(),
                workspace_override: None,
            })
            .unwrap();
        pipeline.wait().await;

        let state = pipeline.snapshot();
        assert_eq!(state.status, RunStatus::Completed, "logs: {:?}", state.logs);

        let course = workspace.join("BIO_101");
        let summary: RunSummary = serde_json::from_str(
            &std::fs::read_to_string(course.join("run_summary.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(summary.students[0].total, 45.0);
        assert_eq!(summary.students[0].max_total, 45.0);

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn corrupt_archive_fails_the_run() {
        let root = temp_root("corrupt");
        let archive = root.join("bad.zip");
        std::fs::write(&archive, "not a zip at all").unwrap();

        let workspace = root.join("ws");
        let pipeline = Pipeline::new(run_config(&workspace));
        pipeline
            .start(RunRequest {
                archive_path: archive,
                course_label: "BIO 101".into(),
                assignment_type: "ma3".into(),
                workspace_override: None,
            })
            .unwrap();
        pipeline.wait().await;

        let state = pipeline.snapshot();
        assert_eq!(state.status, RunStatus::Error);
        assert!(state.error.as_deref().unwrap_or_default().contains("archive"));

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn cancel_observed_at_phase_boundary() {
        let root = temp_root("cancel");
        let archive = root.join("batch.zip");
        let wb = workbook_bytes(&ma3_workbook(true));
        write_zip(&archive, &[("Grace Hopper 1/MA3.wbk", wb.as_slice())]);

        let tracker = RunTracker::new();
        tracker.begin();
        tracker.request_cancel();

        execute(RunArgs {
            run_id: RunId::new(),
            request: RunRequest {
                archive_path: archive,
                course_label: "BIO 101".into(),
                assignment_type: "ma3".into(),
                workspace_override: None,
            },
            config: run_config(&root.join("ws")),
            tracker: tracker.clone(),
        })
        .await;

        let state = tracker.snapshot();
        assert_eq!(state.status, RunStatus::Cancelled);
        assert!(state.error.is_none());
        // Cancelled after phase 1: nothing extracted, nothing graded.
        assert!(!root.join("ws/BIO_101/graded").join("Grace_Hopper_MA3_Grade.wbk").exists());

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn cancel_during_grading_keeps_finished_outputs() {
        let root = temp_root("midcancel");
        let png: &[u8] = b"\x89PNG fake image";
        let alice = workbook_bytes(&ma3_workbook(true));
        let bob = workbook_bytes(&ma3_workbook(true));

        let archive = root.join("batch.zip");
        write_zip(
            &archive,
            &[
                ("Alice Ng 1/MA3.wbk", alice.as_slice()),
                ("Alice Ng 1/usage.png", png),
                ("Bob Tran 2/MA3.wbk", bob.as_slice()),
                ("Bob Tran 2/usage.png", png),
            ],
        );

        let workspace = root.join("ws");
        let mut config = run_config(&workspace);
        config.concurrency = 1;

        let pipeline = Pipeline::new(config);
        pipeline
            .start(RunRequest {
                archive_path: archive,
                course_label: "BIO 101".into(),
                assignment_type: "ma3".into(),
                workspace_override: None,
            })
            .unwrap();

        // Cancel as soon as the first score line lands in the transcript,
        // while the grade phase is still working through the batch.
        loop {
            let state = pipeline.snapshot();
            if state.logs.iter().any(|l| l.starts_with("Alice_Ng: ")) {
                pipeline.cancel();
                break;
            }
            if state.status.is_terminal() {
                break;
            }
            tokio::task::yield_now().await;
        }
        pipeline.wait().await;

        let state = pipeline.snapshot();
        assert_eq!(state.status, RunStatus::Cancelled, "logs: {:?}", state.logs);
        assert!(state.error.is_none());

        let course = workspace.join("BIO_101");
        // The student graded before the cancel keeps their workbook.
        assert!(course.join("graded/Alice_Ng_MA3_Grade.wbk").exists());
        // Chart export and roster phases never ran.
        assert_eq!(std::fs::read_dir(course.join("charts")).unwrap().count(), 0);
        assert!(!course.join("BIO_101_MA3_Roster.wbk").exists());
        // The extraction temp was still cleaned up.
        assert_eq!(std::fs::read_dir(course.join("submissions")).unwrap().count(), 0);

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn cleanup_guard_refuses_foreign_paths() {
        let root = temp_root("guard");
        let workspace = root.join("ws");

        // Correctly named, under the workspace: removed.
        let good = workspace.join("submissions").join(format!("run-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&good).unwrap();
        assert!(remove_run_temp(&good, &workspace));
        assert!(!good.exists());

        // Bad name under the workspace: refused.
        let bad_name = workspace.join("submissions").join("graded");
        std::fs::create_dir_all(&bad_name).unwrap();
        assert!(!remove_run_temp(&bad_name, &workspace));
        assert!(bad_name.exists());

        // Correct name outside the workspace: refused.
        let outside = root.join(format!("run-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&outside).unwrap();
        assert!(!remove_run_temp(&outside, &workspace));
        assert!(outside.exists());

        let _ = std::fs::remove_dir_all(&root);
    }
}
