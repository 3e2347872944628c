//! Core domain types for SheetGrader runs.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current schema version for the run summary format.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Number of pipeline phases in a run.
pub const PHASE_COUNT: u8 = 8;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for run identifiers (time-sortable).
///
/// The run id also names the extraction temp directory (`run-<id>`), which
/// the cleanup guard checks before deleting anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Submissions
// ---------------------------------------------------------------------------

/// Lifecycle status of a single student's submission within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Pending,
    Validated,
    Graded,
    Failed,
}

impl std::fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Validated => "validated",
            Self::Graded => "graded",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// One student's submission, tracked by the orchestrator for the run's lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    /// Deterministic key derived from the student folder name (`First_Last`).
    pub student_key: String,
    /// Raw folder name as it appeared in the archive.
    pub folder_name: String,
    /// Path to the extracted workbook file.
    pub source_path: PathBuf,
    /// Current lifecycle status.
    pub status: SubmissionStatus,
    /// Reason for `Failed`, when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

// ---------------------------------------------------------------------------
// Scores
// ---------------------------------------------------------------------------

/// Outcome of one rubric rule for one student.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreRecord {
    /// Stable rule identifier from the rubric.
    pub rule_id: String,
    /// Tab the rule belongs to.
    pub tab: String,
    /// Points awarded. Invariant: `0 <= points_awarded <= points_max`.
    pub points_awarded: f64,
    /// Maximum points for this rule.
    pub points_max: f64,
    /// Why points were withheld; `None` on full credit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback_code: Option<String>,
    /// Template parameters for rendering the feedback code as text.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub feedback_params: Vec<(String, String)>,
}

impl ScoreRecord {
    /// Full-credit record for a rule.
    pub fn full(rule_id: &str, tab: &str, points_max: f64) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            tab: tab.to_string(),
            points_awarded: points_max,
            points_max,
            feedback_code: None,
            feedback_params: Vec::new(),
        }
    }

    /// Zero-credit record with a feedback code.
    pub fn zero(rule_id: &str, tab: &str, points_max: f64, code: &str) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            tab: tab.to_string(),
            points_awarded: 0.0,
            points_max,
            feedback_code: Some(code.to_string()),
            feedback_params: Vec::new(),
        }
    }

    /// Attach a feedback template parameter.
    pub fn with_param(mut self, key: &str, value: impl Into<String>) -> Self {
        self.feedback_params.push((key.to_string(), value.into()));
        self
    }
}

/// Aggregate grading outcome for one student.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradeResult {
    pub student_key: String,
    /// All score records, in rubric order.
    pub scores: Vec<ScoreRecord>,
    /// Sum of `points_awarded` across `scores`.
    pub total: f64,
    /// Sum of `points_max` across `scores`, missing-tab rules included.
    pub max_total: f64,
    /// Non-fatal problems encountered while grading (e.g. missing tabs).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl GradeResult {
    /// Build a result from score records, computing the totals invariantly.
    pub fn from_scores(student_key: &str, scores: Vec<ScoreRecord>, warnings: Vec<String>) -> Self {
        let total = scores.iter().map(|s| s.points_awarded).sum();
        let max_total = scores.iter().map(|s| s.points_max).sum();
        Self {
            student_key: student_key.to_string(),
            scores,
            total,
            max_total,
            warnings,
        }
    }

    /// Per-tab `(awarded, max)` subtotal.
    pub fn tab_subtotal(&self, tab: &str) -> (f64, f64) {
        self.scores
            .iter()
            .filter(|s| s.tab.eq_ignore_ascii_case(tab))
            .fold((0.0, 0.0), |(a, m), s| {
                (a + s.points_awarded, m + s.points_max)
            })
    }
}

// ---------------------------------------------------------------------------
// Pipeline state
// ---------------------------------------------------------------------------

/// Overall run status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Idle,
    Running,
    Completed,
    Cancelled,
    Error,
}

impl RunStatus {
    /// True for Completed/Cancelled/Error.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Error)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// The eight strictly ordered phases of a grading run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelinePhase {
    Workspace,
    Folders,
    Import,
    Sheets,
    Grade,
    Charts,
    Insert,
    Master,
}

impl PipelinePhase {
    /// All phases in execution order.
    pub const ALL: [PipelinePhase; PHASE_COUNT as usize] = [
        Self::Workspace,
        Self::Folders,
        Self::Import,
        Self::Sheets,
        Self::Grade,
        Self::Charts,
        Self::Insert,
        Self::Master,
    ];

    /// 1-based phase number.
    pub fn number(self) -> u8 {
        match self {
            Self::Workspace => 1,
            Self::Folders => 2,
            Self::Import => 3,
            Self::Sheets => 4,
            Self::Grade => 5,
            Self::Charts => 6,
            Self::Insert => 7,
            Self::Master => 8,
        }
    }

    /// Human-readable phase title for logs and progress display.
    pub fn title(self) -> &'static str {
        match self {
            Self::Workspace => "Preparing workspace",
            Self::Folders => "Extracting student folders",
            Self::Import => "Importing workbooks",
            Self::Sheets => "Validating sheets",
            Self::Grade => "Grading submissions",
            Self::Charts => "Exporting charts",
            Self::Insert => "Inserting chart images",
            Self::Master => "Writing master roster",
        }
    }
}

/// Process-wide pipeline state, mutated only by the orchestrator.
///
/// External collaborators read cloned snapshots at their own cadence; within
/// a run, `progress` is monotonically non-decreasing and `logs` is
/// append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineState {
    pub status: RunStatus,
    /// Current phase; `None` when idle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<PipelinePhase>,
    /// Phases entered so far (0..=8).
    pub progress: u8,
    /// Ordered, append-only run transcript.
    pub logs: Vec<String>,
    /// Fatal run error message, when status is `Error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Course workspace directory once phase 1 has resolved it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self {
            status: RunStatus::Idle,
            phase: None,
            progress: 0,
            logs: Vec::new(),
            error: None,
            output_path: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Run request / summary
// ---------------------------------------------------------------------------

/// Parameters for starting a grading run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    /// Zip archive of per-student submission folders.
    pub archive_path: PathBuf,
    /// Course label, used to name the workspace and outputs.
    pub course_label: String,
    /// Registered assignment type (e.g. `ma1`).
    pub assignment_type: String,
    /// Override for the configured workspace root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_override: Option<PathBuf>,
}

/// Checksum metadata for a written output file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputMeta {
    pub filename: String,
    pub sha256: String,
    pub size_bytes: usize,
}

/// Per-student entry in the run summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentSummary {
    pub student_key: String,
    pub status: SubmissionStatus,
    pub total: f64,
    pub max_total: f64,
}

/// The `run_summary.json` written at run termination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// Schema version for forward compatibility.
    pub schema_version: u32,
    pub run_id: RunId,
    pub course_label: String,
    pub assignment_type: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub students: Vec<StudentSummary>,
    /// Written output files with checksums.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<OutputMeta>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_roundtrip() {
        let id = RunId::new();
        let s = id.to_string();
        let parsed: RunId = s.parse().expect("parse RunId");
        assert_eq!(id, parsed);
    }

    #[test]
    fn grade_result_totals() {
        let scores = vec![
            ScoreRecord::full("ia_name", "Income Analysis", 1.0),
            ScoreRecord::zero("ia_slope_exact", "Income Analysis", 1.0, "IA_SLOPE_WRONG"),
            ScoreRecord::full("cc_date_b17", "Currency Conversion", 0.5),
        ];
        let result = GradeResult::from_scores("Ada_Lovelace", scores, vec![]);

        assert_eq!(result.total, 1.5);
        assert_eq!(result.max_total, 2.5);
        let (awarded, max) = result.tab_subtotal("income analysis");
        assert_eq!(awarded, 1.0);
        assert_eq!(max, 2.0);
    }

    #[test]
    fn score_record_invariant_constructors() {
        let full = ScoreRecord::full("r", "t", 2.0);
        assert_eq!(full.points_awarded, full.points_max);
        assert!(full.feedback_code.is_none());

        let zero = ScoreRecord::zero("r", "t", 2.0, "CODE").with_param("cell", "B4");
        assert_eq!(zero.points_awarded, 0.0);
        assert_eq!(zero.feedback_code.as_deref(), Some("CODE"));
        assert_eq!(zero.feedback_params.len(), 1);
    }

    #[test]
    fn pipeline_state_default_is_idle() {
        let state = PipelineState::default();
        assert_eq!(state.status, RunStatus::Idle);
        assert_eq!(state.progress, 0);
        assert!(state.phase.is_none());
        assert!(state.logs.is_empty());
    }

    #[test]
    fn phase_numbers_are_ordered() {
        let numbers: Vec<u8> = PipelinePhase::ALL.iter().map(|p| p.number()).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn run_summary_serialization() {
        let summary = RunSummary {
            schema_version: CURRENT_SCHEMA_VERSION,
            run_id: RunId::new(),
            course_label: "BUS 101".into(),
            assignment_type: "ma1".into(),
            status: RunStatus::Completed,
            started_at: Utc::now(),
            finished_at: Utc::now(),
            students: vec![StudentSummary {
                student_key: "Ada_Lovelace".into(),
                status: SubmissionStatus::Graded,
                total: 40.0,
                max_total: 43.0,
            }],
            outputs: vec![OutputMeta {
                filename: "Ada_Lovelace_MA1_Grade.wbk".into(),
                sha256: "ab".repeat(32),
                size_bytes: 1024,
            }],
        };

        let json = serde_json::to_string_pretty(&summary).expect("serialize");
        let parsed: RunSummary = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed.schema_version, CURRENT_SCHEMA_VERSION);
        assert_eq!(parsed.students.len(), 1);
        assert_eq!(parsed.students[0].status, SubmissionStatus::Graded);
    }
}
