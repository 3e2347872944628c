//! Assignment graders and the registry used to resolve them by type.

use sheetgrader_shared::{GradeResult, Result, ScoreRecord, SheetGraderError};
use sheetgrader_workbook::Workbook;
use tracing::warn;

use crate::rules::{self, GradeContext, TabRubric, codes};

mod ma1;
mod ma3;

pub use ma1::Ma1Grader;
pub use ma3::Ma3Grader;

// ---------------------------------------------------------------------------
// Grader trait
// ---------------------------------------------------------------------------

/// One supported assignment type: a static rubric plus identity strings.
/// Graders are stateless; everything per-run arrives through the context.
pub trait AssignmentGrader: Send + Sync {
    /// Short type key used on the command line and in output filenames.
    fn assignment_type(&self) -> &'static str;

    fn display_name(&self) -> &'static str;

    /// Required tabs in rubric order.
    fn tabs(&self) -> &'static [TabRubric];

    /// Grade one workbook snapshot. Never fails: missing tabs forfeit
    /// their points and are reported as warnings on the result.
    fn grade(&self, student_key: &str, workbook: &Workbook, ctx: &GradeContext) -> GradeResult {
        grade_tabs(student_key, self.tabs(), workbook, ctx)
    }

    fn max_total(&self) -> f64 {
        self.tabs().iter().map(TabRubric::max_points).sum()
    }
}

fn grade_tabs(
    student_key: &str,
    tabs: &[TabRubric],
    workbook: &Workbook,
    ctx: &GradeContext,
) -> GradeResult {
    let mut scores = Vec::new();
    let mut warnings = Vec::new();

    for tab in tabs {
        match workbook.sheet(tab.tab) {
            Some(sheet) => {
                for rule in tab.rules {
                    scores.push(rules::evaluate(rule, tab.tab, sheet, ctx));
                }
            }
            None => {
                warn!(tab = tab.tab, student = student_key, "required tab missing");
                warnings.push(format!(
                    "tab '{}' missing, {} points forfeited",
                    tab.tab,
                    tab.max_points()
                ));
                for rule in tab.rules {
                    scores.push(
                        ScoreRecord::zero(rule.id, tab.tab, rule.points, codes::TAB_MISSING)
                            .with_param("tab", tab.tab),
                    );
                }
            }
        }
    }

    GradeResult::from_scores(student_key, scores, warnings)
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// All graders this build knows about.
pub struct GraderRegistry {
    graders: Vec<Box<dyn AssignmentGrader>>,
}

impl GraderRegistry {
    pub fn new() -> Self {
        Self {
            graders: vec![Box::new(Ma1Grader), Box::new(Ma3Grader)],
        }
    }

    /// Resolve a grader by assignment type, case-insensitively.
    pub fn get(&self, assignment_type: &str) -> Result<&dyn AssignmentGrader> {
        let wanted = assignment_type.trim();
        self.graders
            .iter()
            .find(|g| g.assignment_type().eq_ignore_ascii_case(wanted))
            .map(|g| g.as_ref())
            .ok_or_else(|| {
                SheetGraderError::validation(format!(
                    "unknown assignment type {assignment_type:?}"
                ))
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn AssignmentGrader> {
        self.graders.iter().map(|g| g.as_ref())
    }
}

impl Default for GraderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
