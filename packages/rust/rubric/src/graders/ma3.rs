//! Measurement Assignment 3: before/after analysis statistics and the
//! energy-use visualization tab. 21 points across two tabs.

use crate::rules::{RuleKind, RuleSpec, TabRubric};

use super::AssignmentGrader;

// ---------------------------------------------------------------------------
// Analysis (14 points)
// ---------------------------------------------------------------------------

const STDEV_ACCEPTED: &[&str] = &["STDEV.S(D14:D18)", "STDEV(D14:D18)"];
const PERCENTILE_ACCEPTED: &[&str] = &["PERCENTILE.INC(D14:D18,0.9)", "PERCENTILE(D14:D18,0.9)"];

const ANALYSIS_RULES: &[RuleSpec] = &[
    RuleSpec {
        id: "an_name",
        kind: RuleKind::Presence { cell: "B10", name_like: true },
        points: 1.0,
        score_cell: "B2",
        fail_code: "NAME_NOT_RECOGNIZED",
    },
    RuleSpec {
        id: "an_diff_d14",
        kind: RuleKind::FormulaPattern { cell: "D14", accepted: &["C14-B14"] },
        points: 1.0,
        score_cell: "B3",
        fail_code: "FORMULA_MISMATCH",
    },
    RuleSpec {
        id: "an_diff_d15",
        kind: RuleKind::FormulaPattern { cell: "D15", accepted: &["C15-B15"] },
        points: 1.0,
        score_cell: "B4",
        fail_code: "FORMULA_MISMATCH",
    },
    RuleSpec {
        id: "an_diff_d16",
        kind: RuleKind::FormulaPattern { cell: "D16", accepted: &["C16-B16"] },
        points: 1.0,
        score_cell: "B5",
        fail_code: "FORMULA_MISMATCH",
    },
    RuleSpec {
        id: "an_diff_d17",
        kind: RuleKind::FormulaPattern { cell: "D17", accepted: &["C17-B17"] },
        points: 1.0,
        score_cell: "B6",
        fail_code: "FORMULA_MISMATCH",
    },
    RuleSpec {
        id: "an_diff_d18",
        kind: RuleKind::FormulaPattern { cell: "D18", accepted: &["C18-B18"] },
        points: 1.0,
        score_cell: "B7",
        fail_code: "FORMULA_MISMATCH",
    },
    RuleSpec {
        id: "an_average",
        kind: RuleKind::FormulaPattern { cell: "G18", accepted: &["AVERAGE(D14:D18)"] },
        points: 2.0,
        score_cell: "B8",
        fail_code: "FORMULA_MISMATCH",
    },
    RuleSpec {
        id: "an_median",
        kind: RuleKind::FormulaPattern { cell: "G19", accepted: &["MEDIAN(D14:D18)"] },
        points: 2.0,
        score_cell: "B9",
        fail_code: "FORMULA_MISMATCH",
    },
    RuleSpec {
        id: "an_stdev",
        kind: RuleKind::FormulaPattern { cell: "G20", accepted: STDEV_ACCEPTED },
        points: 2.0,
        score_cell: "B10",
        fail_code: "FORMULA_MISMATCH",
    },
    RuleSpec {
        id: "an_percentile",
        kind: RuleKind::FormulaPattern { cell: "G22", accepted: PERCENTILE_ACCEPTED },
        points: 2.0,
        score_cell: "B11",
        fail_code: "FORMULA_MISMATCH",
    },
];

// ---------------------------------------------------------------------------
// Visualization (7 points)
// ---------------------------------------------------------------------------

// Bin table for the histogram: min, max, and width of the difference data.
// The width divisor is the bin count, 10 or 11 depending on rounding choice.
const BIN_MIN_ACCEPTED: &[&str] = &["MIN(B12:B61)", "MIN(B14:B61)"];
const BIN_MAX_ACCEPTED: &[&str] = &["MAX(B12:B61)", "MAX(B14:B61)"];
const BIN_WIDTH_ACCEPTED: &[&str] = &["(E23-E22)/10", "(E23-E22)/11"];

const VIZ_RULES: &[RuleSpec] = &[
    RuleSpec {
        id: "vz_title",
        kind: RuleKind::Presence { cell: "B2", name_like: false },
        points: 1.0,
        score_cell: "B2",
        fail_code: "CELL_BLANK",
    },
    RuleSpec {
        id: "vz_unit",
        kind: RuleKind::UnitText { cell: "B4", accepted: &["kwh/d"] },
        points: 1.0,
        score_cell: "B3",
        fail_code: "UNIT_TEXT_MISMATCH",
    },
    RuleSpec {
        id: "vz_chart",
        kind: RuleKind::ChartPresent { min_count: 1 },
        points: 2.0,
        score_cell: "B4",
        fail_code: "CHART_MISSING",
    },
    RuleSpec {
        id: "vz_bin_min",
        kind: RuleKind::FormulaPattern { cell: "E22", accepted: BIN_MIN_ACCEPTED },
        points: 1.0,
        score_cell: "B5",
        fail_code: "FORMULA_MISMATCH",
    },
    RuleSpec {
        id: "vz_bin_max",
        kind: RuleKind::FormulaPattern { cell: "E23", accepted: BIN_MAX_ACCEPTED },
        points: 1.0,
        score_cell: "B6",
        fail_code: "FORMULA_MISMATCH",
    },
    RuleSpec {
        id: "vz_bin_width",
        kind: RuleKind::FormulaPattern { cell: "E24", accepted: BIN_WIDTH_ACCEPTED },
        points: 1.0,
        score_cell: "B7",
        fail_code: "FORMULA_MISMATCH",
    },
];

const TABS: &[TabRubric] = &[
    TabRubric { tab: "Analysis", rules: ANALYSIS_RULES },
    TabRubric { tab: "Visualization", rules: VIZ_RULES },
];

pub struct Ma3Grader;

impl AssignmentGrader for Ma3Grader {
    fn assignment_type(&self) -> &'static str {
        "ma3"
    }

    fn display_name(&self) -> &'static str {
        "Measurement Assignment 3"
    }

    fn tabs(&self) -> &'static [TabRubric] {
        TABS
    }
}
