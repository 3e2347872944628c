//! Measurement Assignment 1: income analysis, unit conversions, and the
//! four-country currency conversion exercise. 45 points across three tabs.

use crate::rules::{RuleKind, RuleSpec, TabRubric};

use super::AssignmentGrader;

// ---------------------------------------------------------------------------
// Income Analysis (11 points)
// ---------------------------------------------------------------------------

const SLOPE_EXACT: &[&str] = &["SLOPE(B19:B26,A19:A26)"];
const SLOPE_ANY_ORDER: &[&str] = &["SLOPE(B19:B26,A19:A26)", "SLOPE(A19:A26,B19:B26)"];
const INTERCEPT_EXACT: &[&str] = &["INTERCEPT(B19:B26,A19:A26)"];
const INTERCEPT_ANY_ORDER: &[&str] = &["INTERCEPT(B19:B26,A19:A26)", "INTERCEPT(A19:A26,B19:B26)"];
const FORECAST_ACCEPTED: &[&str] = &["B30*A28+B31", "A28*B30+B31", "B31+B30*A28", "B31+A28*B30"];

/// The SLOPE and INTERCEPT checks are split into a three-step ladder
/// (function used, right ranges in either order, exact argument order) so
/// partially correct formulas still collect partial credit.
const INCOME_RULES: &[RuleSpec] = &[
    RuleSpec {
        id: "ia_name",
        kind: RuleKind::Presence { cell: "B1", name_like: true },
        points: 1.0,
        score_cell: "B2",
        fail_code: "NAME_NOT_RECOGNIZED",
    },
    RuleSpec {
        id: "ia_slope_used",
        kind: RuleKind::FormulaContains { cell: "B30", fragment: "SLOPE(" },
        points: 1.0,
        score_cell: "B3",
        fail_code: "FORMULA_FRAGMENT_MISSING",
    },
    RuleSpec {
        id: "ia_slope_ranges",
        kind: RuleKind::FormulaPattern { cell: "B30", accepted: SLOPE_ANY_ORDER },
        points: 1.0,
        score_cell: "B4",
        fail_code: "FORMULA_MISMATCH",
    },
    RuleSpec {
        id: "ia_slope_exact",
        kind: RuleKind::FormulaPattern { cell: "B30", accepted: SLOPE_EXACT },
        points: 1.0,
        score_cell: "B5",
        fail_code: "FORMULA_MISMATCH",
    },
    RuleSpec {
        id: "ia_intercept_used",
        kind: RuleKind::FormulaContains { cell: "B31", fragment: "INTERCEPT(" },
        points: 1.0,
        score_cell: "B6",
        fail_code: "FORMULA_FRAGMENT_MISSING",
    },
    RuleSpec {
        id: "ia_intercept_ranges",
        kind: RuleKind::FormulaPattern { cell: "B31", accepted: INTERCEPT_ANY_ORDER },
        points: 1.0,
        score_cell: "B7",
        fail_code: "FORMULA_MISMATCH",
    },
    RuleSpec {
        id: "ia_intercept_exact",
        kind: RuleKind::FormulaPattern { cell: "B31", accepted: INTERCEPT_EXACT },
        points: 1.0,
        score_cell: "B8",
        fail_code: "FORMULA_MISMATCH",
    },
    RuleSpec {
        id: "ia_forecast",
        kind: RuleKind::FormulaPattern { cell: "B32", accepted: FORECAST_ACCEPTED },
        points: 2.0,
        score_cell: "B9",
        fail_code: "FORMULA_MISMATCH",
    },
    // The BLS scatterplot. Title/trendline introspection is not carried by
    // the workbook container, so presence is the scored signal.
    RuleSpec {
        id: "ia_scatterplot",
        kind: RuleKind::ChartPresent { min_count: 1 },
        points: 2.0,
        score_cell: "B10",
        fail_code: "CHART_MISSING",
    },
];

// ---------------------------------------------------------------------------
// Unit Conversions (7 points)
// ---------------------------------------------------------------------------

const RATE_ACCEPTED: &[&str] = &["B4*1000/24", "1000*B4/24", "B4/24*1000", "(B4*1000)/24"];
const TEMP_ACCEPTED: &[&str] = &["(5/9)*(A8-32)"];

const UNIT_RULES: &[RuleSpec] = &[
    RuleSpec {
        id: "uc_dose_per_day",
        kind: RuleKind::UnitText { cell: "B5", accepted: &["mg/d"] },
        points: 1.0,
        score_cell: "B2",
        fail_code: "UNIT_TEXT_MISMATCH",
    },
    RuleSpec {
        id: "uc_dose_per_hour",
        kind: RuleKind::UnitText { cell: "B6", accepted: &["mcg/h"] },
        points: 1.0,
        score_cell: "B3",
        fail_code: "UNIT_TEXT_MISMATCH",
    },
    RuleSpec {
        id: "uc_rate_formula",
        kind: RuleKind::FormulaPattern { cell: "B7", accepted: RATE_ACCEPTED },
        points: 2.0,
        score_cell: "B4",
        fail_code: "FORMULA_MISMATCH",
    },
    RuleSpec {
        id: "uc_temp_formula",
        kind: RuleKind::TempFormula { cell: "B8", accepted: TEMP_ACCEPTED },
        points: 2.0,
        score_cell: "B5",
        fail_code: "TEMP_FORMULA_MISMATCH",
    },
    RuleSpec {
        id: "uc_hours_per_day",
        kind: RuleKind::UnitText { cell: "B9", accepted: &["h/d"] },
        points: 1.0,
        score_cell: "B6",
        fail_code: "UNIT_TEXT_MISMATCH",
    },
];

// ---------------------------------------------------------------------------
// Currency Conversion (27 points)
// ---------------------------------------------------------------------------

// Columns B through E each hold one country block: name row 16, quote date
// row 17, currency code row 18, live rate row 19, budget conversion row 20,
// inverse conversion row 21.

const CC_CONVERT_B: &[&str] = &["B4*B19", "B19*B4"];
const CC_CONVERT_C: &[&str] = &["B4*C19", "C19*B4"];
const CC_CONVERT_D: &[&str] = &["B4*D19", "D19*B4"];
const CC_CONVERT_E: &[&str] = &["B4*E19", "E19*B4"];

const CC_INVERSE_B: &[&str] = &["B5/B19"];
const CC_INVERSE_C: &[&str] = &["B5/C19"];
const CC_INVERSE_D: &[&str] = &["B5/D19"];
const CC_INVERSE_E: &[&str] = &["B5/E19"];

const CURRENCY_RULES: &[RuleSpec] = &[
    RuleSpec {
        id: "cc_name",
        kind: RuleKind::Presence { cell: "B15", name_like: true },
        points: 1.0,
        score_cell: "B2",
        fail_code: "NAME_NOT_RECOGNIZED",
    },
    RuleSpec {
        id: "cc_country_b",
        kind: RuleKind::CountryValid { cell: "B16" },
        points: 1.0,
        score_cell: "B3",
        fail_code: "COUNTRY_NOT_APPROVED",
    },
    RuleSpec {
        id: "cc_country_c",
        kind: RuleKind::CountryValid { cell: "C16" },
        points: 1.0,
        score_cell: "B4",
        fail_code: "COUNTRY_NOT_APPROVED",
    },
    RuleSpec {
        id: "cc_country_d",
        kind: RuleKind::CountryValid { cell: "D16" },
        points: 1.0,
        score_cell: "B5",
        fail_code: "COUNTRY_NOT_APPROVED",
    },
    RuleSpec {
        id: "cc_country_e",
        kind: RuleKind::CountryValid { cell: "E16" },
        points: 1.0,
        score_cell: "B6",
        fail_code: "COUNTRY_NOT_APPROVED",
    },
    RuleSpec {
        id: "cc_date_b",
        kind: RuleKind::DateWithin { cell: "B17" },
        points: 0.5,
        score_cell: "B7",
        fail_code: "DATE_TOO_OLD",
    },
    RuleSpec {
        id: "cc_date_c",
        kind: RuleKind::DateWithin { cell: "C17" },
        points: 0.5,
        score_cell: "B8",
        fail_code: "DATE_TOO_OLD",
    },
    RuleSpec {
        id: "cc_date_d",
        kind: RuleKind::DateWithin { cell: "D17" },
        points: 0.5,
        score_cell: "B9",
        fail_code: "DATE_TOO_OLD",
    },
    RuleSpec {
        id: "cc_date_e",
        kind: RuleKind::DateWithin { cell: "E17" },
        points: 0.5,
        score_cell: "B10",
        fail_code: "DATE_TOO_OLD",
    },
    RuleSpec {
        id: "cc_code_b",
        kind: RuleKind::CurrencyCodeMatches { cell: "B18", country_cell: "B16" },
        points: 1.0,
        score_cell: "B11",
        fail_code: "CODE_MISMATCH",
    },
    RuleSpec {
        id: "cc_code_c",
        kind: RuleKind::CurrencyCodeMatches { cell: "C18", country_cell: "C16" },
        points: 1.0,
        score_cell: "B12",
        fail_code: "CODE_MISMATCH",
    },
    RuleSpec {
        id: "cc_code_d",
        kind: RuleKind::CurrencyCodeMatches { cell: "D18", country_cell: "D16" },
        points: 1.0,
        score_cell: "B13",
        fail_code: "CODE_MISMATCH",
    },
    RuleSpec {
        id: "cc_code_e",
        kind: RuleKind::CurrencyCodeMatches { cell: "E18", country_cell: "E16" },
        points: 1.0,
        score_cell: "B14",
        fail_code: "CODE_MISMATCH",
    },
    RuleSpec {
        id: "cc_rate_b",
        kind: RuleKind::RateWithin { cell: "B19", code_cell: "B18", tolerance_pct: 5.0 },
        points: 1.0,
        score_cell: "B15",
        fail_code: "RATE_OUT_OF_RANGE",
    },
    RuleSpec {
        id: "cc_rate_c",
        kind: RuleKind::RateWithin { cell: "C19", code_cell: "C18", tolerance_pct: 5.0 },
        points: 1.0,
        score_cell: "B16",
        fail_code: "RATE_OUT_OF_RANGE",
    },
    RuleSpec {
        id: "cc_rate_d",
        kind: RuleKind::RateWithin { cell: "D19", code_cell: "D18", tolerance_pct: 5.0 },
        points: 1.0,
        score_cell: "B17",
        fail_code: "RATE_OUT_OF_RANGE",
    },
    RuleSpec {
        id: "cc_rate_e",
        kind: RuleKind::RateWithin { cell: "E19", code_cell: "E18", tolerance_pct: 5.0 },
        points: 1.0,
        score_cell: "B18",
        fail_code: "RATE_OUT_OF_RANGE",
    },
    RuleSpec {
        id: "cc_convert_b",
        kind: RuleKind::FormulaPattern { cell: "B20", accepted: CC_CONVERT_B },
        points: 2.0,
        score_cell: "B19",
        fail_code: "FORMULA_MISMATCH",
    },
    RuleSpec {
        id: "cc_convert_c",
        kind: RuleKind::FormulaPattern { cell: "C20", accepted: CC_CONVERT_C },
        points: 2.0,
        score_cell: "B20",
        fail_code: "FORMULA_MISMATCH",
    },
    RuleSpec {
        id: "cc_convert_d",
        kind: RuleKind::FormulaPattern { cell: "D20", accepted: CC_CONVERT_D },
        points: 2.0,
        score_cell: "B21",
        fail_code: "FORMULA_MISMATCH",
    },
    RuleSpec {
        id: "cc_convert_e",
        kind: RuleKind::FormulaPattern { cell: "E20", accepted: CC_CONVERT_E },
        points: 2.0,
        score_cell: "B22",
        fail_code: "FORMULA_MISMATCH",
    },
    RuleSpec {
        id: "cc_inverse_b",
        kind: RuleKind::FormulaPattern { cell: "B21", accepted: CC_INVERSE_B },
        points: 1.0,
        score_cell: "B23",
        fail_code: "FORMULA_MISMATCH",
    },
    RuleSpec {
        id: "cc_inverse_c",
        kind: RuleKind::FormulaPattern { cell: "C21", accepted: CC_INVERSE_C },
        points: 1.0,
        score_cell: "B24",
        fail_code: "FORMULA_MISMATCH",
    },
    RuleSpec {
        id: "cc_inverse_d",
        kind: RuleKind::FormulaPattern { cell: "D21", accepted: CC_INVERSE_D },
        points: 1.0,
        score_cell: "B25",
        fail_code: "FORMULA_MISMATCH",
    },
    RuleSpec {
        id: "cc_inverse_e",
        kind: RuleKind::FormulaPattern { cell: "E21", accepted: CC_INVERSE_E },
        points: 1.0,
        score_cell: "B26",
        fail_code: "FORMULA_MISMATCH",
    },
];

const TABS: &[TabRubric] = &[
    TabRubric { tab: "Income Analysis", rules: INCOME_RULES },
    TabRubric { tab: "Unit Conversions", rules: UNIT_RULES },
    TabRubric { tab: "Currency Conversion", rules: CURRENCY_RULES },
];

pub struct Ma1Grader;

impl AssignmentGrader for Ma1Grader {
    fn assignment_type(&self) -> &'static str {
        "ma1"
    }

    fn display_name(&self) -> &'static str {
        "Measurement Assignment 1"
    }

    fn tabs(&self) -> &'static [TabRubric] {
        TABS
    }
}
