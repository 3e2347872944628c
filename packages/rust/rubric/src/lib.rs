//! Assignment rubrics and the rule engine that scores workbook snapshots.
//!
//! Each assignment type contributes a static rubric (tabs of [`RuleSpec`]s)
//! behind the [`AssignmentGrader`] trait; the [`GraderRegistry`] resolves a
//! type key like `ma1` to its grader. Rule evaluation is pure and total:
//! a workbook snapshot plus a [`GradeContext`] in, score records out.

pub mod graders;
pub mod rules;

pub use graders::{AssignmentGrader, GraderRegistry, Ma1Grader, Ma3Grader};
pub use rules::{GradeContext, RuleKind, RuleSpec, TabRubric, codes, evaluate, validate_tabs};
