//! Core pipeline orchestration for SheetGrader.
//!
//! This crate drives a grading run end to end: archive extraction, workbook
//! import, rubric grading, chart handling, and output writing, behind the
//! [`Pipeline`] command surface (start/cancel/reset/snapshot).

pub mod extract;
pub mod pipeline;
pub mod state;
pub mod writer;

pub use state::{Pipeline, RunTracker};
pub use writer::CoursePaths;
