//! Shared types, error model, and configuration for SheetGrader.
//!
//! This crate is the foundation depended on by all other SheetGrader crates.
//! It provides:
//! - [`SheetGraderError`] — the unified error type
//! - Domain types ([`Submission`], [`ScoreRecord`], [`GradeResult`], [`PipelineState`])
//! - Configuration ([`AppConfig`], [`RunConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, RatesConfig, RunConfig, config_dir, config_file_path,
    expand_tilde, init_config, load_config, load_config_from,
};
pub use error::{Result, SheetGraderError};
pub use types::{
    CURRENT_SCHEMA_VERSION, GradeResult, OutputMeta, PHASE_COUNT, PipelinePhase, PipelineState,
    RunId, RunRequest, RunStatus, RunSummary, ScoreRecord, StudentSummary, Submission,
    SubmissionStatus,
};
