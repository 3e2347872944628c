//! SheetGrader CLI — batch grading of spreadsheet homework submissions.
//!
//! Extracts a submission archive, grades each student workbook against the
//! assignment rubric, and writes per-student grade workbooks plus a master
//! roster.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
