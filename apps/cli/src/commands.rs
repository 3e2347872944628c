//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use sheetgrader_core::Pipeline;
use sheetgrader_rubric::GraderRegistry;
use sheetgrader_shared::{
    AppConfig, RunConfig, RunRequest, RunStatus, RunSummary, init_config, load_config,
};
use tracing::info;

/// How often the run loop re-reads the pipeline state snapshot.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// SheetGrader — grade spreadsheet homework batches.
#[derive(Parser)]
#[command(
    name = "sheetgrader",
    version,
    about = "Grade batches of spreadsheet homework submissions against assignment rubrics.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Grade a submission archive.
    Grade {
        /// Zip archive of per-student submission folders.
        archive: PathBuf,

        /// Course label; names the workspace and output files.
        #[arg(short, long)]
        course: String,

        /// Assignment type (see `sheetgrader assignments`).
        #[arg(short, long)]
        assignment: String,

        /// Workspace root (overrides the configured default).
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        /// Worker pool size for per-student phases.
        #[arg(long)]
        concurrency: Option<u32>,
    },

    /// List registered assignment types and their rubrics.
    Assignments,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "sheetgrader=info",
        1 => "sheetgrader=debug",
        _ => "sheetgrader=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Grade {
            archive,
            course,
            assignment,
            workspace,
            concurrency,
        } => cmd_grade(archive, course, assignment, workspace, concurrency).await,
        Command::Assignments => cmd_assignments().await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// grade
// ---------------------------------------------------------------------------

async fn cmd_grade(
    archive: PathBuf,
    course: String,
    assignment: String,
    workspace: Option<PathBuf>,
    concurrency: Option<u32>,
) -> Result<()> {
    let app_config = load_config()?;
    let mut run_config = RunConfig::from(&app_config);
    if let Some(n) = concurrency {
        run_config.concurrency = n.max(1);
    }

    info!(
        archive = %archive.display(),
        course,
        assignment,
        "starting grading run"
    );

    let pipeline = Pipeline::new(run_config);
    pipeline.start(RunRequest {
        archive_path: archive,
        course_label: course.clone(),
        assignment_type: assignment.clone(),
        workspace_override: workspace,
    })?;

    let spinner = run_spinner();
    let mut seen = 0usize;
    let state = loop {
        let state = pipeline.snapshot();
        for line in &state.logs[seen..] {
            spinner.println(format!("  {line}"));
        }
        seen = state.logs.len();
        if let Some(phase) = state.phase {
            spinner.set_message(format!("[{}/8] {}", phase.number(), phase.title()));
        }
        if state.status.is_terminal() {
            break state;
        }

        // Ctrl-C requests cooperative cancellation; the run finishes the
        // student in flight and stops at the next boundary.
        tokio::select! {
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
            _ = tokio::signal::ctrl_c() => {
                spinner.set_message("cancelling...");
                pipeline.cancel();
            }
        }
    };
    pipeline.wait().await;
    spinner.finish_and_clear();

    println!();
    println!("  Run {}", state.status);
    println!("  Course:     {course}");
    println!("  Assignment: {assignment}");
    if let Some(path) = &state.output_path {
        println!("  Output:     {}", path.display());
        print_roster(path);
    }
    println!();

    match state.status {
        RunStatus::Error => Err(eyre!(
            "grading run failed: {}",
            state.error.as_deref().unwrap_or("unknown error")
        )),
        _ => Ok(()),
    }
}

fn run_spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap()
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}

/// Print per-student totals from the run summary, when one was written.
fn print_roster(course_root: &std::path::Path) {
    let summary_path = course_root.join("run_summary.json");
    let Ok(content) = std::fs::read_to_string(&summary_path) else {
        return;
    };
    let Ok(summary) = serde_json::from_str::<RunSummary>(&content) else {
        return;
    };

    println!();
    for student in &summary.students {
        println!(
            "  {:<30} {:>6}/{:<6} {}",
            student.student_key, student.total, student.max_total, student.status
        );
    }
}

// ---------------------------------------------------------------------------
// assignments
// ---------------------------------------------------------------------------

async fn cmd_assignments() -> Result<()> {
    let registry = GraderRegistry::new();
    for grader in registry.iter() {
        println!(
            "{}  {} ({} points)",
            grader.assignment_type(),
            grader.display_name(),
            grader.max_total()
        );
        for tab in grader.tabs() {
            println!(
                "      {} — {} rules, {} points",
                tab.tab,
                tab.rules.len(),
                tab.max_points()
            );
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
