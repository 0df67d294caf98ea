use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use sheetfill_core::config::{SheetfillConfig, application_base_dir};
use sheetfill_core::{DispatchOutcome, Dispatcher, PipelineOutcome, logging};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

/// Exit code for rejected input (missing file, bad option, ...)
const EXIT_REJECTED: u8 = 2;

#[derive(Parser)]
#[command(name = "sheetfill")]
#[command(about = "Fill a worksheet range with a numeric sequence and save a modified copy", long_about = None)]
#[command(version, arg_required_else_help = true)]
struct Cli {
    /// The Excel file to read
    #[arg(long, value_name = "FILE")]
    file: Option<PathBuf>,

    /// Worksheet to process; must be one of the recognized options
    #[arg(long, value_name = "OPTION")]
    option: Option<String>,

    /// Path to configuration file (TOML)
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let base_dir = application_base_dir();
    let config = SheetfillConfig::load(cli.config.as_deref(), &base_dir)
        .context("Failed to load configuration")?;

    let mut log_context = logging::configure(&base_dir, &config.logging, Local::now());
    let _guard = log_context.install();
    info!("Application [sheetfill] Start");

    let dispatcher = Dispatcher::from_config(&config);
    let outcome = dispatcher
        .dispatch(cli.file.as_deref(), cli.option.as_deref())
        .context("Workbook processing failed")?;

    let code = match outcome {
        DispatchOutcome::Completed(PipelineOutcome::Saved { output, .. }) => {
            info!("Done: {}", output.display());
            ExitCode::SUCCESS
        }
        DispatchOutcome::Completed(_) => ExitCode::SUCCESS,
        DispatchOutcome::Rejected(_) => ExitCode::from(EXIT_REJECTED),
    };

    Ok(code)
}
