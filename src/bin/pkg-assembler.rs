use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use pkg_assembler::config::CONFIG_FILENAME;
use pkg_assembler::report::{report_path, write_report, BuildReport};
use pkg_assembler::{BuildContext, BuildError, PackageConfig, Pipeline, SystemRunner};
use time::OffsetDateTime;
use tracing_subscriber::EnvFilter;

/// Build the Debian package for the daemon in the current directory.
#[derive(Parser)]
#[command(name = "pkg-assembler", version)]
struct Cli {
    /// Path to pkg-assembler.toml (default: <work-dir>/pkg-assembler.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory all relative paths are resolved against
    #[arg(long, default_value = ".")]
    work_dir: PathBuf,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let outcome = run(&cli);
    if let Err(err) = &outcome {
        eprintln!("{}", failure_message(err));
    }
    ExitCode::from(exit_status(&outcome))
}

/// 0 on success, 1 on any failure.
fn exit_status(outcome: &Result<()>) -> u8 {
    match outcome {
        Ok(()) => 0,
        Err(_) => 1,
    }
}

/// One line naming the stage and error, then the failing tool's output.
fn failure_message(err: &anyhow::Error) -> String {
    let Some(build) = err.downcast_ref::<BuildError>() else {
        return format!("error: {err:#}");
    };
    let mut message = format!("error: {}", build.describe());
    if let Some(output) = build.captured_output() {
        message.push('\n');
        message.push_str(output.trim_end());
    }
    message
}

fn run(cli: &Cli) -> Result<()> {
    let work_dir = absolute(&cli.work_dir)?;
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| work_dir.join(CONFIG_FILENAME));

    let mut config = PackageConfig::load(&config_path)?;
    config.apply_env_overrides();

    let started_at = OffsetDateTime::now_utc();
    let mut ctx = BuildContext::new(config, &work_dir);
    let outcome = Pipeline::standard().run(&mut ctx, &SystemRunner);

    let path = report_path(&ctx.output_dir);
    let report = BuildReport::from_run(&ctx, &outcome, started_at)
        .and_then(|report| write_report(&path, &report));
    if let Err(err) = report {
        if outcome.is_ok() {
            return Err(err.context("writing build report"));
        }
        tracing::warn!("failed to write build report: {err:#}");
    }

    outcome?;
    if let Some(package) = &ctx.package_file {
        println!("{}", package.display());
    }
    Ok(())
}

fn absolute(dir: &Path) -> Result<PathBuf> {
    if dir.is_absolute() {
        return Ok(dir.to_path_buf());
    }
    let cwd = std::env::current_dir().context("reading current directory")?;
    Ok(cwd.join(dir))
}
