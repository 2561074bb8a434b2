use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use std::path::PathBuf;

use upkeep_cli::update;

#[derive(Parser, Debug)]
#[command(name = "upkeep", version)]
#[command(about = "Keeps an application install in sync with its latest release", long_about = None)]
struct Cli {
    /// Only check whether a newer release exists
    #[arg(long)]
    check: bool,

    /// Apply the update without asking
    #[arg(short = 'y', long)]
    yes: bool,

    /// Installation root (defaults to the current directory)
    #[arg(long, value_name = "PATH")]
    install_dir: Option<PathBuf>,

    /// Diagnostic log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "warn", value_name = "LEVEL")]
    log_level: String,

    /// Continuation mode used by the relaunched copy; not for direct use
    #[arg(long = "update-self", hide = true, num_args = 2, value_names = ["PID", "LEVEL"])]
    update_self: Option<Vec<String>>,
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(&cli) {
        eprintln!("{} {:#}", "✗".red(), e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let install_root = match &cli.install_dir {
        Some(path) => path.clone(),
        None => std::env::current_dir().context("Failed to resolve installation root")?,
    };

    if let Some(handoff) = &cli.update_self {
        let (parent_pid, level) = parse_handoff(handoff)?;
        init_tracing(&level);
        return update::run_continuation(install_root, parent_pid);
    }

    init_tracing(&cli.log_level);
    update::run_original(
        install_root,
        &update::Options {
            check_only: cli.check,
            assume_yes: cli.yes,
            verbosity: cli.log_level.clone(),
        },
    )
}

fn parse_handoff(values: &[String]) -> Result<(u32, String)> {
    let pid = values
        .first()
        .context("missing parent pid in --update-self")?
        .parse::<u32>()
        .context("invalid parent pid in --update-self")?;
    let level = values.get(1).cloned().unwrap_or_else(|| "warn".to_string());
    Ok((pid, level))
}

fn init_tracing(level: &str) {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .init();
}
