use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::error;

use dining_philosophers::{config::Cli, signal::SignalWatcher, Config, Dinner};

fn init_tracing(quiet: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let default = if quiet { "warn" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_names(true),
        )
        .init();
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let (config, notices) = Config::from_cli(&cli);
    for notice in &notices {
        println!("{notice}");
    }

    let dinner = Dinner::new(config).context("failed to set the table")?;
    let watcher =
        SignalWatcher::spawn(dinner.monitor()).context("failed to install signal handlers")?;

    let report = dinner.serve(|n| println!("{n} philosopher(s) came in for a dinner."));
    let interrupted = watcher.stop();
    let report = report.context("dinner ended abnormally")?;

    if interrupted || report.cancelled {
        let left = report.outcomes.iter().filter(|o| !o.cancelled).count();
        eprintln!("main(): dinner was interrupted");
        eprintln!(
            "{left} of {} philosopher(s) finished, {} meal(s) served.",
            report.outcomes.len(),
            report.meals
        );
        return Ok(ExitCode::FAILURE);
    }

    println!("All philosophers have left. System terminates normally.");
    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.quiet);

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "fatal");
            eprintln!("main(): {e:#}");
            ExitCode::FAILURE
        }
    }
}
