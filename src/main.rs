use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod artifacts;
mod cli;
mod config;
mod error;
mod pipeline;
mod protocol;
mod report;
mod runner;

use crate::artifacts::ArtifactStore;
use crate::cli::Args;
use crate::config::{load_config, PipelineConfig};
use crate::pipeline::{Pipeline, PlanningInstance, RunOptions};
use crate::report::write_report;
use crate::runner::ProcessRunner;

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(err) => {
            println!("error: {err:#}");
            ExitCode::from(1)
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Returns whether the pipeline produced an optimized plan.
fn run(args: &Args) -> Result<bool> {
    println!("Domain file:  {}", args.domain.display());
    println!("Problem file: {}", args.problem.display());
    println!("Plan file:    {}", args.plan.display());
    println!("Encoder:      {}", args.encoder);
    println!("Verbose:      {}", args.verbose);

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => PipelineConfig::default(),
    };
    let echo = !args.quiet;
    let instance = PlanningInstance::new(
        args.domain.clone(),
        args.problem.clone(),
        args.plan.clone(),
    );
    let options = RunOptions {
        encoder: args.encoder.clone(),
        verbose: args.verbose,
        echo,
    };
    let mut pipeline = Pipeline::new(
        config,
        ArtifactStore::new(args.work_dir.clone()),
        instance,
        options,
        ProcessRunner::new(echo),
    );

    let succeeded = match pipeline.run() {
        Ok(plan) => {
            println!("Optimised plan written to {}", plan.display());
            true
        }
        Err(err) => {
            println!("{}", err.user_message());
            false
        }
    };

    // The report is a side channel; it never changes the exit status.
    if let Some(path) = &args.report {
        match write_report(path, pipeline.report()) {
            Ok(()) if echo => println!("Wrote run report to {}", path.display()),
            Ok(()) => {}
            Err(err) => tracing::warn!(error = %format!("{err:#}"), "cannot write run report"),
        }
    }
    Ok(succeeded)
}
