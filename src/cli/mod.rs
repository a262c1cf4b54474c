//! Command-line interface for actionkit.
//!
//! Provides commands for inspecting the retry reporting gate and the
//! resolved configuration, and for running the sample actions directly or
//! through the inline job backend.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;

use crate::config::{self, Settings};
use crate::core::{should_report, ReportContext};
use crate::domain::{ActionError, ReportMode};
use crate::jobs::{InlineBackend, JobBackend, RetryPolicy};

pub mod demo;

/// actionkit - Contract-checked units of work with a fixed execution pipeline
#[derive(Parser, Debug)]
#[command(name = "actionkit")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Decide whether an exception on a given attempt would be reported
    Gate {
        /// Reporting mode (defaults to the configured one)
        #[arg(short, long)]
        mode: Option<ReportMode>,

        /// 1-indexed delivery attempt
        #[arg(short, long)]
        attempt: u32,

        /// Retries allowed after the first attempt
        #[arg(long)]
        max_retries: u32,
    },

    /// Show resolved configuration (debug)
    Config,

    /// Run the sample greeting action
    Greet {
        /// Who to greet
        #[arg(short, long)]
        name: Option<String>,

        /// Fail with this message instead of greeting
        #[arg(long)]
        fail: Option<String>,
    },

    /// Run a flaky sample action through the inline job backend
    Job {
        /// Number of attempts that raise before the action succeeds
        #[arg(long, default_value = "1")]
        fail_times: u32,

        /// Retries allowed after the first attempt
        #[arg(long, default_value = "3")]
        max_retries: u32,

        /// Reporting mode for this run
        #[arg(short, long)]
        mode: Option<ReportMode>,
    },
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Gate {
                mode,
                attempt,
                max_retries,
            } => show_gate(mode, attempt, max_retries),
            Commands::Config => show_config(),
            Commands::Greet { name, fail } => greet(name, fail),
            Commands::Job {
                fail_times,
                max_retries,
                mode,
            } => run_job(fail_times, max_retries, mode).await,
        }
    }
}

/// Print the reporting decision for one attempt
fn show_gate(mode: Option<ReportMode>, attempt: u32, max_retries: u32) -> Result<()> {
    if attempt == 0 {
        anyhow::bail!("Attempt numbers start at 1");
    }

    let default_mode = config::settings().default_report_mode;
    let effective = mode.unwrap_or(default_mode);
    let decision = should_report(mode, attempt, max_retries, default_mode);

    println!("Mode:        {}", effective);
    println!("Attempt:     {} of {}", attempt, max_retries + 1);
    println!("Decision:    {}", if decision { "report" } else { "suppress" });

    Ok(())
}

/// Show resolved configuration
fn show_config() -> Result<()> {
    let settings = config::load()?;

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("  actionkit Configuration");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
    println!(
        "Config file: {}",
        settings
            .config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!(
        "Version:     {}",
        settings.config_version.as_deref().unwrap_or("(unversioned)")
    );
    println!();
    println!("Reporting:");
    println!("  Default mode: {}", settings.default_report_mode);
    println!();
    println!("Log levels:");
    println!("  Call:      {}", settings.log.call);
    println!("  Success:   {}", settings.log.success);
    println!("  Failure:   {}", settings.log.failure);
    println!("  Exception: {}", settings.log.exception);

    Ok(())
}

/// Run the greeting action and print its summary
fn greet(name: Option<String>, fail: Option<String>) -> Result<()> {
    let action = demo::greet_action()?;

    let mut inputs = HashMap::new();
    if let Some(name) = name {
        inputs.insert("name".to_string(), Value::String(name));
    }
    if let Some(fail) = fail {
        inputs.insert("fail".to_string(), Value::String(fail));
    }

    let result = action.run(inputs);
    let summary =
        serde_json::to_string_pretty(&result.summary()).context("Failed to render result")?;
    println!("{}", summary);

    Ok(())
}

/// Run the flaky action as a job and print what each attempt reported
async fn run_job(fail_times: u32, max_retries: u32, mode: Option<ReportMode>) -> Result<()> {
    let action = demo::flaky_action(fail_times)?;

    let mut settings: Settings = (*config::settings()).clone();
    if let Some(mode) = mode {
        settings = settings.with_default_report_mode(mode);
    }
    let settings = settings.with_reporter(
        |error: &ActionError, ctx: &ReportContext<'_>| -> anyhow::Result<()> {
            let attempt = ctx.retry.map(|r| r.attempt()).unwrap_or(1);
            eprintln!("  [reporter] {} attempt {}: {}", ctx.action, attempt, error);
            Ok(())
        },
    );

    let backend = InlineBackend::new(RetryPolicy::immediate(max_retries))
        .with_settings(Arc::new(settings));
    let report = backend.perform(&action, HashMap::new()).await;

    println!("Job ID:   {}", report.job_id);
    println!("Backend:  {}", backend.name());
    println!();
    println!("{:<10} {:<12} {:<10}", "ATTEMPT", "OUTCOME", "REPORTED");
    println!("{}", "-".repeat(34));
    for attempt in &report.attempts {
        println!(
            "{:<10} {:<12} {:<10}",
            attempt.attempt,
            attempt.outcome.as_str(),
            if attempt.reported { "yes" } else { "no" }
        );
    }
    println!();
    println!("Final: {}", report.result.message());

    Ok(())
}
