//! `nodeprep apply` - converge the host

use crate::Context;
use crate::cli::ApplyArgs;
use crate::config::Config;
use crate::progress::RunProgress;
use crate::{recipe, secrets, signal, ui};
use anyhow::{Context as AnyhowContext, Result};
use chrono::{DateTime, Utc};
use colored::Colorize;
use converge::{Engine, EngineOptions, RunReport, Summary};
use hostkit::LocalHost;
use serde::Serialize;
use std::io::IsTerminal;
use std::path::Path;

/// JSON written by `--report`
#[derive(Serialize)]
struct ReportFile<'a> {
    started_at: DateTime<Utc>,
    recipe: &'a str,
    exit_code: i32,
    summary: Summary,
    #[serde(flatten)]
    report: &'a RunReport,
}

pub fn run(ctx: &Context, args: ApplyArgs) -> Result<i32> {
    let config = Config::load(ctx.config.as_deref())?;
    let loaded = recipe::load(args.recipe.recipe.as_deref())?;
    let continue_on_error = args.continue_on_error || config.continue_on_error;
    let strict = args.strict || config.strict;

    if !is_root() {
        ui::warn("Not running as root; most resources will fail with permission errors");
    }

    if !ctx.quiet {
        ui::header(&format!("Applying {}", loaded.source));
        ui::kv("resources", &loaded.plan.len().to_string());
        ui::kv("notifications", &loaded.plan.bus.edges().len().to_string());
        if continue_on_error {
            ui::kv("on failure", "continue");
        }
        println!();
    }

    if !args.yes && std::io::stdin().is_terminal() && !confirm_proceed()? {
        println!();
        println!("  {} Aborted", "✗".red());
        return Ok(0);
    }

    let cancel = signal::install();
    let local = LocalHost::new(
        config.host_options(args.timeout),
        secrets::provider(&config.secrets),
    );
    let engine = Engine::new(local.host())
        .with_options(EngineOptions { continue_on_error })
        .with_cancel(cancel);

    let started_at = Utc::now();
    let mut progress = RunProgress::new(ctx.quiet);
    let report = engine.run(&loaded.plan, &mut progress);
    progress.finish();

    if let Some((id, detail)) = report.first_failure() {
        println!();
        ui::error(&format!("{} failed: {}", id.to_string().bold(), detail));
        ui::dim(detail.category.advice());
    }

    let summary = report.summary();
    if !ctx.quiet {
        ui::print_summary(&summary, report.elapsed, report.cancelled);
    }

    let exit_code = report.exit_code(strict);
    if let Some(path) = &args.report {
        let file = ReportFile {
            started_at,
            recipe: &loaded.source,
            exit_code,
            summary,
            report: &report,
        };
        write_report(path, &file)?;
        if !ctx.quiet {
            ui::dim(&format!("Report written to {}", path.display()));
        }
    }

    Ok(exit_code)
}

fn write_report(path: &Path, file: &ReportFile<'_>) -> Result<()> {
    let json = serde_json::to_string_pretty(file).context("Failed to serialize run report")?;
    std::fs::write(path, json)
        .with_context(|| format!("Could not write report to {}", path.display()))
}

fn is_root() -> bool {
    #[allow(unsafe_code)]
    // SAFETY: geteuid has no preconditions and cannot fail
    let euid = unsafe { libc::geteuid() };
    euid == 0
}

/// Confirm with user
fn confirm_proceed() -> Result<bool> {
    use dialoguer::Confirm;

    let confirmed = Confirm::new()
        .with_prompt("Converge this host?")
        .default(true)
        .interact()?;

    Ok(confirmed)
}
