//! `nodeprep plan` - dry run against the live host

use crate::Context;
use crate::cli::RecipeArgs;
use crate::config::Config;
use crate::{recipe, secrets, ui};
use anyhow::Result;
use colored::Colorize;
use converge::{FileSystem, PlanEntry, PlanStatus, Properties, Resource};
use hostkit::{LocalFs, LocalHost};
use std::path::Path;

pub fn run(ctx: &Context, args: RecipeArgs) -> Result<i32> {
    let config = Config::load(ctx.config.as_deref())?;
    let loaded = recipe::load(args.recipe.as_deref())?;
    let local = LocalHost::new(config.host_options(None), secrets::provider(&config.secrets));
    let engine = converge::Engine::new(local.host());

    ui::header(&format!("Plan for {}", loaded.source));
    let entries = engine.plan(&loaded.plan);

    let mut changes = 0;
    let mut failures = 0;
    for (entry, resource) in entries.iter().zip(&loaded.plan.resources) {
        match &entry.status {
            PlanStatus::WouldChange(_) => changes += 1,
            PlanStatus::Failed(_) => failures += 1,
            PlanStatus::Converged | PlanStatus::Skipped(_) => {}
        }
        if matches!(entry.status, PlanStatus::Converged) && ctx.verbose == 0 {
            continue;
        }
        for line in entry_lines(entry) {
            println!("{line}");
        }
        if matches!(entry.status, PlanStatus::WouldChange(_)) {
            for line in content_diff(resource, &LocalFs) {
                println!("{line}");
            }
        }
    }

    println!();
    if changes == 0 && failures == 0 {
        ui::success("Host is converged; apply would change nothing");
    } else {
        ui::info(&format!(
            "{changes} of {} resources would change",
            loaded.plan.len()
        ));
    }
    ui::dim("Each resource is checked against the host as it is now");

    if failures > 0 {
        ui::error(&format!("{failures} resources could not be checked"));
        return Ok(1);
    }
    Ok(0)
}

fn entry_lines(entry: &PlanEntry) -> Vec<String> {
    match &entry.status {
        PlanStatus::Converged => vec![format!("  {} {}", "○".dimmed(), entry.id)],
        PlanStatus::WouldChange(changes) => {
            let mut lines = vec![format!("  {} {}", "~".yellow().bold(), entry.id)];
            for change in changes {
                lines.push(format!(
                    "      {}: {} {} {}",
                    change.action.to_string().cyan(),
                    change.observation.current,
                    "→".dimmed(),
                    change.observation.desired
                ));
            }
            lines
        }
        PlanStatus::Skipped(reason) => {
            vec![format!("  {} {} {}", "⊘".yellow(), entry.id, reason.to_string().dimmed())]
        }
        PlanStatus::Failed(detail) => {
            vec![format!("  {} {} {}", "✗".red(), entry.id, detail.to_string().red())]
        }
    }
}

/// Unified diff of a managed file's content against what is on disk
fn content_diff(resource: &Resource, fs: &dyn FileSystem) -> Vec<String> {
    let Properties::File(props) = &resource.properties else {
        return Vec::new();
    };
    let Some(desired) = &props.content else {
        return Vec::new();
    };
    let current = match fs.read_string(Path::new(resource.name())) {
        Ok(current) => current.unwrap_or_default(),
        Err(e) => {
            log::debug!("{}: cannot read current content: {e}", resource.id);
            return Vec::new();
        }
    };

    let diff = similar::TextDiff::from_lines(current.as_str(), desired.as_str());
    let mut lines = Vec::new();
    for change in diff.iter_all_changes() {
        let text = change.to_string_lossy();
        let text = text.trim_end_matches('\n');
        match change.tag() {
            similar::ChangeTag::Delete => lines.push(format!("        {}", format!("- {text}").red())),
            similar::ChangeTag::Insert => lines.push(format!("        {}", format!("+ {text}").green())),
            similar::ChangeTag::Equal => {}
        }
    }
    lines
}
