//! `nodeprep show` - list compiled resources and notification edges

use crate::Context;
use crate::cli::RecipeArgs;
use crate::{recipe, ui};
use anyhow::Result;
use colored::Colorize;
use converge::{Guards, NotificationEdge, Resource};

pub fn run(_ctx: &Context, args: RecipeArgs) -> Result<i32> {
    let loaded = recipe::load(args.recipe.as_deref())?;

    ui::header(&loaded.source);
    ui::section("Resources");
    for (index, resource) in loaded.plan.resources.iter().enumerate() {
        println!("{}", resource_line(index, resource));
        if let Some(guards) = guards_line(&resource.guards) {
            ui::dim(&format!("      {guards}"));
        }
    }

    let edges = loaded.plan.bus.edges();
    if !edges.is_empty() {
        ui::section("Notifications");
        for edge in edges {
            println!("{}", edge_line(edge));
        }
    }
    Ok(0)
}

fn resource_line(index: usize, resource: &Resource) -> String {
    let actions: Vec<&str> = resource.actions.iter().map(|a| a.as_str()).collect();
    format!(
        "  {:>3}. {} {}",
        index + 1,
        resource.id,
        format!("[{}]", actions.join(", ")).dimmed()
    )
}

fn guards_line(guards: &Guards) -> Option<String> {
    let mut parts = Vec::new();
    parts.extend(guards.only_if.iter().map(|g| format!("only_if {g}")));
    parts.extend(guards.not_if.iter().map(|g| format!("not_if {g}")));
    if let Some(path) = &guards.creates {
        parts.push(format!("creates {}", path.display()));
    }
    (!parts.is_empty()).then(|| parts.join("; "))
}

fn edge_line(edge: &NotificationEdge) -> String {
    format!(
        "  {} {} {} {} ({})",
        edge.source,
        "→".cyan(),
        edge.action,
        edge.target,
        edge.timing
    )
}
