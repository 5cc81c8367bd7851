//! `nodeprep validate` - compile a recipe without touching the host

use crate::Context;
use crate::cli::RecipeArgs;
use crate::{recipe, ui};
use anyhow::Result;

pub fn run(ctx: &Context, args: RecipeArgs) -> Result<i32> {
    let loaded = recipe::load(args.recipe.as_deref())?;
    if !ctx.quiet {
        ui::success(&format!(
            "{} is valid: {} resources, {} notification edges",
            loaded.source,
            loaded.plan.len(),
            loaded.plan.bus.edges().len()
        ));
    }
    Ok(0)
}
