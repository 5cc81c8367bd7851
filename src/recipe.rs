//! Recipe loading
//!
//! A recipe is a list of `[[resource]]` tables in TOML, or the same shape in
//! JSON (`{"resource": [...]}`), selected by file extension.

use anyhow::{Context, Result};
use converge::{Declaration, Plan};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

const BUILTIN: &str = include_str!("../recipes/k8s-node.toml");

/// Name shown for the recipe compiled into the binary
pub const BUILTIN_NAME: &str = "built-in k8s-node";

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RecipeFile {
    #[serde(default)]
    pub resource: Vec<Declaration>,
}

impl RecipeFile {
    pub fn parse_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("Invalid TOML recipe")
    }

    pub fn parse_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("Invalid JSON recipe")
    }

    /// Read a recipe file, picking the format from its extension
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read recipe {}", path.display()))?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let recipe = if is_json {
            Self::parse_json(&content)
        } else {
            Self::parse_toml(&content)
        };
        recipe.with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn builtin() -> Result<Self> {
        Self::parse_toml(BUILTIN).context("Built-in recipe is malformed")
    }
}

/// A compiled recipe and where it came from
pub struct LoadedRecipe {
    pub source: String,
    pub plan: Plan,
}

/// Load and compile the given recipe, or the built-in one
pub fn load(path: Option<&Path>) -> Result<LoadedRecipe> {
    let (source, recipe) = match path {
        Some(path) => (path.display().to_string(), RecipeFile::load(path)?),
        None => (BUILTIN_NAME.to_string(), RecipeFile::builtin()?),
    };
    log::debug!("{} declares {} resources", source, recipe.resource.len());

    let plan = Plan::compile(&recipe.resource)
        .with_context(|| format!("Recipe {source} failed validation"))?;
    Ok(LoadedRecipe { source, plan })
}
