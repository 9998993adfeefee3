use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use textbook_core::prompts::Prompts;

/// Reads every `<name>.md` file in `dir_path` into a map keyed by `<name>`.
///
/// Blank files are skipped so they never wipe out a built-in template.
pub fn load_prompts(dir_path: &Path) -> Result<HashMap<String, String>> {
    let entries = fs::read_dir(dir_path)
        .with_context(|| format!("Failed to read prompts directory: {}", dir_path.display()))?;

    let mut prompts = HashMap::new();
    for entry in entries {
        let path = entry?.path();
        if !path.is_file() || path.extension().and_then(|s| s.to_str()) != Some("md") {
            continue;
        }
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .context("Could not get file stem for prompt file")?
            .to_string();
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read prompt file: {}", path.display()))?;
        if content.trim().is_empty() {
            tracing::warn!("Skipping empty prompt file {}", path.display());
            continue;
        }
        prompts.insert(name, content);
    }
    Ok(prompts)
}

/// The built-in prompts, with any overrides found in `dir` applied on top.
pub fn resolve_prompts(dir: Option<&Path>) -> Result<Prompts> {
    let Some(dir) = dir else {
        return Ok(Prompts::default());
    };
    let overrides = load_prompts(dir)?;
    tracing::info!("Loaded {} prompt overrides from {}", overrides.len(), dir.display());
    Ok(Prompts::default().with_overrides(&overrides))
}
