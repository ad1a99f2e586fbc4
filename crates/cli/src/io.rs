//! Parameter and template file lookup.

use std::{
    fs::read,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use fontpress_core::{FontParameterValues, VariantRef};
use glob::glob;

/// Extensions tried, in order, when resolving a template name.
const TEMPLATE_EXTENSIONS: &[&str] = &["otf", "ttf"];

/// A JSON file holding one variant's parameter values.
#[derive(Debug, Clone)]
pub struct ValuesFile {
    path: PathBuf,
}

impl ValuesFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The file backing `db` inside `dir`.
    pub fn in_dir(dir: &Path, db: &str) -> Self {
        Self::new(dir.join(format!("{db}.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    pub fn read(&self) -> Result<FontParameterValues> {
        let data = read(&self.path)
            .with_context(|| format!("Failed to read values: {}", self.path.display()))?;
        serde_json::from_slice(&data)
            .with_context(|| format!("Invalid parameter values in {}", self.path.display()))
    }
}

/// Parse a `NAME=DB` variant argument.
pub fn parse_variant(arg: &str) -> Result<VariantRef> {
    match arg.split_once('=') {
        Some((name, db)) if !name.is_empty() && !db.is_empty() => Ok(VariantRef::new(name, db)),
        _ => bail!("Expected NAME=DB, got {arg:?}"),
    }
}

/// One variant per `*.json` file in `dir`, named after the file stem, sorted.
pub fn discover_variants(dir: &Path) -> Result<Vec<VariantRef>> {
    let pattern = dir.join("*.json");
    let pattern_str = pattern.to_str().context("Invalid pattern path")?;
    let mut variants: Vec<_> = glob(pattern_str)
        .with_context(|| format!("Failed to glob pattern: {pattern_str}"))?
        .filter_map(Result::ok)
        .filter_map(|path| path.file_stem().and_then(|s| s.to_str()).map(str::to_string))
        .map(|stem| VariantRef::new(stem.clone(), stem))
        .collect();
    variants.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(variants)
}

/// Resolve `template` to a font file in `dir`.
pub fn find_template(dir: &Path, template: &str) -> Result<PathBuf> {
    TEMPLATE_EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("{template}.{ext}")))
        .find(|path| path.is_file())
        .with_context(|| format!("No template {template:?} in {}", dir.display()))
}
