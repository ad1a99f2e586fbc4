//! Export request and result types.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{DEFAULT_FAMILY_NAME, DEFAULT_VARIANT_NAME, FONT_EXTENSION};

/// A font family as the exporter sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FamilyRef {
    pub name: String,
    pub template: String,
}

impl FamilyRef {
    pub fn new(name: impl Into<String>, template: impl Into<String>) -> Self {
        Self { name: name.into(), template: template.into() }
    }

    /// File name of the archive holding this family.
    pub fn archive_name(&self) -> String {
        format!("{}.zip", self.name)
    }
}

/// Where a variant's parameter values are stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantRef {
    pub name: String,
    pub db: String,
}

impl VariantRef {
    pub fn new(name: impl Into<String>, db: impl Into<String>) -> Self {
        Self { name: name.into(), db: db.into() }
    }

    /// Archive entry name for this variant's rendered font.
    pub fn entry_name(&self) -> String {
        format!("{}.{FONT_EXTENSION}", self.name)
    }
}

/// A request to export every variant of a family into one archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FamilyExport {
    pub family: FamilyRef,
    pub variants: Vec<VariantRef>,
}

impl FamilyExport {
    pub fn new(family: FamilyRef, variants: impl IntoIterator<Item = VariantRef>) -> Self {
        Self { family, variants: variants.into_iter().collect() }
    }
}

/// Glyph-shape parameters of one variant, in store order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FontParameterValues(IndexMap<String, Value>);

impl FontParameterValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Numeric parameter, if present and a number.
    pub fn number(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(Value::as_f64)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for FontParameterValues {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// A variant's binary font, ready for packaging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedVariant {
    pub variant: VariantRef,
    pub buffer: Vec<u8>,
}

/// Family and style names handed to the rendering engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FontName {
    pub family: String,
    pub style: String,
}

impl FontName {
    pub fn new(family: impl Into<String>, style: impl Into<String>) -> Self {
        Self { family: family.into(), style: style.into() }
    }

    /// Names for a single-font export.
    ///
    /// With `export_as` the caller's names are used verbatim. Otherwise the
    /// editor's current names are used with whitespace replaced by `-`,
    /// falling back to `font` / `regular`. The style is always lowercased.
    pub fn for_single_export(request: &OtfExport, context: &EditorContext) -> Self {
        let (family, style) = if request.export_as {
            (request.family_name.clone(), request.variant_name.clone())
        } else {
            (
                context
                    .family
                    .as_deref()
                    .filter(|name| !name.is_empty())
                    .map_or_else(|| DEFAULT_FAMILY_NAME.to_string(), dash_whitespace),
                context
                    .variant
                    .as_deref()
                    .filter(|name| !name.is_empty())
                    .map_or_else(|| DEFAULT_VARIANT_NAME.to_string(), dash_whitespace),
            )
        };
        Self { family, style: style.to_lowercase() }
    }

    /// File name of a single exported font.
    pub fn file_name(&self) -> String {
        format!("{}-{}.{FONT_EXTENSION}", self.family, self.style)
    }
}

fn dash_whitespace(name: &str) -> String {
    name.chars().map(|c| if c.is_whitespace() { '-' } else { c }).collect()
}

/// The editor state a family export swaps out and later restores.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EditorContext {
    pub template: String,
    pub partition: String,
    pub family: Option<String>,
    pub variant: Option<String>,
}

impl EditorContext {
    pub fn new(template: impl Into<String>, partition: impl Into<String>) -> Self {
        Self { template: template.into(), partition: partition.into(), ..Default::default() }
    }

    pub fn with_names(mut self, family: impl Into<String>, variant: impl Into<String>) -> Self {
        self.family = Some(family.into());
        self.variant = Some(variant.into());
        self
    }
}

/// A request to export the font currently open in the editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtfExport {
    pub merged: bool,
    pub family_name: String,
    pub variant_name: String,
    pub export_as: bool,
}

impl Default for OtfExport {
    fn default() -> Self {
        Self {
            merged: false,
            family_name: DEFAULT_FAMILY_NAME.to_string(),
            variant_name: DEFAULT_VARIANT_NAME.to_string(),
            export_as: false,
        }
    }
}

/// Options chosen in the "export as" dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportAsSettings {
    pub export_as: bool,
    pub merged: bool,
}
