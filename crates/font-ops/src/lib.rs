//! OpenType table rewriting for rendered font variants.

use std::collections::BTreeSet;

use anyhow::{Context, Result};
use read_fonts::{FontRef, TableProvider, types::NameId};
use write_fonts::{
    FontBuilder,
    from_obj::ToOwnedTable,
    tables::{
        name::{Name, NameRecord},
        os2::Os2,
    },
};

/// Windows platform, Unicode BMP encoding, US English.
const WINDOWS_ENGLISH: (u16, u16, u16) = (3, 1, 0x409);

const NAME_ID_FAMILY: u16 = 1;
const NAME_ID_SUBFAMILY: u16 = 2;
const NAME_ID_FULL_NAME: u16 = 4;
const NAME_ID_POSTSCRIPT: u16 = 6;
const NAME_ID_TYPO_FAMILY: u16 = 16;
const NAME_ID_TYPO_SUBFAMILY: u16 = 17;

/// Rewrite font data by applying a transformation function.
///
/// Copies all tables from the source font, then calls `f` to modify or add
/// tables on a builder that already holds the originals.
pub fn rewrite_font(
    data: &[u8],
    f: impl FnOnce(&FontRef, &mut FontBuilder) -> Result<()>,
) -> Result<Vec<u8>> {
    let font = FontRef::new(data).context("Failed to parse font")?;
    let mut builder = FontBuilder::new();

    for record in font.table_directory.table_records() {
        let tag = record.tag();
        if let Some(table_data) = font.table_data(tag) {
            builder.add_raw(tag, table_data);
        }
    }

    f(&font, &mut builder)?;
    Ok(builder.build())
}

/// Rebuild the name table, letting `mapper` replace strings by name ID.
///
/// `mapper` receives `(name_id, current)` and returns `Some` to replace the
/// string. Any ID in `required` missing from the font is added as a Windows
/// English record with `mapper(id, "")`. A font without a name table gets one.
pub fn map_name_records(
    font: &FontRef,
    required: &[u16],
    mut mapper: impl FnMut(u16, &str) -> Option<String>,
) -> Result<Name> {
    let mut records = Vec::new();
    let mut seen = BTreeSet::new();

    if let Ok(name) = font.name() {
        for record in name.name_record() {
            let name_id = record.name_id().to_u16();
            let Ok(current) = record.string(name.string_data()) else {
                continue;
            };
            let current: String = current.chars().collect();
            let string = mapper(name_id, &current).unwrap_or(current);

            if record.platform_id() == WINDOWS_ENGLISH.0 {
                seen.insert(name_id);
            }
            records.push(NameRecord::new(
                record.platform_id(),
                record.encoding_id(),
                record.language_id(),
                NameId::new(name_id),
                string.into(),
            ));
        }
    }

    let (platform, encoding, language) = WINDOWS_ENGLISH;
    for &name_id in required.iter().filter(|id| !seen.contains(*id)) {
        if let Some(string) = mapper(name_id, "") {
            records.push(NameRecord::new(
                platform,
                encoding,
                language,
                NameId::new(name_id),
                string.into(),
            ));
        }
    }

    Ok(Name::new(records))
}

/// Name a rendered font after its family and style.
///
/// - 1 (Family): `"{family}"`
/// - 2 (Subfamily): `"{style}"`
/// - 4 (Full name): `"{family} {style}"`
/// - 6 (PostScript name): `"{family}-{style}"` with spaces removed
/// - 16 / 17 (Typographic family / subfamily): as 1 / 2
pub fn apply_family_style_names(font_data: &[u8], family: &str, style: &str) -> Result<Vec<u8>> {
    let postscript = format!("{}-{}", family.replace(' ', ""), style.replace(' ', ""));
    let required = [
        NAME_ID_FAMILY,
        NAME_ID_SUBFAMILY,
        NAME_ID_FULL_NAME,
        NAME_ID_POSTSCRIPT,
        NAME_ID_TYPO_FAMILY,
        NAME_ID_TYPO_SUBFAMILY,
    ];

    rewrite_font(font_data, |font, builder| {
        let name = map_name_records(font, &required, |name_id, _| match name_id {
            NAME_ID_FAMILY | NAME_ID_TYPO_FAMILY => Some(family.to_string()),
            NAME_ID_SUBFAMILY | NAME_ID_TYPO_SUBFAMILY => Some(style.to_string()),
            NAME_ID_FULL_NAME => Some(format!("{family} {style}")),
            NAME_ID_POSTSCRIPT => Some(postscript.clone()),
            _ => None,
        })?;
        builder.add_table(&name)?;
        Ok(())
    })
}

/// OS/2 weight and width classes derived from a variant's parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StyleClasses {
    pub weight: Option<u16>,
    pub width: Option<u16>,
}

impl StyleClasses {
    /// Weight class from a CSS-like weight (clamped to 1..=1000).
    pub fn weight_from(value: f64) -> u16 {
        value.round().clamp(1.0, 1000.0) as u16
    }

    /// Width class (1..=9) from a width factor where 1.0 is normal.
    pub fn width_from(factor: f64) -> u16 {
        // usWidthClass 5 is 100%; each step is roughly 12.5%.
        (5.0 + (factor - 1.0) / 0.125).round().clamp(1.0, 9.0) as u16
    }

    pub fn is_empty(&self) -> bool {
        self.weight.is_none() && self.width.is_none()
    }

    /// Write the classes into the OS/2 table, if the font has one.
    pub fn apply(&self, data: &[u8]) -> Result<Vec<u8>> {
        let classes = *self;

        rewrite_font(data, |font, builder| {
            if let Ok(os2) = font.os2() {
                let mut new_os2: Os2 = os2.to_owned_table();
                if let Some(weight) = classes.weight {
                    new_os2.us_weight_class = weight;
                }
                if let Some(width) = classes.width {
                    new_os2.us_width_class = width;
                }
                builder.add_table(&new_os2)?;
            }
            Ok(())
        })
    }
}
