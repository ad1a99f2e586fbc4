//! File-system backed collaborators for the exporter.

use std::{
    fs::{create_dir_all, read, write},
    path::PathBuf,
    sync::{
        Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use anyhow::{Context, Result, bail};
use fontpress_core::{
    DownloadResource, DownloadSurface, EditorContext, EditorSession, Entitlements, FontName,
    FontParameterValues, ParameterStore, Plan, RenderEngine, VariantRef,
};
use fontpress_font_ops::{StyleClasses, apply_family_style_names};
use log::{debug, info};

use crate::io::{ValuesFile, find_template};

/// Parameter values stored as `<dir>/<db>.json`.
#[derive(Debug, Clone)]
pub struct DirParameterStore {
    dir: PathBuf,
}

impl DirParameterStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Values for a data partition, empty when it has no file yet.
    pub fn partition_values(&self, db: &str) -> Result<FontParameterValues> {
        let file = ValuesFile::in_dir(&self.dir, db);
        if file.exists() { file.read() } else { Ok(FontParameterValues::new()) }
    }
}

impl ParameterStore for DirParameterStore {
    fn fetch_values(&self, variant: &VariantRef) -> Result<FontParameterValues> {
        ValuesFile::in_dir(&self.dir, &variant.db).read()
    }
}

struct LoadedTemplate {
    context: EditorContext,
    data: Option<Vec<u8>>,
}

/// An editor session and renderer over template fonts in a directory.
///
/// Loading a template reads its bytes; rendering renames the template and
/// stamps OS/2 classes from the `weight` and `width` parameters.
pub struct LocalWorkspace {
    templates_dir: PathBuf,
    parameters: DirParameterStore,
    loaded: Mutex<LoadedTemplate>,
    exporting_zip: AtomicBool,
}

impl LocalWorkspace {
    pub fn new(
        templates_dir: impl Into<PathBuf>,
        parameters: DirParameterStore,
        context: EditorContext,
    ) -> Self {
        Self {
            templates_dir: templates_dir.into(),
            parameters,
            loaded: Mutex::new(LoadedTemplate { context, data: None }),
            exporting_zip: AtomicBool::new(false),
        }
    }

    fn template_data(&self) -> Result<Vec<u8>> {
        let mut loaded = self.loaded.lock().unwrap_or_else(|e| e.into_inner());
        if loaded.data.is_none() {
            let path = find_template(&self.templates_dir, &loaded.context.template)?;
            let data =
                read(&path).with_context(|| format!("Failed to read template: {}", path.display()))?;
            loaded.data = Some(data);
        }
        Ok(loaded.data.clone().unwrap_or_default())
    }
}

impl EditorSession for LocalWorkspace {
    fn current_context(&self) -> EditorContext {
        self.loaded.lock().unwrap_or_else(|e| e.into_inner()).context.clone()
    }

    fn change_font(&self, context: &EditorContext) -> Result<()> {
        let path = find_template(&self.templates_dir, &context.template)?;
        let data =
            read(&path).with_context(|| format!("Failed to read template: {}", path.display()))?;
        debug!("Loaded template {} on partition {}", context.template, context.partition);

        let mut loaded = self.loaded.lock().unwrap_or_else(|e| e.into_inner());
        *loaded = LoadedTemplate { context: context.clone(), data: Some(data) };
        Ok(())
    }
}

impl RenderEngine for LocalWorkspace {
    fn reset_queue(&self) {
        debug!("Render queue reset");
    }

    fn set_exporting_zip(&self, exporting: bool) {
        self.exporting_zip.store(exporting, Ordering::SeqCst);
    }

    fn render(&self, name: &FontName, values: &FontParameterValues, merged: bool) -> Result<Vec<u8>> {
        debug!("Rendering {} {} (merged: {merged})", name.family, name.style);
        let template = self.template_data()?;
        let named = apply_family_style_names(&template, &name.family, &name.style)?;

        let classes = StyleClasses {
            weight: values.number("weight").map(StyleClasses::weight_from),
            width: values.number("width").map(StyleClasses::width_from),
        };
        if classes.is_empty() { Ok(named) } else { classes.apply(&named) }
    }

    fn render_current(&self, name: &FontName, merged: bool, account: Option<&str>) -> Result<Vec<u8>> {
        // Mid family export the loaded template is the scratch copy.
        if self.exporting_zip.load(Ordering::SeqCst) {
            bail!("Cannot render {} while a family archive is being built", name.file_name());
        }
        let partition = self.current_context().partition;
        let values = self.parameters.partition_values(&partition)?;
        if let Some(account) = account {
            debug!("Rendering for {account}");
        }
        self.render(name, &values, merged)
    }
}

/// A fixed plan, typically taken from the command line.
#[derive(Debug, Clone)]
pub struct StaticPlan {
    plan: String,
    account: Option<String>,
}

impl StaticPlan {
    pub fn new(plan: impl Into<String>, account: Option<String>) -> Self {
        Self { plan: plan.into(), account }
    }
}

impl Entitlements for StaticPlan {
    fn plan(&self) -> Plan {
        Plan::new(&self.plan)
    }

    fn account(&self) -> Option<String> {
        self.account.clone()
    }
}

/// Saves offered downloads into a directory.
#[derive(Debug, Clone)]
pub struct DirDownload {
    dir: PathBuf,
    print_data_uri: bool,
}

impl DirDownload {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), print_data_uri: false }
    }

    /// Also print each offered resource as a `data:` URI on stdout.
    pub fn with_data_uri(mut self, print: bool) -> Self {
        self.print_data_uri = print;
        self
    }
}

impl DownloadSurface for DirDownload {
    fn offer(&self, resource: &DownloadResource) -> Result<()> {
        create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create directory: {}", self.dir.display()))?;
        let target = self.dir.join(&resource.file_name);
        write(&target, &resource.bytes)
            .with_context(|| format!("Failed to write {}", target.display()))?;

        let size_kb = resource.len() as f64 / 1024.0;
        info!("Saved {} ({size_kb:.1} KB)", target.display());
        if self.print_data_uri {
            println!("{}", resource.data_uri());
        }
        Ok(())
    }

    fn release(&self, resource: &DownloadResource) {
        debug!("Released {}", resource.file_name);
    }
}
