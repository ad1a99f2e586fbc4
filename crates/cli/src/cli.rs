//! CLI definitions and command dispatch.

use std::{
    path::PathBuf,
    sync::{Arc, mpsc::Receiver},
    time::Duration,
};

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use fontpress_core::{
    Collaborators, EditorContext, ExportConfig, ExportHandle, ExportProgress, ExportReport,
    Exporter, FamilyExport, FamilyRef, OtfExport, ProgressStore, VariantRef,
    config::{DEFAULT_FAMILY_NAME, DEFAULT_VARIANT_NAME, RENDER_DEADLINE, SCRATCH_PARTITION},
};
use log::info;

use crate::{
    backends::{DirDownload, DirParameterStore, LocalWorkspace, StaticPlan},
    io::{discover_variants, parse_variant},
};

#[derive(Parser)]
#[command(name = "fontpress")]
#[command(about = "Render font variants from parameter values and export them")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, clap::Args)]
pub struct ExportArgs {
    #[arg(long, default_value = "templates")]
    pub templates_dir: PathBuf,
    #[arg(long, default_value = "values")]
    pub values_dir: PathBuf,
    #[arg(long, default_value = "dist")]
    pub out_dir: PathBuf,
    /// Subscription plan identifier; plans containing `free_` cannot export.
    #[arg(long, default_value = "personal_monthly")]
    pub plan: String,
    #[arg(long)]
    pub email: Option<String>,
    /// Deadline for a single font render, in milliseconds.
    #[arg(long, default_value_t = RENDER_DEADLINE.as_millis() as u64)]
    pub deadline_ms: u64,
    /// Print each exported file as a `data:` URI.
    #[arg(long)]
    pub data_uri: bool,
}

impl ExportArgs {
    /// Wire the file-system collaborators into an exporter.
    pub fn exporter(&self, context: EditorContext) -> Exporter {
        let parameters = DirParameterStore::new(&self.values_dir);
        let workspace =
            Arc::new(LocalWorkspace::new(&self.templates_dir, parameters.clone(), context));
        let config =
            ExportConfig::default().with_render_deadline(Duration::from_millis(self.deadline_ms));

        Exporter::new(
            Collaborators {
                engine: workspace.clone(),
                parameters: Arc::new(parameters),
                session: workspace,
                entitlements: Arc::new(StaticPlan::new(&self.plan, self.email.clone())),
                downloads: Arc::new(DirDownload::new(&self.out_dir).with_data_uri(self.data_uri)),
            },
            Arc::new(ProgressStore::new()),
            config,
        )
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Export every variant of a family into `<FAMILY>.zip`.
    Family {
        #[arg(long)]
        family: String,
        #[arg(long)]
        template: String,
        /// Variant as NAME=DB. Defaults to every `*.json` in the values directory.
        #[arg(long = "variant", value_parser = parse_variant)]
        variants: Vec<VariantRef>,
        #[command(flatten)]
        args: ExportArgs,
    },
    /// Export one font as `<family>-<style>.otf`.
    Otf {
        #[arg(long)]
        template: String,
        #[arg(long, default_value = SCRATCH_PARTITION)]
        db: String,
        #[arg(long)]
        family: Option<String>,
        #[arg(long)]
        variant: Option<String>,
        #[arg(long)]
        merged: bool,
        /// Use --family and --variant as given instead of the sanitized editor names.
        #[arg(long)]
        export_as: bool,
        #[command(flatten)]
        args: ExportArgs,
    },
}

impl Commands {
    pub fn run(self) -> Result<()> {
        match self {
            Commands::Family { family, template, variants, args } => {
                let variants = if variants.is_empty() {
                    discover_variants(&args.values_dir)?
                } else {
                    variants
                };
                if variants.is_empty() {
                    bail!("No variants given and no *.json files in {}", args.values_dir.display());
                }

                let exporter = args.exporter(EditorContext::new(&template, SCRATCH_PARTITION));
                let progress = exporter.progress().subscribe();
                let handle = exporter
                    .start_family_export(FamilyExport::new(FamilyRef::new(family, template), variants))?;
                let report = follow(handle, &progress)?;
                exporter.wait_for_cleanup();
                print_report(&report, &args);
            }
            Commands::Otf { template, db, family, variant, merged, export_as, args } => {
                let mut context = EditorContext::new(&template, &db);
                context.family = family.clone();
                context.variant = variant.clone();

                let request = OtfExport {
                    merged,
                    family_name: family.unwrap_or_else(|| DEFAULT_FAMILY_NAME.to_string()),
                    variant_name: variant.unwrap_or_else(|| DEFAULT_VARIANT_NAME.to_string()),
                    export_as,
                };
                let exporter = args.exporter(context);
                let report = exporter.export_otf(&request)?;
                exporter.wait_for_cleanup();
                print_report(&report, &args);
            }
        }
        Ok(())
    }
}

/// Log progress until the export worker finishes.
fn follow(handle: ExportHandle, progress: &Receiver<ExportProgress>) -> Result<ExportReport> {
    while !handle.is_finished() {
        let Ok(snapshot) = progress.recv_timeout(Duration::from_millis(100)) else {
            continue;
        };
        if let Some(total) = snapshot.variant_to_export {
            info!("{:?}: {}/{total} variants", snapshot.state, snapshot.exported_variant);
        }
    }
    Ok(handle.wait()?)
}

fn print_report(report: &ExportReport, args: &ExportArgs) {
    println!("Exported {}", args.out_dir.join(&report.file_name).display());
    for entry in &report.entries {
        println!("  {entry}");
    }
    let size_kb = report.size as f64 / 1024.0;
    println!("  {size_kb:.1} KB");
}
