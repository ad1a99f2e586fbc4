//! The export orchestrator.
//!
//! A family export runs on its own worker thread through
//! `Preparing -> FetchingValues -> Rendering -> Packaging -> Downloading`,
//! fanning out value fetches and renders with rayon. A single font export
//! renders the editor's current font under a deadline. Both paths publish
//! progress through the injected [`ProgressStore`] and always leave it idle.

use std::{
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
        mpsc,
    },
    thread::{self, JoinHandle},
};

use log::{debug, info, warn};
use rayon::prelude::*;

use crate::{
    archive::{DownloadResource, FamilyArchive},
    config::ExportConfig,
    engine::{DownloadSurface, EditorSession, Entitlements, ParameterStore, RenderEngine},
    error::{Error, Result},
    model::{
        EditorContext, ExportAsSettings, FamilyExport, FamilyRef, FontName, FontParameterValues,
        OtfExport, RenderedVariant, VariantRef,
    },
    progress::{ExportId, ProgressStore},
    schedule::{ScheduledTask, Scheduler},
    state::ExportState,
};

/// Everything an [`Exporter`] talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub engine: Arc<dyn RenderEngine>,
    pub parameters: Arc<dyn ParameterStore>,
    pub session: Arc<dyn EditorSession>,
    pub entitlements: Arc<dyn Entitlements>,
    pub downloads: Arc<dyn DownloadSurface>,
}

/// What a finished export delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReport {
    pub id: ExportId,
    pub file_name: String,
    pub entries: Vec<String>,
    pub size: usize,
}

/// A family export running in the background.
pub struct ExportHandle {
    id: ExportId,
    handle: JoinHandle<Result<ExportReport>>,
}

impl ExportHandle {
    pub fn id(&self) -> ExportId {
        self.id
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn wait(self) -> Result<ExportReport> {
        self.handle.join().map_err(|_| Error::WorkerPanicked)?
    }
}

struct Inner {
    with: Collaborators,
    progress: Arc<ProgressStore>,
    scheduler: Scheduler,
    config: ExportConfig,
}

#[derive(Clone)]
pub struct Exporter {
    inner: Arc<Inner>,
}

impl Exporter {
    pub fn new(with: Collaborators, progress: Arc<ProgressStore>, config: ExportConfig) -> Self {
        Self { inner: Arc::new(Inner { with, progress, scheduler: Scheduler::new(), config }) }
    }

    pub fn progress(&self) -> &Arc<ProgressStore> {
        &self.inner.progress
    }

    pub fn config(&self) -> &ExportConfig {
        &self.inner.config
    }

    /// Block until every pending resource release has run.
    pub fn wait_for_cleanup(&self) {
        self.inner.scheduler.wait_idle();
    }

    fn check_entitlement(&self) -> Result<()> {
        let plan = self.inner.with.entitlements.plan();
        if plan.permits_export() {
            Ok(())
        } else {
            info!("Export refused for plan {}", plan.as_str());
            Err(Error::EntitlementDenied(plan.0))
        }
    }

    /// Record the options chosen in the "export as" dialog.
    pub fn set_up_export_as(&self, merged: bool, export_as: bool) -> Result<()> {
        self.check_entitlement()?;
        self.inner.progress.set_export_as(ExportAsSettings { export_as, merged });
        Ok(())
    }

    /// Export a whole family and wait for the archive to be delivered.
    pub fn export_family(&self, request: FamilyExport) -> Result<ExportReport> {
        self.start_family_export(request)?.wait()
    }

    /// Claim the progress store and run the family export in the background.
    pub fn start_family_export(&self, request: FamilyExport) -> Result<ExportHandle> {
        self.check_entitlement()?;
        if request.variants.is_empty() {
            return Err(Error::NoVariants(request.family.name));
        }

        let id = self
            .inner
            .progress
            .begin(Some((request.family.name.as_str(), request.variants.len())))?;
        let previous = self.inner.with.session.current_context();
        info!(
            "Export {id}: {} from template {} ({} variants)",
            request.family.name,
            request.family.template,
            request.variants.len()
        );

        let exporter = self.clone();
        let spawned = thread::Builder::new()
            .name(format!("export-{}", id.get()))
            .spawn(move || exporter.run_family(id, request, previous));

        match spawned {
            Ok(handle) => Ok(ExportHandle { id, handle }),
            Err(e) => {
                self.inner.progress.fail(id);
                Err(e.into())
            }
        }
    }

    fn run_family(
        &self,
        id: ExportId,
        request: FamilyExport,
        previous: EditorContext,
    ) -> Result<ExportReport> {
        // A panicking collaborator still goes through the cleanup below.
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.family_pipeline(id, &request)))
            .unwrap_or(Err(Error::WorkerPanicked));

        self.inner.with.engine.set_exporting_zip(false);
        if let Err(e) = self.inner.with.session.change_font(&previous) {
            warn!("Export {id}: failed to restore template {}: {e:#}", previous.template);
        }

        match result {
            Ok(report) => {
                self.inner.progress.finish(id)?;
                info!("Export {id}: delivered {} ({} bytes)", report.file_name, report.size);
                Ok(report)
            }
            Err(e) => {
                warn!("Export {id} failed: {e}");
                self.inner.progress.fail(id);
                Err(e)
            }
        }
    }

    fn family_pipeline(&self, id: ExportId, request: &FamilyExport) -> Result<ExportReport> {
        let Inner { with, progress, config, .. } = &*self.inner;

        progress.enter(id, ExportState::Preparing)?;
        with.engine.reset_queue();
        with.engine.set_exporting_zip(true);
        let scratch = EditorContext::new(&request.family.template, &config.scratch_partition);
        with.session.change_font(&scratch).map_err(|e| Error::TemplateSwap {
            template: scratch.template.clone(),
            partition: scratch.partition.clone(),
            source: e.into(),
        })?;
        debug!("Export {id}: engine ready on {}", scratch.template);

        progress.enter(id, ExportState::FetchingValues)?;
        let values = self.fetch_all(&request.variants)?;

        progress.enter(id, ExportState::Rendering)?;
        let rendered = self.render_all(id, &request.family, values)?;

        progress.enter(id, ExportState::Packaging)?;
        let mut archive = FamilyArchive::new();
        archive.extend(&rendered)?;
        let entries = archive.entries().to_vec();
        let resource = archive.serialize(request.family.archive_name())?;

        progress.enter(id, ExportState::Downloading)?;
        let (file_name, size) = self.deliver(id, resource)?;
        Ok(ExportReport { id, file_name, entries, size })
    }

    fn fetch_all(&self, variants: &[VariantRef]) -> Result<Vec<(VariantRef, FontParameterValues)>> {
        let parameters = &self.inner.with.parameters;
        variants
            .par_iter()
            .map(|variant| {
                let values = parameters.fetch_values(variant).map_err(|e| Error::Fetch {
                    variant: variant.name.clone(),
                    source: e.into(),
                })?;
                Ok((variant.clone(), values))
            })
            .collect()
    }

    fn render_all(
        &self,
        id: ExportId,
        family: &FamilyRef,
        values: Vec<(VariantRef, FontParameterValues)>,
    ) -> Result<Vec<RenderedVariant>> {
        let Inner { with, progress, .. } = &*self.inner;
        let total = values.len();

        values
            .into_par_iter()
            .map(|(variant, values)| {
                let name = FontName::new(&family.name, &variant.name);
                let buffer = with.engine.render(&name, &values, false).map_err(|e| Error::Render {
                    variant: variant.name.clone(),
                    source: e.into(),
                })?;
                let done = progress.record_rendered(id)?;
                debug!("Export {id}: rendered {} ({done}/{total})", variant.name);
                Ok(RenderedVariant { variant, buffer })
            })
            .collect()
    }

    /// Offer `resource` and schedule its release.
    fn deliver(&self, id: ExportId, resource: DownloadResource) -> Result<(String, usize)> {
        let Inner { with, scheduler, config, .. } = &*self.inner;

        with.downloads.offer(&resource).map_err(|e| Error::Download {
            file_name: resource.file_name.clone(),
            source: e.into(),
        })?;
        let delivered = (resource.file_name.clone(), resource.len());

        let downloads = Arc::clone(&with.downloads);
        scheduler.after(format!("release-{}", id.get()), config.release_grace, move || {
            downloads.release(&resource)
        })?;
        Ok(delivered)
    }

    /// Export the font currently open in the editor.
    pub fn export_otf(&self, request: &OtfExport) -> Result<ExportReport> {
        self.check_entitlement()?;
        let id = self.inner.progress.begin(None)?;

        match self.render_single(id, request) {
            Ok(report) => {
                self.inner.progress.finish(id)?;
                info!("Export {id}: delivered {}", report.file_name);
                Ok(report)
            }
            Err(e) => {
                warn!("Export {id} failed: {e}");
                self.inner.progress.fail(id);
                Err(e)
            }
        }
    }

    fn render_single(&self, id: ExportId, request: &OtfExport) -> Result<ExportReport> {
        let Inner { with, progress, config, .. } = &*self.inner;

        progress.enter(id, ExportState::Rendering)?;
        let name = FontName::for_single_export(request, &with.session.current_context());
        let account = with.entitlements.account();

        // Whichever of the render and the deadline settles first reports.
        let settled = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel();

        let deadline = {
            let settled = Arc::clone(&settled);
            let tx = tx.clone();
            let limit = config.render_deadline;
            ScheduledTask::spawn(format!("deadline-{}", id.get()), limit, move || {
                if !settled.swap(true, Ordering::SeqCst) {
                    let _ = tx.send(Err(Error::RenderTimeout(limit)));
                }
            })?
        };

        let engine = Arc::clone(&with.engine);
        let worker_name = name.clone();
        let merged = request.merged;
        let spawned = thread::Builder::new().name(format!("render-{}", id.get())).spawn(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(|| {
                engine.render_current(&worker_name, merged, account.as_deref())
            }));
            if settled.swap(true, Ordering::SeqCst) {
                warn!("Discarding render of {} that finished after the deadline", worker_name.file_name());
                return;
            }
            let _ = tx.send(match result {
                Ok(rendered) => rendered.map_err(|e| Error::Render {
                    variant: worker_name.file_name(),
                    source: e.into(),
                }),
                Err(_) => Err(Error::RenderAbandoned),
            });
        });
        if let Err(e) = spawned {
            deadline.cancel();
            return Err(e.into());
        }

        let outcome = rx.recv().unwrap_or(Err(Error::RenderAbandoned));
        deadline.cancel();
        let buffer = outcome?;

        progress.enter(id, ExportState::Downloading)?;
        let (file_name, size) = self.deliver(id, DownloadResource::font(&name, buffer))?;
        Ok(ExportReport { id, entries: vec![file_name.clone()], file_name, size })
    }
}
