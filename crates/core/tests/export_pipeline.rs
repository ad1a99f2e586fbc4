//! End-to-end tests of the exporter against in-memory collaborators.

use std::{
    collections::HashMap,
    io::{Cursor, Read},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
        mpsc::Receiver,
    },
    thread::sleep,
    time::{Duration, Instant},
};

use anyhow::{Result, bail};
use fontpress_core::{
    Collaborators, DownloadResource, DownloadSurface, EditorContext, EditorSession, Entitlements,
    Error, ExportConfig, ExportProgress, ExportState, Exporter, FamilyExport, FamilyRef, FontName,
    FontParameterValues, OtfExport, ParameterStore, Plan, ProgressStore, RenderEngine, VariantRef,
};
use zip::ZipArchive;

// ============================================================================
// Fakes
// ============================================================================

#[derive(Default)]
struct FakeEngine {
    delays: HashMap<String, Duration>,
    failing_style: Option<String>,
    panicking_style: Option<String>,
    panic_current: bool,
    current_delay: Duration,
    rendered: Mutex<Vec<String>>,
    zip_flags: Mutex<Vec<bool>>,
    resets: AtomicUsize,
    current_calls: AtomicUsize,
}

impl RenderEngine for FakeEngine {
    fn reset_queue(&self) {
        self.resets.fetch_add(1, Ordering::SeqCst);
    }

    fn set_exporting_zip(&self, exporting: bool) {
        self.zip_flags.lock().unwrap().push(exporting);
    }

    fn render(&self, name: &FontName, values: &FontParameterValues, _merged: bool) -> Result<Vec<u8>> {
        if let Some(delay) = self.delays.get(&name.style) {
            sleep(*delay);
        }
        if self.failing_style.as_deref() == Some(name.style.as_str()) {
            bail!("engine crashed on {}", name.style);
        }
        if self.panicking_style.as_deref() == Some(name.style.as_str()) {
            panic!("engine aborted on {}", name.style);
        }
        self.rendered.lock().unwrap().push(name.style.clone());
        Ok(format!("{}/{}/{}", name.family, name.style, values.len()).into_bytes())
    }

    fn render_current(&self, name: &FontName, merged: bool, account: Option<&str>) -> Result<Vec<u8>> {
        sleep(self.current_delay);
        self.current_calls.fetch_add(1, Ordering::SeqCst);
        if self.panic_current {
            panic!("engine aborted on {}", name.style);
        }
        Ok(format!("{}/{}/{merged}/{}", name.family, name.style, account.unwrap_or("-")).into_bytes())
    }
}

#[derive(Default)]
struct FakeParameters {
    values: HashMap<String, FontParameterValues>,
    fetched: Mutex<Vec<String>>,
}

impl FakeParameters {
    fn with(mut self, db: &str, params: &[(&str, f64)]) -> Self {
        self.values.insert(db.to_string(), params.iter().copied().collect());
        self
    }
}

impl ParameterStore for FakeParameters {
    fn fetch_values(&self, variant: &VariantRef) -> Result<FontParameterValues> {
        self.fetched.lock().unwrap().push(variant.db.clone());
        match self.values.get(&variant.db) {
            Some(values) => Ok(values.clone()),
            None => bail!("no values stored for {}", variant.db),
        }
    }
}

struct FakeSession {
    context: Mutex<EditorContext>,
    history: Mutex<Vec<EditorContext>>,
}

impl FakeSession {
    fn new(context: EditorContext) -> Self {
        Self { context: Mutex::new(context), history: Mutex::default() }
    }
}

impl EditorSession for FakeSession {
    fn current_context(&self) -> EditorContext {
        self.context.lock().unwrap().clone()
    }

    fn change_font(&self, context: &EditorContext) -> Result<()> {
        self.history.lock().unwrap().push(context.clone());
        if context.template == "broken" {
            bail!("template {} failed to load", context.template);
        }
        *self.context.lock().unwrap() = context.clone();
        Ok(())
    }
}

struct FakePlan(&'static str);

impl Entitlements for FakePlan {
    fn plan(&self) -> Plan {
        Plan::new(self.0)
    }

    fn account(&self) -> Option<String> {
        Some("designer@example.com".to_string())
    }
}

#[derive(Default)]
struct FakeDownloads {
    offered: Mutex<Vec<DownloadResource>>,
    released: Mutex<Vec<String>>,
}

impl DownloadSurface for FakeDownloads {
    fn offer(&self, resource: &DownloadResource) -> Result<()> {
        self.offered.lock().unwrap().push(resource.clone());
        Ok(())
    }

    fn release(&self, resource: &DownloadResource) {
        self.released.lock().unwrap().push(resource.file_name.clone());
    }
}

struct Harness {
    engine: Arc<FakeEngine>,
    parameters: Arc<FakeParameters>,
    session: Arc<FakeSession>,
    downloads: Arc<FakeDownloads>,
    exporter: Exporter,
}

fn editing_context() -> EditorContext {
    EditorContext::new("T0", "db-open").with_names("Open Family", "Medium Italic")
}

fn default_parameters() -> FakeParameters {
    FakeParameters::default()
        .with("dbA", &[("weight", 400.0), ("width", 1.0)])
        .with("dbB", &[("weight", 700.0), ("width", 1.0)])
        .with("dbC", &[("weight", 300.0)])
}

fn harness(plan: &'static str, engine: FakeEngine, config: ExportConfig) -> Harness {
    let engine = Arc::new(engine);
    let parameters = Arc::new(default_parameters());
    let session = Arc::new(FakeSession::new(editing_context()));
    let downloads = Arc::new(FakeDownloads::default());
    let exporter = Exporter::new(
        Collaborators {
            engine: engine.clone(),
            parameters: parameters.clone(),
            session: session.clone(),
            entitlements: Arc::new(FakePlan(plan)),
            downloads: downloads.clone(),
        },
        Arc::new(ProgressStore::new()),
        config,
    );
    Harness { engine, parameters, session, downloads, exporter }
}

fn sans(variants: &[(&str, &str)]) -> FamilyExport {
    FamilyExport::new(
        FamilyRef::new("Sans", "T1"),
        variants.iter().map(|(name, db)| VariantRef::new(*name, *db)),
    )
}

fn zip_entries(bytes: &[u8]) -> Vec<(String, String)> {
    let mut zip = ZipArchive::new(Cursor::new(bytes)).unwrap();
    (0..zip.len())
        .map(|i| {
            let mut file = zip.by_index(i).unwrap();
            let mut content = String::new();
            file.read_to_string(&mut content).unwrap();
            (file.name().to_string(), content)
        })
        .collect()
}

fn drain(rx: &Receiver<ExportProgress>) -> Vec<ExportProgress> {
    rx.try_iter().collect()
}

// ============================================================================
// Family export
// ============================================================================

#[test]
fn test_family_export_scenario() {
    // Regular renders slowest; the archive must still follow variant order.
    let engine = FakeEngine {
        delays: HashMap::from([("Regular".to_string(), Duration::from_millis(80))]),
        ..FakeEngine::default()
    };
    let h = harness("personal_monthly", engine, ExportConfig::default());

    let report = h.exporter.export_family(sans(&[("Regular", "dbA"), ("Bold", "dbB")])).unwrap();

    let mut fetched = h.parameters.fetched.lock().unwrap().clone();
    fetched.sort();
    assert_eq!(fetched, ["dbA", "dbB"]);
    let mut rendered = h.engine.rendered.lock().unwrap().clone();
    rendered.sort();
    assert_eq!(rendered, ["Bold", "Regular"]);

    assert_eq!(report.file_name, "Sans.zip");
    assert_eq!(report.entries, ["Regular.otf", "Bold.otf"]);

    let offered = h.downloads.offered.lock().unwrap().clone();
    assert_eq!(offered.len(), 1);
    assert_eq!(offered[0].file_name, "Sans.zip");
    assert_eq!(offered[0].media_type, "application/zip");
    assert_eq!(
        zip_entries(&offered[0].bytes),
        [
            ("Regular.otf".to_string(), "Sans/Regular/2".to_string()),
            ("Bold.otf".to_string(), "Sans/Bold/2".to_string()),
        ]
    );

    assert_eq!(h.exporter.progress().snapshot(), ExportProgress::default());
}

#[test]
fn test_family_export_swaps_and_restores_context() {
    let h = harness("personal_monthly", FakeEngine::default(), ExportConfig::default());
    h.exporter.export_family(sans(&[("Regular", "dbA")])).unwrap();

    let history = h.session.history.lock().unwrap().clone();
    assert_eq!(history, [EditorContext::new("T1", "default"), editing_context()]);
    assert_eq!(h.session.current_context(), editing_context());
    assert_eq!(*h.engine.zip_flags.lock().unwrap(), [true, false]);
    assert_eq!(h.engine.resets.load(Ordering::SeqCst), 1);
}

#[test]
fn test_family_export_releases_resource_after_grace() {
    let config = ExportConfig::default().with_release_grace(Duration::from_millis(30));
    let h = harness("personal_monthly", FakeEngine::default(), config);
    h.exporter.export_family(sans(&[("Regular", "dbA")])).unwrap();

    h.exporter.wait_for_cleanup();
    assert_eq!(*h.downloads.released.lock().unwrap(), ["Sans.zip"]);
}

#[test]
fn test_family_progress_counts_each_render_once() {
    let h = harness("personal_monthly", FakeEngine::default(), ExportConfig::default());
    let rx = h.exporter.progress().subscribe();

    h.exporter
        .export_family(sans(&[("Regular", "dbA"), ("Bold", "dbB"), ("Light", "dbC")]))
        .unwrap();

    let snapshots = drain(&rx);
    let first = &snapshots[0];
    assert!(first.exporting);
    assert_eq!(first.family_exported.as_deref(), Some("Sans"));
    assert_eq!(first.variant_to_export, Some(3));
    assert_eq!(first.exported_variant, 0);

    let counts: Vec<_> = snapshots
        .iter()
        .take_while(|p| p.state != ExportState::Idle || p.exporting)
        .map(|p| p.exported_variant)
        .collect();
    assert!(counts.windows(2).all(|w| w[1] == w[0] || w[1] == w[0] + 1));
    assert_eq!(counts.windows(2).filter(|w| w[1] == w[0] + 1).count(), 3);

    let packaging = snapshots.iter().position(|p| p.state == ExportState::Packaging).unwrap();
    let reached_total = snapshots.iter().position(|p| p.exported_variant == 3).unwrap();
    assert!(reached_total < packaging);

    assert_eq!(snapshots.last().unwrap(), &ExportProgress::default());
}

#[test]
fn test_family_export_rejects_concurrent_start() {
    let engine = FakeEngine {
        delays: HashMap::from([("Regular".to_string(), Duration::from_millis(200))]),
        ..FakeEngine::default()
    };
    let h = harness("personal_monthly", engine, ExportConfig::default());

    let handle = h.exporter.start_family_export(sans(&[("Regular", "dbA")])).unwrap();
    let second = h.exporter.start_family_export(sans(&[("Bold", "dbB")]));
    assert!(matches!(second, Err(Error::ExportInFlight(id)) if id == handle.id().get()));
    assert!(matches!(h.exporter.export_otf(&OtfExport::default()), Err(Error::ExportInFlight(_))));

    let report = handle.wait().unwrap();
    assert_eq!(report.entries, ["Regular.otf"]);
    assert_eq!(h.downloads.offered.lock().unwrap().len(), 1);
}

#[test]
fn test_family_render_failure_aborts_and_cleans_up() {
    let engine = FakeEngine { failing_style: Some("Bold".to_string()), ..FakeEngine::default() };
    let h = harness("personal_monthly", engine, ExportConfig::default());

    let err = h
        .exporter
        .export_family(sans(&[("Regular", "dbA"), ("Bold", "dbB")]))
        .unwrap_err();
    assert!(matches!(err, Error::Render { ref variant, .. } if variant == "Bold"));

    let snapshot = h.exporter.progress().snapshot();
    assert!(!snapshot.exporting);
    assert!(snapshot.error_export);
    assert_eq!(snapshot.variant_to_export, None);
    assert_eq!(snapshot.exported_variant, 0);
    assert_eq!(snapshot.family_exported, None);
    assert_eq!(h.exporter.progress().active(), None);

    assert_eq!(h.session.current_context(), editing_context());
    assert_eq!(*h.engine.zip_flags.lock().unwrap(), [true, false]);
    assert!(h.downloads.offered.lock().unwrap().is_empty());
}

#[test]
fn test_family_engine_panic_cleans_up() {
    let engine = FakeEngine { panicking_style: Some("Bold".to_string()), ..FakeEngine::default() };
    let h = harness("personal_monthly", engine, ExportConfig::default());

    let err = h
        .exporter
        .export_family(sans(&[("Regular", "dbA"), ("Bold", "dbB")]))
        .unwrap_err();
    assert!(matches!(err, Error::WorkerPanicked));

    let snapshot = h.exporter.progress().snapshot();
    assert!(!snapshot.exporting);
    assert!(snapshot.error_export);
    assert_eq!(snapshot.state, ExportState::Idle);
    assert_eq!(h.exporter.progress().active(), None);
    assert_eq!(h.session.current_context(), editing_context());
    assert_eq!(*h.engine.zip_flags.lock().unwrap(), [true, false]);

    let report = h.exporter.export_family(sans(&[("Regular", "dbA")])).unwrap();
    assert_eq!(report.entries, ["Regular.otf"]);
}

#[test]
fn test_family_fetch_failure_names_variant() {
    let h = harness("personal_monthly", FakeEngine::default(), ExportConfig::default());
    let err = h
        .exporter
        .export_family(sans(&[("Regular", "dbA"), ("Ghost", "missing")]))
        .unwrap_err();
    assert!(matches!(err, Error::Fetch { ref variant, .. } if variant == "Ghost"));
    assert!(h.engine.rendered.lock().unwrap().is_empty());
    assert!(h.exporter.progress().snapshot().error_export);
}

#[test]
fn test_family_template_failure() {
    let h = harness("personal_monthly", FakeEngine::default(), ExportConfig::default());
    let request = FamilyExport::new(FamilyRef::new("Sans", "broken"), [VariantRef::new("Regular", "dbA")]);

    let err = h.exporter.export_family(request).unwrap_err();
    assert!(matches!(err, Error::TemplateSwap { ref template, .. } if template == "broken"));
    assert!(h.parameters.fetched.lock().unwrap().is_empty());
    assert_eq!(h.session.current_context(), editing_context());
}

#[test]
fn test_family_export_needs_variants() {
    let h = harness("personal_monthly", FakeEngine::default(), ExportConfig::default());
    let rx = h.exporter.progress().subscribe();
    let err = h.exporter.export_family(sans(&[])).unwrap_err();
    assert!(matches!(err, Error::NoVariants(ref family) if family == "Sans"));
    assert!(drain(&rx).is_empty());
}

#[test]
fn test_family_export_denied_on_free_plan() {
    let h = harness("free_monthly", FakeEngine::default(), ExportConfig::default());
    let rx = h.exporter.progress().subscribe();

    let err = h.exporter.export_family(sans(&[("Regular", "dbA")])).unwrap_err();
    assert!(matches!(err, Error::EntitlementDenied(_)));
    assert!(drain(&rx).is_empty());
    assert!(h.session.history.lock().unwrap().is_empty());
}

#[test]
fn test_exporter_recovers_after_error() {
    let h = harness("personal_monthly", FakeEngine::default(), ExportConfig::default());
    assert!(h.exporter.export_family(sans(&[("Ghost", "missing")])).is_err());

    h.exporter.progress().dismiss_error();
    assert_eq!(h.exporter.progress().snapshot(), ExportProgress::default());

    let report = h.exporter.export_family(sans(&[("Bold", "dbB")])).unwrap();
    assert_eq!(report.entries, ["Bold.otf"]);
}

// ============================================================================
// Single font export
// ============================================================================

#[test]
fn test_otf_export_uses_editor_names() {
    let h = harness("personal_monthly", FakeEngine::default(), ExportConfig::default());
    let request = OtfExport { merged: true, ..OtfExport::default() };

    let report = h.exporter.export_otf(&request).unwrap();
    assert_eq!(report.file_name, "Open-Family-medium-italic.otf");

    let offered = h.downloads.offered.lock().unwrap().clone();
    assert_eq!(offered.len(), 1);
    assert_eq!(offered[0].media_type, "font/otf");
    assert_eq!(offered[0].bytes, b"Open-Family/medium-italic/true/designer@example.com");
    assert_eq!(h.exporter.progress().snapshot(), ExportProgress::default());
}

#[test]
fn test_otf_export_as() {
    let h = harness("personal_monthly", FakeEngine::default(), ExportConfig::default());
    let request = OtfExport {
        family_name: "Display".to_string(),
        variant_name: "Heavy".to_string(),
        export_as: true,
        ..OtfExport::default()
    };
    let report = h.exporter.export_otf(&request).unwrap();
    assert_eq!(report.file_name, "Display-heavy.otf");
}

#[test]
fn test_otf_export_denied_on_free_plan() {
    let h = harness("free_annual", FakeEngine::default(), ExportConfig::default());
    let rx = h.exporter.progress().subscribe();

    let err = h.exporter.export_otf(&OtfExport::default()).unwrap_err();
    assert!(matches!(err, Error::EntitlementDenied(ref plan) if plan == "free_annual"));
    assert!(drain(&rx).is_empty());
    assert_eq!(h.engine.current_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_otf_export_timeout_reports_once() {
    let engine = FakeEngine { current_delay: Duration::from_millis(250), ..FakeEngine::default() };
    let config = ExportConfig::default().with_render_deadline(Duration::from_millis(40));
    let h = harness("personal_monthly", engine, config);
    let rx = h.exporter.progress().subscribe();

    let err = h.exporter.export_otf(&OtfExport::default()).unwrap_err();
    assert!(matches!(err, Error::RenderTimeout(d) if d == Duration::from_millis(40)));

    let snapshot = h.exporter.progress().snapshot();
    assert!(!snapshot.exporting);
    assert!(snapshot.error_export);

    // Let the abandoned render finish.
    sleep(Duration::from_millis(400));
    assert_eq!(h.engine.current_calls.load(Ordering::SeqCst), 1);

    let snapshots = drain(&rx);
    assert_eq!(snapshots.iter().filter(|p| p.error_export).count(), 1);
    let last = snapshots.last().unwrap();
    assert!(last.error_export);
    assert_eq!(last.state, ExportState::Errored);
    assert!(h.downloads.offered.lock().unwrap().is_empty());
}

#[test]
fn test_otf_engine_panic_reports_before_deadline() {
    let engine = FakeEngine { panic_current: true, ..FakeEngine::default() };
    let config = ExportConfig::default().with_render_deadline(Duration::from_secs(5));
    let h = harness("personal_monthly", engine, config);

    let started = Instant::now();
    let err = h.exporter.export_otf(&OtfExport::default()).unwrap_err();
    assert!(matches!(err, Error::RenderAbandoned));
    assert!(started.elapsed() < Duration::from_secs(2));

    let snapshot = h.exporter.progress().snapshot();
    assert!(!snapshot.exporting);
    assert!(snapshot.error_export);
    assert_eq!(h.exporter.progress().active(), None);
    assert!(h.downloads.offered.lock().unwrap().is_empty());
}

#[test]
fn test_otf_export_beats_deadline() {
    let engine = FakeEngine { current_delay: Duration::from_millis(5), ..FakeEngine::default() };
    let config = ExportConfig::default().with_render_deadline(Duration::from_millis(500));
    let h = harness("personal_monthly", engine, config);
    let rx = h.exporter.progress().subscribe();

    h.exporter.export_otf(&OtfExport::default()).unwrap();
    sleep(Duration::from_millis(600));

    assert!(drain(&rx).iter().all(|p| !p.error_export));
    assert!(!h.exporter.progress().snapshot().error_export);
}

#[test]
fn test_set_up_export_as() {
    let h = harness("personal_monthly", FakeEngine::default(), ExportConfig::default());
    h.exporter.set_up_export_as(true, true).unwrap();
    let settings = h.exporter.progress().export_as().unwrap();
    assert!(settings.merged);
    assert!(settings.export_as);

    let denied = harness("free_monthly", FakeEngine::default(), ExportConfig::default());
    assert!(matches!(denied.exporter.set_up_export_as(true, true), Err(Error::EntitlementDenied(_))));
    assert_eq!(denied.exporter.progress().export_as(), None);
}
