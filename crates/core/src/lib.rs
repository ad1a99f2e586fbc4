//! fontpress core - export orchestration for font families.
//!
//! An [`Exporter`] swaps the editor to a family's template, fetches every
//! variant's parameter values, renders each variant to an OpenType buffer,
//! packs the buffers into a zip archive and hands it to a download surface,
//! publishing [`ExportProgress`] along the way.

pub mod archive;
pub mod config;
pub mod engine;
pub mod error;
pub mod exporter;
pub mod model;
pub mod progress;
pub mod schedule;
pub mod state;

pub use archive::{DownloadResource, FamilyArchive};
pub use config::ExportConfig;
pub use engine::{DownloadSurface, EditorSession, Entitlements, ParameterStore, Plan, RenderEngine};
pub use error::{Error, Result};
pub use exporter::{Collaborators, ExportHandle, ExportReport, Exporter};
pub use model::{
    EditorContext, ExportAsSettings, FamilyExport, FamilyRef, FontName, FontParameterValues,
    OtfExport, RenderedVariant, VariantRef,
};
pub use progress::{ExportId, ExportProgress, ProgressStore};
pub use state::ExportState;
