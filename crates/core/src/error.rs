//! Error types for export orchestration.

use std::{io, result, time::Duration};

use crate::state::ExportState;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can end an export.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("current plan {0:?} does not permit export")]
    EntitlementDenied(String),

    #[error("export {0} is already in flight")]
    ExportInFlight(u64),

    #[error("family {0:?} has no variants to export")]
    NoVariants(String),

    #[error("failed to load template {template:?} on partition {partition:?}")]
    TemplateSwap {
        template: String,
        partition: String,
        #[source]
        source: BoxError,
    },

    #[error("failed to fetch parameter values for variant {variant:?}")]
    Fetch {
        variant: String,
        #[source]
        source: BoxError,
    },

    #[error("failed to render variant {variant:?}")]
    Render {
        variant: String,
        #[source]
        source: BoxError,
    },

    #[error("render did not complete within {0:?}")]
    RenderTimeout(Duration),

    #[error("render worker exited without reporting a result")]
    RenderAbandoned,

    #[error("exported {exported} of {expected} variants")]
    ProgressOverflow { exported: usize, expected: usize },

    #[error("invalid export state transition {from:?} -> {to:?}")]
    InvalidTransition { from: ExportState, to: ExportState },

    #[error("export {0} is no longer active")]
    Inactive(u64),

    #[error("failed to build archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("failed to hand {file_name:?} to the download surface")]
    Download {
        file_name: String,
        #[source]
        source: BoxError,
    },

    #[error("export worker panicked")]
    WorkerPanicked,

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = result::Result<T, Error>;
