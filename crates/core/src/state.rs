//! Per-export state machine.

use crate::error::{Error, Result};

/// Where an export currently is.
///
/// `Idle` is both the initial and the only terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportState {
    #[default]
    Idle,
    /// Switching the editor to the export template.
    Preparing,
    FetchingValues,
    Rendering,
    Packaging,
    Downloading,
    /// The export failed and the error is being surfaced.
    Errored,
}

impl ExportState {
    /// Whether `self -> to` is a legal edge.
    pub fn can_enter(self, to: ExportState) -> bool {
        use ExportState::*;

        match (self, to) {
            (Idle, Preparing) | (Idle, Rendering) => true,
            (Preparing, FetchingValues) => true,
            (FetchingValues, Rendering) => true,
            (Rendering, Packaging) | (Rendering, Downloading) => true,
            (Packaging, Downloading) => true,
            (Downloading, Idle) => true,
            (Preparing | FetchingValues | Rendering | Packaging | Downloading, Errored) => true,
            (Errored, Idle) => true,
            (Idle | Preparing | FetchingValues | Rendering | Packaging | Downloading | Errored, _) => {
                false
            }
        }
    }

    pub fn enter(self, to: ExportState) -> Result<ExportState> {
        if self.can_enter(to) {
            Ok(to)
        } else {
            Err(Error::InvalidTransition { from: self, to })
        }
    }

    pub fn is_idle(self) -> bool {
        self == ExportState::Idle
    }
}
