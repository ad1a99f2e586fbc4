//! Collaborators the exporter drives.
//!
//! Implementations live outside this crate: a font rendering engine, the
//! parameter store, the editor session, the account's plan and wherever
//! downloads end up.

use anyhow::Result;

use crate::{
    archive::DownloadResource,
    config::FREE_PLAN_MARKER,
    model::{EditorContext, FontName, FontParameterValues, VariantRef},
};

/// Turns glyph parameter values into binary fonts.
pub trait RenderEngine: Send + Sync {
    /// Drop any queued render requests.
    fn reset_queue(&self);

    /// Tell the engine a multi-font archive export is running.
    fn set_exporting_zip(&self, exporting: bool);

    fn render(&self, name: &FontName, values: &FontParameterValues, merged: bool)
    -> Result<Vec<u8>>;

    /// Render the font currently loaded in the editor.
    fn render_current(&self, name: &FontName, merged: bool, account: Option<&str>)
    -> Result<Vec<u8>>;
}

/// Source of per-variant parameter values.
pub trait ParameterStore: Send + Sync {
    fn fetch_values(&self, variant: &VariantRef) -> Result<FontParameterValues>;
}

/// The editor whose active font a family export temporarily replaces.
pub trait EditorSession: Send + Sync {
    fn current_context(&self) -> EditorContext;

    /// Load `context`, returning once the engine reports the font loaded.
    fn change_font(&self, context: &EditorContext) -> Result<()>;
}

/// The account's subscription plan identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan(pub String);

impl Plan {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn permits_export(&self) -> bool {
        !self.0.contains(FREE_PLAN_MARKER)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

pub trait Entitlements: Send + Sync {
    fn plan(&self) -> Plan;

    fn account(&self) -> Option<String> {
        None
    }
}

/// Where finished exports are delivered.
pub trait DownloadSurface: Send + Sync {
    fn offer(&self, resource: &DownloadResource) -> Result<()>;

    /// Called once the grace period after [`DownloadSurface::offer`] elapsed.
    fn release(&self, resource: &DownloadResource);
}
