//! Configuration constants for exports.

use std::time::Duration;

/// How long a single-variant render may take before the export is reported as failed.
pub const RENDER_DEADLINE: Duration = Duration::from_millis(10_000);

/// Grace period before an offered download resource is released.
pub const RELEASE_GRACE: Duration = Duration::from_millis(100);

/// Data partition the editor switches to while a family export renders.
pub const SCRATCH_PARTITION: &str = "default";

/// Plan identifiers containing this marker may not export.
pub const FREE_PLAN_MARKER: &str = "free_";

/// Extension of every font entry in a family archive.
pub const FONT_EXTENSION: &str = "otf";

/// Media type of a single exported font.
pub const FONT_MEDIA_TYPE: &str = "font/otf";

/// Media type of a family archive.
pub const ARCHIVE_MEDIA_TYPE: &str = "application/zip";

/// Family name used when the editor has none.
pub const DEFAULT_FAMILY_NAME: &str = "font";

/// Variant name used when the editor has none.
pub const DEFAULT_VARIANT_NAME: &str = "regular";

/// Tunables for an [`Exporter`](crate::Exporter).
#[derive(Debug, Clone)]
pub struct ExportConfig {
    pub render_deadline: Duration,
    pub release_grace: Duration,
    pub scratch_partition: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            render_deadline: RENDER_DEADLINE,
            release_grace: RELEASE_GRACE,
            scratch_partition: SCRATCH_PARTITION.to_string(),
        }
    }
}

impl ExportConfig {
    pub fn with_render_deadline(mut self, deadline: Duration) -> Self {
        self.render_deadline = deadline;
        self
    }

    pub fn with_release_grace(mut self, grace: Duration) -> Self {
        self.release_grace = grace;
        self
    }

    pub fn with_scratch_partition(mut self, partition: impl Into<String>) -> Self {
        self.scratch_partition = partition.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_deadline() {
        let config = ExportConfig::default();
        assert_eq!(config.render_deadline, Duration::from_secs(10));
        assert_eq!(config.release_grace, Duration::from_millis(100));
        assert_eq!(config.scratch_partition, "default");
    }

    #[test]
    fn test_builders() {
        let config = ExportConfig::default()
            .with_render_deadline(Duration::from_millis(50))
            .with_scratch_partition("scratch");
        assert_eq!(config.render_deadline, Duration::from_millis(50));
        assert_eq!(config.scratch_partition, "scratch");
    }
}
