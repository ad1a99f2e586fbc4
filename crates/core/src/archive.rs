//! Packaging rendered fonts for download.

use std::io::{Cursor, Write};

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use zip::{
    CompressionMethod, DateTime, ZipWriter,
    write::SimpleFileOptions,
};

use crate::{
    config::{ARCHIVE_MEDIA_TYPE, FONT_MEDIA_TYPE},
    error::Result,
    model::{FontName, RenderedVariant},
};

/// Bytes handed to a download surface under a suggested file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadResource {
    pub file_name: String,
    pub media_type: &'static str,
    pub bytes: Vec<u8>,
}

impl DownloadResource {
    pub fn font(name: &FontName, bytes: Vec<u8>) -> Self {
        Self { file_name: name.file_name(), media_type: FONT_MEDIA_TYPE, bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The resource as a `data:` URI.
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.media_type, BASE64.encode(&self.bytes))
    }
}

/// Zip archive of a family's fonts, entries kept in insertion order.
pub struct FamilyArchive {
    writer: ZipWriter<Cursor<Vec<u8>>>,
    entries: Vec<String>,
}

impl Default for FamilyArchive {
    fn default() -> Self {
        Self::new()
    }
}

impl FamilyArchive {
    pub fn new() -> Self {
        Self { writer: ZipWriter::new(Cursor::new(Vec::new())), entries: Vec::new() }
    }

    fn options() -> SimpleFileOptions {
        // Fixed timestamps keep identical inputs byte-identical.
        SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(DateTime::default())
    }

    pub fn insert(&mut self, entry_name: &str, buffer: &[u8]) -> Result<()> {
        self.writer.start_file(entry_name, Self::options())?;
        self.writer.write_all(buffer)?;
        self.entries.push(entry_name.to_string());
        Ok(())
    }

    /// Insert every variant as `{variant}.otf`, in order.
    pub fn extend(&mut self, rendered: &[RenderedVariant]) -> Result<()> {
        rendered
            .iter()
            .try_for_each(|r| self.insert(&r.variant.entry_name(), &r.buffer))
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Finish the archive as a downloadable resource named `file_name`.
    pub fn serialize(self, file_name: impl Into<String>) -> Result<DownloadResource> {
        let bytes = self.writer.finish()?.into_inner();
        Ok(DownloadResource { file_name: file_name.into(), media_type: ARCHIVE_MEDIA_TYPE, bytes })
    }
}
