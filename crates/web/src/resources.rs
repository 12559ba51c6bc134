//! Test resource delivery
//!
//! Browsers fetch every loaded script through `<prefix>/test/<path>`. The
//! handler looks the path up in the shared cache and writes the file bytes
//! unchanged. Unknown paths produce no output.

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use testdrive_common::{FileEntry, FileLookup, Result};
use tracing::debug;

/// Result of a delivery request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Content was written with this content type
    Served { content_type: String },
    /// Nothing is registered under the requested path
    NotFound,
}

/// Extension to content-type table
#[derive(Debug, Clone)]
pub struct MimeTable {
    types: HashMap<String, String>,
}

impl Default for MimeTable {
    fn default() -> Self {
        let types = [
            ("js", "application/javascript"),
            ("css", "text/css"),
            ("html", "text/html"),
            ("htm", "text/html"),
            ("json", "application/json"),
            ("txt", "text/plain"),
            ("png", "image/png"),
            ("gif", "image/gif"),
            ("jpg", "image/jpeg"),
            ("jpeg", "image/jpeg"),
            ("svg", "image/svg+xml"),
            ("ico", "image/x-icon"),
        ]
        .into_iter()
        .map(|(ext, mime)| (ext.to_string(), mime.to_string()))
        .collect();
        Self { types }
    }
}

impl MimeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or override the type for an extension (without the dot)
    pub fn with_type(mut self, extension: &str, mime: &str) -> Self {
        self.types
            .insert(extension.to_ascii_lowercase(), mime.to_string());
        self
    }

    pub fn content_type(&self, path: &str) -> String {
        let extension = Path::new(path)
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase());
        extension
            .and_then(|ext| self.types.get(&ext).cloned())
            .unwrap_or_else(|| {
                mime_guess::from_path(path)
                    .first_or_octet_stream()
                    .to_string()
            })
    }
}

/// Writes cached file bytes for a requested path
#[derive(Clone)]
pub struct ResourceDeliveryHandler {
    files: Arc<dyn FileLookup>,
    mime: MimeTable,
}

impl ResourceDeliveryHandler {
    pub fn new(files: Arc<dyn FileLookup>, mime: MimeTable) -> Self {
        Self { files, mime }
    }

    /// Write the content registered under `path` to `out`.
    ///
    /// Files cached without content are read from disk with blocking I/O.
    /// Web addresses are never fetched here.
    pub fn service(&self, path: &str, out: &mut impl Write) -> Result<DeliveryOutcome> {
        let Some(file) = self.lookup(path) else {
            return Ok(DeliveryOutcome::NotFound);
        };
        let file = match file.content() {
            Some(_) => file,
            None => file.load(std::fs::read(file.path())?),
        };
        self.write_entry(&file, out)
    }

    /// Same as [`service`](Self::service), reading uncached files through
    /// `tokio::fs` so request handlers never block a runtime worker.
    pub async fn deliver(&self, path: &str, out: &mut Vec<u8>) -> Result<DeliveryOutcome> {
        let Some(file) = self.lookup(path) else {
            return Ok(DeliveryOutcome::NotFound);
        };
        let file = match file.content() {
            Some(_) => file,
            None => file.load(tokio::fs::read(file.path()).await?),
        };
        self.write_entry(&file, out)
    }

    /// Entry registered under `path`, unless it is a web address without content
    fn lookup(&self, path: &str) -> Option<FileEntry> {
        let Some(file) = self.files.lookup(path) else {
            debug!("No file registered for {}", path);
            return None;
        };
        if file.content().is_none() && file.is_web_address() {
            debug!("{} is a web address without content", path);
            return None;
        }
        Some(file)
    }

    fn write_entry(&self, file: &FileEntry, out: &mut impl Write) -> Result<DeliveryOutcome> {
        if let Some(content) = file.content() {
            out.write_all(content)?;
        }
        Ok(DeliveryOutcome::Served {
            content_type: self.mime.content_type(file.path()),
        })
    }
}
