//! Core types for Testdrive

use bytes::Bytes;
use serde::Serialize;

/// Timestamp for entries that are always considered changed
/// (web addresses and entries that have not been resolved yet).
pub const UNKNOWN_TIMESTAMP: i64 = -1;

/// Identity used for deduplication and exclusion:
/// two entries describing the same file revision are interchangeable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileKey {
    pub path: String,
    pub timestamp: i64,
    pub is_patch: bool,
}

/// A single file or resource reference flowing through the pipeline
#[derive(Debug, Clone, Serialize)]
pub struct FileEntry {
    /// Path as written in the configuration
    declared_path: String,

    /// Absolute path (or web address) once resolved
    resolved_path: Option<String>,

    /// Sanitized, traversal-free label shown to clients
    display_path: String,

    /// Last-modified time in milliseconds, or [`UNKNOWN_TIMESTAMP`]
    timestamp: i64,

    #[serde(skip)]
    content: Option<Bytes>,

    is_patch: bool,
    serve_only: bool,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    patches: Vec<FileEntry>,
}

impl FileEntry {
    /// An entry as declared in configuration, before resolution
    pub fn unresolved(declared_path: impl Into<String>) -> Self {
        let declared_path = declared_path.into();
        Self {
            display_path: declared_path.clone(),
            declared_path,
            resolved_path: None,
            timestamp: UNKNOWN_TIMESTAMP,
            content: None,
            is_patch: false,
            serve_only: false,
            patches: Vec::new(),
        }
    }

    /// An already-resolved entry whose content is embedded
    pub fn with_content(
        path: impl Into<String>,
        timestamp: i64,
        content: impl Into<Bytes>,
    ) -> Self {
        let path = path.into();
        Self {
            declared_path: path.clone(),
            resolved_path: Some(path.clone()),
            display_path: path,
            timestamp,
            content: Some(content.into()),
            is_patch: false,
            serve_only: false,
            patches: Vec::new(),
        }
    }

    pub fn patch(mut self) -> Self {
        self.is_patch = true;
        self
    }

    pub fn serve_only(mut self) -> Self {
        self.serve_only = true;
        self
    }

    pub fn set_serve_only(&mut self, serve_only: bool) {
        self.serve_only = serve_only;
    }

    /// Derive the resolved form of this entry, keeping its patch and serve-only flags
    pub fn from_resolved_path(
        &self,
        resolved_path: impl Into<String>,
        display_path: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        Self {
            declared_path: self.declared_path.clone(),
            resolved_path: Some(resolved_path.into()),
            display_path: display_path.into(),
            timestamp,
            content: self.content.clone(),
            is_patch: self.is_patch,
            serve_only: self.serve_only,
            patches: Vec::new(),
        }
    }

    /// Copy of this entry carrying the given content
    pub fn load(&self, content: impl Into<Bytes>) -> Self {
        let mut loaded = self.clone();
        loaded.content = Some(content.into());
        loaded
    }

    pub fn declared_path(&self) -> &str {
        &self.declared_path
    }

    /// Resolved path when known, declared path otherwise
    pub fn path(&self) -> &str {
        self.resolved_path.as_deref().unwrap_or(&self.declared_path)
    }

    pub fn display_path(&self) -> &str {
        &self.display_path
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn content(&self) -> Option<&Bytes> {
        self.content.as_ref()
    }

    pub fn is_patch(&self) -> bool {
        self.is_patch
    }

    pub fn is_serve_only(&self) -> bool {
        self.serve_only
    }

    pub fn patches(&self) -> &[FileEntry] {
        &self.patches
    }

    pub(crate) fn add_patch(&mut self, patch: FileEntry) {
        self.patches.push(patch);
    }

    pub(crate) fn patches_mut(&mut self) -> &mut [FileEntry] {
        &mut self.patches
    }

    pub fn is_web_address(&self) -> bool {
        is_web_address(&self.declared_path)
    }

    pub fn key(&self) -> FileKey {
        FileKey {
            path: self.path().to_string(),
            timestamp: self.timestamp,
            is_patch: self.is_patch,
        }
    }
}

impl PartialEq for FileEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for FileEntry {}

impl std::fmt::Display for FileEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_patch {
            write!(f, "patch {}", self.path())
        } else {
            write!(f, "{}", self.path())
        }
    }
}

/// Whether a path names an http(s) resource rather than a file
pub fn is_web_address(path: &str) -> bool {
    path.starts_with("http://") || path.starts_with("https://")
}

/// A plugin declaration: resolved like a file but never globbed or patched
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Plugin {
    pub name: String,
    pub path: String,
    pub module: String,
    pub args: Vec<String>,
}

impl Plugin {
    pub fn new(
        name: impl Into<String>,
        path: impl Into<String>,
        module: impl Into<String>,
        args: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            module: module.into(),
            args,
        }
    }

    /// Split a comma separated argument string; empty input gives no arguments
    pub fn parse_args(args: Option<&str>) -> Vec<String> {
        args.map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
    }

    pub fn with_resolved_path(&self, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..self.clone()
        }
    }
}

/// A declared path that resolved but could not be read
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnreadableFile {
    pub declared_path: String,
    pub resolved_path: String,
}

impl UnreadableFile {
    pub fn new(declared_path: impl Into<String>, resolved_path: impl Into<String>) -> Self {
        Self {
            declared_path: declared_path.into(),
            resolved_path: resolved_path.into(),
        }
    }
}
