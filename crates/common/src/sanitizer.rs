//! Display labels for resolved paths

use std::path::{Component, Path, PathBuf};

/// Leading segment of labels for paths outside the base directory
pub const OUTSIDE_BASE_SEGMENT: &str = "_abs_";

/// Converts absolute resolved paths into traversal-free labels for clients.
///
/// Paths under the base directory become base-relative. Anything else keeps
/// its full path without the root, behind an [`OUTSIDE_BASE_SEGMENT`]
/// segment so it never collides with a base-relative label. Labels always
/// use `/` separators.
#[derive(Debug, Clone)]
pub struct DisplayPathSanitizer {
    base: PathBuf,
}

impl DisplayPathSanitizer {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn sanitize(&self, absolute_path: &str) -> String {
        let path = Path::new(absolute_path);
        let (relative, outside) = match path.strip_prefix(&self.base) {
            Ok(relative) => (relative, false),
            Err(_) => (path, true),
        };

        let segments = relative.components().filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            Component::ParentDir => Some("_dot_dot_".to_string()),
            Component::RootDir | Component::Prefix(_) | Component::CurDir => None,
        });

        let mut label: Vec<String> = Vec::new();
        if outside {
            label.push(OUTSIDE_BASE_SEGMENT.to_string());
        }
        label.extend(segments);
        label.join("/")
    }
}
