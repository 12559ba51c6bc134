//! Path resolution
//!
//! Turns declared configuration entries into concrete files:
//! - Expands glob patterns (e.g. `*.js`) in the final path segment
//! - Collapses `..` references without following symlinks
//! - Stamps each file with its last-modified time and display label
//! - Attaches `patch` entries to the file declared before them
//!
//! Unreadable files are collected over the whole pass and reported together.

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use glob::{MatchOptions, Pattern};
use tracing::debug;

use crate::file_set::FileSet;
use crate::sanitizer::DisplayPathSanitizer;
use crate::types::{FileEntry, Plugin, UnreadableFile, UNKNOWN_TIMESTAMP};
use crate::{Error, Result};

/// Transform applied to the fully resolved file set, before patches are consolidated
pub trait FileParsePostProcessor: Send + Sync {
    fn process(&self, files: FileSet) -> FileSet;
}

const NAME_MATCH: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Resolves declared paths, globs and plugins against a base directory
#[derive(Clone)]
pub struct PathResolver {
    base_dir: PathBuf,
    processors: Vec<Arc<dyn FileParsePostProcessor>>,
    sanitizer: DisplayPathSanitizer,
}

impl PathResolver {
    pub fn new(
        base_dir: impl Into<PathBuf>,
        processors: Vec<Arc<dyn FileParsePostProcessor>>,
        sanitizer: DisplayPathSanitizer,
    ) -> Self {
        let base_dir = base_dir.into();
        let base_dir = std::path::absolute(&base_dir).unwrap_or(base_dir);
        Self {
            base_dir: collapse_parent_references(&base_dir),
            processors,
            sanitizer,
        }
    }

    /// Resolver with no post-processors, labelling paths relative to `base_dir`
    pub fn for_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        let base_dir = collapse_parent_references(
            &std::path::absolute(&base_dir).unwrap_or_else(|_| base_dir.clone()),
        );
        Self::new(base_dir.clone(), Vec::new(), DisplayPathSanitizer::new(base_dir))
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Full path to a resource without following symlinks
    pub fn resolve_path(&self, file_path: &str) -> PathBuf {
        let declared = Path::new(file_path);
        let absolute = if declared.is_absolute() {
            declared.to_path_buf()
        } else {
            self.base_dir.join(declared)
        };
        collapse_parent_references(&absolute)
    }

    /// Resolve declared entries into concrete files, in declaration order.
    ///
    /// Fails immediately when a pattern matches nothing or a patch has no
    /// file before it; unreadable matches are gathered and reported at once.
    pub fn resolve<'a>(
        &self,
        unresolved: impl IntoIterator<Item = &'a FileEntry>,
    ) -> Result<FileSet> {
        let mut resolved = FileSet::new();
        let mut unreadable = Vec::new();

        for entry in unresolved {
            let declared = entry.declared_path();

            if entry.is_web_address() {
                resolved.insert(entry.from_resolved_path(declared, declared, UNKNOWN_TIMESTAMP));
                continue;
            }

            let file = self.resolve_path(declared);
            let (dir, pattern) = match (file.parent(), file.file_name()) {
                (Some(dir), Some(name)) => (dir.to_path_buf(), name.to_string_lossy().into_owned()),
                _ => return Err(self.pattern_not_matched(declared, &file)),
            };

            for name in self.expand_glob(declared, &pattern, &dir)? {
                let source = dir.join(&name);
                let absolute_path = source.to_string_lossy().into_owned();

                let Some(timestamp) = readable_timestamp(&source) else {
                    unreadable.push(UnreadableFile::new(declared, absolute_path));
                    continue;
                };

                let display_path = self.sanitizer.sanitize(&absolute_path);
                resolved.insert(entry.from_resolved_path(absolute_path, display_path, timestamp));
            }
        }

        if !unreadable.is_empty() {
            return Err(Error::UnreadableFiles(unreadable));
        }

        let processed = self
            .processors
            .iter()
            .fold(resolved, |files, processor| processor.process(files));

        debug!("Resolved {} files under {}", processed.len(), self.base_dir.display());
        consolidate_patches(processed)
    }

    /// Resolve plugin artifacts: absolute path plus readability, never globbed
    pub fn resolve_plugins(&self, plugins: &[Plugin]) -> Result<Vec<Plugin>> {
        let mut resolved: Vec<Plugin> = Vec::with_capacity(plugins.len());
        let mut unreadable = Vec::new();

        for plugin in plugins {
            let file = self.resolve_path(&plugin.path);
            let absolute_path = file.to_string_lossy().into_owned();
            if readable_timestamp(&file).is_none() {
                unreadable.push(UnreadableFile::new(&plugin.path, absolute_path));
                continue;
            }
            let plugin = plugin.with_resolved_path(absolute_path);
            if !resolved.contains(&plugin) {
                resolved.push(plugin);
            }
        }

        if !unreadable.is_empty() {
            return Err(Error::UnreadableFiles(unreadable));
        }
        Ok(resolved)
    }

    fn expand_glob(&self, declared: &str, pattern: &str, dir: &Path) -> Result<Vec<String>> {
        let matcher = Pattern::new(pattern).ok();
        let matches_name = |name: &str| match &matcher {
            Some(glob) => glob.matches_with(name, NAME_MATCH),
            None => name.to_lowercase() == pattern.to_lowercase(),
        };

        let mut names: Vec<String> = match fs::read_dir(dir) {
            Ok(listing) => listing
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .filter(|name| matches_name(name.as_str()))
                .collect(),
            Err(e) => {
                debug!("Cannot list {}: {}", dir.display(), e);
                Vec::new()
            }
        };

        if names.is_empty() {
            return Err(self.pattern_not_matched(declared, dir));
        }

        names.sort_by_cached_key(|name| name.to_lowercase());
        Ok(names)
    }

    fn pattern_not_matched(&self, declared: &str, dir: &Path) -> Error {
        Error::PatternNotMatched {
            pattern: declared.to_string(),
            directory: dir.display().to_string(),
            base: self.base_dir.display().to_string(),
        }
    }
}

impl std::fmt::Debug for PathResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathResolver")
            .field("base_dir", &self.base_dir)
            .field("processors", &self.processors.len())
            .finish()
    }
}

/// Attach every patch to the closest preceding non-patch entry
fn consolidate_patches(files: FileSet) -> Result<FileSet> {
    let mut consolidated: Vec<FileEntry> = Vec::with_capacity(files.len());

    for entry in files {
        if !entry.is_patch() {
            consolidated.push(entry);
            continue;
        }
        match consolidated.last_mut() {
            Some(target) => target.add_patch(entry),
            None => return Err(Error::PatchWithoutTarget(entry.to_string())),
        }
    }

    Ok(consolidated.into_iter().collect())
}

/// Drop each `..` together with the segment before it; `.` segments vanish
fn collapse_parent_references(path: &Path) -> PathBuf {
    let mut resolved = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                resolved.pop();
            }
            Component::CurDir => {}
            other => resolved.push(other.as_os_str()),
        }
    }
    resolved
}

/// Last-modified millis for a readable file, `None` when it cannot be opened
fn readable_timestamp(path: &Path) -> Option<i64> {
    fs::File::open(path).ok()?;
    let modified = fs::metadata(path).ok()?.modified().ok()?;
    let millis = modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(UNKNOWN_TIMESTAMP);
    Some(millis)
}
