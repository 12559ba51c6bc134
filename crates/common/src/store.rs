//! Test-case cache shared by the delivery handlers
//!
//! Cases are immutable once built. Registering a case under an existing id
//! swaps in a new `Arc`, so readers see either the old or the new case.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::debug;

use crate::types::FileEntry;
use crate::Result;

/// A named, ordered bundle of load, test and serve-only files
#[derive(Debug, Clone)]
pub struct CachedTestCase {
    id: String,
    load: Vec<FileEntry>,
    tests: Vec<FileEntry>,
    serve: Vec<FileEntry>,
}

impl CachedTestCase {
    pub fn new(
        id: impl Into<String>,
        load: Vec<FileEntry>,
        tests: Vec<FileEntry>,
        serve: Vec<FileEntry>,
    ) -> Self {
        Self {
            id: id.into(),
            load,
            tests,
            serve,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn load_files(&self) -> &[FileEntry] {
        &self.load
    }

    pub fn test_files(&self) -> &[FileEntry] {
        &self.tests
    }

    pub fn serve_files(&self) -> &[FileEntry] {
        &self.serve
    }

    /// Load files, then tests, then serve-only files
    pub fn iter(&self) -> impl Iterator<Item = &FileEntry> {
        self.load.iter().chain(&self.tests).chain(&self.serve)
    }

    /// Find a file (or a patch attached to one) by display or resolved path
    pub fn find_file(&self, path: &str) -> Option<&FileEntry> {
        self.iter().find_map(|file| {
            if serves_path(file, path) {
                return Some(file);
            }
            file.patches().iter().find(|patch| serves_path(patch, path))
        })
    }

    /// Copy of this case with every file's content read through `loader`
    pub fn with_loaded_files(&self, loader: &dyn FileLoader) -> Result<Self> {
        let load_all = |files: &[FileEntry]| -> Result<Vec<FileEntry>> {
            files.iter().map(|f| loader.load(f)).collect()
        };
        Ok(Self {
            id: self.id.clone(),
            load: load_all(&self.load)?,
            tests: load_all(&self.tests)?,
            serve: load_all(&self.serve)?,
        })
    }
}

impl<'a> IntoIterator for &'a CachedTestCase {
    type Item = &'a FileEntry;
    type IntoIter = Box<dyn Iterator<Item = &'a FileEntry> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

fn serves_path(file: &FileEntry, path: &str) -> bool {
    file.display_path() == path || file.path() == path
}

/// Lookup seam used by the resource delivery handler
pub trait FileLookup: Send + Sync {
    fn lookup(&self, path: &str) -> Option<FileEntry>;
}

/// Keyed store of test cases
#[derive(Debug, Default)]
pub struct TestCaseStore {
    cases: RwLock<IndexMap<String, Arc<CachedTestCase>>>,
}

impl TestCaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a case, replacing any case with the same id
    pub fn add_case(&self, case: CachedTestCase) {
        let case = Arc::new(case);
        debug!("Caching test case {} ({} files)", case.id(), case.iter().count());
        self.cases.write().insert(case.id().to_string(), case);
    }

    pub fn get_case(&self, id: &str) -> Option<Arc<CachedTestCase>> {
        self.cases.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.cases.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.read().is_empty()
    }
}

impl FileLookup for TestCaseStore {
    fn lookup(&self, path: &str) -> Option<FileEntry> {
        let cases = self.cases.read();
        cases
            .values()
            .find_map(|case| case.find_file(path).cloned())
    }
}

/// Flat path to file cache, keyed by display path
#[derive(Debug, Default)]
pub struct FilesCache {
    files: RwLock<IndexMap<String, FileEntry>>,
}

impl FilesCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_files(&self, files: impl IntoIterator<Item = FileEntry>) {
        let mut cache = self.files.write();
        for file in files {
            cache.insert(file.display_path().to_string(), file);
        }
    }

    pub fn files(&self) -> Vec<FileEntry> {
        self.files.read().values().cloned().collect()
    }

    pub fn clear(&self) {
        self.files.write().clear();
    }
}

impl FileLookup for FilesCache {
    fn lookup(&self, path: &str) -> Option<FileEntry> {
        let files = self.files.read();
        files
            .get(path)
            .or_else(|| files.values().find(|f| f.path() == path))
            .cloned()
    }
}

/// Reads file content into entries
pub trait FileLoader: Send + Sync {
    fn load(&self, file: &FileEntry) -> Result<FileEntry>;
}

/// Loads content from the local filesystem; web addresses are left alone
#[derive(Debug, Clone, Copy, Default)]
pub struct DiskFileLoader;

impl FileLoader for DiskFileLoader {
    fn load(&self, file: &FileEntry) -> Result<FileEntry> {
        let mut loaded = if file.is_web_address() || file.content().is_some() {
            file.clone()
        } else {
            file.load(std::fs::read(file.path())?)
        };
        for patch in loaded.patches_mut() {
            *patch = self.load(patch)?;
        }
        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn case(id: &str, contents: &[(&str, &str)]) -> CachedTestCase {
        let load = contents
            .iter()
            .map(|(path, data)| FileEntry::with_content(*path, -1, data.to_string()))
            .collect();
        CachedTestCase::new(id, load, Vec::new(), Vec::new())
    }

    #[test]
    fn test_missing_case_is_none() {
        let store = TestCaseStore::new();
        assert!(store.get_case("nope").is_none());
        assert!(store.lookup("dummy.js").is_none());
    }

    #[test]
    fn test_replacing_a_case_keeps_old_snapshot() {
        let store = TestCaseStore::new();
        store.add_case(case("id", &[("dummy.js", "data")]));
        let old = store.get_case("id").unwrap();

        store.add_case(case("id", &[("dummy.js", "new data")]));
        let new = store.get_case("id").unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(old.load_files()[0].content().unwrap().as_ref(), b"data");
        assert_eq!(new.load_files()[0].content().unwrap().as_ref(), b"new data");
    }

    #[test]
    fn test_lookup_across_cases_and_patches() {
        let store = TestCaseStore::new();
        store.add_case(case("a", &[("one.js", "1")]));

        let mut target = FileEntry::with_content("two.js", 5, "2");
        target.add_patch(FileEntry::with_content("two-patch.js", 5, "p").patch());
        store.add_case(CachedTestCase::new("b", vec![target], Vec::new(), Vec::new()));

        assert!(store.lookup("one.js").is_some());
        assert!(store.lookup("two-patch.js").unwrap().is_patch());
    }

    #[test]
    fn test_files_cache_lookup() {
        let cache = FilesCache::new();
        cache.add_files(vec![FileEntry::with_content("a.js", 1, "a")]);
        assert!(cache.lookup("a.js").is_some());
        assert!(cache.lookup("b.js").is_none());
        cache.clear();
        assert!(cache.files().is_empty());
    }

    #[test]
    fn test_disk_loader_reads_files_and_patches() {
        let tmp = TempDir::new().unwrap();
        let code = tmp.path().join("code.js");
        let patch = tmp.path().join("patch.js");
        std::fs::write(&code, "var a;").unwrap();
        std::fs::write(&patch, "a = 1;").unwrap();

        let mut entry = FileEntry::unresolved("code.js").from_resolved_path(
            code.to_string_lossy(),
            "code.js",
            1,
        );
        entry.add_patch(
            FileEntry::unresolved("patch.js")
                .patch()
                .from_resolved_path(patch.to_string_lossy(), "patch.js", 1),
        );
        let web = FileEntry::unresolved("http://cdn.example.com/x.js");

        let case = CachedTestCase::new("id", vec![entry, web], Vec::new(), Vec::new());
        let loaded = case.with_loaded_files(&DiskFileLoader).unwrap();

        let code = &loaded.load_files()[0];
        assert_eq!(code.content().unwrap().as_ref(), b"var a;");
        assert_eq!(code.patches()[0].content().unwrap().as_ref(), b"a = 1;");
        assert!(loaded.load_files()[1].content().is_none());
        assert!(case.load_files()[0].content().is_none());
    }
}
