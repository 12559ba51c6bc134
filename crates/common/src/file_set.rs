//! Insertion-ordered, deduplicating collection of file entries

use indexmap::IndexMap;

use crate::types::{FileEntry, FileKey};

/// Ordered set of [`FileEntry`] keyed by [`FileKey`].
///
/// The first insertion of a key wins and keeps its position.
#[derive(Debug, Clone, Default)]
pub struct FileSet {
    entries: IndexMap<FileKey, FileEntry>,
}

impl FileSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry; returns false if an equal entry was already present
    pub fn insert(&mut self, entry: FileEntry) -> bool {
        let key = entry.key();
        if self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(key, entry);
        true
    }

    /// Remove every entry whose identity appears in `other`, preserving order
    pub fn remove_all(&mut self, other: &FileSet) {
        self.entries.retain(|key, _| !other.entries.contains_key(key));
    }

    /// Copy of this set without the entries of `other`
    pub fn difference(&self, other: &FileSet) -> FileSet {
        let mut result = self.clone();
        result.remove_all(other);
        result
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FileEntry> {
        self.entries.values()
    }

    pub fn to_vec(&self) -> Vec<FileEntry> {
        self.entries.values().cloned().collect()
    }
}

impl FromIterator<FileEntry> for FileSet {
    fn from_iter<I: IntoIterator<Item = FileEntry>>(iter: I) -> Self {
        let mut set = FileSet::new();
        for entry in iter {
            set.insert(entry);
        }
        set
    }
}

impl Extend<FileEntry> for FileSet {
    fn extend<I: IntoIterator<Item = FileEntry>>(&mut self, iter: I) {
        for entry in iter {
            self.insert(entry);
        }
    }
}

impl IntoIterator for FileSet {
    type Item = FileEntry;
    type IntoIter = indexmap::map::IntoValues<FileKey, FileEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_values()
    }
}

impl<'a> IntoIterator for &'a FileSet {
    type Item = &'a FileEntry;
    type IntoIter = indexmap::map::Values<'a, FileKey, FileEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str, ts: i64) -> FileEntry {
        FileEntry::with_content(path, ts, "")
    }

    #[test]
    fn test_keeps_first_insertion_order() {
        let mut set = FileSet::new();
        assert!(set.insert(entry("/b.js", 1)));
        assert!(set.insert(entry("/a.js", 1)));
        assert!(!set.insert(entry("/b.js", 1)));

        let paths: Vec<_> = set.iter().map(|e| e.path().to_string()).collect();
        assert_eq!(paths, vec!["/b.js", "/a.js"]);
    }

    #[test]
    fn test_remove_all_by_identity() {
        let set: FileSet = vec![entry("/a.js", 1), entry("/b.js", 1), entry("/c.js", 1)]
            .into_iter()
            .collect();
        let excluded: FileSet = vec![entry("/b.js", 1), entry("/c.js", 2)].into_iter().collect();

        let remaining = set.difference(&excluded);
        let paths: Vec<_> = remaining.iter().map(|e| e.path().to_string()).collect();
        assert_eq!(paths, vec!["/a.js", "/c.js"]);
    }
}
