//! Photo library indexing: wholesale rescans producing immutable snapshots.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use serde::de::Deserializer;
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use crate::error::Error;

/// Directory-name substrings whose subtrees are excluded from indexing.
///
/// Entries are matched case-insensitively against each directory name; a hit
/// prunes the whole subtree, not just the directory itself.
#[derive(Debug, Clone, Default)]
pub struct Blacklist {
    entries: Vec<String>,
}

impl Blacklist {
    pub const DELIMITER: char = ';';

    pub fn parse(raw: &str) -> Self {
        let entries = raw
            .split(Self::DELIMITER)
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(str::to_lowercase)
            .collect();
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `name` contains any blacklisted substring, case-insensitively.
    pub fn matches(&self, name: &str) -> bool {
        if self.entries.is_empty() {
            return false;
        }
        let name = name.to_lowercase();
        self.entries.iter().any(|banned| name.contains(banned))
    }
}

impl fmt::Display for Blacklist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for entry in &self.entries {
            if !first {
                f.write_str(";")?;
            }
            f.write_str(entry)?;
            first = false;
        }
        Ok(())
    }
}

impl<'de> Deserialize<'de> for Blacklist {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

/// One immutable, fully-built view of the photo library.
///
/// Cloning is cheap; the path list is shared. Readers always observe either
/// the previous snapshot or this one in full, never a mix.
#[derive(Debug, Clone)]
pub struct Snapshot {
    generation: u64,
    paths: Arc<[PathBuf]>,
}

impl Snapshot {
    /// The pre-scan snapshot: generation zero, no photos.
    pub fn empty() -> Self {
        Self::new(0, Vec::new())
    }

    pub fn new(generation: u64, paths: Vec<PathBuf>) -> Self {
        Self {
            generation,
            paths: paths.into(),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn path_at(&self, index: usize) -> Option<&Path> {
        self.paths.get(index).map(PathBuf::as_path)
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

/// Walk the library root and collect every castable photo path, sorted
/// lexicographically.
///
/// Any directory whose name matches the blacklist is pruned together with its
/// whole subtree. Regular files are collected without extension filtering;
/// the photo server decides what it will actually serve.
///
/// # Errors
/// Returns [`Error::BadRoot`] when the root is missing or not a directory and
/// [`Error::Walk`] when the walk cannot start; the caller keeps its previous
/// snapshot in that case. Unreadable entries deeper in the tree are skipped.
pub fn scan_library(root: &Path, blacklist: &Blacklist) -> Result<Vec<PathBuf>, Error> {
    if !root.is_dir() {
        return Err(Error::BadRoot(root.display().to_string()));
    }

    let mut out = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| !is_blacklisted_dir(e, blacklist))
    {
        match entry {
            Ok(entry) => {
                if entry.file_type().is_file() {
                    out.push(entry.into_path());
                }
            }
            Err(err) if err.depth() == 0 => return Err(err.into()),
            Err(err) => {
                debug!(error = %err, "skipping unreadable entry");
            }
        }
    }

    out.sort();
    Ok(out)
}

fn is_blacklisted_dir(entry: &DirEntry, blacklist: &Blacklist) -> bool {
    // Never prune the root itself; its name is the operator's choice.
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return false;
    }
    entry
        .file_name()
        .to_str()
        .is_some_and(|name| blacklist.matches(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blacklist_parses_delimited_entries() {
        let blacklist = Blacklist::parse("Private; staging ;;");
        assert!(blacklist.matches("private"));
        assert!(blacklist.matches("My-Staging-Area"));
        assert!(!blacklist.matches("public"));
    }

    #[test]
    fn empty_blacklist_matches_nothing() {
        let blacklist = Blacklist::parse("");
        assert!(blacklist.is_empty());
        assert!(!blacklist.matches("anything"));
    }

    #[test]
    fn blacklist_match_is_case_insensitive_substring() {
        let blacklist = Blacklist::parse("priv");
        assert!(blacklist.matches("PRIVATE"));
        assert!(blacklist.matches("semi-Private"));
        assert!(!blacklist.matches("public"));
    }

    #[test]
    fn empty_snapshot_has_generation_zero() {
        let snapshot = Snapshot::empty();
        assert_eq!(snapshot.generation(), 0);
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.path_at(0), None);
    }
}
