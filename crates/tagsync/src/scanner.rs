//! Tree scanner for tagged objects
//!
//! # Design
//!
//! - Walk the subtree depth-first with `walkdir`, sorted by file name so the
//!   visit order is deterministic
//! - Symlinks are visited as entries but never traversed
//! - Each object's attribute is read through the [`AttributeStore`]; objects
//!   whose value decodes as a tag are yielded with their lstat data
//! - Before descending into a directory its descriptor is checked; a backup
//!   destination ends the whole walk with [`TagSyncError::DestinationGuard`]
//! - Unreadable objects and malformed tags are logged and skipped

use crate::attr::AttributeStore;
use crate::config::Config;
use crate::error::{Result, TagSyncError};
use crate::manifest::FileStat;
use crate::sentinel::read_descriptor;
use crate::tag::{self, Tag};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

/// A tagged object found by the scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedObject {
    /// Absolute path of the object
    pub path: PathBuf,
    /// Attribute value as stored
    pub raw: String,
    pub tag: Tag,
    pub stat: FileStat,
}

/// Counters collected during a walk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub dirs_scanned: u64,
    pub objects_visited: u64,
    pub tagged: u64,
    /// Objects skipped because of read errors or malformed tags
    pub skipped: u64,
}

/// Filesystem scanner
pub struct Scanner<'a, S: AttributeStore> {
    store: &'a S,
    sentinel_name: String,
    filter: Vec<String>,
}

impl<'a, S: AttributeStore> Scanner<'a, S> {
    pub fn new(store: &'a S, config: &Config) -> Self {
        Self {
            store,
            sentinel_name: config.sentinel_name.clone(),
            filter: Vec::new(),
        }
    }

    /// Only yield objects whose tag shares a name with `names` (empty = all).
    pub fn with_filter(mut self, names: Vec<String>) -> Self {
        self.filter = names;
        self
    }

    /// Start a lazy walk of `root`.
    pub fn scan(&self, root: &Path) -> Result<Scan<'_, 'a, S>> {
        let root = absolute(root)?;
        if !root.is_dir() {
            return Err(TagSyncError::NotADirectory(root));
        }
        info!(path = %root.display(), "Starting scan");

        let walker = WalkDir::new(&root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();

        Ok(Scan {
            scanner: self,
            walker,
            stats: ScanStats::default(),
            done: false,
        })
    }

    /// Walk `root` to completion, returning every tagged object.
    ///
    /// Fails only on the destination guard; nothing is returned in that case.
    pub fn scan_all(&self, root: &Path) -> Result<(Vec<ScannedObject>, ScanStats)> {
        let mut scan = self.scan(root)?;
        let mut found = Vec::new();
        for item in scan.by_ref() {
            found.push(item?);
        }
        let stats = scan.stats().clone();
        info!(
            path = %root.display(),
            tagged = stats.tagged,
            visited = stats.objects_visited,
            skipped = stats.skipped,
            "Scan complete"
        );
        Ok((found, stats))
    }

    fn is_destination(&self, dir: &Path) -> bool {
        match read_descriptor(dir, &self.sentinel_name) {
            Ok(Some(descriptor)) => descriptor.is_destination(),
            Ok(None) => false,
            Err(err) => {
                warn!(
                    path = %dir.join(&self.sentinel_name).display(),
                    error = %err,
                    "Unreadable directory descriptor, treating directory as source"
                );
                false
            }
        }
    }

    fn inspect(&self, entry: &DirEntry, stats: &mut ScanStats) -> Option<ScannedObject> {
        let path = entry.path();

        let raw = match self.store.get(path) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Failed to read attribute, skipping");
                stats.skipped += 1;
                return None;
            }
        };

        let tag = match tag::decode(&raw) {
            Ok(Some(tag)) => tag,
            Ok(None) => return None,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Malformed tag, skipping");
                stats.skipped += 1;
                return None;
            }
        };

        if !tag.matches(&self.filter) {
            return None;
        }

        let stat = match entry.metadata() {
            Ok(metadata) => FileStat::from_metadata(&metadata),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Failed to stat, skipping");
                stats.skipped += 1;
                return None;
            }
        };

        debug!(path = %path.display(), size = stat.size, mtime = stat.mtime, tag = %raw, "Found");
        stats.tagged += 1;
        Some(ScannedObject {
            path: path.to_path_buf(),
            raw,
            tag,
            stat,
        })
    }
}

/// Lazy walk over one root. Yields `Err` at most once, for the destination
/// guard, and ends afterwards.
pub struct Scan<'s, 'a, S: AttributeStore> {
    scanner: &'s Scanner<'a, S>,
    walker: walkdir::IntoIter,
    stats: ScanStats,
    done: bool,
}

impl<'s, 'a, S: AttributeStore> Scan<'s, 'a, S> {
    pub fn stats(&self) -> &ScanStats {
        &self.stats
    }
}

impl<'s, 'a, S: AttributeStore> Iterator for Scan<'s, 'a, S> {
    type Item = Result<ScannedObject>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let entry = match self.walker.next()? {
                Ok(entry) => entry,
                Err(err) => {
                    let path = err.path().map(|p| p.display().to_string()).unwrap_or_default();
                    warn!(path = %path, error = %err, "Walk error, skipping");
                    self.stats.skipped += 1;
                    continue;
                }
            };

            if entry.file_type().is_dir() {
                self.stats.dirs_scanned += 1;
                if self.scanner.is_destination(entry.path()) {
                    self.done = true;
                    warn!(path = %entry.path().display(), "Backup destination reached, aborting scan");
                    return Some(Err(TagSyncError::DestinationGuard {
                        path: entry.path().to_path_buf(),
                    }));
                }
            }

            // The root is walked, not reported.
            if entry.depth() == 0 {
                continue;
            }

            self.stats.objects_visited += 1;
            if let Some(found) = self.scanner.inspect(&entry, &mut self.stats) {
                return Some(Ok(found));
            }
        }
        None
    }
}

/// Make `path` absolute against the current directory and drop `.` and `..`
/// components lexically. Symlinks are not resolved.
pub fn absolute(path: &Path) -> Result<PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    Ok(normalize(&joined))
}

/// Lexical normalisation; `..` at the root stays at the root.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}
