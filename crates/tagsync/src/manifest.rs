//! Manifest Store: the flat JSON index of tagged objects.
//!
//! The file is a JSON object keyed by absolute path. It is rewritten in full on
//! every save; there is no journal and no locking.

use crate::error::{Result, TagSyncError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, Metadata};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Stat data recorded for a tagged object, in whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileStat {
    pub mtime: i64,
    pub ctime: i64,
    pub size: u64,
}

impl FileStat {
    /// `lstat` the path; symlinks describe themselves.
    pub fn lstat(path: &Path) -> std::io::Result<Self> {
        fs::symlink_metadata(path).map(|m| Self::from_metadata(&m))
    }

    pub fn from_metadata(metadata: &Metadata) -> Self {
        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            Self {
                mtime: metadata.mtime(),
                ctime: metadata.ctime(),
                size: metadata.size(),
            }
        }

        #[cfg(not(unix))]
        {
            let secs = |t: std::io::Result<std::time::SystemTime>| {
                t.ok()
                    .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                    .map(|d| d.as_secs() as i64)
                    .unwrap_or(0)
            };
            Self {
                mtime: secs(metadata.modified()),
                ctime: secs(metadata.created()),
                size: metadata.len(),
            }
        }
    }
}

/// Last-known metadata for one tagged object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub mtime: i64,
    pub ctime: i64,
    pub size: u64,
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_added: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_updated: Option<DateTime<Utc>>,
    /// Set when the last liveness check found nothing at this path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_missing: Option<DateTime<Utc>>,
}

impl ManifestEntry {
    pub fn new(stat: FileStat, tag: impl Into<String>) -> Self {
        Self {
            mtime: stat.mtime,
            ctime: stat.ctime,
            size: stat.size,
            tag: tag.into(),
            date_added: None,
            date_updated: None,
            date_missing: None,
        }
    }

    pub fn is_missing(&self) -> bool {
        self.date_missing.is_some()
    }

    /// Overwrite stat data and tag, stamp `date_updated`, and mark the entry live.
    pub fn refresh(&mut self, stat: FileStat, tag: impl Into<String>, now: DateTime<Utc>) {
        self.mtime = stat.mtime;
        self.ctime = stat.ctime;
        self.size = stat.size;
        self.tag = tag.into();
        self.date_updated = Some(now);
        self.date_missing = None;
    }
}

/// How [`Manifest::load`] obtained its contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    /// The file was parsed.
    Loaded,
    /// No file at the location; started empty.
    Missing,
    /// The file existed but could not be read or parsed; its contents were discarded.
    Discarded { reason: String },
}

/// Mapping from absolute path to entry. Keys are kept sorted so saves are stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    entries: BTreeMap<PathBuf, ManifestEntry>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the manifest, starting empty when it is absent or unreadable.
    pub fn load(location: &Path) -> (Self, LoadStatus) {
        let content = match fs::read_to_string(location) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %location.display(), "No manifest yet, starting empty");
                return (Self::new(), LoadStatus::Missing);
            }
            Err(err) => return Self::discarded(location, err.to_string()),
        };

        match serde_json::from_str::<Manifest>(&content) {
            Ok(manifest) => {
                debug!(path = %location.display(), entries = manifest.len(), "Loaded manifest");
                (manifest, LoadStatus::Loaded)
            }
            Err(err) => Self::discarded(location, err.to_string()),
        }
    }

    fn discarded(location: &Path, reason: String) -> (Self, LoadStatus) {
        warn!(
            path = %location.display(),
            error = %reason,
            "Manifest is unreadable, discarding it and starting empty"
        );
        (Self::new(), LoadStatus::Discarded { reason })
    }

    /// Serialize the full mapping to `location`.
    ///
    /// Writes a sibling temp file and renames it over the target. Any failure
    /// is returned as [`TagSyncError::ManifestWrite`].
    pub fn save(&self, location: &Path) -> Result<()> {
        let write_err = |source: std::io::Error| TagSyncError::ManifestWrite {
            path: location.to_path_buf(),
            source,
        };

        if let Some(parent) = location.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(write_err)?;
        }

        let payload = serde_json::to_string_pretty(self)?;
        let temp_path = temp_path_for(location);

        let write_result = (|| {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(payload.as_bytes())?;
            file.write_all(b"\n")?;
            file.sync_all()
        })();
        if let Err(err) = write_result {
            let _ = fs::remove_file(&temp_path);
            return Err(write_err(err));
        }

        if let Err(err) = fs::rename(&temp_path, location) {
            let _ = fs::remove_file(&temp_path);
            return Err(write_err(err));
        }

        debug!(path = %location.display(), entries = self.len(), "Saved manifest");
        Ok(())
    }

    /// Replace the stored manifest with an empty mapping.
    pub fn flush(location: &Path) -> Result<()> {
        Self::new().save(location)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, path: &Path) -> Option<&ManifestEntry> {
        self.entries.get(path)
    }

    pub fn get_mut(&mut self, path: &Path) -> Option<&mut ManifestEntry> {
        self.entries.get_mut(path)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    pub fn insert(&mut self, path: PathBuf, entry: ManifestEntry) -> Option<ManifestEntry> {
        self.entries.insert(path, entry)
    }

    pub fn remove(&mut self, path: &Path) -> Option<ManifestEntry> {
        self.entries.remove(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PathBuf, &ManifestEntry)> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&PathBuf, &mut ManifestEntry)> {
        self.entries.iter_mut()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.entries.keys().cloned().collect()
    }

    /// Entries currently flagged missing.
    pub fn missing(&self) -> impl Iterator<Item = (&PathBuf, &ManifestEntry)> {
        self.entries.iter().filter(|(_, e)| e.is_missing())
    }
}

fn temp_path_for(location: &Path) -> PathBuf {
    let mut name = location
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "manifest.json".into());
    name.push(format!(".tmp.{}", std::process::id()));
    location.with_file_name(name)
}
