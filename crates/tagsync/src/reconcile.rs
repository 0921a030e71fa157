//! Reconciler: keeps the manifest in step with the filesystem.
//!
//! Per entry the lifecycle is `added -> live <-> missing`, driven by three
//! operations:
//!
//! - [`Reconciler::merge_scan`]: additive merge of scanner findings
//! - [`Reconciler::update`]: liveness sweep over recorded paths
//! - [`Reconciler::rebuild`]: re-link missing entries to relocated objects by UUID
//!
//! All operations mutate the in-memory [`Manifest`] only. Persisting is the
//! caller's job, and a destination-guard abort always happens before any
//! mutation.

use crate::attr::AttributeStore;
use crate::config::Config;
use crate::error::Result;
use crate::manifest::{FileStat, Manifest, ManifestEntry};
use crate::scanner::{ScannedObject, Scanner};
use crate::tag;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub added: usize,
    pub updated: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpdateReport {
    pub refreshed: usize,
    /// Entries that went from live to missing in this sweep
    pub newly_missing: Vec<PathBuf>,
    /// Entries already missing before this sweep and still absent
    pub still_missing: usize,
    /// Entries that were missing and exist again at their recorded path
    pub recovered: Vec<PathBuf>,
    /// Entries left untouched because their path could not be inspected
    pub skipped: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RebuildStatus {
    Restored { path: PathBuf },
    NotFound,
    /// The entry's tag string does not decode, so it has no UUID to match on
    Undecodable { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RebuildOutcome {
    pub uuid: Option<Uuid>,
    /// Manifest key before the rebuild
    pub previous: PathBuf,
    #[serde(flatten)]
    pub status: RebuildStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RebuildReport {
    pub outcomes: Vec<RebuildOutcome>,
}

impl RebuildReport {
    pub fn restored(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, RebuildStatus::Restored { .. }))
            .count()
    }

    pub fn not_found(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, RebuildStatus::NotFound))
            .count()
    }
}

/// Manifest reconciliation engine.
pub struct Reconciler<'a, S: AttributeStore> {
    store: &'a S,
    config: &'a Config,
}

impl<'a, S: AttributeStore> Reconciler<'a, S> {
    pub fn new(store: &'a S, config: &'a Config) -> Self {
        Self { store, config }
    }

    fn scanner(&self) -> Scanner<'a, S> {
        Scanner::new(self.store, self.config)
    }

    /// Scan `root` fully, then merge the findings.
    ///
    /// The manifest is untouched if the scan trips the destination guard.
    pub fn scan_into(
        &self,
        manifest: &mut Manifest,
        root: &Path,
        filter: Vec<String>,
    ) -> Result<MergeReport> {
        let (found, _) = self.scanner().with_filter(filter).scan_all(root)?;
        Ok(self.merge_scan(manifest, found))
    }

    /// Additive merge: every scanned object gets a fresh entry, new paths are
    /// stamped `date_added`, all are stamped `date_updated`. Other entries stay.
    pub fn merge_scan<I>(&self, manifest: &mut Manifest, found: I) -> MergeReport
    where
        I: IntoIterator<Item = ScannedObject>,
    {
        let now = Utc::now();
        let mut report = MergeReport::default();

        for object in found {
            match manifest.get_mut(&object.path) {
                Some(entry) => {
                    entry.refresh(object.stat, object.raw, now);
                    report.updated += 1;
                }
                None => {
                    let mut entry = ManifestEntry::new(object.stat, object.raw);
                    entry.date_added = Some(now);
                    entry.date_updated = Some(now);
                    debug!(path = %object.path.display(), "Added to manifest");
                    manifest.insert(object.path, entry);
                    report.added += 1;
                }
            }
        }

        info!(added = report.added, updated = report.updated, "Merged scan results");
        report
    }

    /// Liveness sweep over every entry's recorded path.
    pub fn update(&self, manifest: &mut Manifest) -> UpdateReport {
        let now = Utc::now();
        let mut report = UpdateReport::default();

        for (path, entry) in manifest.iter_mut() {
            match FileStat::lstat(path) {
                Ok(stat) => {
                    let was_missing = entry.is_missing();
                    let tag = self.current_tag(path).unwrap_or_else(|| entry.tag.clone());
                    entry.refresh(stat, tag, now);
                    report.refreshed += 1;
                    if was_missing {
                        info!(path = %path.display(), "Entry is back at its recorded path");
                        report.recovered.push(path.clone());
                    }
                }
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    if mark_missing(entry, now) {
                        info!(path = %path.display(), "Entry is missing");
                        report.newly_missing.push(path.clone());
                    } else {
                        report.still_missing += 1;
                    }
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "Failed to stat entry, leaving it unchanged");
                    report.skipped.push(path.clone());
                }
            }
        }

        info!(
            refreshed = report.refreshed,
            newly_missing = report.newly_missing.len(),
            still_missing = report.still_missing,
            "Manifest update complete"
        );
        report
    }

    /// Re-link missing entries to objects found under `search_roots` carrying
    /// the same UUID. First match in walk order wins; roots are walked in the
    /// given order.
    pub fn rebuild(&self, manifest: &mut Manifest, search_roots: &[PathBuf]) -> Result<RebuildReport> {
        let mut report = RebuildReport::default();

        // uuid -> manifest key, first key in sorted order wins
        let mut outstanding: BTreeMap<Uuid, PathBuf> = BTreeMap::new();
        let mut shadowed: Vec<(Uuid, PathBuf)> = Vec::new();
        for (path, entry) in manifest.missing() {
            match tag::decode(&entry.tag) {
                Ok(Some(tag)) => {
                    if outstanding.contains_key(&tag.id) {
                        shadowed.push((tag.id, path.clone()));
                    } else {
                        outstanding.insert(tag.id, path.clone());
                    }
                }
                Ok(None) => report.outcomes.push(undecodable(path, "not a tag".to_string())),
                Err(err) => report.outcomes.push(undecodable(path, err.to_string())),
            }
        }

        let resolved = if outstanding.is_empty() {
            HashMap::new()
        } else {
            self.find_by_uuid(&outstanding, search_roots)?
        };

        let now = Utc::now();
        for (uuid, old_path) in outstanding {
            let status = match resolved.get(&uuid) {
                Some(object) => {
                    relink(manifest, &old_path, object, now);
                    info!(uuid = %uuid, from = %old_path.display(), to = %object.path.display(), "Restored");
                    RebuildStatus::Restored {
                        path: object.path.clone(),
                    }
                }
                None => {
                    debug!(uuid = %uuid, path = %old_path.display(), "Not found in search roots");
                    RebuildStatus::NotFound
                }
            };
            report.outcomes.push(RebuildOutcome {
                uuid: Some(uuid),
                previous: old_path,
                status,
            });
        }

        for (uuid, path) in shadowed {
            warn!(uuid = %uuid, path = %path.display(), "Another missing entry already claims this UUID");
            report.outcomes.push(RebuildOutcome {
                uuid: Some(uuid),
                previous: path,
                status: RebuildStatus::NotFound,
            });
        }

        Ok(report)
    }

    /// Walk every root to completion, keeping the first object seen for each
    /// outstanding UUID. Every root is walked even when all UUIDs are already
    /// resolved, so a destination anywhere in the search roots still aborts.
    fn find_by_uuid(
        &self,
        outstanding: &BTreeMap<Uuid, PathBuf>,
        search_roots: &[PathBuf],
    ) -> Result<HashMap<Uuid, ScannedObject>> {
        let mut resolved: HashMap<Uuid, ScannedObject> = HashMap::new();
        let scanner = self.scanner();

        for root in search_roots {
            let scan = match scanner.scan(root) {
                Ok(scan) => scan,
                Err(err) => {
                    warn!(path = %root.display(), error = %err, "Skipping search root");
                    continue;
                }
            };
            for item in scan {
                let object = item?;
                let uuid = object.tag.id;
                if !outstanding.contains_key(&uuid) {
                    continue;
                }
                if let Some(first) = resolved.get(&uuid) {
                    debug!(
                        uuid = %uuid,
                        kept = %first.path.display(),
                        ignored = %object.path.display(),
                        "Duplicate UUID in search roots"
                    );
                    continue;
                }
                resolved.insert(uuid, object);
            }
        }

        Ok(resolved)
    }

    /// Read and validate the attribute on a live path. `None` keeps the recorded tag.
    fn current_tag(&self, path: &Path) -> Option<String> {
        match self.store.get(path) {
            Ok(Some(raw)) if tag::is_tag(&raw) => Some(raw),
            Ok(_) => {
                warn!(path = %path.display(), "Object no longer carries a tag, keeping recorded tag");
                None
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Failed to read attribute, keeping recorded tag");
                None
            }
        }
    }
}

/// Stamp `date_missing` on first detection only. Returns true if it was set now.
fn mark_missing(entry: &mut ManifestEntry, now: DateTime<Utc>) -> bool {
    if entry.date_missing.is_some() {
        return false;
    }
    entry.date_missing = Some(now);
    true
}

fn relink(manifest: &mut Manifest, old_path: &Path, object: &ScannedObject, now: DateTime<Utc>) {
    let Some(mut entry) = manifest.remove(old_path) else {
        return;
    };
    entry.refresh(object.stat, object.raw.clone(), now);
    if object.path != old_path && manifest.contains(&object.path) {
        debug!(path = %object.path.display(), "Replacing existing entry at restored path");
    }
    manifest.insert(object.path.clone(), entry);
}

fn undecodable(path: &Path, reason: String) -> RebuildOutcome {
    warn!(path = %path.display(), reason = %reason, "Missing entry has no usable tag");
    RebuildOutcome {
        uuid: None,
        previous: path.to_path_buf(),
        status: RebuildStatus::Undecodable { reason },
    }
}
