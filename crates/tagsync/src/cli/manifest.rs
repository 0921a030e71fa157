//! Manifest command - scan, update, rebuild and inspect the manifest

use crate::cli::output::{format_age, format_size, print_table_colored};
use crate::cli::CliContext;
use anyhow::Context;
use chrono::Utc;
use clap::Subcommand;
use comfy_table::Color;
use serde::Serialize;
use std::path::PathBuf;
use tagsync::scanner::absolute;
use tagsync::tag;
use tagsync::{Manifest, RebuildReport, RebuildStatus, Reconciler};
use tracing::info;

/// Subcommands for manifest management
#[derive(Subcommand, Debug, Clone)]
pub enum ManifestAction {
    /// Scan a directory tree and merge its tagged objects into the manifest
    Scan {
        path: PathBuf,
        /// Only record objects tagged with one of these names
        #[arg(short = 'n', long = "names")]
        names: Vec<String>,
        #[arg(long)]
        json: bool,
    },
    /// Re-check every recorded path and mark vanished entries missing
    Update {
        #[arg(long)]
        json: bool,
    },
    /// Find missing entries under the given roots by UUID and re-link them
    Rebuild {
        #[arg(required = true)]
        roots: Vec<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Replace the manifest with an empty one
    Flush,
    /// List manifest entries
    Show {
        /// Only entries marked missing
        #[arg(long)]
        missing: bool,
        #[arg(long)]
        json: bool,
    },
    /// Remove entries for the given paths
    Forget {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
}

/// Execute the manifest command
pub fn run(ctx: &CliContext, action: ManifestAction) -> anyhow::Result<()> {
    match action {
        ManifestAction::Scan { path, names, json } => scan(ctx, path, names, json),
        ManifestAction::Update { json } => update(ctx, json),
        ManifestAction::Rebuild { roots, json } => rebuild(ctx, roots, json),
        ManifestAction::Flush => flush(ctx),
        ManifestAction::Show { missing, json } => show(ctx, missing, json),
        ManifestAction::Forget { paths } => forget(ctx, paths),
    }
}

fn scan(ctx: &CliContext, path: PathBuf, names: Vec<String>, json: bool) -> anyhow::Result<()> {
    let filter: Vec<String> = names.iter().flat_map(|a| tag::parse_name_list(a)).collect();
    let mut manifest = ctx.load_manifest();

    let reconciler = Reconciler::new(&ctx.store, &ctx.config);
    let report = reconciler.scan_into(&mut manifest, &path, filter)?;
    ctx.save_manifest(&manifest)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        ctx.say(format!(
            "Wrote manifest for {} objects ({} new, total {}) to {}",
            report.added + report.updated,
            report.added,
            manifest.len(),
            ctx.config.manifest_path.display()
        ));
    }
    Ok(())
}

fn update(ctx: &CliContext, json: bool) -> anyhow::Result<()> {
    let mut manifest = ctx.load_manifest();
    let report = Reconciler::new(&ctx.store, &ctx.config).update(&mut manifest);
    ctx.save_manifest(&manifest)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for path in &report.newly_missing {
        ctx.say(format!("{}: missing", path.display()));
    }
    for path in &report.recovered {
        ctx.say(format!("{}: back", path.display()));
    }
    ctx.say(format!(
        "Updated {} entries, {} newly missing, {} still missing",
        report.refreshed,
        report.newly_missing.len(),
        report.still_missing
    ));
    if !report.skipped.is_empty() {
        ctx.say(format!("{} entries could not be checked", report.skipped.len()));
    }
    Ok(())
}

fn rebuild(ctx: &CliContext, roots: Vec<PathBuf>, json: bool) -> anyhow::Result<()> {
    let mut manifest = ctx.load_manifest();
    let report = Reconciler::new(&ctx.store, &ctx.config).rebuild(&mut manifest, &roots)?;
    ctx.save_manifest(&manifest)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for line in rebuild_lines(&report) {
        ctx.say(line);
    }
    ctx.say(format!(
        "{} restored, {} not found",
        report.restored(),
        report.not_found()
    ));
    Ok(())
}

/// One line per outcome, keyed by UUID where the entry has one.
pub fn rebuild_lines(report: &RebuildReport) -> Vec<String> {
    report
        .outcomes
        .iter()
        .map(|outcome| {
            let key = match outcome.uuid {
                Some(uuid) => uuid.to_string(),
                None => outcome.previous.display().to_string(),
            };
            match &outcome.status {
                RebuildStatus::Restored { path } => format!("{}: restored at {}", key, path.display()),
                RebuildStatus::NotFound => format!("{}: not found in search roots", key),
                RebuildStatus::Undecodable { reason } => format!("{}: skipped ({})", key, reason),
            }
        })
        .collect()
}

fn flush(ctx: &CliContext) -> anyhow::Result<()> {
    let path = &ctx.config.manifest_path;
    if ctx.config.dry_run {
        ctx.say(format!("[DRY-RUN] Would flush {}", path.display()));
        return Ok(());
    }
    Manifest::flush(path).with_context(|| "Manifest was not flushed")?;
    info!(path = %path.display(), "Manifest flushed");
    ctx.say(format!("Flushed {}", path.display()));
    Ok(())
}

#[derive(Serialize)]
struct ShowRow<'a> {
    path: &'a PathBuf,
    #[serde(flatten)]
    entry: &'a tagsync::ManifestEntry,
}

fn show(ctx: &CliContext, missing_only: bool, json: bool) -> anyhow::Result<()> {
    let manifest = ctx.load_manifest();
    let entries: Vec<_> = manifest
        .iter()
        .filter(|(_, entry)| !missing_only || entry.is_missing())
        .collect();

    if json {
        let rows: Vec<ShowRow> = entries
            .iter()
            .map(|&(path, entry)| ShowRow { path, entry })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if entries.is_empty() {
        ctx.say("No manifest entries.");
        return Ok(());
    }

    let now = Utc::now();
    let rows = entries
        .iter()
        .map(|(path, entry)| {
            let (status, color) = match entry.date_missing {
                Some(when) => (format!("missing {}", format_age(when, now)), Some(Color::Red)),
                None => ("live".to_string(), Some(Color::Green)),
            };
            let updated = entry
                .date_updated
                .map(|t| format_age(t, now))
                .unwrap_or_else(|| "-".to_string());
            vec![
                (path.display().to_string(), None),
                (entry.tag.clone(), None),
                (format_size(entry.size), None),
                (updated, None),
                (status, color),
            ]
        })
        .collect();

    print_table_colored(&["Path", "Tag", "Size", "Updated", "Status"], rows);
    ctx.say(format!("{} of {} entries", entries.len(), manifest.len()));
    Ok(())
}

fn forget(ctx: &CliContext, paths: Vec<PathBuf>) -> anyhow::Result<()> {
    let mut manifest = ctx.load_manifest();
    let forgotten = forget_paths(&mut manifest, &paths);
    for path in &forgotten {
        let verb = if ctx.config.dry_run { "forget" } else { "Forgot" };
        ctx.say(format!("{}{} {}", ctx.would(), verb, path.display()));
    }
    if forgotten.len() < paths.len() {
        ctx.say(format!("{} path(s) were not in the manifest", paths.len() - forgotten.len()));
    }
    if !forgotten.is_empty() {
        ctx.save_manifest(&manifest)?;
    }
    Ok(())
}

/// Remove entries by path, trying the path as given and then made absolute.
pub fn forget_paths(manifest: &mut Manifest, paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut forgotten = Vec::new();
    for path in paths {
        if manifest.remove(path).is_some() {
            forgotten.push(path.clone());
            continue;
        }
        if let Ok(abs) = absolute(path) {
            if manifest.remove(&abs).is_some() {
                forgotten.push(abs);
            }
        }
    }
    forgotten
}

#[cfg(test)]
mod tests {
    use super::*;
    use tagsync::{FileStat, ManifestEntry, RebuildOutcome};
    use uuid::Uuid;

    #[test]
    fn test_rebuild_lines() {
        let id = Uuid::new_v4();
        let report = RebuildReport {
            outcomes: vec![
                RebuildOutcome {
                    uuid: Some(id),
                    previous: PathBuf::from("/a"),
                    status: RebuildStatus::Restored {
                        path: PathBuf::from("/b"),
                    },
                },
                RebuildOutcome {
                    uuid: None,
                    previous: PathBuf::from("/c"),
                    status: RebuildStatus::Undecodable {
                        reason: "not a tag".to_string(),
                    },
                },
            ],
        };
        let lines = rebuild_lines(&report);
        assert_eq!(lines[0], format!("{}: restored at /b", id));
        assert_eq!(lines[1], "/c: skipped (not a tag)");
    }

    #[test]
    fn test_forget_paths() {
        let mut manifest = Manifest::new();
        let tag = format!("ts/{}", Uuid::new_v4());
        manifest.insert(PathBuf::from("/x/one"), ManifestEntry::new(FileStat::default(), tag.clone()));
        manifest.insert(PathBuf::from("/x/two"), ManifestEntry::new(FileStat::default(), tag));

        let forgotten = forget_paths(
            &mut manifest,
            &[PathBuf::from("/x/one"), PathBuf::from("/x/three")],
        );
        assert_eq!(forgotten, vec![PathBuf::from("/x/one")]);
        assert_eq!(manifest.len(), 1);
        assert!(manifest.contains(&PathBuf::from("/x/two")));
    }
}
