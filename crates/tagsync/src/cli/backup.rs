//! Backup command - copy tagged objects into a destination with rsync
//!
//! Sources are walked with the tree scanner, so a source that is itself a
//! backup destination is refused. Copy failures are warned per object.

use crate::cli::error::HelpfulError;
use crate::cli::CliContext;
use anyhow::Context;
use std::path::{Path, PathBuf};
use std::process::Command;
use tagsync::scanner::absolute;
use tagsync::sentinel::mark_destination;
use tagsync::{tag, Scanner};
use tracing::{info, warn};

const COPIER: &str = "rsync";

/// Arguments for the backup command
#[derive(Debug)]
pub struct BackupArgs {
    /// Raw groups: `[-n NAMES] SRC... DEST`, repeated
    pub args: Vec<String>,
}

/// One `[-n NAMES] SRC... DEST` group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupGroup {
    pub names: Vec<String>,
    pub sources: Vec<PathBuf>,
    pub dest: PathBuf,
}

/// Split the argument list into groups.
///
/// `-n` starts a new group once the current one has paths; its names apply
/// until the next `-n`. The last path of every group is its destination.
pub fn parse_groups(args: &[String]) -> Result<Vec<BackupGroup>, HelpfulError> {
    let mut groups = Vec::new();
    let mut names: Vec<String> = Vec::new();
    let mut paths: Vec<PathBuf> = Vec::new();

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-n" | "--names" => {
                let value = match iter.next() {
                    Some(value) if !value.starts_with('-') => value,
                    _ => return Err(HelpfulError::new("-n requires at least one name")),
                };
                if !paths.is_empty() {
                    groups.push(close_group(&names, std::mem::take(&mut paths))?);
                }
                names = tag::parse_name_list(value);
            }
            flag if flag.starts_with('-') && flag != "-" => {
                return Err(HelpfulError::new(format!("Unknown flag in backup groups: {}", flag))
                    .with_context("Only -n may appear between backup paths")
                    .hint(format!("tagsync {} backup ...", flag)));
            }
            path => paths.push(PathBuf::from(path)),
        }
    }
    groups.push(close_group(&names, paths)?);
    Ok(groups)
}

fn close_group(names: &[String], mut paths: Vec<PathBuf>) -> Result<BackupGroup, HelpfulError> {
    if paths.len() < 2 {
        return Err(HelpfulError::missing_backup_destination());
    }
    let dest = paths.pop().ok_or_else(HelpfulError::missing_backup_destination)?;
    Ok(BackupGroup {
        names: names.to_vec(),
        sources: paths,
        dest,
    })
}

/// Arguments passed to the copier for one object.
pub fn copier_args(object: &Path, dest: &Path) -> Vec<String> {
    vec![
        "-iauHAX".to_string(),
        "--no-links".to_string(),
        "--relative".to_string(),
        object.display().to_string(),
        format!("{}/", dest.display()),
    ]
}

/// Execute the backup command
pub fn run(ctx: &CliContext, args: BackupArgs) -> anyhow::Result<()> {
    let groups = parse_groups(&args.args)?;
    let mut copied = 0usize;
    let mut failed = 0usize;

    for group in &groups {
        if !group.dest.is_dir() {
            warn!(
                path = %group.dest.display(),
                "Destination is not a directory or not found, skipping group"
            );
            continue;
        }
        let (ok, bad) = backup_group(ctx, group)?;
        copied += ok;
        failed += bad;
    }

    let verb = if ctx.config.dry_run { "copy" } else { "Copied" };
    let mut summary = format!("{}{} {} object(s)", ctx.would(), verb, copied);
    if groups.len() == 1 {
        summary.push_str(&format!(" to {}", groups[0].dest.display()));
    }
    if failed > 0 {
        summary.push_str(&format!(", {} failed", failed));
    }
    ctx.say(summary);
    Ok(())
}

/// Back up one group; returns (copied, failed).
fn backup_group(ctx: &CliContext, group: &BackupGroup) -> anyhow::Result<(usize, usize)> {
    let dest = absolute(&group.dest)?;
    let scanner = Scanner::new(&ctx.store, &ctx.config).with_filter(group.names.clone());
    let mut copied = 0usize;
    let mut failed = 0usize;

    for source in &group.sources {
        if !source.is_dir() {
            warn!(path = %source.display(), "Source is not a directory or not found, skipping");
            continue;
        }
        let (objects, _) = scanner.scan_all(source)?;
        for object in objects {
            if copy_object(ctx, &object.path, &dest) {
                copied += 1;
            } else {
                failed += 1;
            }
        }
    }

    info!(copied, failed, dest = %dest.display(), names = ?group.names, "Backup group finished");
    Ok((copied, failed))
}

/// Copy one object; returns false on failure.
fn copy_object(ctx: &CliContext, object: &Path, dest: &Path) -> bool {
    let args = copier_args(object, dest);
    if ctx.config.dry_run {
        ctx.say(format!("[DRY-RUN] Would {} {}", COPIER, args.join(" ")));
        return true;
    }

    match Command::new(COPIER).args(&args).status() {
        Ok(status) if status.success() => {
            ctx.detail(format!("Backed up {}", object.display()));
            true
        }
        Ok(status) => {
            warn!(path = %object.display(), code = ?status.code(), "{} failed", COPIER);
            false
        }
        Err(err) => {
            warn!(path = %object.display(), error = %err, "Failed to run {}", COPIER);
            false
        }
    }
}

/// Execute the mark-dest command
pub fn run_mark_dest(ctx: &CliContext, dir: &Path) -> anyhow::Result<()> {
    if !dir.is_dir() {
        return Err(HelpfulError::not_a_directory(dir).into());
    }
    let sentinel = dir.join(&ctx.config.sentinel_name);
    if ctx.config.dry_run {
        ctx.say(format!("[DRY-RUN] Would write {}", sentinel.display()));
        return Ok(());
    }
    mark_destination(dir, &ctx.config.sentinel_name)
        .with_context(|| format!("Failed to write {}", sentinel.display()))?;
    ctx.say(format!("Marked {} as a backup destination", dir.display()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|a| a.to_string()).collect()
    }

    #[test]
    fn test_parse_single_group() {
        let groups = parse_groups(&strings(&["a", "b", "dest"])).unwrap();
        assert_eq!(
            groups,
            vec![BackupGroup {
                names: Vec::new(),
                sources: vec![PathBuf::from("a"), PathBuf::from("b")],
                dest: PathBuf::from("dest"),
            }]
        );
    }

    #[test]
    fn test_parse_named_groups() {
        let groups = parse_groups(&strings(&[
            "-n", "photos", "pics", "/mnt/a", "-n", "docs;notes", "docs", "/mnt/b",
        ]))
        .unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].names, vec!["photos"]);
        assert_eq!(groups[0].sources, vec![PathBuf::from("pics")]);
        assert_eq!(groups[0].dest, PathBuf::from("/mnt/a"));
        assert_eq!(groups[1].names, vec!["docs", "notes"]);
        assert_eq!(groups[1].dest, PathBuf::from("/mnt/b"));
    }

    #[test]
    fn test_parse_groups_rejects_bad_input() {
        // Group without a destination
        let err = parse_groups(&strings(&["-n", "a", "only", "-n", "b", "src", "dest"])).unwrap_err();
        assert!(err.message.contains("destination"));
        assert!(parse_groups(&strings(&["src", "dest", "-n", "a"])).is_err());

        // -n without a name
        let err = parse_groups(&strings(&["src", "dest", "-n"])).unwrap_err();
        assert_eq!(err.message, "-n requires at least one name");
        assert!(parse_groups(&strings(&["-n", "-v", "src", "dest"])).is_err());

        let err = parse_groups(&strings(&["src", "--bogus", "dest"])).unwrap_err();
        assert!(err.message.contains("--bogus"));
    }

    #[test]
    fn test_copier_args() {
        let args = copier_args(Path::new("/src/a/file"), Path::new("/mnt/backup"));
        assert_eq!(
            args,
            vec!["-iauHAX", "--no-links", "--relative", "/src/a/file", "/mnt/backup/"]
        );
    }
}
