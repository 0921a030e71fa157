//! ls command - list tagged objects
//!
//! Directories list their direct children; files are listed themselves.
//! Nothing is recursive here, use `manifest scan` for whole trees.

use crate::cli::CliContext;
use std::path::{Path, PathBuf};
use tagsync::tag;
use tagsync::AttributeStore;
use tracing::{debug, warn};

/// Arguments for the ls command
#[derive(Debug)]
pub struct LsArgs {
    pub paths: Vec<PathBuf>,
    pub names: Vec<String>,
}

/// Execute the ls command
pub fn run(ctx: &CliContext, args: LsArgs) -> anyhow::Result<()> {
    let filter: Vec<String> = args.names.iter().flat_map(|a| tag::parse_name_list(a)).collect();
    let paths = if args.paths.is_empty() {
        vec![PathBuf::from(".")]
    } else {
        args.paths
    };

    let mut listed = 0usize;
    for path in &paths {
        for hit in list_tagged(&ctx.store, path, &filter) {
            println!("{}", hit.display());
            listed += 1;
        }
    }

    if listed == 0 {
        ctx.detail("No tagged files or directories found matching criteria.");
    }
    Ok(())
}

/// Tagged objects at `path` matching `filter`, in file-name order.
pub fn list_tagged<S: AttributeStore>(store: &S, path: &Path, filter: &[String]) -> Vec<PathBuf> {
    let is_real_dir = path
        .symlink_metadata()
        .map(|m| m.is_dir())
        .unwrap_or(false);

    let candidates = if is_real_dir {
        match std::fs::read_dir(path) {
            Ok(entries) => {
                let mut children: Vec<PathBuf> =
                    entries.filter_map(|e| e.ok()).map(|e| e.path()).collect();
                children.sort();
                children
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Error reading directory");
                return Vec::new();
            }
        }
    } else if path.symlink_metadata().is_ok() {
        vec![path.to_path_buf()]
    } else {
        warn!(path = %path.display(), "File or directory not found");
        return Vec::new();
    };

    candidates
        .into_iter()
        .filter(|obj| match store.get(obj) {
            Ok(Some(raw)) => {
                debug!(path = %obj.display(), tag = %raw, "Read tag");
                tag::matches(&raw, filter)
            }
            Ok(None) => false,
            Err(err) => {
                debug!(path = %obj.display(), error = %err, "Unreadable attribute");
                false
            }
        })
        .collect()
}
