//! info command - show the raw attribute of each path

use crate::cli::CliContext;
use std::path::PathBuf;
use tagsync::{tag, AttributeStore};
use tracing::warn;

/// Execute the info command
pub fn run(ctx: &CliContext, paths: &[PathBuf]) -> anyhow::Result<()> {
    for path in paths {
        if path.symlink_metadata().is_err() {
            warn!(path = %path.display(), "Not found");
            continue;
        }
        match ctx.store.get(path) {
            Ok(Some(raw)) => {
                println!("{}: {}", path.display(), raw);
                if ctx.config.verbosity.is_verbose() {
                    describe(&raw);
                }
            }
            Ok(None) => println!("{}: [not set]", path.display()),
            Err(err) => warn!(path = %path.display(), error = %err, "Failed to read tag"),
        }
    }
    Ok(())
}

fn describe(raw: &str) {
    match tag::decode(raw) {
        Ok(Some(tag)) => {
            println!("  uuid:  {}", tag.id);
            if tag.names.is_empty() {
                println!("  names: (none)");
            } else {
                println!("  names: {}", tag.names.join(", "));
            }
        }
        Ok(None) => println!("  (not a TagSync tag)"),
        Err(err) => println!("  (malformed: {})", err),
    }
}
