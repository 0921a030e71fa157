//! CLI module for TagSync
//!
//! Thin drivers around the library: each command resolves its inputs, calls
//! the codec/scanner/reconciler, and prints results. Diagnostics go through
//! `tracing`; user-facing results go to stdout unless `--quiet`.

pub mod backup;
pub mod config;
pub mod error;
pub mod info;
pub mod ls;
pub mod manifest;
pub mod output;
pub mod tag;

use anyhow::Context;
use std::fmt::Display;
use tagsync::{Config, LoadStatus, Manifest, XattrStore};
use tracing::warn;

/// Resolved configuration plus the attribute store every command shares.
pub struct CliContext {
    pub config: Config,
    pub store: XattrStore,
}

impl CliContext {
    pub fn new(config: Config) -> Self {
        let store = XattrStore::new(config.attribute_name.clone(), config.follow_symlinks);
        Self { config, store }
    }

    /// Print a result line unless quiet.
    pub fn say(&self, msg: impl Display) {
        if !self.config.verbosity.is_quiet() {
            println!("{}", msg);
        }
    }

    /// Print an extra line in verbose mode only.
    pub fn detail(&self, msg: impl Display) {
        if self.config.verbosity.is_verbose() {
            println!("{}", msg);
        }
    }

    /// Prefix for messages describing changes that dry-run skips.
    pub fn would(&self) -> &'static str {
        if self.config.dry_run {
            "[DRY-RUN] Would "
        } else {
            ""
        }
    }

    pub fn load_manifest(&self) -> Manifest {
        let (manifest, status) = Manifest::load(&self.config.manifest_path);
        if let LoadStatus::Discarded { reason } = status {
            warn!(
                path = %self.config.manifest_path.display(),
                "Manifest could not be parsed ({}); continuing with an empty manifest",
                reason
            );
        }
        manifest
    }

    /// Persist the manifest; dry-run only reports.
    pub fn save_manifest(&self, manifest: &Manifest) -> anyhow::Result<()> {
        if self.config.dry_run {
            self.say(format!(
                "[DRY-RUN] Would write {} entries to {}",
                manifest.len(),
                self.config.manifest_path.display()
            ));
            return Ok(());
        }
        manifest
            .save(&self.config.manifest_path)
            .with_context(|| "Manifest changes were not saved")?;
        Ok(())
    }
}
