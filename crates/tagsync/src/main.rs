//! TagSync command-line interface
//!
//! Exit status: 0 on success, 1 on failure, 2 on usage errors, and 3 when a
//! scan refuses to enter a backup destination.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tagsync::{Config, TagSyncError, Verbosity};
use tagsync_logging::{init_logging, LogConfig};

mod cli;

use cli::error::HelpfulError;
use cli::CliContext;

/// Exit status reserved for the destination guard.
const EXIT_DESTINATION_GUARD: u8 = 3;

#[derive(Parser, Debug)]
#[command(
    name = "tagsync",
    version,
    about = "Tag files with persistent identities and track them in a manifest"
)]
struct Cli {
    /// Verbose output
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Only warnings and errors
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Show what would be done without changing attributes, files or the manifest
    #[arg(long, global = true)]
    dry_run: bool,

    /// Manifest location (default: <home>/manifest.json)
    #[arg(long, global = true, env = "TAGSYNC_MANIFEST")]
    manifest: Option<PathBuf>,

    /// Read and write attributes through symlinks
    #[arg(short = 'F', long = "follow", global = true)]
    follow: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Tag files and directories, or edit their names
    Tag {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Names to add (comma or semicolon separated, repeatable)
        #[arg(short = 'n', long = "names")]
        names: Vec<String>,
        /// Names to remove
        #[arg(short = 'x', long = "remove-names")]
        remove_names: Vec<String>,
        /// Remove all names, keeping the identity
        #[arg(short = 'X', long = "remove-all-names")]
        remove_all_names: bool,
        /// Remove the tag entirely
        #[arg(short = 'r', long = "remove", conflicts_with_all = ["names", "remove_names", "remove_all_names"])]
        remove: bool,
    },
    /// Remove tags or names
    Untag {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Only remove these names
        #[arg(short = 'n', long = "names")]
        names: Vec<String>,
        /// Remove all names, keeping the identity
        #[arg(short = 'N', long = "nuke-names")]
        nuke_names: bool,
    },
    /// List tagged objects in directories
    Ls {
        paths: Vec<PathBuf>,
        /// Only objects tagged with one of these names
        #[arg(short = 'n', long = "names")]
        names: Vec<String>,
    },
    /// Show the raw tag of each path
    Info {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Maintain the manifest
    Manifest {
        #[command(subcommand)]
        action: cli::manifest::ManifestAction,
    },
    /// Copy tagged objects from sources into a destination directory
    Backup {
        /// One or more groups of `[-n NAMES] SRC... DEST`; -n limits the
        /// group to objects tagged with one of NAMES
        #[arg(
            required = true,
            num_args = 2..,
            value_name = "[-n NAMES] SRC... DEST",
            trailing_var_arg = true,
            allow_hyphen_values = true
        )]
        args: Vec<String>,
    },
    /// Mark a directory as a backup destination
    MarkDest { dir: PathBuf },
    /// Show resolved configuration
    Config(cli::config::ConfigArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let _log_guard = match init_logging(LogConfig {
        app_name: "tagsync",
        verbose: cli.verbose,
        quiet: cli.quiet,
        log_dir: Some(tagsync::config::logs_dir()),
    }) {
        Ok(guard) => Some(guard),
        Err(err) => {
            eprintln!("Warning: {:#}", err);
            None
        }
    };

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if let Some(path) = destination_guard_path(&err) {
                eprintln!("{}", HelpfulError::destination_guard(&path));
                return ExitCode::from(EXIT_DESTINATION_GUARD);
            }
            eprintln!("{:?}", err);
            ExitCode::from(1)
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = resolve_config(&cli)?;
    let ctx = CliContext::new(config);
    run_command(&ctx, cli.command)
}

/// File configuration with command-line overrides applied.
fn resolve_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = Config::load_default().with_context(|| {
        format!(
            "Failed to load {}",
            tagsync::config::config_file_path().display()
        )
    })?;

    if let Some(manifest) = &cli.manifest {
        config.manifest_path = manifest.clone();
    }
    if cli.verbose || cli.quiet {
        config.verbosity = Verbosity::from_flags(cli.verbose, cli.quiet);
    }
    config.dry_run |= cli.dry_run;
    config.follow_symlinks |= cli.follow;
    Ok(config)
}

fn run_command(ctx: &CliContext, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Tag {
            paths,
            names,
            remove_names,
            remove_all_names,
            remove,
        } => cli::tag::run(
            ctx,
            cli::tag::TagArgs {
                paths,
                add: names,
                remove: remove_names,
                remove_all_names,
                remove_tag: remove,
            },
        ),
        Commands::Untag {
            paths,
            names,
            nuke_names,
        } => cli::tag::run_untag(
            ctx,
            cli::tag::UntagArgs {
                paths,
                names,
                nuke_names,
            },
        ),
        Commands::Ls { paths, names } => cli::ls::run(ctx, cli::ls::LsArgs { paths, names }),
        Commands::Info { paths } => cli::info::run(ctx, &paths),
        Commands::Manifest { action } => cli::manifest::run(ctx, action),
        Commands::Backup { args } => cli::backup::run(ctx, cli::backup::BackupArgs { args }),
        Commands::MarkDest { dir } => cli::backup::run_mark_dest(ctx, &dir),
        Commands::Config(args) => cli::config::run(ctx, args),
    }
}

/// Path of the destination that aborted a scan, if that is what failed.
fn destination_guard_path(err: &anyhow::Error) -> Option<PathBuf> {
    err.chain().find_map(|cause| match cause.downcast_ref::<TagSyncError>() {
        Some(TagSyncError::DestinationGuard { path }) => Some(path.clone()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_tag_with_repeated_names() {
        let cli = Cli::try_parse_from(["tagsync", "tag", "-n", "a,b", "-n", "c", "f1", "f2"]).unwrap();
        match cli.command {
            Commands::Tag { paths, names, .. } => {
                assert_eq!(paths, vec![PathBuf::from("f1"), PathBuf::from("f2")]);
                assert_eq!(names, vec!["a,b".to_string(), "c".to_string()]);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_remove_conflicts_with_names() {
        assert!(Cli::try_parse_from(["tagsync", "tag", "-r", "-n", "a", "f"]).is_err());
    }

    #[test]
    fn test_backup_needs_source_and_destination() {
        assert!(Cli::try_parse_from(["tagsync", "backup", "only"]).is_err());
        assert!(Cli::try_parse_from(["tagsync", "backup", "src", "dest"]).is_ok());
    }

    #[test]
    fn test_backup_keeps_group_flags_in_order() {
        let cli = Cli::try_parse_from([
            "tagsync", "--dry-run", "backup", "-n", "a", "src", "/mnt/a", "-n", "b", "docs", "/mnt/b",
        ])
        .unwrap();
        assert!(cli.dry_run);
        match cli.command {
            Commands::Backup { args } => {
                assert_eq!(args, vec!["-n", "a", "src", "/mnt/a", "-n", "b", "docs", "/mnt/b"]);
            }
            _ => panic!("expected backup"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["tagsync", "manifest", "flush", "--dry-run", "-q"]).unwrap();
        assert!(cli.dry_run);
        assert!(cli.quiet);
    }

    #[test]
    fn test_destination_guard_path_through_context() {
        let err = anyhow::Error::from(TagSyncError::DestinationGuard {
            path: PathBuf::from("/mnt/backup"),
        })
        .context("scan failed");
        assert_eq!(destination_guard_path(&err), Some(PathBuf::from("/mnt/backup")));

        let other = anyhow::anyhow!("boom");
        assert_eq!(destination_guard_path(&other), None);
    }
}
