//! config command - show the resolved configuration

use crate::cli::CliContext;
use tagsync::config::{config_file_path, logs_dir, tagsync_home};
use tagsync::tag::MAX_TAG_LEN;

/// Arguments for the config command
#[derive(Debug, clap::Args)]
pub struct ConfigArgs {
    /// Show resolved configuration in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Run the config command
pub fn run(ctx: &CliContext, args: ConfigArgs) -> anyhow::Result<()> {
    let config = &ctx.config;
    let home = tagsync_home();
    let config_file = config_file_path();
    let logs = logs_dir();

    if args.json {
        let value = serde_json::json!({
            "home": home.to_string_lossy(),
            "config_file": {
                "path": config_file.to_string_lossy(),
                "exists": config_file.exists(),
            },
            "manifest": {
                "path": config.manifest_path.to_string_lossy(),
                "exists": config.manifest_path.exists(),
            },
            "logs": logs.to_string_lossy(),
            "attribute_name": config.attribute_name,
            "max_tag_len": MAX_TAG_LEN,
            "sentinel_name": config.sentinel_name,
            "follow_symlinks": config.follow_symlinks,
            "dry_run": config.dry_run,
            "verbosity": config.verbosity,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    let exists = |p: &std::path::Path| if p.exists() { "exists" } else { "not found" };

    println!("TAGSYNC CONFIGURATION");
    println!("=====================");
    println!();
    println!("Home:        {}", home.display());
    println!("Config file: {} ({})", config_file.display(), exists(&config_file));
    println!(
        "Manifest:    {} ({})",
        config.manifest_path.display(),
        exists(&config.manifest_path)
    );
    println!("Logs:        {}", logs.display());
    println!();
    println!("Attribute:   {} (max {} bytes)", config.attribute_name, MAX_TAG_LEN);
    println!("Sentinel:    {}", config.sentinel_name);
    println!("Follow symlinks: {}", if config.follow_symlinks { "yes" } else { "no" });
    Ok(())
}
