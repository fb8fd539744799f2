//! Command-line interface for the geebam application
//!
//! This module handles argument parsing, logging setup and configuration
//! assembly for the batch asset manager.

use crate::error::{Error, Result};
use crate::models::{Config, LoginSettings, UploadMode};
use crate::uploader::UploadOptions;
use crate::worker::IngestionOptions;
use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Environment variable holding the login password for non-interactive runs
pub const PASSWORD_ENV: &str = "GEEBAM_PASSWORD";

/// Command-line arguments for the geebam application
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Batch asset manager for Google Earth Engine: upload, delete, cancel and report",
    long_about = "geebam uploads directories of rasters into image collections, deletes asset trees \
recursively, cancels running tasks and reports asset sizes and sharing.

CONFIGURATION:
  Environment Variables:
    EE_ACCESS_TOKEN   bearer token for the asset API
    EE_API_URL        asset API root (optional)
    GEEBAM_PASSWORD   login password, skips the interactive prompt

  Configuration Files:
    Use --init-config to generate an example YAML/JSON config file
    Use --config to load it

EXAMPLES:
    geebam upload -u me@gmail.com --source ./tiles --dest users/me/tiles
    geebam upload -u me@gmail.com --source ./tiles -m meta.csv --nodata -9999
    geebam delete users/me/tiles
    geebam cancel
    geebam report --filename usage",
    color = clap::ColorChoice::Always,
    styles = clap::builder::Styles::styled()
        .header(clap::builder::styling::AnsiColor::Yellow.on_default())
        .usage(clap::builder::styling::AnsiColor::Green.on_default())
        .literal(clap::builder::styling::AnsiColor::Green.on_default())
        .placeholder(clap::builder::styling::AnsiColor::Green.on_default())
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Enable verbose logging with detailed tracing information
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(
        short = 'c',
        long = "config",
        global = true,
        help = "Path to configuration file\n\
                • Supports YAML (.yaml, .yml) and JSON (.json) formats\n\
                • Use --init-config to generate example file",
        value_name = "FILE"
    )]
    pub config_file: Option<PathBuf>,

    /// Generate example configuration file template
    #[arg(long = "init-config", value_name = "FILE")]
    pub init_config: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Batch asset uploader
    Upload(UploadArgs),
    /// Deletes a collection or folder and everything inside it
    Delete {
        /// Full path, or a path relative to your home root; the last segment
        /// may hold `*`, `?` or `[..]` wildcards
        id: String,
    },
    /// Cancels all running tasks
    Cancel,
    /// Produces a summary of all assets
    Report {
        /// File name for the output CSV (".csv" is appended)
        #[arg(long)]
        filename: Option<PathBuf>,
    },
}

#[derive(clap::Args, Debug, Clone, PartialEq)]
pub struct UploadArgs {
    /// Google account name (gmail address)
    #[arg(short = 'u', long = "user")]
    pub user: String,

    /// Path to the directory with images for upload
    #[arg(long = "source", value_name = "DIR")]
    pub source: PathBuf,

    /// Full destination path, e.g. users/pinkiepie/myponycollection
    #[arg(long = "dest", value_name = "ASSET")]
    pub destination: Option<String>,

    /// Collection name, relative to your home root unless it starts with users/
    #[arg(long = "collection", value_name = "NAME", conflicts_with = "destination")]
    pub collection: Option<String>,

    /// Path to CSV with metadata
    #[arg(short = 'm', long = "metadata", value_name = "CSV")]
    pub metadata: Option<PathBuf>,

    /// Use multipart upload, for large files
    #[arg(long)]
    pub large: bool,

    /// The value to burn into the raster as missing data
    #[arg(long, allow_negative_numbers = true)]
    pub nodata: Option<i64>,

    /// Comma-separated alphanumeric names for the image bands
    #[arg(long, value_delimiter = ',', value_parser = parse_band_name)]
    pub bands: Vec<String>,

    /// Exit with code 1 when any file failed
    #[arg(short = 'e', long = "upload-catch-error")]
    pub upload_catch_error: bool,

    /// Exit with code 0 when every asset already exists
    #[arg(short = 'a', long = "tolerate-assets-already-exist")]
    pub tolerate_assets_already_exist: bool,
}

impl UploadArgs {
    pub fn to_options(&self) -> UploadOptions {
        UploadOptions {
            user: self.user.clone(),
            source_dir: self.source.clone(),
            destination: self.destination.clone(),
            collection: self.collection.clone(),
            metadata_path: self.metadata.clone(),
            ingestion: IngestionOptions {
                mode: if self.large {
                    UploadMode::Multipart
                } else {
                    UploadMode::Simple
                },
                nodata: self.nodata,
                bands: self.bands.clone(),
            },
        }
    }
}

fn parse_band_name(value: &str) -> std::result::Result<String, String> {
    if !value.is_empty() && value.chars().all(|c| c.is_ascii_alphanumeric()) {
        Ok(value.to_string())
    } else {
        Err(format!(
            "band names must be alphanumeric without spaces or special characters: {:?}",
            value
        ))
    }
}

/// Validates command-line arguments
pub fn validate_args(args: &Args) -> std::result::Result<(), String> {
    if args.init_config.is_some() {
        return Ok(());
    }

    let command = args
        .command
        .as_ref()
        .ok_or("A subcommand is required (upload, delete, cancel, report)")?;

    if let Some(config_file) = &args.config_file
        && !config_file.is_file()
    {
        return Err(format!(
            "Configuration file does not exist: {}",
            config_file.display()
        ));
    }

    if let Command::Upload(upload) = command {
        if !upload.source.is_dir() {
            return Err(format!(
                "Source directory does not exist: {}",
                upload.source.display()
            ));
        }
        if let Some(metadata) = &upload.metadata
            && !metadata.is_file()
        {
            return Err(format!("Metadata file does not exist: {}", metadata.display()));
        }
        if upload.destination.is_some() && upload.collection.is_some() {
            return Err("--dest and --collection are mutually exclusive".to_string());
        }
    }

    Ok(())
}

/// Initializes logging: `RUST_LOG` when set, otherwise warnings only, or
/// everything down to debug with `--verbose`
///
/// Without `--verbose` progress is printed by the console formatter instead.
pub fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Display startup banner with configuration information
pub fn display_banner(args: &Args) {
    if !args.verbose {
        return;
    }

    println!();
    println!("{}", "geebam".bright_cyan().bold());
    println!("{}", "=".repeat(40).bright_black());

    if let Some(Command::Upload(upload)) = &args.command {
        println!("Source: {}", upload.source.display().to_string().bright_white());
        let target = upload
            .destination
            .as_deref()
            .or(upload.collection.as_deref())
            .unwrap_or("(source directory name)");
        println!("Destination: {}", target.bright_white());
        println!(
            "Mode: {}",
            if upload.large { "Multipart" } else { "Simple" }.bright_green()
        );
    }

    if let Some(config_file) = &args.config_file {
        println!(
            "Config: {}",
            config_file.display().to_string().bright_magenta()
        );
    } else {
        println!("Config: {}", "Environment variables".bright_magenta());
    }

    println!("Verbose: {}", args.verbose.to_string().bright_blue());
    println!("{}", "=".repeat(40).bright_black());
    println!();
}

/// Generates and saves an example configuration file
pub async fn generate_example_config(path: &Path) -> std::result::Result<(), String> {
    let mut example_config = Config::default();
    example_config.api.access_token = Some("your_access_token_here".to_string());
    example_config.api.timeout_secs = Some(300);
    example_config.login = LoginSettings {
        success_markers: vec!["Earth Engine".to_string()],
        ..LoginSettings::default()
    };

    let content = if path.extension().and_then(|s| s.to_str()) == Some("json") {
        serde_json::to_string_pretty(&example_config)
            .map_err(|e| format!("Failed to serialize JSON: {}", e))?
    } else {
        serde_yaml::to_string(&example_config)
            .map_err(|e| format!("Failed to serialize YAML: {}", e))?
    };

    tokio::fs::write(path, content)
        .await
        .map_err(|e| format!("Failed to write config file: {}", e))?;

    println!(
        "{} Generated example configuration file: {}",
        "✓".bright_green(),
        path.display().to_string().bright_cyan()
    );
    println!();
    println!("{}", "Next steps:".bright_yellow().bold());
    println!("  1. Edit the configuration file and replace placeholder values");
    println!(
        "  2. Upload: {}",
        format!(
            "geebam -c {} upload -u you@gmail.com --source ./tiles",
            path.display()
        )
        .bright_white()
    );

    Ok(())
}

/// Creates configuration from the config file (if any), environment and flags
pub async fn create_config_from_args(args: &Args) -> Result<Config> {
    let config = match &args.config_file {
        Some(config_file) => Config::from_file(config_file).await?,
        None => Config::from_env()?,
    };
    let config = config.with_verbose(args.verbose);
    config.validate()?;
    Ok(config)
}

/// Login password: `GEEBAM_PASSWORD`, otherwise a hidden prompt
pub fn read_password(user: &str) -> Result<String> {
    if let Ok(password) = std::env::var(PASSWORD_ENV)
        && !password.is_empty()
    {
        return Ok(password);
    }
    dialoguer::Password::new()
        .with_prompt(format!("Password for {}", user))
        .interact()
        .map_err(|e| Error::authentication(format!("could not read password: {}", e)))
}
