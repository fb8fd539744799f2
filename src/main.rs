//! Google Earth Engine Batch Asset Manager
//!
//! A command-line tool for bulk uploads, recursive deletes, task
//! cancellation and asset reports.

use anyhow::{Context, Result};
use clap::Parser;
use geebam::cli::{self, Command, UploadArgs};
use geebam::output::{AssetFormatter, FORMATTER, OutputFormatter};
use geebam::{AssetManager, Error};
use tracing::{error, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Args::parse();

    if let Some(config_path) = &args.init_config {
        if let Err(error_msg) = cli::generate_example_config(config_path).await {
            eprintln!("Error: {}", error_msg);
            std::process::exit(1);
        }
        return Ok(());
    }

    if let Err(error_msg) = cli::validate_args(&args) {
        eprintln!("Error: {}", error_msg);
        std::process::exit(1);
    }

    cli::init_logging(args.verbose);

    let config = match cli::create_config_from_args(&args).await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: Failed to create configuration: {}", e);
            std::process::exit(1);
        }
    };

    cli::display_banner(&args);

    let manager = AssetManager::new(config).context("Failed to initialize the asset API client")?;

    let Some(command) = args.command else {
        anyhow::bail!("No subcommand given");
    };

    match command {
        Command::Upload(upload) => run_upload(&manager, &upload).await,
        Command::Delete { id } => match manager.delete(&id).await {
            Ok(removed) => {
                FORMATTER.print_success(&format!("removed {} assets under {}", removed, id));
                Ok(())
            }
            Err(e) => exit_with(&e),
        },
        Command::Cancel => {
            let cancelled = manager
                .cancel_running_tasks()
                .await
                .context("Failed to cancel running tasks")?;
            println!("{}", FORMATTER.format_cancelled(cancelled));
            Ok(())
        }
        Command::Report { filename } => {
            let total = manager
                .report(filename.as_deref())
                .await
                .context("Failed to produce the asset report")?;
            println!("Total size [MB]: {:.2}", total);
            Ok(())
        }
    }
}

async fn run_upload(manager: &AssetManager, upload: &UploadArgs) -> Result<()> {
    let password = match cli::read_password(&upload.user) {
        Ok(password) => password,
        Err(e) => exit_with(&e),
    };

    match manager.upload(&upload.to_options(), &password).await {
        Ok(summary) => {
            println!(
                "{}",
                FORMATTER.format_report_summary(summary.failures, &summary.report_path)
            );
            if upload.upload_catch_error && summary.failures > 0 {
                std::process::exit(1);
            }
            Ok(())
        }
        Err(e @ Error::NothingToUpload { .. }) if upload.tolerate_assets_already_exist => {
            FORMATTER.print_warning(&e.to_string());
            Ok(())
        }
        Err(e) => exit_with(&e),
    }
}

/// Fatal errors are shown as errors, terminal no-op conditions as warnings;
/// both exit with status 1
fn exit_with(e: &Error) -> ! {
    if e.is_fatal() {
        error!("{}", e);
        FORMATTER.print_error(&e.to_string());
    } else {
        warn!("{}", e);
        FORMATTER.print_warning(&e.to_string());
    }
    std::process::exit(1);
}
