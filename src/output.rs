//! Output formatting utilities
//!
//! Console lines for interactive runs. With `--verbose` the same events go
//! through `tracing` instead.

use colored::*;
use std::path::Path;

/// Trait for formatting console output with consistent styling
pub trait OutputFormatter {
    /// Formats a success message with green checkmark
    fn success(&self, message: &str) -> String;

    /// Formats an error message with red X
    fn error(&self, message: &str) -> String;

    /// Formats a warning message with yellow warning symbol
    fn warning(&self, message: &str) -> String;

    /// Formats an info message with blue info symbol
    fn info(&self, message: &str) -> String;

    /// Formats a progress message with blue arrow
    fn progress(&self, message: &str) -> String;

    /// Formats a skip message with yellow skip symbol
    fn skip(&self, message: &str) -> String;

    fn print_success(&self, message: &str) {
        println!("{}", self.success(message));
    }

    fn print_error(&self, message: &str) {
        eprintln!("{}", self.error(message));
    }

    fn print_warning(&self, message: &str) {
        println!("{}", self.warning(message));
    }

    fn print_info(&self, message: &str) {
        println!("{}", self.info(message));
    }

    fn print_progress(&self, message: &str) {
        println!("{}", self.progress(message));
    }

    fn print_skip(&self, message: &str) {
        println!("{}", self.skip(message));
    }
}

/// Standard console output formatter with colored output
#[derive(Debug, Clone, Copy)]
pub struct ConsoleFormatter;

impl OutputFormatter for ConsoleFormatter {
    fn success(&self, message: &str) -> String {
        format!("{} {}", "✓".bright_green(), message.green())
    }

    fn error(&self, message: &str) -> String {
        format!("{} {}", "✗".bright_red(), message.red())
    }

    fn warning(&self, message: &str) -> String {
        format!("{} {}", "⚠".bright_yellow(), message.yellow())
    }

    fn info(&self, message: &str) -> String {
        format!("{} {}", "ℹ".bright_blue(), message.dimmed())
    }

    fn progress(&self, message: &str) -> String {
        format!("{} {}", "→".bright_blue(), message.bright_white())
    }

    fn skip(&self, message: &str) -> String {
        format!("{} {}", "⏭".bright_yellow(), message.dimmed())
    }
}

/// Messages for the batch operations on local files and remote assets
pub trait AssetFormatter {
    /// Progress line for the `index`-th of `total` files
    fn format_upload_progress(&self, index: usize, total: usize, path: &Path) -> String;

    fn format_upload_success(&self, path: &Path, task_id: &str) -> String;

    fn format_upload_failure(&self, path: &Path, reason: &str) -> String;

    /// Formats a skip message for files without a metadata row
    fn format_skip_missing_metadata(&self, path: &Path) -> String;

    fn format_collection_created(&self, asset_id: &str) -> String;

    fn format_deleted(&self, asset_id: &str) -> String;

    fn format_cancelled(&self, count: usize) -> String;

    /// Closing line pointing at the failure report
    fn format_report_summary(&self, failures: usize, report: &Path) -> String;
}

impl<T: OutputFormatter> AssetFormatter for T {
    fn format_upload_progress(&self, index: usize, total: usize, path: &Path) -> String {
        self.progress(&format!("[{}/{}] uploading: {}", index, total, path.display()))
    }

    fn format_upload_success(&self, path: &Path, task_id: &str) -> String {
        self.success(&format!("ingesting: {} (task {})", path.display(), task_id))
    }

    fn format_upload_failure(&self, path: &Path, reason: &str) -> String {
        self.error(&format!("failed: {} ({})", path.display(), reason))
    }

    fn format_skip_missing_metadata(&self, path: &Path) -> String {
        self.skip(&format!("skipped, no metadata: {}", path.display()))
    }

    fn format_collection_created(&self, asset_id: &str) -> String {
        self.success(&format!("created collection: {}", asset_id))
    }

    fn format_deleted(&self, asset_id: &str) -> String {
        format!("  {} deleted: {}", "🗑".bright_red(), asset_id)
    }

    fn format_cancelled(&self, count: usize) -> String {
        match count {
            0 => self.info("no running tasks to cancel"),
            1 => self.success("cancelled 1 running task"),
            n => self.success(&format!("cancelled {} running tasks", n)),
        }
    }

    fn format_report_summary(&self, failures: usize, report: &Path) -> String {
        if failures == 0 {
            self.success(&format!("no failures, report at {}", report.display()))
        } else {
            self.warning(&format!(
                "{} failures written to {}",
                failures,
                report.display()
            ))
        }
    }
}

/// Global formatter instance for consistent usage across the application
pub const FORMATTER: ConsoleFormatter = ConsoleFormatter;
