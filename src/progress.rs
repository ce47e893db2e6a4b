//! Progress display and result summaries
//!
//! Uses an indicatif spinner while a command runs and prints styled
//! summaries with console once it ends.

use crate::digest::bytes_to_mb;
use crate::export::ExportSummary;
use crate::poller::TrackedItem;
use crate::report::CheckReport;
use crate::upload::{ImportSummary, UploadSession};
use console::style;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Spinner with a one-line status message
pub struct ProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter {
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();

        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .expect("Invalid progress template")
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );

        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Running totals of `check image`
    pub fn update_check(&self, report: &CheckReport) {
        let msg = format!(
            "Files: {} | Invalid: {} | Size: {} | GP: {:.3}",
            format_number(report.total() as u64),
            format_number(report.invalid_count() as u64),
            format_size(report.total_bytes, BINARY),
            report.total_gigapixels,
        );
        self.bar.set_message(msg);
    }

    /// Running totals of `import image`
    pub fn update_import(&self, summary: &ImportSummary) {
        let msg = format!(
            "Done: {} | Ready: {} | Invalid: {} | Timeout: {} | Failed: {}",
            format_number(summary.total as u64),
            format_number(summary.ready as u64),
            summary.invalid,
            summary.timed_out,
            summary.failed,
        );
        self.bar.set_message(msg);
    }

    /// Running totals of `export image`
    pub fn update_export(&self, summary: &ExportSummary) {
        let mut msg = format!(
            "Exported: {}/{}",
            format_number(summary.exported as u64),
            format_number(summary.total as u64),
        );
        if summary.downloaded + summary.download_failed > 0 {
            msg.push_str(&format!(
                " | Downloaded: {} | Failed: {}",
                format_number(summary.downloaded as u64),
                summary.download_failed,
            ));
        }
        self.bar.set_message(msg);
    }

    pub fn set_status(&self, status: &str) {
        self.bar.set_message(status.to_string());
    }

    /// Print a line above the spinner
    pub fn println(&self, line: &str) {
        self.bar.println(line);
    }

    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    pub fn finish_and_clear(&self) {
        self.bar.finish_and_clear();
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Format a number with thousands separators
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();

    let chunks: Vec<String> = bytes
        .chunks(3)
        .map(|chunk| chunk.iter().rev().map(|&b| b as char).collect::<String>())
        .collect();

    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}

/// Print a header at the start of a command
pub fn print_header(command: &str, source: &str, workers: usize) {
    println!();
    println!(
        "{} {} {}",
        style("alti-cli").cyan().bold(),
        env!("CARGO_PKG_VERSION"),
        style(command).dim()
    );
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Source:").bold(), source);
    if workers > 0 {
        println!("  {} {}", style("Workers:").bold(), workers);
    }
    println!();
}

/// Print the `check image` report
pub fn print_check_summary(report: &CheckReport, duration: Duration, table: bool) {
    let invalid = report.invalid();
    if !invalid.is_empty() {
        println!();
        println!("{}", style("Invalid files").yellow().bold());
        for r in &invalid {
            let reason = r.error.as_ref().map(|e| e.to_string()).unwrap_or_default();
            println!("  {} {}", style(r.path.display()).dim(), reason);
        }
    }

    if table {
        print_image_table(report);
    }

    let duplicates = report.duplicates();
    if !duplicates.is_empty() {
        println!();
        println!("{}", style("Duplicate images").yellow().bold());
        for (sum, paths) in &duplicates {
            println!("  {}", style(&sum[..sum.len().min(16)]).dim());
            for p in paths {
                println!("    {}", p.display());
            }
        }
    }

    let images = report.images().len() as u64;
    println!();
    println!("{}", style("Check Complete").green().bold());
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Images:").bold(), format_number(images));
    println!(
        "  {} {:.3} GP",
        style("Giga-pixels:").bold(),
        report.total_gigapixels
    );
    println!(
        "  {} {}",
        style("Total Size:").bold(),
        format_size(report.total_bytes, BINARY)
    );
    println!("  {} {:.1}s", style("Duration:").bold(), duration.as_secs_f64());
    if !invalid.is_empty() {
        println!(
            "  {} {}",
            style("Invalid:").yellow().bold(),
            format_number(invalid.len() as u64)
        );
    }
    if !duplicates.is_empty() {
        println!(
            "  {} {}",
            style("Duplicate groups:").yellow().bold(),
            duplicates.len()
        );
    }
    println!();
}

/// Print one row per valid image
pub fn print_image_table(report: &CheckReport) {
    println!();
    println!(
        "{}",
        style(format!(
            "{:<40} {:>7} {:>7} {:>9} {:>8} {:<12} {}",
            "Filename", "Width", "Height", "Size(MB)", "MP", "Type", "Checksum"
        ))
        .bold()
    );
    for r in report.images() {
        println!(
            "{:<40} {:>7} {:>7} {:>9.2} {:>8.2} {:<12} {}",
            truncate(&r.filename, 40),
            r.width,
            r.height,
            bytes_to_mb(r.filesize),
            r.megapixels(),
            r.filetype,
            r.checksum
        );
    }
}

/// Print the destination of an import
pub fn print_session(session: &UploadSession) {
    println!("  {} {}", style("Method:").bold(), session.method);
    if !session.bucket.is_empty() {
        println!("  {} {}", style("Bucket:").bold(), session.bucket);
    }
    println!("  {} {}", style("Project:").bold(), session.project_id);
}

/// One line per finalized item, used in verbose mode
pub fn item_line(item: &TrackedItem) -> String {
    match &item.error {
        None => format!("{} {} {}", style("✓").green(), item.filename, style(&item.state).dim()),
        Some(e) => format!("{} {} {}", style("✗").red(), item.filename, e),
    }
}

/// Print the `import image` summary
pub fn print_import_summary(summary: &ImportSummary) {
    if !summary.rejected.is_empty() {
        println!();
        println!("{}", style("Not imported").yellow().bold());
        let mut rejected: Vec<_> = summary.rejected.iter().collect();
        rejected.sort_by(|a, b| a.filename.cmp(&b.filename));
        for item in rejected {
            println!("  {}", item_line(item));
        }
    }

    println!();
    let title = if summary.is_success() {
        style("Import Complete").green().bold()
    } else {
        style("Import Finished With Errors").yellow().bold()
    };
    println!("{}", title);
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Images:").bold(), format_number(summary.total as u64));
    println!("  {} {}", style("Ready:").bold(), format_number(summary.ready as u64));
    let counts = [
        ("Invalid:", summary.invalid),
        ("Timed out:", summary.timed_out),
        ("Aborted:", summary.cancelled),
        ("Failed:", summary.failed),
    ];
    for (label, n) in counts {
        if n > 0 {
            println!("  {} {}", style(label).yellow().bold(), format_number(n as u64));
        }
    }
    if let Some(e) = &summary.walk_error {
        println!("  {} {}", style("Walk error:").red().bold(), e);
    }
    println!(
        "  {} {:.1}s",
        style("Duration:").bold(),
        summary.elapsed.as_secs_f64()
    );
    println!();
}

/// Print the `export image` summary
pub fn print_export_summary(summary: &ExportSummary, download: bool) {
    println!();
    let Some(out) = &summary.out else {
        println!("{}", style("No image is found").yellow().bold());
        println!();
        return;
    };
    let title = if summary.download_failed == 0 {
        style("Export Complete").green().bold()
    } else {
        style("Export Finished With Errors").yellow().bold()
    };
    println!("{}", title);
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Images:").bold(), format_number(summary.exported as u64));
    println!("  {} {}", style("CSV:").bold(), out.display());
    if download {
        println!("  {} {}", style("Downloaded:").bold(), format_number(summary.downloaded as u64));
        if summary.not_ready > 0 {
            println!("  {} {}", style("Not ready:").dim(), format_number(summary.not_ready as u64));
        }
        if summary.download_failed > 0 {
            println!(
                "  {} {}",
                style("Failed:").yellow().bold(),
                format_number(summary.download_failed as u64)
            );
        }
    }
    println!(
        "  {} {:.1}s",
        style("Duration:").bold(),
        summary.elapsed.as_secs_f64()
    );
    println!();
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let head: String = s.chars().take(max.saturating_sub(1)).collect();
    format!("{}…", head)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1234567), "1,234,567");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short.jpg", 40), "short.jpg");
        let long = "a".repeat(50);
        let t = truncate(&long, 10);
        assert_eq!(t.chars().count(), 10);
        assert!(t.ends_with('…'));
    }
}
