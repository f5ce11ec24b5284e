//! End-of-run summary

use crate::crawler::CrawlSummary;
use std::fmt::Write;

/// Failed URLs listed before the rest is elided
const MAX_LISTED_FAILURES: usize = 50;

/// Renders the run summary as plain text
pub fn format_summary(summary: &CrawlSummary) -> String {
    let report = &summary.report;
    let records = &summary.writer.records;
    let mut out = String::new();

    // Writing to a String cannot fail
    let _ = writeln!(out, "=== Crawl Summary ===\n");
    match &summary.writer_error {
        Some(e) => {
            let _ = writeln!(out, "Status: aborted (store error: {})", e);
        }
        None if report.interrupted => {
            let _ = writeln!(out, "Status: interrupted");
        }
        None => {
            let _ = writeln!(out, "Status: completed");
        }
    }
    let _ = writeln!(out, "Elapsed: {:.1}s\n", summary.elapsed.as_secs_f64());

    let _ = writeln!(out, "Pages:");
    let _ = writeln!(out, "  Fetched: {}", report.pages_fetched);
    let _ = writeln!(out, "  Aircraft details: {}", report.details_fetched);
    let _ = writeln!(out, "  Failed: {}\n", report.failed.len());

    let _ = writeln!(out, "Records persisted:");
    let _ = writeln!(out, "  Aircraft: {}", records.aircrafts);
    let _ = writeln!(out, "  Histories: {}", records.histories);
    let _ = writeln!(out, "  Aliases: {}", records.aliases);
    let _ = writeln!(out, "  Rejected by validation: {}", report.rejected);
    let _ = writeln!(out, "  Batches committed: {}", summary.writer.batches);
    if summary.writer.archived_rows > 0 {
        let _ = writeln!(out, "  Rows archived: {}", summary.writer.archived_rows);
    }

    if !report.failed.is_empty() {
        let _ = writeln!(out, "\nFailed URLs ({}):", report.failed.len());
        for failure in report.failed.iter().take(MAX_LISTED_FAILURES) {
            let _ = writeln!(out, "  - {}", failure);
        }
        if report.failed.len() > MAX_LISTED_FAILURES {
            let _ = writeln!(
                out,
                "  ... and {} more",
                report.failed.len() - MAX_LISTED_FAILURES
            );
        }
    }

    out
}

/// Prints the run summary to stdout
pub fn print_summary(summary: &CrawlSummary) {
    print!("{}", format_summary(summary));
}
