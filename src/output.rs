use std::io::{self, Write};

use serde::Serialize;
use tracing::info;

use crate::app::{
    PrepareResult, ProgressEvent, ProgressSink, ProgressSinkKind, RunResult, SweepResult,
};
use crate::cache::CacheCatalogWrite;
use crate::catalog::CatalogStats;
use crate::search::SearchReport;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Interactive sink: progress goes to the log on stderr.
pub struct LogSink {
    kind: ProgressSinkKind,
}

impl LogSink {
    pub fn new(kind: ProgressSinkKind) -> Self {
        Self { kind }
    }

    fn label(&self) -> &'static str {
        match self.kind {
            ProgressSinkKind::Prepare => "prepare",
            ProgressSinkKind::Search => "search",
            ProgressSinkKind::Catalog => "catalog",
        }
    }
}

impl ProgressSink for LogSink {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => info!(
                command = self.label(),
                elapsed_ms = elapsed.as_millis() as u64,
                "{}",
                event.message
            ),
            None => info!(command = self.label(), "{}", event.message),
        }
    }
}

const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

pub struct HumanOutput;

impl HumanOutput {
    pub fn print_prepare(result: &PrepareResult) {
        println!("{CYAN}KIRA-SS catalog summary{RESET}");
        println!(
            "identifiers: {}  present: {}  missing: {}",
            result.identifiers, result.present, result.missing
        );
        if result.download_skipped {
            println!("{YELLOW}downloads skipped (skip_download){RESET}");
        } else {
            println!("{GREEN}fetched: {}{RESET}", result.fetched.len());
            println!("{YELLOW}not in wort: {}{RESET}", result.not_found.len());
            println!("{RED}failed: {}{RESET}", result.failed.len());
            for failure in &result.failed {
                println!("{RED}   {} ({}){RESET}", failure.id, failure.cause);
            }
        }
        println!(
            "{GREEN}catalog: {} ({} entries){RESET}",
            result.catalog.path, result.catalog.entries
        );
        if !result.catalog.dropped.is_empty() {
            println!(
                "{YELLOW}dropped {} vanished entries{RESET}",
                result.catalog.dropped.len()
            );
        }
        if let Some(cache) = &result.cache_catalog {
            Self::print_cache(cache);
        }
        if !result.is_complete() {
            println!(
                "{YELLOW}catalog is partial; rerun to retry missing signatures{RESET}"
            );
        }
    }

    pub fn print_cache(result: &CacheCatalogWrite) {
        println!(
            "{GREEN}cache catalog: {} ({} entries){RESET}",
            result.path, result.entries
        );
    }

    pub fn print_search(report: &SearchReport) {
        let color = if report.success { GREEN } else { YELLOW };
        println!("{CYAN}KIRA-SS search{RESET}");
        println!("{color}searcher: {}{RESET}", report.program);
        match report.exit_code {
            Some(code) => println!("{color}exit code: {code}{RESET}"),
            None if report.launched => println!("{color}terminated by signal{RESET}"),
            None => println!("{RED}not launched: {}{RESET}", report.stderr),
        }
        match &report.output {
            Some(path) => println!("{color}results: {path}{RESET}"),
            None => println!("{YELLOW}no results file produced{RESET}"),
        }
    }

    pub fn print_run(result: &RunResult) {
        Self::print_prepare(&result.prepare);
        Self::print_search(&result.search);
    }

    pub fn print_stats(stats: &CatalogStats) {
        println!(
            "{}, {:.2} GiB ({} entries)",
            group_thousands(stats.total_bytes),
            stats.total_gib,
            stats.entries
        );
        if !stats.missing.is_empty() {
            println!("{YELLOW}{} entries missing on disk{RESET}", stats.missing.len());
        }
    }

    pub fn print_sweep(result: &SweepResult) {
        println!(
            "{GREEN}removed {} partial download(s) from {}{RESET}",
            result.removed.len(),
            result.root
        );
    }
}

fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thousands_separator() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1000), "1,000");
        assert_eq!(group_thousands(1234567), "1,234,567");
    }
}
