//! Terminal rendering for scan and probe reports.
//!
//! Human output is a fixed-width table on stdout; `--json` callers get the
//! serialized reports instead and never come through here.

use std::io::IsTerminal;

use crate::probe::{ProbeFinding, ProbeOutcome, ProbeReport};
use crate::providers::ProviderSpec;
use crate::scan::{KeyFinding, KeySource, KeyStatus, ScanReport};

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";

const RULE_WIDTH: usize = 72;

/// Escape codes in use, or empty strings when color is off.
#[derive(Debug, Clone, Copy)]
pub struct Style {
    pub green: &'static str,
    pub red: &'static str,
    pub yellow: &'static str,
    pub dim: &'static str,
    pub bold: &'static str,
    pub reset: &'static str,
}

impl Style {
    pub fn ansi() -> Style {
        Style {
            green: GREEN,
            red: RED,
            yellow: YELLOW,
            dim: DIM,
            bold: BOLD,
            reset: RESET,
        }
    }

    pub fn plain() -> Style {
        Style {
            green: "",
            red: "",
            yellow: "",
            dim: "",
            bold: "",
            reset: "",
        }
    }

    /// Color on a real terminal unless `NO_COLOR` is set.
    pub fn auto() -> Style {
        if std::env::var_os("NO_COLOR").is_none() && std::io::stdout().is_terminal() {
            Style::ansi()
        } else {
            Style::plain()
        }
    }
}

/// Print a formatted table of scan findings to stdout.
pub fn print_scan(report: &ScanReport, s: &Style) {
    let reset = s.reset;
    let dim = s.dim;

    println!();
    let file_note = if report.env_file_found { "" } else { " (not found)" };
    println!(
        "{}keycheck scan — {}{file_note}{reset}",
        s.bold,
        report.env_file.display()
    );
    println!("{}", "─".repeat(RULE_WIDTH));

    for f in &report.findings {
        println!("{}", scan_row(f, s));
    }

    if !report.file_diagnostics.is_empty() {
        println!();
        println!("  {}file issues{reset}", s.bold);
        for d in &report.file_diagnostics {
            println!(
                "  {}✗{reset}  line {:<4} {:<26} {}",
                s.red,
                d.line,
                d.excerpt,
                d.kind.describe()
            );
        }
    }

    println!("{}", "─".repeat(RULE_WIDTH));

    let failed = report.failed_count() + report.file_diagnostics.len();
    if failed == 0 {
        println!("{}All keys look good.{reset}", s.green);
    } else {
        println!(
            "{}{failed} problem(s) found. See above for details.{reset}",
            s.red
        );
    }
    println!("{dim}score: {}/100{reset}", report.score);
    println!();
}

/// Print a formatted table of probe results to stdout.
pub fn print_probe(report: &ProbeReport, s: &Style) {
    let reset = s.reset;

    println!();
    println!("{}keycheck probe — live verification{reset}", s.bold);
    println!("{}", "─".repeat(RULE_WIDTH));

    for f in &report.findings {
        println!("{}", probe_row(f, s));
    }

    println!("{}", "─".repeat(RULE_WIDTH));

    if !report.any_ran() {
        println!("{}Nothing was probed. See the reasons above.{reset}", s.red);
    } else {
        let failed = report
            .findings
            .iter()
            .filter(|f| f.outcome.is_failure())
            .count();
        if failed == 0 {
            println!("{}All probes passed.{reset}", s.green);
        } else {
            println!(
                "{}{failed} probe(s) failed. See above for details.{reset}",
                s.red
            );
        }
    }
    println!();
}

/// Print the provider registry.
pub fn print_providers(specs: &[ProviderSpec], s: &Style) {
    let reset = s.reset;

    println!();
    println!("{}registered providers{reset}", s.bold);
    println!("{}", "─".repeat(RULE_WIDTH));
    for spec in specs {
        println!(
            "  {:<14} {:<22} {:<18} {}",
            spec.name,
            spec.env_var,
            spec.prefixes.join(", "),
            spec.console_url.as_deref().unwrap_or("-")
        );
    }
    println!("{}", "─".repeat(RULE_WIDTH));
    println!();
}

/// One scan table row. Pure so the rendering can be asserted on directly.
fn scan_row(f: &KeyFinding, s: &Style) -> String {
    let reset = s.reset;
    let dim = s.dim;
    let (symbol, color) = match f.status {
        KeyStatus::Ok => ("✓", s.green),
        KeyStatus::FormatQuirk => ("!", s.yellow),
        _ => ("✗", s.red),
    };
    let shown = f.masked.as_deref().unwrap_or("-");
    let location = match &f.source {
        KeySource::EnvFile { line } => format!(" {dim}[line {line}]{reset}"),
        KeySource::ProcessEnv => format!(" {dim}[process env]{reset}"),
        KeySource::Absent => String::new(),
    };
    format!(
        "  {color}{symbol}{reset}  {:<22} {:<26} {}{location}",
        f.env_var, shown, f.detail
    )
}

/// One probe table row.
fn probe_row(f: &ProbeFinding, s: &Style) -> String {
    let reset = s.reset;
    let dim = s.dim;
    let (symbol, color) = match &f.outcome {
        ProbeOutcome::Valid { .. } => ("✓", s.green),
        ProbeOutcome::RateLimited => ("!", s.yellow),
        ProbeOutcome::Skipped { .. } => ("–", s.dim),
        _ => ("✗", s.red),
    };
    let shown = f.masked.as_deref().unwrap_or("-");
    let timing = match &f.outcome {
        ProbeOutcome::Skipped { .. } => String::new(),
        _ => format!(" {dim}{} ms{reset}", f.elapsed_ms),
    };
    format!(
        "  {color}{symbol}{reset}  {:<22} {:<16} {}{timing}",
        f.env_var,
        shown,
        outcome_text(&f.outcome)
    )
}

fn outcome_text(outcome: &ProbeOutcome) -> String {
    match outcome {
        ProbeOutcome::Valid { note: Some(n) } => format!("valid ({n})"),
        ProbeOutcome::Valid { note: None } => "valid".to_string(),
        ProbeOutcome::Unauthorized => "unauthorized, the provider rejected this key".to_string(),
        ProbeOutcome::RateLimited => "rate limited, could not verify; retry shortly".to_string(),
        ProbeOutcome::ProviderError { status } => format!("provider error (HTTP {status})"),
        ProbeOutcome::Network { detail } => format!("network failure: {detail}"),
        ProbeOutcome::Skipped { reason } => format!("skipped: {reason}"),
    }
}
