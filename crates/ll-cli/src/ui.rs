//! Terminal output: progress reporter and list formatting.

use std::io::Write;
use std::sync::Mutex;

use crossterm::style::Stylize;
use crossterm::terminal::{Clear, ClearType};
use crossterm::{cursor, execute};
use ll_core::Reporter;
use ll_schema::Reference;

/// Column width for references in `ll-repo list`.
const REF_WIDTH: usize = 56;

/// Writes progress to stderr, redrawing one status line per reference.
#[derive(Debug, Default)]
pub struct TerminalReporter {
    // last reference a progress line was drawn for
    live: Mutex<Option<String>>,
}

impl TerminalReporter {
    fn end_live_line(&self) {
        let mut live = self.live.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if live.take().is_some() {
            eprintln!();
        }
    }
}

impl Reporter for TerminalReporter {
    fn section(&self, title: &str) {
        self.end_live_line();
        eprintln!("{}", title.bold());
    }

    fn progress(&self, reference: &Reference, percent: u32, status: &str) {
        let mut live = self.live.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *live = Some(reference.to_string());
        let mut err = std::io::stderr();
        let _ = execute!(err, cursor::MoveToColumn(0), Clear(ClearType::CurrentLine));
        let _ = write!(
            err,
            "  {} {:>3}% {}",
            reference.app_id.as_str().cyan(),
            percent,
            status.dark_grey()
        );
        let _ = err.flush();
    }

    fn done(&self, reference: &Reference, detail: &str) {
        self.end_live_line();
        eprintln!("  {} {} {}", "✓".green(), reference, detail.dark_grey());
    }

    fn failed(&self, reference: &Reference, reason: &str) {
        self.end_live_line();
        eprintln!("  {} {} {}", "✗".red(), reference, reason.red());
    }

    fn info(&self, msg: &str) {
        self.end_live_line();
        eprintln!("  {msg}");
    }

    fn warning(&self, msg: &str) {
        self.end_live_line();
        eprintln!("  {} {msg}", "warning:".yellow());
    }
}

/// Print column headers for `ll-repo list`
pub fn print_ref_header() {
    let header = format!("  {:<REF_WIDTH$} {}", "reference", "commit");
    println!("{}", header.dark_grey());
}

/// Print one row for `ll-repo list`
pub fn print_ref_row(reference: &Reference, commit: &str) {
    let name = format!("{:<REF_WIDTH$}", reference.to_canonical_string());
    let short = commit.get(..12).unwrap_or(commit);
    println!("  {} {}", name.cyan(), short.dark_grey());
}

/// Print footer for `ll-repo list`
pub fn print_ref_footer(count: usize) {
    println!();
    println!("{}", format!("  {count} references").dark_grey());
}
