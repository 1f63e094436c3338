//! Colored terminal rendering of supervisor events.
//!
//! Tunnel output is printed as-is; log lines and supervisor notices carry a
//! `[HH:MM:SS]` prefix taken from the event's own timestamp.

use std::io::{self, Write};

use chrono::{DateTime, Local, Utc};
use owo_colors::OwoColorize;

use crate::events::{
    Diagnostic, DiagnosticLevel, LineSource, Status, StatusEvent, SupervisorEvent,
    TerminationEvent,
};
use crate::filter::OutputFilter;
use crate::supervisor::ProcessState;

/// How events are written to stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Colored human readable lines.
    #[default]
    Human,
    /// One JSON object per line.
    Json,
}

/// `[HH:MM:SS]` prefix in local time.
#[must_use]
pub fn clock(timestamp: DateTime<Utc>) -> String {
    format!("[{}]", timestamp.with_timezone(&Local).format("%H:%M:%S"))
}

fn level_label(level: DiagnosticLevel) -> &'static str {
    match level {
        DiagnosticLevel::Error => "Error",
        DiagnosticLevel::Warning => "Warning",
    }
}

/// Human readable summary of how the tunnel ended.
#[must_use]
pub fn describe_termination(term: &TerminationEvent) -> String {
    match term.signal {
        Some(signal) => format!(
            "Process terminated by signal {signal} (exit code {})",
            term.exit_code
        ),
        None => format!("Process exited with code {}", term.exit_code),
    }
}

/// Print an event in the requested mode.
pub fn print_event(event: &SupervisorEvent, mode: OutputMode) {
    match mode {
        OutputMode::Human => print_human(event),
        OutputMode::Json => print_json(event),
    }
    let _ = io::stdout().flush();
}

fn print_json(event: &SupervisorEvent) {
    match serde_json::to_string(event) {
        Ok(json) => println!("{json}"),
        Err(e) => tracing::warn!(error = %e, "Failed to serialize event"),
    }
}

fn print_human(event: &SupervisorEvent) {
    match event {
        SupervisorEvent::Output(line) => match line.source {
            LineSource::ProcessStream => println!("{}", line.text),
            LineSource::LogFile => {
                println!("{} {}", clock(line.timestamp).dimmed(), line.text);
            }
        },
        SupervisorEvent::Status(status) => print_status(status),
        SupervisorEvent::Diagnostic(diag) => print_diagnostic(diag),
        SupervisorEvent::Terminated(term) => {
            let text = describe_termination(term);
            if term.success() {
                println!("{} {}", clock(term.timestamp).dimmed(), text.green());
            } else {
                println!("{} {}", clock(term.timestamp).dimmed(), text.red().bold());
            }
        }
    }
}

fn print_status(status: &StatusEvent) {
    let ts = clock(status.timestamp);
    let text = status.describe();
    match &status.status {
        Status::Process(ProcessState::Running) => {
            println!("{} {}", ts.dimmed(), text.green().bold());
        }
        Status::Process(ProcessState::Failed) => {
            println!("{} {}", ts.dimmed(), text.red().bold());
        }
        Status::Process(_) => println!("{} {}", ts.dimmed(), text.yellow()),
        Status::Shutdown(_) => println!("{} {}", ts.dimmed(), text.dimmed()),
        Status::LogAttached(_) | Status::LogDetached(_) => {
            println!("{} {}", ts.dimmed(), text.cyan());
        }
    }
}

fn print_diagnostic(diag: &Diagnostic) {
    let ts = clock(diag.timestamp);
    let label = format!("{}:", level_label(diag.level));
    match diag.level {
        DiagnosticLevel::Error => {
            println!("{} {} {}", ts.dimmed(), label.red().bold(), diag.message);
        }
        DiagnosticLevel::Warning => {
            println!("{} {} {}", ts.dimmed(), label.yellow().bold(), diag.message);
        }
    }
}

/// Print whether `line` would be suppressed, and by which rule.
pub fn print_filter_check(filter: &OutputFilter, line: &str) {
    match filter.check(line) {
        Some(rule) => println!(
            "{} {} ({}: {})",
            "[SUPPRESSED]".yellow().bold(),
            line,
            rule.description().dimmed(),
            rule.pattern().dimmed()
        ),
        None => println!("{} {}", "[SHOWN]".green().bold(), line),
    }
}

/// Print an error message.
pub fn print_error(message: &str) {
    eprintln!("{} {}", "Error:".red().bold(), message);
}
