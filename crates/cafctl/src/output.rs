//! Output rendering for the cafctl CLI.
//!
//! Every command supports two renderings: a human-readable form for the
//! terminal and machine-readable JSON behind `--json`.

use chrono::{DateTime, Local, Utc};

use cafctl_core::{
    NoticeSeverity, OptionKind, RemainingDisplay, StatusReport, StopReason, ThresholdEvent,
};
use cafctl_protocol::EventKind;

use crate::error::Result;

/// Prints a status report.
pub fn print_status(report: &StatusReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    if report.session.active {
        let remaining = report.session.remaining_secs.unwrap_or(0) as i64;
        let total = report.session.duration_secs.unwrap_or(0) as i64;
        let percent = report.session.percent_remaining.unwrap_or(0.0);
        println!(
            "Session:   active, {} remaining of {} ({percent:.0}%)",
            RemainingDisplay(remaining),
            RemainingDisplay(total),
        );
        if let Some(end_at) = report.session.end_at {
            println!("           ends at {}", format_local(end_at));
        }
    } else {
        println!("Session:   idle");
    }

    println!("Options:   {}", describe_options(report));
    println!("Lid sleep: {}", describe_lid(report));
    println!(
        "Alarm:     {}",
        if report.alarm_enabled { "on" } else { "off" }
    );
    Ok(())
}

/// Prints the reply to a successful start.
pub fn print_started(report: &StatusReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    let total = report.session.duration_secs.unwrap_or(0) as i64;
    print!("Keeping awake for {}", RemainingDisplay(total));
    match report.session.end_at {
        Some(end_at) => println!(" (until {}).", format_local(end_at)),
        None => println!("."),
    }
    Ok(())
}

/// Prints the reply to a stop.
pub fn print_stopped(reason: Option<StopReason>, json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({ "stopped": reason.is_some(), "reason": reason }))?
        );
        return Ok(());
    }

    match reason {
        Some(_) => println!("Session stopped."),
        None => println!("No session was running."),
    }
    Ok(())
}

/// Renders a broadcast event as a single output line.
pub fn render_event(event: &EventKind) -> String {
    match event {
        EventKind::SessionStarted { report } => {
            let total = report.session.duration_secs.unwrap_or(0) as i64;
            format!("session started ({})", RemainingDisplay(total))
        }
        EventKind::SessionEnded { reason } => format!("session ended: {reason}"),
        EventKind::Threshold {
            threshold,
            remaining_secs,
        } => match threshold {
            ThresholdEvent::TenPercent | ThresholdEvent::FivePercent => {
                format!(
                    "{} remaining ({})",
                    RemainingDisplay(*remaining_secs as i64),
                    describe_threshold(threshold)
                )
            }
            ThresholdEvent::FinalSecond(n) => format!("{n}..."),
        },
        EventKind::LidChanged {
            preference,
            actual_active,
        } => {
            if *actual_active {
                "lid sleep disabled (machine stays awake with lid closed)".to_string()
            } else if *preference {
                "lid sleep override pending".to_string()
            } else {
                "lid sleep restored".to_string()
            }
        }
        EventKind::Notice {
            severity,
            message,
            remediation,
        } => {
            let prefix = match severity {
                NoticeSeverity::Info => "note",
                NoticeSeverity::Warning => "warning",
            };
            match remediation {
                Some(fix) => format!("{prefix}: {message} (try: {fix})"),
                None => format!("{prefix}: {message}"),
            }
        }
    }
}

fn describe_threshold(threshold: &ThresholdEvent) -> &'static str {
    match threshold {
        ThresholdEvent::TenPercent => "10% left",
        ThresholdEvent::FivePercent => "5% left",
        ThresholdEvent::FinalSecond(_) => "final countdown",
    }
}

/// Lists the enabled option flags, or "none".
fn describe_options(report: &StatusReport) -> String {
    let kinds = [
        OptionKind::DisplaySleep,
        OptionKind::IdleSleep,
        OptionKind::DiskSleep,
        OptionKind::SystemSleep,
        OptionKind::UserActive,
    ];

    let enabled: Vec<String> = kinds
        .iter()
        .filter(|k| report.options.get(**k))
        .map(|k| k.to_string())
        .collect();

    if enabled.is_empty() {
        "none".to_string()
    } else {
        enabled.join(", ")
    }
}

fn describe_lid(report: &StatusReport) -> String {
    match (report.lid.preference, report.lid.actual_active) {
        (true, true) => "disabled (flag set, machine stays awake with lid closed)".to_string(),
        (true, false) => "will be disabled while a session runs".to_string(),
        (false, true) => "enabled, but the system flag is still set".to_string(),
        (false, false) => "enabled (normal)".to_string(),
    }
}

fn format_local(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%H:%M:%S").to_string()
}
