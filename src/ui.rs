use colored::Colorize;
use converge::{NotificationRecord, RunOutcome, Status, Summary};
use std::time::Duration;

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

// ============================================================================
// Run Output
// ============================================================================

/// Uncolored symbol for a status
pub fn symbol(status: Status) -> &'static str {
    match status {
        Status::Unchanged => "○",
        Status::Changed => "✓",
        Status::Failed => "✗",
        Status::Skipped => "⊘",
    }
}

fn colored_symbol(status: Status) -> colored::ColoredString {
    let symbol = symbol(status);
    match status {
        Status::Unchanged => symbol.dimmed(),
        Status::Changed => symbol.green(),
        Status::Failed => symbol.red(),
        Status::Skipped => symbol.yellow(),
    }
}

/// Format an elapsed time compactly (`850ms`, `2.4s`, `1m05s`)
pub fn format_elapsed(elapsed: Duration) -> String {
    let millis = elapsed.as_millis();
    if millis < 1000 {
        format!("{millis}ms")
    } else if millis < 60_000 {
        format!("{:.1}s", elapsed.as_secs_f64())
    } else {
        let secs = elapsed.as_secs();
        format!("{}m{:02}s", secs / 60, secs % 60)
    }
}

/// What to print after the status word
fn outcome_detail(outcome: &RunOutcome) -> String {
    if let Some(error) = &outcome.error {
        return error.to_string();
    }
    if let Some(reason) = &outcome.skip_reason {
        return reason.to_string();
    }
    if outcome.applied.is_empty() {
        return String::new();
    }
    let applied: Vec<&str> = outcome.applied.iter().map(|a| a.as_str()).collect();
    applied.join(", ")
}

/// One line per resource outcome
pub fn outcome_line(outcome: &RunOutcome) -> String {
    let detail = outcome_detail(outcome);
    let detail = match outcome.status {
        Status::Failed => detail.red().to_string(),
        _ => detail.dimmed().to_string(),
    };
    format!(
        "  {} {} {} {} {}",
        colored_symbol(outcome.status),
        outcome.id,
        outcome.status,
        format_elapsed(outcome.elapsed).dimmed(),
        detail
    )
    .trim_end()
    .to_string()
}

/// One line per notification firing, indented under its source
pub fn notification_line(record: &NotificationRecord) -> String {
    let edge = &record.edge;
    let mut line = format!(
        "    {} {} {} ({}, from {})",
        "↳".cyan(),
        edge.action,
        edge.target,
        edge.timing,
        edge.source
    );
    if let Some(error) = &record.error {
        line.push_str(&format!(" {}", error.to_string().red()));
    } else if let Some(reason) = &record.skip_reason {
        line.push_str(&format!(" {}", format!("skipped: {reason}").yellow()));
    }
    line
}

/// Print final summary
pub fn print_summary(summary: &Summary, elapsed: Duration, cancelled: bool) {
    println!();
    if cancelled {
        println!("  {} Run cancelled", "⚠".yellow().bold());
    } else if summary.is_success() {
        println!(
            "  {} Host converged in {}",
            "✓".green().bold(),
            format_elapsed(elapsed)
        );
    } else {
        println!("  {} Convergence failed", "✗".red().bold());
    }

    if summary.changed > 0 {
        println!("    • {} resources changed", summary.changed);
    }
    if summary.unchanged > 0 {
        println!("    • {} resources unchanged", summary.unchanged);
    }
    if summary.skipped > 0 {
        println!("    • {} resources skipped", summary.skipped);
    }
    if summary.failed > 0 {
        println!("    • {} {} failed", summary.failed, "resources".red());
    }
    let notifications = summary.notifications_fired + summary.notifications_failed;
    if notifications > 0 {
        println!("    • {notifications} notifications fired");
    }
    if summary.notifications_failed > 0 {
        println!(
            "    • {} {} failed",
            summary.notifications_failed,
            "notifications".red()
        );
    }
}

// ============================================================================
// Tests
// ============================================================================
