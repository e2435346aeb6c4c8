use colored::{ColoredString, Colorize};
use provision::{RecordStatus, RunStatus};
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
    println!("{}", underline(title).dimmed());
}

/// Rule as wide as `title` in characters; node names may be non-ASCII
fn underline(title: &str) -> String {
    "─".repeat(title.chars().count())
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Symbol for a record status
pub fn status_symbol(status: RecordStatus) -> ColoredString {
    match status {
        RecordStatus::Succeeded => "✓".green(),
        RecordStatus::Skipped => "=".dimmed(),
        RecordStatus::Failed => "✗".red(),
        RecordStatus::SkippedDueToDependency => "↷".yellow(),
        RecordStatus::Pending => "…".dimmed(),
        RecordStatus::Running => "▸".blue(),
    }
}

/// Colored label for the overall run outcome
pub fn run_status(status: RunStatus) -> ColoredString {
    let label = status.to_string();
    match status {
        RunStatus::Success => label.green().bold(),
        RunStatus::DryRun => label.cyan().bold(),
        RunStatus::PartialFailure => label.red().bold(),
        RunStatus::Cancelled => label.yellow().bold(),
    }
}

/// Format a duration as a short human-readable string
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 3600 {
        format!("{}h{:02}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else if secs >= 1 {
        format!("{:.1}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

// ============================================================================
// Tests
// ============================================================================
