//! Progress bar over (node, step) completions

use indicatif::{ProgressBar, ProgressStyle};
use provision::{EventSink, LogEvents, ProvisionEvent, RecordStatus};

/// Event sink that advances a progress bar and forwards to the log
pub struct ProgressEvents {
    bar: ProgressBar,
}

impl ProgressEvents {
    /// A bar over `total` (node, step) pairs; hidden when `quiet`
    pub fn new(total: usize, quiet: bool) -> Self {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(total as u64)
        };
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        Self { bar }
    }

    pub fn bar(&self) -> &ProgressBar {
        &self.bar
    }
}

impl EventSink for ProgressEvents {
    fn emit(&self, event: &ProvisionEvent) {
        match event.status {
            RecordStatus::Running => {
                self.bar
                    .set_message(format!("{}: {}", event.node, event.step));
            }
            // Cancelled before finishing: never counted
            RecordStatus::Pending if event.error.is_some() => {}
            _ => self.bar.inc(1),
        }

        self.bar.suspend(|| LogEvents.emit(event));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_events_advance_the_bar() {
        let sink = ProgressEvents::new(3, true);

        sink.emit(&ProvisionEvent::new("head", "install", RecordStatus::Running, 1));
        sink.emit(&ProvisionEvent::new("head", "install", RecordStatus::Succeeded, 1));
        sink.emit(&ProvisionEvent::new("compute1", "install", RecordStatus::Skipped, 1));
        sink.emit(
            &ProvisionEvent::new("compute2", "install", RecordStatus::Pending, 1)
                .with_error("run cancelled"),
        );

        assert_eq!(sink.bar().position(), 2);
    }

    #[test]
    fn test_retries_do_not_advance() {
        let sink = ProgressEvents::new(1, true);
        sink.emit(
            &ProvisionEvent::new("compute2", "exchange-keys", RecordStatus::Running, 1)
                .with_error("exit 255"),
        );
        assert_eq!(sink.bar().position(), 0);
    }
}
