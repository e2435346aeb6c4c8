//! Execution records and the run report
//!
//! One [`ExecutionRecord`] exists per (node, step) pair a run targets. The
//! record table is persisted as JSON Lines so later invocations can report
//! drift without probing the nodes again.

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::time::Duration;

/// Status of one (node, step) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecordStatus {
    /// Not started (cancelled before reaching it, or dry-run would apply)
    Pending,
    /// Currently being tried
    Running,
    /// Action ran and the idempotency check passed afterwards
    Succeeded,
    /// Retries exhausted or a non-retryable error
    Failed,
    /// Idempotency check already passed, nothing to do
    Skipped,
    /// A dependency did not succeed on this node
    SkippedDueToDependency,
}

impl RecordStatus {
    /// Whether dependents of this step may proceed
    pub fn is_satisfied(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Skipped)
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::SkippedDueToDependency => "skipped-due-to-dependency",
        };
        f.write_str(s)
    }
}

/// Per-node, per-step status entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub node: String,
    pub step: String,
    pub status: RecordStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl ExecutionRecord {
    pub fn new(node: &str, step: &str) -> Self {
        Self {
            node: node.to_string(),
            step: step.to_string(),
            status: RecordStatus::Pending,
            attempts: 0,
            last_error: None,
        }
    }
}

/// All records of a run, grouped by node in registry order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordTable {
    records: Vec<ExecutionRecord>,
}

impl RecordTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: ExecutionRecord) {
        self.records.push(record);
    }

    pub fn extend(&mut self, records: impl IntoIterator<Item = ExecutionRecord>) {
        self.records.extend(records);
    }

    pub fn records(&self) -> &[ExecutionRecord] {
        &self.records
    }

    pub fn get(&self, node: &str, step: &str) -> Option<&ExecutionRecord> {
        self.records
            .iter()
            .find(|r| r.node == node && r.step == step)
    }

    /// Records for one node, in the order they were produced
    pub fn for_node<'a>(&'a self, node: &'a str) -> impl Iterator<Item = &'a ExecutionRecord> {
        self.records.iter().filter(move |r| r.node == node)
    }

    /// Records that are neither succeeded nor skipped
    pub fn unsettled(&self) -> impl Iterator<Item = &ExecutionRecord> {
        self.records.iter().filter(|r| !r.status.is_satisfied())
    }

    pub fn count(&self, status: RecordStatus) -> usize {
        self.records.iter().filter(|r| r.status == status).count()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Write one JSON object per line
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let mut writer = BufWriter::new(fs::File::create(path)?);
        for record in &self.records {
            serde_json::to_writer(&mut writer, record)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;

        log::debug!("Saved {} records to {}", self.records.len(), path.display());
        Ok(())
    }

    /// Read a table written by [`RecordTable::save`]; blank lines are ignored
    pub fn load(path: &Path) -> Result<Self> {
        let reader = BufReader::new(fs::File::open(path)?);
        let mut table = Self::new();

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            table.push(serde_json::from_str(&line)?);
        }

        log::debug!("Loaded {} records from {}", table.len(), path.display());
        Ok(table)
    }
}

/// Overall outcome of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunStatus {
    /// Every record succeeded or was already satisfied
    Success,
    /// At least one record failed
    PartialFailure,
    /// Cancellation was observed during the run
    Cancelled,
    /// Only checks ran
    DryRun,
}

impl RunStatus {
    /// Process exit code for this outcome
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Success | Self::DryRun => 0,
            Self::PartialFailure => 1,
            Self::Cancelled => 3,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Success => "success",
            Self::PartialFailure => "partial-failure",
            Self::Cancelled => "cancelled",
            Self::DryRun => "dry-run",
        };
        f.write_str(s)
    }
}

/// Result of [`Executor::execute`](crate::Executor::execute)
#[derive(Debug, Clone)]
pub struct RunReport {
    pub status: RunStatus,
    pub records: RecordTable,
    /// Backoff delays slept per (node, step), in order
    pub delays: BTreeMap<(String, String), Vec<Duration>>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub fn delays_for(&self, node: &str, step: &str) -> &[Duration] {
        self.delays
            .get(&(node.to_string(), step.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(node: &str, step: &str, status: RecordStatus) -> ExecutionRecord {
        ExecutionRecord {
            status,
            attempts: 1,
            ..ExecutionRecord::new(node, step)
        }
    }

    #[test]
    fn test_status_serializes_kebab_case() {
        let json = serde_json::to_string(&RecordStatus::SkippedDueToDependency).unwrap();
        assert_eq!(json, "\"skipped-due-to-dependency\"");
        assert_eq!(
            RecordStatus::SkippedDueToDependency.to_string(),
            "skipped-due-to-dependency"
        );
    }

    #[test]
    fn test_save_writes_one_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("records.jsonl");

        let mut table = RecordTable::new();
        table.push(record("head", "install", RecordStatus::Succeeded));
        table.push(ExecutionRecord {
            last_error: Some("exit 1".into()),
            attempts: 3,
            ..record("compute2", "exchange-keys", RecordStatus::Failed)
        });
        table.save(&path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            r#"{"node":"head","step":"install","status":"succeeded","attempts":1,"last_error":null}"#
        );

        let loaded = RecordTable::load(&path).unwrap();
        assert_eq!(loaded, table);
    }

    #[test]
    fn test_unsettled_and_counts() {
        let mut table = RecordTable::new();
        table.push(record("head", "a", RecordStatus::Succeeded));
        table.push(record("head", "b", RecordStatus::Skipped));
        table.push(record("compute1", "a", RecordStatus::Failed));
        table.push(record("compute1", "b", RecordStatus::SkippedDueToDependency));

        let unsettled: Vec<_> = table.unsettled().map(|r| r.step.as_str()).collect();
        assert_eq!(unsettled, vec!["a", "b"]);
        assert_eq!(table.count(RecordStatus::Failed), 1);
        assert_eq!(table.for_node("head").count(), 2);
        assert_eq!(
            table.get("compute1", "b").unwrap().status,
            RecordStatus::SkippedDueToDependency
        );
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(RunStatus::Success.exit_code(), 0);
        assert_eq!(RunStatus::DryRun.exit_code(), 0);
        assert_eq!(RunStatus::PartialFailure.exit_code(), 1);
        assert_eq!(RunStatus::Cancelled.exit_code(), 3);
    }
}
