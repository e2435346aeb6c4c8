//! `clusterup status` - compare the topology with the last recorded run
//!
//! Only the record file is consulted; nodes are never contacted.

use crate::Context;
use crate::action::Backends;
use crate::cli::StatusArgs;
use crate::config::Topology;
use crate::{state, ui};
use ::provision::{NodeRegistry, RecordStatus, RecordTable, StepGraph};
use anyhow::{Context as _, Result};
use colored::Colorize;
use serde::Serialize;
use std::collections::BTreeMap;

/// A (node, step) pair the last run did not leave converged
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Drift {
    pub node: String,
    pub step: String,
    /// `None` when the pair was never recorded
    pub status: Option<RecordStatus>,
    pub last_error: Option<String>,
}

/// Every targeted pair, in topological order per node, that is not
/// succeeded or skipped in `table`
pub fn drift(registry: &NodeRegistry, graph: &StepGraph, table: &RecordTable) -> Vec<Drift> {
    let mut drifted = Vec::new();

    for node in registry.nodes() {
        for step in graph.topological_order() {
            if !step.targets(node) {
                continue;
            }
            match table.get(node.name(), step.name()) {
                Some(record) if record.status.is_satisfied() => {}
                record => drifted.push(Drift {
                    node: node.name().to_string(),
                    step: step.name().to_string(),
                    status: record.map(|r| r.status),
                    last_error: record.and_then(|r| r.last_error.clone()),
                }),
            }
        }
    }

    drifted
}

pub fn run(ctx: &Context, args: &StatusArgs) -> Result<u8> {
    let topology = Topology::load(&args.topology)?;
    let registry = topology.registry(&BTreeMap::new())?;
    // Actions are built but never run
    let graph = topology.graph(&registry, &Backends::ssh())?;

    let path = state::records_path(args.records.as_deref(), &topology.name)?;
    let table = if path.exists() {
        RecordTable::load(&path)
            .with_context(|| format!("Failed to read records from {}", path.display()))?
    } else {
        if !ctx.quiet && !args.json {
            ui::warn(&format!("No records at {}", path.display()));
        }
        RecordTable::new()
    };

    let drifted = drift(&registry, &graph, &table);

    if args.json {
        for entry in &drifted {
            println!("{}", serde_json::to_string(entry)?);
        }
    } else if !ctx.quiet {
        print_drift(&topology.name, super::planned(&registry, &graph), &drifted);
    }

    Ok(u8::from(!drifted.is_empty()))
}

fn print_drift(name: &str, planned: usize, drifted: &[Drift]) {
    ui::header(&format!("Topology {name}"));

    if drifted.is_empty() {
        ui::success(&format!("All {planned} (node, step) pairs converged"));
        return;
    }

    for entry in drifted {
        let status = entry
            .status
            .map_or_else(|| "never run".to_string(), |s| s.to_string());
        println!(
            "  {} {}/{} {}",
            entry
                .status
                .map_or_else(|| "?".dimmed(), ui::status_symbol),
            entry.node.bold(),
            entry.step,
            status.dimmed()
        );
        if let Some(error) = &entry.last_error {
            ui::dim(&format!("    {error}"));
        }
    }

    println!();
    ui::warn(&format!(
        "{} of {planned} (node, step) pairs not converged",
        drifted.len()
    ));
}
