//! Execution engine - applies a step graph to every node with retries
//!
//! Each node gets its own task on a `rayon` pool with one thread per node.
//! The task walks the graph in topological order, so a node's steps never
//! overlap while different nodes proceed independently. The concurrency
//! cap is a set of worker slots held only while a try checks or applies;
//! backoff sleeps and readiness waits hold no slot and wake on
//! cancellation.

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::event::{EventSink, NoEvents, ProvisionEvent};
use crate::graph::StepGraph;
use crate::node::{Node, NodeState};
use crate::probe::{Capability, HealthProber};
use crate::record::{ExecutionRecord, RecordStatus, RecordTable, RunReport, RunStatus};
use crate::registry::NodeRegistry;
use crate::retry::RetryPolicy;
use crate::slots::WorkerSlots;
use crate::step::{ApplyContext, Selector, Step};
use chrono::Utc;
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// Options for a provisioning run
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Retry policy for every (node, step)
    pub retry: RetryPolicy,
    /// Most tries running at once; `None` means one per node
    pub concurrency: Option<usize>,
    /// Run idempotency checks only, never actions
    pub dry_run: bool,
    /// Verbose output
    pub verbose: bool,
    /// What must be reachable before connectivity-bound steps
    pub readiness: Capability,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            concurrency: None,
            dry_run: false,
            verbose: false,
            readiness: Capability::Endpoint,
        }
    }
}

/// Outcome of one try of a step on a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TryOutcome {
    /// Check passed before any action in this try
    Satisfied,
    /// Action ran and the check passed afterwards
    Applied,
    /// Dry run and the check failed
    WouldApply,
}

/// Everything one node's worker produced
#[derive(Debug, Default)]
struct NodeOutcome {
    records: Vec<ExecutionRecord>,
    delays: Vec<(String, Vec<Duration>)>,
    cancelled: bool,
}

/// Applies a [`StepGraph`] to a [`NodeRegistry`]
pub struct Executor {
    options: ExecuteOptions,
    prober: HealthProber,
    events: Box<dyn EventSink>,
    cancel: CancelToken,
}

impl Executor {
    pub fn new(options: ExecuteOptions, prober: HealthProber) -> Self {
        Self {
            options,
            prober,
            events: Box::new(NoEvents),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_events(mut self, sink: impl EventSink + 'static) -> Self {
        self.events = Box::new(sink);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run every step on every targeted node
    ///
    /// Structural problems are returned as `Err` before any node is
    /// touched. Step failures never produce `Err`; they are recorded and
    /// reflected in [`RunReport::status`].
    pub fn execute(&self, registry: &mut NodeRegistry, graph: &StepGraph) -> Result<RunReport> {
        validate(registry, graph)?;

        let started_at = Utc::now();
        let order: Vec<&Step> = graph.topological_order().collect();
        let cap = self
            .options
            .concurrency
            .unwrap_or(registry.len())
            .clamp(1, registry.len());
        let slots = WorkerSlots::new(cap);

        log::info!(
            "Provisioning {} node(s) x {} step(s), at most {} at once{}",
            registry.len(),
            order.len(),
            cap,
            if self.options.dry_run { " (dry run)" } else { "" }
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(registry.len())
            .build()
            .map_err(|e| Error::Io(std::io::Error::other(format!("failed to create worker pool: {e}"))))?;

        let outcomes: Vec<NodeOutcome> = pool.install(|| {
            registry
                .nodes()
                .par_iter()
                .with_max_len(1)
                .map(|node| self.run_node(node, &order, &slots))
                .collect()
        });

        let mut records = RecordTable::new();
        let mut delays = BTreeMap::new();
        let mut cancelled = self.cancel.is_cancelled();
        let mut node_states = Vec::with_capacity(outcomes.len());

        for (node, outcome) in registry.nodes().iter().zip(outcomes) {
            cancelled |= outcome.cancelled;
            let settled = outcome.records.iter().all(|r| r.status.is_satisfied());
            node_states.push((
                node.name().to_string(),
                if settled {
                    NodeState::Provisioned
                } else {
                    NodeState::Degraded
                },
            ));
            for (step, slept) in outcome.delays {
                delays.insert((node.name().to_string(), step), slept);
            }
            records.extend(outcome.records);
        }

        if !self.options.dry_run {
            for (name, state) in node_states {
                registry.set_state(&name, state)?;
            }
        }

        let status = if cancelled {
            RunStatus::Cancelled
        } else if self.options.dry_run {
            RunStatus::DryRun
        } else if records.count(RecordStatus::Failed) > 0 {
            RunStatus::PartialFailure
        } else {
            RunStatus::Success
        };

        log::info!("Run finished: {} ({} records)", status, records.len());

        Ok(RunReport {
            status,
            records,
            delays,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// Walk the graph for one node
    fn run_node(&self, node: &Node, order: &[&Step], slots: &WorkerSlots) -> NodeOutcome {
        let mut outcome = NodeOutcome::default();
        let mut statuses: HashMap<&str, RecordStatus> = HashMap::new();

        for step in order {
            if !step.targets(node) {
                continue;
            }

            let mut record = ExecutionRecord::new(node.name(), step.name());

            if outcome.cancelled || self.cancel.is_cancelled() {
                // Never started; stays pending
                outcome.cancelled = true;
            } else if let Some(dep) = blocking_dependency(step, &statuses) {
                record.status = RecordStatus::SkippedDueToDependency;
                record.last_error = Some(format!("dependency '{dep}' did not complete"));
                self.emit(&record, None);
            } else {
                let (slept, cancelled) = self.run_step(node, step, &mut record, slots);
                outcome.cancelled |= cancelled;
                if !slept.is_empty() {
                    outcome.delays.push((step.name().to_string(), slept));
                }
            }

            statuses.insert(step.name(), record.status);
            outcome.records.push(record);
        }

        outcome
    }

    /// Try a step until it settles; returns backoff delays slept and
    /// whether cancellation interrupted it
    fn run_step(
        &self,
        node: &Node,
        step: &Step,
        record: &mut ExecutionRecord,
        slots: &WorkerSlots,
    ) -> (Vec<Duration>, bool) {
        let policy = &self.options.retry;
        let mut delays = Vec::new();
        let mut applied = false;

        loop {
            record.attempts += 1;
            record.status = RecordStatus::Running;
            self.emit(record, None);

            match self.try_once(node, step, record.attempts, slots, &mut applied) {
                Ok(outcome) => {
                    record.status = match outcome {
                        TryOutcome::Satisfied if applied => RecordStatus::Succeeded,
                        TryOutcome::Satisfied => RecordStatus::Skipped,
                        TryOutcome::Applied => RecordStatus::Succeeded,
                        TryOutcome::WouldApply => RecordStatus::Pending,
                    };
                    record.last_error = None;
                    self.emit(record, None);
                    return (delays, false);
                }
                Err(Error::Cancelled) => {
                    return (delays, self.interrupted(record));
                }
                Err(e) => {
                    record.last_error = Some(e.to_string());

                    if !(e.is_retryable() && policy.allows_retry(record.attempts)) {
                        record.status = RecordStatus::Failed;
                        self.emit(record, None);
                        return (delays, false);
                    }

                    let delay = policy.delay_for_attempt(record.attempts - 1);
                    self.emit(record, Some(delay));

                    delays.push(delay);
                    if !self.cancel.sleep(delay) {
                        return (delays, self.interrupted(record));
                    }
                }
            }
        }
    }

    /// One try: readiness, then check, apply and re-check under a slot
    fn try_once(
        &self,
        node: &Node,
        step: &Step,
        attempt: u32,
        slots: &WorkerSlots,
        applied: &mut bool,
    ) -> Result<TryOutcome> {
        let action = step.action();

        // Every try re-probes; a node may restart between steps
        if action.requires_connectivity() {
            self.prober.wait_ready(
                node,
                &self.options.readiness,
                self.prober.timeout(),
                &self.cancel,
            )?;
        }

        let _slot = slots.acquire();
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        if action.check(node)? {
            return Ok(TryOutcome::Satisfied);
        }

        if self.options.dry_run {
            return Ok(TryOutcome::WouldApply);
        }

        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        log::debug!("[{}] {}: {}", node.name(), step.name(), action.describe());
        *applied = true;
        action.apply(
            node,
            &ApplyContext {
                attempt,
                verbose: self.options.verbose,
            },
        )?;

        if action.check(node)? {
            Ok(TryOutcome::Applied)
        } else {
            Err(Error::action(
                node.name(),
                None,
                format!("'{}' ran but its check still fails", step.name()),
            ))
        }
    }

    /// Mark a record interrupted by cancellation
    fn interrupted(&self, record: &mut ExecutionRecord) -> bool {
        record.status = RecordStatus::Pending;
        record.last_error = Some(Error::Cancelled.to_string());
        self.emit(record, None);
        true
    }

    fn emit(&self, record: &ExecutionRecord, retry_in: Option<Duration>) {
        let mut event =
            ProvisionEvent::new(&record.node, &record.step, record.status, record.attempts);
        if let Some(error) = &record.last_error {
            event = event.with_error(error.clone());
        }
        if let Some(delay) = retry_in {
            event = event.with_retry_in(delay);
        }
        self.events.emit(&event);
    }
}

/// Check graph and selectors against the registry before any work
///
/// [`Executor::execute`] runs this itself; callers that start
/// infrastructure first run it earlier so a broken topology starts nothing.
pub fn validate(registry: &NodeRegistry, graph: &StepGraph) -> Result<()> {
    if registry.is_empty() {
        return Err(Error::Configuration("topology declares no nodes".into()));
    }

    graph.validate()?;

    for step in graph.steps() {
        if let Selector::Nodes(names) = step.selector() {
            for name in names {
                registry.get(name)?;
            }
        }
    }
    Ok(())
}

/// First dependency of `step` that did not complete on this node
fn blocking_dependency<'a>(step: &'a Step, statuses: &HashMap<&str, RecordStatus>) -> Option<&'a str> {
    step.depends_on()
        .iter()
        .find(|dep| {
            matches!(
                statuses.get(dep.as_str()),
                Some(RecordStatus::Failed | RecordStatus::SkippedDueToDependency)
            )
        })
        .map(String::as_str)
}
