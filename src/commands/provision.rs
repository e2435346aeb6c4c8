//! `clusterup provision` - bring the topology up and converge every node

use crate::Context;
use crate::action::Backends;
use crate::backend::ComposeRuntime;
use crate::cli::ProvisionArgs;
use crate::config::Topology;
use crate::progress::ProgressEvents;
use crate::{runner, signal, state, ui};
use ::provision::{
    CancelToken, ContainerRuntime, Executor, NodeRegistry, RunReport, RunStatus, StepGraph,
};
use anyhow::{Context as _, Result};
use colored::Colorize;
use std::collections::BTreeMap;
use std::sync::Arc;

pub fn run(ctx: &Context, args: &ProvisionArgs) -> Result<u8> {
    let topology = Topology::load(&args.topology)?;
    runner::require("ssh")?;

    let compose = ComposeRuntime::new();
    let runtime: Option<&dyn ContainerRuntime> =
        if topology.descriptor().is_some() && !args.no_up && !args.dry_run {
            runner::require("docker")?;
            Some(&compose)
        } else {
            None
        };

    let (mut registry, graph) = prepare(ctx, &topology, &Backends::ssh(), runtime)?;
    let options = topology.execute_options(
        args.concurrency,
        args.max_attempts,
        args.dry_run,
        ctx.verbose > 0,
    );

    if !ctx.quiet {
        ui::info(&format!(
            "Provisioning {} node(s) with {} step(s){}",
            registry.len(),
            graph.len(),
            if args.dry_run { " (dry run)" } else { "" }
        ));
    }

    let cancel = CancelToken::new();
    signal::install(&cancel);

    let progress = Arc::new(ProgressEvents::new(
        super::planned(&registry, &graph),
        ctx.quiet,
    ));
    let executor = Executor::new(options, topology.prober())
        .with_events(Arc::clone(&progress))
        .with_cancel(cancel);

    let report = executor.execute(&mut registry, &graph)?;
    progress.bar().finish_and_clear();

    // A dry run would overwrite real results with pending records
    if !args.dry_run {
        let path = state::records_path(args.records.as_deref(), &topology.name)?;
        report
            .records
            .save(&path)
            .with_context(|| format!("Failed to write records to {}", path.display()))?;
        log::info!("Records written to {}", path.display());
    }

    if !ctx.quiet {
        print_summary(&registry, &report);
    }

    Ok(report.status.exit_code())
}

/// Build the registry and graph, starting containers through `runtime`
///
/// The declared topology is fully validated first, so a structural error
/// aborts before the runtime is touched. Published endpoints then replace
/// the declared ones.
fn prepare(
    ctx: &Context,
    topology: &Topology,
    backends: &Backends,
    runtime: Option<&dyn ContainerRuntime>,
) -> Result<(NodeRegistry, StepGraph)> {
    let registry = topology.registry(&BTreeMap::new())?;
    let graph = topology.graph(&registry, backends)?;
    ::provision::executor::validate(&registry, &graph)?;

    let (Some(runtime), Some(descriptor)) = (runtime, topology.descriptor()) else {
        return Ok((registry, graph));
    };

    if !ctx.quiet {
        ui::info(&format!(
            "Bringing up '{}' from {}",
            descriptor.project,
            descriptor.file.display()
        ));
    }
    let endpoints = runtime
        .bring_up(&descriptor)
        .context("Failed to bring up the container topology")?;

    let registry = topology.registry(&endpoints)?;
    let graph = topology.graph(&registry, backends)?;
    Ok((registry, graph))
}

fn print_summary(registry: &NodeRegistry, report: &RunReport) {
    ui::header("Summary");

    for node in registry.nodes() {
        println!(
            "  {} {} {}",
            node.name().bold(),
            node.endpoint().to_string().dimmed(),
            format!("[{}]", node.state()).dimmed()
        );
        for record in report.records.for_node(node.name()) {
            let attempts = if record.attempts > 1 {
                format!(" ({} attempts)", record.attempts)
            } else {
                String::new()
            };
            println!(
                "    {} {}{}",
                ui::status_symbol(record.status),
                record.step,
                attempts.dimmed()
            );
        }
    }

    let unsettled: Vec<_> = report
        .records
        .unsettled()
        .filter(|r| report.status != RunStatus::DryRun || r.last_error.is_some())
        .collect();
    if !unsettled.is_empty() {
        ui::header("Not completed");
        for record in unsettled {
            ui::kv(
                &format!("{}/{}", record.node, record.step),
                &format!(
                    "{}{}",
                    record.status,
                    record
                        .last_error
                        .as_ref()
                        .map(|e| format!(": {e}"))
                        .unwrap_or_default()
                ),
            );
        }
    }

    let elapsed = (report.finished_at - report.started_at)
        .to_std()
        .unwrap_or_default();
    println!();
    let line = format!(
        "{} in {} ({} records)",
        ui::run_status(report.status),
        ui::format_duration(elapsed),
        report.records.len()
    );
    match report.status {
        RunStatus::Success | RunStatus::DryRun => ui::success(&line),
        RunStatus::Cancelled => ui::warn(&line),
        RunStatus::PartialFailure => ui::error(&line),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockRunner;
    use crate::backend::{AptPackages, SshKeygenStore};
    use ::provision::{Endpoint, Error, RemoteRunner, TopologyDescriptor};
    use std::fs;
    use std::sync::Mutex;

    /// Runtime that publishes every service on localhost and remembers calls
    #[derive(Default)]
    struct RecordingRuntime {
        started: Mutex<Vec<String>>,
    }

    impl ContainerRuntime for RecordingRuntime {
        fn bring_up(
            &self,
            descriptor: &TopologyDescriptor,
        ) -> ::provision::Result<BTreeMap<String, Endpoint>> {
            self.started.lock().unwrap().push(descriptor.project.clone());
            Ok(descriptor
                .services
                .iter()
                .enumerate()
                .map(|(i, service)| {
                    (
                        service.clone(),
                        Endpoint::new("127.0.0.1", 32768 + i as u16, ""),
                    )
                })
                .collect())
        }

        fn tear_down(&self, _descriptor: &TopologyDescriptor) -> ::provision::Result<()> {
            Ok(())
        }
    }

    fn backends() -> Backends {
        let runner: Arc<dyn RemoteRunner> = Arc::new(MockRunner::new());
        Backends {
            packages: Arc::new(AptPackages::new(Arc::clone(&runner))),
            keys: Arc::new(SshKeygenStore::new(Arc::clone(&runner))),
            runner,
        }
    }

    fn quiet() -> Context {
        Context {
            verbose: 0,
            quiet: true,
        }
    }

    fn load(steps: &str) -> (tempfile::TempDir, Topology) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cluster.toml");
        let content = format!(
            r#"
name = "lab"

[compose]
file = "compose.yaml"

[[nodes]]
name = "head"
role = "head"
host = "10.0.0.1"

[[nodes]]
name = "compute1"
role = "compute"
host = "10.0.0.2"
{steps}"#
        );
        fs::write(&path, content).unwrap();
        let topology = Topology::load(&path).unwrap();
        (dir, topology)
    }

    fn root_cause(err: &anyhow::Error) -> Option<&Error> {
        err.chain().find_map(|cause| cause.downcast_ref::<Error>())
    }

    #[test]
    fn test_cyclic_topology_never_starts_containers() {
        let (_dir, topology) = load(
            r#"
[[steps]]
name = "a"
depends_on = ["b"]
[steps.action]
kind = "command"
run = "true"
check = "true"

[[steps]]
name = "b"
depends_on = ["a"]
[steps.action]
kind = "command"
run = "true"
check = "true"
"#,
        );
        let runtime = RecordingRuntime::default();

        let err = prepare(&quiet(), &topology, &backends(), Some(&runtime)).unwrap_err();

        assert!(matches!(
            root_cause(&err),
            Some(Error::CyclicDependency { .. })
        ));
        assert_eq!(crate::exit_code(&err), 2);
        assert!(runtime.started.lock().unwrap().is_empty());
    }

    #[test]
    fn test_unknown_node_selector_never_starts_containers() {
        let (_dir, topology) = load(
            r#"
[[steps]]
name = "a"
nodes = ["ghost"]
[steps.action]
kind = "command"
run = "true"
check = "true"
"#,
        );
        let runtime = RecordingRuntime::default();

        let err = prepare(&quiet(), &topology, &backends(), Some(&runtime)).unwrap_err();

        assert!(matches!(
            root_cause(&err),
            Some(Error::UnknownNode { name }) if name == "ghost"
        ));
        assert!(runtime.started.lock().unwrap().is_empty());
    }

    #[test]
    fn test_valid_topology_uses_published_endpoints() {
        let (_dir, topology) = load(
            r#"
[[steps]]
name = "a"
[steps.action]
kind = "command"
run = "true"
check = "true"
"#,
        );
        let runtime = RecordingRuntime::default();

        let (registry, graph) =
            prepare(&quiet(), &topology, &backends(), Some(&runtime)).unwrap();

        assert_eq!(*runtime.started.lock().unwrap(), vec!["lab".to_string()]);
        assert_eq!(graph.len(), 1);
        let head = registry.get("head").unwrap().endpoint();
        assert_eq!((head.host.as_str(), head.port), ("127.0.0.1", 32768));
        assert_eq!(registry.get("compute1").unwrap().endpoint().port, 32769);
    }

    #[test]
    fn test_without_runtime_declared_endpoints_are_kept() {
        let (_dir, topology) = load("");

        let (registry, _graph) = prepare(&quiet(), &topology, &backends(), None).unwrap();

        assert_eq!(registry.get("head").unwrap().endpoint().host, "10.0.0.1");
    }
}
