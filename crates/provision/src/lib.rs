//! # Provision
//!
//! Idempotent, health-checked, retryable multi-node provisioning.
//!
//! ## Core Concepts
//!
//! - **Node Registry**: the declared topology (name, role, endpoint)
//! - **Step Graph**: idempotent steps ordered by their dependencies
//! - **Executor**: applies the graph to every node with bounded retries
//! - **Health Prober**: waits for nodes to accept connections
//!
//! ## Example
//!
//! ```ignore
//! use provision::{
//!     Endpoint, ExecuteOptions, Executor, HealthProber, Node, NodeRegistry,
//!     Step, StepGraph, TcpProbe,
//! };
//! use std::sync::Arc;
//!
//! let mut registry = NodeRegistry::new();
//! registry.register(Node::head("head", Endpoint::new("127.0.0.1", 2222, "root")))?;
//!
//! let mut graph = StepGraph::new();
//! graph.add_step(Step::new("install", Arc::new(install_action)))?;
//! graph.add_step(Step::new("run-job", Arc::new(job_action)).after("install"))?;
//!
//! let executor = Executor::new(ExecuteOptions::default(), HealthProber::new(TcpProbe::default()));
//! let report = executor.execute(&mut registry, &graph)?;
//! std::process::exit(report.status.exit_code().into());
//! ```
//!
//! ## Collaborator Traits
//!
//! Step actions reach nodes only through traits in [`backend`]:
//!
//! - [`RemoteRunner`]: runs commands and copies files
//! - [`PackageManager`]: installs packages
//! - [`ContainerRuntime`]: brings a topology up and down
//! - [`CredentialStore`]: hands out the public half of the cluster key
//!
//! This keeps the core independent of SSH clients and container tools,
//! and lets tests run against simulated nodes.

pub mod backend;
pub mod cancel;
pub mod error;
pub mod event;
pub mod executor;
pub mod graph;
pub mod node;
pub mod probe;
pub mod record;
pub mod registry;
pub mod retry;
mod slots;
pub mod step;

// Re-export main types at crate root
pub use backend::{
    CommandOutput, ContainerRuntime, CredentialStore, PackageManager, RemoteRunner,
    TopologyDescriptor,
};
pub use cancel::CancelToken;
pub use error::{Error, ErrorCategory, Result};
pub use event::{EventSink, LogEvents, NoEvents, ProvisionEvent};
pub use executor::{ExecuteOptions, Executor};
pub use graph::{StepGraph, TopologicalOrder};
pub use node::{Endpoint, Node, NodeState, Role};
pub use probe::{AlwaysReady, Capability, HealthProber, Probe, TcpProbe};
pub use record::{ExecutionRecord, RecordStatus, RecordTable, RunReport, RunStatus};
pub use registry::NodeRegistry;
pub use retry::RetryPolicy;
pub use step::{ApplyContext, Selector, Step, StepAction};
