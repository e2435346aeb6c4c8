//! Collaborator traits for the external systems a run drives
//!
//! The executor never talks to SSH, package managers or container
//! runtimes directly. Step actions receive implementations of these traits,
//! which keeps the core testable against simulated nodes.

use crate::error::{Error, Result};
use crate::node::{Endpoint, Node};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Output from a remote command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Convert a non-zero exit into an [`Error::Action`]
    pub fn into_result(self, node: &Node) -> Result<String> {
        if self.success() {
            Ok(self.stdout)
        } else {
            let message = if self.stderr.trim().is_empty() {
                self.stdout.trim().to_string()
            } else {
                self.stderr.trim().to_string()
            };
            Err(Error::action(node.name(), Some(self.exit_code), message))
        }
    }
}

/// Remote command runner (SSH-equivalent)
pub trait RemoteRunner: Send + Sync {
    /// Run a shell command on the node
    ///
    /// A command that ran and exited non-zero is `Ok` with that exit code;
    /// `Err` means the node could not be reached.
    fn run(&self, node: &Node, command: &str) -> Result<CommandOutput>;

    /// Write `content` to `remote_path` on the node
    fn copy(&self, node: &Node, content: &[u8], remote_path: &str) -> Result<()>;

    /// Run and return stdout, turning a non-zero exit into an error
    fn run_checked(&self, node: &Node, command: &str) -> Result<String> {
        self.run(node, command)?.into_result(node)
    }

    /// Run and report only whether the command exited zero
    fn run_status(&self, node: &Node, command: &str) -> Result<bool> {
        Ok(self.run(node, command)?.success())
    }
}

/// Package manager on a node
pub trait PackageManager: Send + Sync {
    fn is_installed(&self, node: &Node, package: &str) -> Result<bool>;

    fn install_packages(&self, node: &Node, packages: &[String]) -> Result<()>;
}

/// Everything a container runtime needs to bring a topology up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologyDescriptor {
    /// Project name used to namespace containers
    pub project: String,
    /// Multi-service definition file
    pub file: PathBuf,
    /// Services whose endpoints should be resolved
    pub services: Vec<String>,
    /// Container port each service exposes for remote login
    pub service_port: u16,
}

/// Container/orchestration runtime
pub trait ContainerRuntime: Send + Sync {
    /// Start all services and return the endpoint each one is reachable at
    fn bring_up(&self, descriptor: &TopologyDescriptor) -> Result<BTreeMap<String, Endpoint>>;

    fn tear_down(&self, descriptor: &TopologyDescriptor) -> Result<()>;
}

/// Source of the cluster key pair
///
/// The key pair lives on its origin node. Only the public half is ever
/// returned for distribution.
pub trait CredentialStore: Send + Sync {
    /// Ensure a key pair exists on `origin` and return its public key
    fn public_key(&self, origin: &Node) -> Result<String>;

    /// Public key of an existing pair on `origin`, without generating one
    ///
    /// Idempotency checks use this so they never mutate the origin.
    fn lookup(&self, origin: &Node) -> Result<Option<String>>;
}
