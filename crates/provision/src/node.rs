//! Node types: identity, role, connection endpoint and state tag

use serde::{Deserialize, Serialize};
use std::fmt;

/// Role of a node in the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Coordinating node (launches jobs, owns the cluster key)
    Head,
    /// Worker node
    Compute,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Head => write!(f, "head"),
            Role::Compute => write!(f, "compute"),
        }
    }
}

/// Desired/observed state tag of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    /// Declared in the topology, not yet provisioned by this run
    #[default]
    Declared,
    /// Every step targeting the node succeeded or was already satisfied
    Provisioned,
    /// At least one step targeting the node did not complete
    Degraded,
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeState::Declared => write!(f, "declared"),
            NodeState::Provisioned => write!(f, "provisioned"),
            NodeState::Degraded => write!(f, "degraded"),
        }
    }
}

/// How to reach a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    /// Login user
    pub user: String,
    /// Credential reference, e.g. a path to an identity file
    #[serde(default)]
    pub credential: Option<String>,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            user: user.into(),
            credential: None,
        }
    }

    pub fn with_credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = Some(credential.into());
        self
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.user, self.host, self.port)
    }
}

/// One addressable machine participating in the cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    name: String,
    role: Role,
    endpoint: Endpoint,
    state: NodeState,
}

impl Node {
    pub fn new(name: impl Into<String>, role: Role, endpoint: Endpoint) -> Self {
        Self {
            name: name.into(),
            role,
            endpoint,
            state: NodeState::Declared,
        }
    }

    pub fn head(name: impl Into<String>, endpoint: Endpoint) -> Self {
        Self::new(name, Role::Head, endpoint)
    }

    pub fn compute(name: impl Into<String>, endpoint: Endpoint) -> Self {
        Self::new(name, Role::Compute, endpoint)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: NodeState) {
        self.state = state;
    }
}
