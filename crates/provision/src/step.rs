//! Step declarations and the action trait
//!
//! A Step is one idempotent unit of provisioning work. Its action carries
//! both the idempotency check (a read-only predicate over remote state) and
//! the mutation that makes the check pass.

use crate::error::Result;
use crate::node::{Node, Role};
use std::fmt;
use std::sync::Arc;

/// Context passed to [`StepAction::apply`]
#[derive(Debug, Clone, Copy)]
pub struct ApplyContext {
    /// 1-indexed try number for this (node, step)
    pub attempt: u32,
    /// Whether to output verbose information
    pub verbose: bool,
}

/// Core trait for step actions
///
/// # Example
///
/// ```ignore
/// #[derive(Debug)]
/// struct Touch { runner: Arc<dyn RemoteRunner>, path: String }
///
/// impl StepAction for Touch {
///     fn describe(&self) -> String { format!("touch {}", self.path) }
///
///     fn check(&self, node: &Node) -> Result<bool> {
///         self.runner.run_status(node, &format!("test -f {}", self.path))
///     }
///
///     fn apply(&self, node: &Node, _ctx: &ApplyContext) -> Result<()> {
///         self.runner.run_checked(node, &format!("touch {}", self.path)).map(|_| ())
///     }
/// }
/// ```
pub trait StepAction: Send + Sync + fmt::Debug {
    /// Human-readable description of the command
    fn describe(&self) -> String;

    /// Idempotency check: has this step's end state been reached on `node`?
    ///
    /// Must not mutate anything.
    fn check(&self, node: &Node) -> Result<bool>;

    /// Make the check pass
    fn apply(&self, node: &Node, ctx: &ApplyContext) -> Result<()>;

    /// Whether the node must be reachable before check/apply
    fn requires_connectivity(&self) -> bool {
        true
    }
}

/// Which nodes a step applies to
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Selector {
    /// Every registered node
    #[default]
    All,
    /// Nodes with any of these roles
    Roles(Vec<Role>),
    /// Nodes with these names
    Nodes(Vec<String>),
}

impl Selector {
    pub fn matches(&self, node: &Node) -> bool {
        match self {
            Selector::All => true,
            Selector::Roles(roles) => roles.contains(&node.role()),
            Selector::Nodes(names) => names.iter().any(|n| n == node.name()),
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::All => write!(f, "all"),
            Selector::Roles(roles) => {
                let roles: Vec<String> = roles.iter().map(ToString::to_string).collect();
                write!(f, "roles[{}]", roles.join(","))
            }
            Selector::Nodes(names) => write!(f, "nodes[{}]", names.join(",")),
        }
    }
}

/// A declared provisioning step
#[derive(Debug, Clone)]
pub struct Step {
    name: String,
    selector: Selector,
    action: Arc<dyn StepAction>,
    depends_on: Vec<String>,
}

impl Step {
    pub fn new(name: impl Into<String>, action: Arc<dyn StepAction>) -> Self {
        Self {
            name: name.into(),
            selector: Selector::All,
            action,
            depends_on: Vec::new(),
        }
    }

    pub fn targeting(mut self, selector: Selector) -> Self {
        self.selector = selector;
        self
    }

    pub fn after(mut self, step: impl Into<String>) -> Self {
        let step = step.into();
        if !self.depends_on.contains(&step) {
            self.depends_on.push(step);
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    pub fn action(&self) -> &dyn StepAction {
        self.action.as_ref()
    }

    pub fn depends_on(&self) -> &[String] {
        &self.depends_on
    }

    pub fn targets(&self, node: &Node) -> bool {
        self.selector.matches(node)
    }
}
