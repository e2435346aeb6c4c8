//! Node registry - the declared cluster topology

use crate::error::{Error, Result};
use crate::node::{Node, NodeState, Role};

/// Holds declared nodes in declaration order
#[derive(Debug, Default, Clone)]
pub struct NodeRegistry {
    nodes: Vec<Node>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node, failing if its name is taken
    pub fn register(&mut self, node: Node) -> Result<()> {
        if self.contains(node.name()) {
            return Err(Error::DuplicateNode {
                name: node.name().to_string(),
            });
        }
        log::debug!("Registered node {} ({})", node.name(), node.role());
        self.nodes.push(node);
        Ok(())
    }

    /// Look up a node by name
    pub fn get(&self, name: &str) -> Result<&Node> {
        self.nodes
            .iter()
            .find(|n| n.name() == name)
            .ok_or_else(|| Error::UnknownNode {
                name: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.iter().any(|n| n.name() == name)
    }

    /// Nodes with the given role, in declaration order
    pub fn list_by_role(&self, role: Role) -> Vec<&Node> {
        self.nodes.iter().filter(|n| n.role() == role).collect()
    }

    /// All nodes in declaration order
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Update a node's state tag
    pub fn set_state(&mut self, name: &str, state: NodeState) -> Result<()> {
        let node = self
            .nodes
            .iter_mut()
            .find(|n| n.name() == name)
            .ok_or_else(|| Error::UnknownNode {
                name: name.to_string(),
            })?;
        node.set_state(state);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
