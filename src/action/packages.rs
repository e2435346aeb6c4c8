//! System packages present on the node

use provision::{ApplyContext, Node, PackageManager, Result, StepAction};
use std::fmt;
use std::sync::Arc;

pub struct PackagesAction {
    manager: Arc<dyn PackageManager>,
    packages: Vec<String>,
}

impl PackagesAction {
    pub fn new(manager: Arc<dyn PackageManager>, packages: Vec<String>) -> Self {
        Self { manager, packages }
    }

    fn missing(&self, node: &Node) -> Result<Vec<String>> {
        let mut missing = Vec::new();
        for package in &self.packages {
            if !self.manager.is_installed(node, package)? {
                missing.push(package.clone());
            }
        }
        Ok(missing)
    }
}

impl fmt::Debug for PackagesAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PackagesAction")
            .field("packages", &self.packages)
            .finish_non_exhaustive()
    }
}

impl StepAction for PackagesAction {
    fn describe(&self) -> String {
        format!("install {}", self.packages.join(", "))
    }

    fn check(&self, node: &Node) -> Result<bool> {
        Ok(self.missing(node)?.is_empty())
    }

    fn apply(&self, node: &Node, _ctx: &ApplyContext) -> Result<()> {
        let missing = self.missing(node)?;
        self.manager.install_packages(node, &missing)
    }
}
