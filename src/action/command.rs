//! Arbitrary shell command guarded by a check command

use provision::{ApplyContext, Node, RemoteRunner, Result, StepAction};
use std::fmt;
use std::sync::Arc;

/// Runs `run` on the node; `check` exiting zero means it has already run
pub struct CommandAction {
    runner: Arc<dyn RemoteRunner>,
    run: String,
    check: String,
}

impl CommandAction {
    pub fn new(runner: Arc<dyn RemoteRunner>, run: String, check: String) -> Self {
        Self { runner, run, check }
    }
}

impl fmt::Debug for CommandAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandAction")
            .field("run", &self.run)
            .field("check", &self.check)
            .finish_non_exhaustive()
    }
}

impl StepAction for CommandAction {
    fn describe(&self) -> String {
        format!("run `{}`", self.run)
    }

    fn check(&self, node: &Node) -> Result<bool> {
        self.runner.run_status(node, &self.check)
    }

    fn apply(&self, node: &Node, ctx: &ApplyContext) -> Result<()> {
        let output = self.runner.run_checked(node, &self.run)?;
        if ctx.verbose && !output.trim().is_empty() {
            for line in output.lines() {
                log::info!("[{}] {}", node.name(), line);
            }
        }
        Ok(())
    }
}
