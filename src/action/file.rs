//! File with fixed content on the node

use crate::backend::shell_quote;
use provision::{ApplyContext, Node, RemoteRunner, Result, StepAction};
use std::fmt;
use std::sync::Arc;

pub struct FileAction {
    runner: Arc<dyn RemoteRunner>,
    path: String,
    content: String,
    /// Octal mode, e.g. `644`
    mode: Option<String>,
}

impl FileAction {
    pub fn new(
        runner: Arc<dyn RemoteRunner>,
        path: String,
        content: String,
        mode: Option<String>,
    ) -> Self {
        Self {
            runner,
            path,
            content,
            mode,
        }
    }
}

impl fmt::Debug for FileAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileAction")
            .field("path", &self.path)
            .field("bytes", &self.content.len())
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl StepAction for FileAction {
    fn describe(&self) -> String {
        format!("write {}", self.path)
    }

    fn check(&self, node: &Node) -> Result<bool> {
        let output = self
            .runner
            .run(node, &format!("cat {} 2>/dev/null", shell_quote(&self.path)))?;
        Ok(output.success() && output.stdout == self.content)
    }

    fn apply(&self, node: &Node, _ctx: &ApplyContext) -> Result<()> {
        self.runner
            .copy(node, self.content.as_bytes(), &self.path)?;
        if let Some(mode) = &self.mode {
            self.runner.run_checked(
                node,
                &format!("chmod {} {}", shell_quote(mode), shell_quote(&self.path)),
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockRunner;
    use provision::Endpoint;

    fn node() -> Node {
        Node::head("head", Endpoint::new("h", 22, "mpiuser"))
    }

    #[test]
    fn test_check_compares_content() {
        let runner = Arc::new(MockRunner::new().respond("cat", 0, "head\ncompute1\n"));
        let same = FileAction::new(
            runner.clone(),
            "/home/mpiuser/hosts".into(),
            "head\ncompute1\n".into(),
            None,
        );
        let different = FileAction::new(
            runner,
            "/home/mpiuser/hosts".into(),
            "head\n".into(),
            None,
        );
        assert!(same.check(&node()).unwrap());
        assert!(!different.check(&node()).unwrap());
    }

    #[test]
    fn test_apply_copies_then_sets_mode() {
        let runner = Arc::new(MockRunner::new());
        let action = FileAction::new(
            runner.clone(),
            "/home/mpiuser/hello.sh".into(),
            "#!/bin/sh\nhostname\n".into(),
            Some("755".into()),
        );

        action
            .apply(
                &node(),
                &ApplyContext {
                    attempt: 1,
                    verbose: false,
                },
            )
            .unwrap();

        let copies = runner.copies.lock().unwrap().clone();
        assert_eq!(copies.len(), 1);
        assert_eq!(copies[0].0, "/home/mpiuser/hello.sh");
        assert_eq!(copies[0].1, b"#!/bin/sh\nhostname\n");
        assert_eq!(runner.calls(), vec!["chmod 755 /home/mpiuser/hello.sh"]);
    }
}
