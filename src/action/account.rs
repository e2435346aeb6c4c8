//! Service account shared by every node of the cluster

use crate::backend::{as_root, shell_quote};
use provision::{ApplyContext, Node, RemoteRunner, Result, StepAction};
use std::fmt;
use std::sync::Arc;

pub struct ServiceAccountAction {
    runner: Arc<dyn RemoteRunner>,
    user: String,
    shell: String,
    /// Grant passwordless sudo
    sudo: bool,
}

impl ServiceAccountAction {
    pub fn new(runner: Arc<dyn RemoteRunner>, user: String) -> Self {
        Self {
            runner,
            user,
            shell: "/bin/bash".to_string(),
            sudo: false,
        }
    }

    pub fn with_shell(mut self, shell: String) -> Self {
        self.shell = shell;
        self
    }

    pub fn with_sudo(mut self, sudo: bool) -> Self {
        self.sudo = sudo;
        self
    }

    fn sudoers_file(&self) -> String {
        format!("/etc/sudoers.d/clusterup-{}", self.user)
    }
}

impl fmt::Debug for ServiceAccountAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountAction")
            .field("user", &self.user)
            .field("shell", &self.shell)
            .field("sudo", &self.sudo)
            .finish_non_exhaustive()
    }
}

impl StepAction for ServiceAccountAction {
    fn describe(&self) -> String {
        if self.sudo {
            format!("create account {} with sudo", self.user)
        } else {
            format!("create account {}", self.user)
        }
    }

    fn check(&self, node: &Node) -> Result<bool> {
        let user = shell_quote(&self.user);
        let mut script = format!("id -u {user} >/dev/null 2>&1");
        if self.sudo {
            script.push_str(&format!(" && test -f {}", self.sudoers_file()));
        }
        self.runner.run_status(node, &as_root(node, &script))
    }

    fn apply(&self, node: &Node, _ctx: &ApplyContext) -> Result<()> {
        let user = shell_quote(&self.user);
        let mut script = format!(
            "id -u {user} >/dev/null 2>&1 || useradd -m -s {} {user}",
            shell_quote(&self.shell)
        );
        if self.sudo {
            let file = self.sudoers_file();
            script.push_str(&format!(
                " && echo {} > {file} && chmod 440 {file}",
                shell_quote(&format!("{} ALL=(ALL) NOPASSWD:ALL", self.user))
            ));
        }
        self.runner
            .run_checked(node, &as_root(node, &script))
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockRunner;
    use provision::Endpoint;

    fn ctx() -> ApplyContext {
        ApplyContext {
            attempt: 1,
            verbose: false,
        }
    }

    #[test]
    fn test_apply_creates_user_and_sudoers() {
        let runner = Arc::new(MockRunner::new());
        let action =
            ServiceAccountAction::new(runner.clone(), "mpiuser".into()).with_sudo(true);
        let node = Node::compute("compute1", Endpoint::new("h", 22, "admin"));

        action.apply(&node, &ctx()).unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].starts_with("sudo -n sh -c "));
        assert!(calls[0].contains("useradd -m -s /bin/bash mpiuser"));
        assert!(calls[0].contains("/etc/sudoers.d/clusterup-mpiuser"));
    }

    #[test]
    fn test_check_without_sudo_only_looks_up_user() {
        let runner = Arc::new(MockRunner::new().respond("id -u mpiuser", 1, ""));
        let action = ServiceAccountAction::new(runner.clone(), "mpiuser".into());
        let node = Node::head("head", Endpoint::new("h", 22, "root"));

        assert!(!action.check(&node).unwrap());
        assert!(!runner.ran("sudoers"));
        assert_eq!(action.describe(), "create account mpiuser");
    }
}
