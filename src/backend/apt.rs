//! Debian package manager over a remote runner

use super::{shell_quote, sudo_prefix};
use provision::{Node, PackageManager, RemoteRunner, Result};
use std::sync::Arc;

/// Installs packages with `apt-get` and queries them with `dpkg-query`
pub struct AptPackages {
    runner: Arc<dyn RemoteRunner>,
}

impl AptPackages {
    pub fn new(runner: Arc<dyn RemoteRunner>) -> Self {
        Self { runner }
    }
}

impl PackageManager for AptPackages {
    fn is_installed(&self, node: &Node, package: &str) -> Result<bool> {
        let command = format!(
            "dpkg-query -W -f='${{Status}}' {} 2>/dev/null | grep -q 'install ok installed'",
            shell_quote(package)
        );
        self.runner.run_status(node, &command)
    }

    fn install_packages(&self, node: &Node, packages: &[String]) -> Result<()> {
        if packages.is_empty() {
            return Ok(());
        }

        let names: Vec<String> = packages.iter().map(|p| shell_quote(p)).collect();
        let sudo = sudo_prefix(node);
        let command = format!(
            "{sudo}env DEBIAN_FRONTEND=noninteractive apt-get update -qq && \
             {sudo}env DEBIAN_FRONTEND=noninteractive apt-get install -y -qq {}",
            names.join(" ")
        );

        log::info!("[{}] installing {}", node.name(), packages.join(", "));
        self.runner.run_checked(node, &command).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockRunner;
    use provision::{Endpoint, Error};

    fn node(user: &str) -> Node {
        Node::compute("compute1", Endpoint::new("h", 22, user))
    }

    #[test]
    fn test_is_installed_uses_exit_status() {
        let runner = Arc::new(MockRunner::new().respond("openmpi-bin", 1, ""));
        let apt = AptPackages::new(runner.clone());

        assert!(!apt.is_installed(&node("root"), "openmpi-bin").unwrap());
        assert!(apt.is_installed(&node("root"), "openssh-server").unwrap());
        assert!(runner.ran("dpkg-query -W"));
    }

    #[test]
    fn test_install_uses_sudo_for_non_root() {
        let runner = Arc::new(MockRunner::new());
        let apt = AptPackages::new(runner.clone());

        apt.install_packages(&node("mpiuser"), &["openmpi-bin".into(), "make".into()])
            .unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].starts_with("sudo -n env DEBIAN_FRONTEND=noninteractive apt-get update"));
        assert!(calls[0].ends_with("apt-get install -y -qq openmpi-bin make"));
    }

    #[test]
    fn test_install_failure_is_action_error() {
        let runner = Arc::new(MockRunner::new().respond("apt-get", 100, ""));
        let apt = AptPackages::new(runner);

        let err = apt
            .install_packages(&node("root"), &["nope".into()])
            .unwrap_err();
        assert!(matches!(err, Error::Action { exit_code: Some(100), .. }));
    }

    #[test]
    fn test_install_nothing_runs_nothing() {
        let runner = Arc::new(MockRunner::new());
        AptPackages::new(runner.clone())
            .install_packages(&node("root"), &[])
            .unwrap();
        assert!(runner.calls().is_empty());
    }
}
