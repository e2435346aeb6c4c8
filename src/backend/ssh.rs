//! Remote runner backed by the system `ssh` client

use super::shell_quote;
use provision::{CommandOutput, Error, Node, RemoteRunner, Result};
use std::io::Write;
use std::process::{Command, Stdio};

/// Exit status `ssh` itself uses for connection failures
const SSH_FAILURE: i32 = 255;

/// Runs commands on nodes with non-interactive `ssh`
#[derive(Debug, Clone)]
pub struct SshRunner {
    /// Seconds `ssh` waits for the TCP connection
    connect_timeout: u64,
}

impl Default for SshRunner {
    fn default() -> Self {
        Self { connect_timeout: 10 }
    }
}

impl SshRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arguments up to and including the destination
    fn ssh_args(&self, node: &Node) -> Vec<String> {
        let endpoint = node.endpoint();
        let mut args = vec![
            "-p".to_string(),
            endpoint.port.to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            "-o".to_string(),
            "UserKnownHostsFile=/dev/null".to_string(),
            "-o".to_string(),
            "LogLevel=ERROR".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout),
        ];
        if let Some(identity) = &endpoint.credential {
            args.push("-i".to_string());
            args.push(identity.clone());
        }
        args.push(format!("{}@{}", endpoint.user, endpoint.host));
        args
    }

    fn output(node: &Node, output: &std::process::Output) -> Result<CommandOutput> {
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        // Killed by a signal: treat like a dropped connection
        let exit_code = output.status.code().unwrap_or(SSH_FAILURE);

        if exit_code == SSH_FAILURE {
            return Err(Error::connectivity(node.name(), stderr.trim()));
        }

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr,
            exit_code,
        })
    }
}

impl RemoteRunner for SshRunner {
    fn run(&self, node: &Node, command: &str) -> Result<CommandOutput> {
        log::trace!("[{}] ssh: {}", node.name(), command);

        let output = Command::new("ssh")
            .args(self.ssh_args(node))
            .arg(command)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| Error::connectivity(node.name(), format!("failed to execute ssh: {e}")))?;

        Self::output(node, &output)
    }

    fn copy(&self, node: &Node, content: &[u8], remote_path: &str) -> Result<()> {
        log::trace!(
            "[{}] copy {} bytes to {}",
            node.name(),
            content.len(),
            remote_path
        );

        let path = shell_quote(remote_path);
        let command = format!("mkdir -p \"$(dirname {path})\" && cat > {path}");

        let mut child = Command::new("ssh")
            .args(self.ssh_args(node))
            .arg(command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::connectivity(node.name(), format!("failed to execute ssh: {e}")))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(content)?;
        }
        let output = child.wait_with_output()?;

        Self::output(node, &output)?.into_result(node).map(|_| ())
    }
}
