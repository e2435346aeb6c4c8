use anyhow::{Result, bail};
use std::process::{Command, Stdio};

/// Check if a command exists
pub fn command_exists(cmd: &str) -> bool {
    Command::new("which")
        .arg(cmd)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Fail early when a tool the run shells out to is missing
pub fn require(cmd: &str) -> Result<()> {
    if !command_exists(cmd) {
        bail!("'{cmd}' not found in PATH");
    }
    Ok(())
}
