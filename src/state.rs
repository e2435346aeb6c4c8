//! Where execution records live between runs

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Default state directory: `$XDG_STATE_HOME/clusterup` or `~/.local/state/clusterup`
pub fn state_dir() -> Result<PathBuf> {
    let base = match dirs::state_dir() {
        Some(dir) => dir,
        None => dirs::home_dir()
            .context("Could not determine home directory")?
            .join(".local")
            .join("state"),
    };
    Ok(base.join("clusterup"))
}

/// Record file for a topology, honouring an explicit `--records` path
pub fn records_path(explicit: Option<&Path>, topology: &str) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(PathBuf::from(
            shellexpand::tilde(&path.to_string_lossy()).as_ref(),
        )),
        None => Ok(state_dir()?.join(format!("{topology}.jsonl"))),
    }
}
