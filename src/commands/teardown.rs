use crate::Context;
use crate::backend::ComposeRuntime;
use crate::cli::TeardownArgs;
use crate::config::{ConfigError, Topology};
use crate::{runner, ui};
use ::provision::ContainerRuntime;
use anyhow::{Context as _, Result};

pub fn run(ctx: &Context, args: &TeardownArgs) -> Result<u8> {
    let topology = Topology::load(&args.topology)?;
    let descriptor = topology.descriptor().ok_or_else(|| {
        ConfigError::Invalid(format!(
            "topology '{}' has no [compose] section to tear down",
            topology.name
        ))
    })?;
    runner::require("docker")?;

    ComposeRuntime::new()
        .tear_down(&descriptor)
        .with_context(|| format!("Failed to tear down '{}'", descriptor.project))?;

    if !ctx.quiet {
        ui::success(&format!("Removed '{}'", descriptor.project));
    }
    Ok(0)
}
