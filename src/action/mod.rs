//! Concrete step actions
//!
//! Every action pairs a read-only check with the mutation that makes it
//! pass, and reaches nodes only through the collaborator traits in
//! [`Backends`].

pub mod account;
pub mod command;
pub mod file;
pub mod keys;
pub mod packages;

pub use account::ServiceAccountAction;
pub use command::CommandAction;
pub use file::FileAction;
pub use keys::AuthorizedKeyAction;
pub use packages::PackagesAction;

use crate::backend::{AptPackages, SshKeygenStore, SshRunner};
use crate::config::ActionSpec;
use provision::{
    CredentialStore, Error, NodeRegistry, PackageManager, RemoteRunner, Result, StepAction,
};
use std::sync::Arc;

/// Collaborators handed to actions
#[derive(Clone)]
pub struct Backends {
    pub runner: Arc<dyn RemoteRunner>,
    pub packages: Arc<dyn PackageManager>,
    pub keys: Arc<dyn CredentialStore>,
}

impl Backends {
    /// Real backends: `ssh`, `apt-get`, `ssh-keygen`
    pub fn ssh() -> Self {
        let runner: Arc<dyn RemoteRunner> = Arc::new(SshRunner::new());
        Self {
            packages: Arc::new(AptPackages::new(Arc::clone(&runner))),
            keys: Arc::new(SshKeygenStore::new(Arc::clone(&runner))),
            runner,
        }
    }
}

/// Build the action a step declaration describes
pub fn build(
    spec: &ActionSpec,
    backends: &Backends,
    registry: &NodeRegistry,
) -> Result<Arc<dyn StepAction>> {
    let action: Arc<dyn StepAction> = match spec {
        ActionSpec::Command {
            run,
            check,
            creates,
        } => {
            let check = match (check, creates) {
                (Some(check), None) => check.clone(),
                (None, Some(path)) => format!("test -e {}", crate::backend::shell_quote(path)),
                (Some(_), Some(_)) => {
                    return Err(Error::Configuration(
                        "command action takes either 'check' or 'creates', not both".into(),
                    ));
                }
                (None, None) => {
                    return Err(Error::Configuration(format!(
                        "command action '{run}' needs a 'check' or 'creates' to be idempotent"
                    )));
                }
            };
            Arc::new(CommandAction::new(
                Arc::clone(&backends.runner),
                run.clone(),
                check,
            ))
        }
        ActionSpec::Packages { packages } => {
            if packages.is_empty() {
                return Err(Error::Configuration(
                    "packages action lists no packages".into(),
                ));
            }
            Arc::new(PackagesAction::new(
                Arc::clone(&backends.packages),
                packages.clone(),
            ))
        }
        ActionSpec::ServiceAccount { user, shell, sudo } => Arc::new(
            ServiceAccountAction::new(Arc::clone(&backends.runner), user.clone())
                .with_shell(shell.clone())
                .with_sudo(*sudo),
        ),
        ActionSpec::AuthorizedKey { user, origin } => Arc::new(AuthorizedKeyAction::new(
            Arc::clone(&backends.runner),
            Arc::clone(&backends.keys),
            registry.get(origin)?.clone(),
            user.clone(),
        )),
        ActionSpec::File {
            path,
            content,
            mode,
        } => Arc::new(FileAction::new(
            Arc::clone(&backends.runner),
            path.clone(),
            content.clone(),
            mode.clone(),
        )),
    };
    Ok(action)
}
