//! Cluster key pairs generated with `ssh-keygen` on their origin node
//!
//! The private half is created on the origin and never read back; only the
//! public half crosses the wire. Public keys are cached per origin so every
//! target of a key exchange sees the same key.

use provision::{CredentialStore, Error, Node, RemoteRunner, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Key path on the origin, relative to the login user's home
const KEY_PATH: &str = "~/.ssh/id_ed25519";

pub struct SshKeygenStore {
    runner: Arc<dyn RemoteRunner>,
    /// Origin name -> public key; the lock also serialises generation
    cache: Mutex<HashMap<String, String>>,
}

impl SshKeygenStore {
    pub fn new(runner: Arc<dyn RemoteRunner>) -> Self {
        Self {
            runner,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn read_public_key(&self, origin: &Node) -> Result<Option<String>> {
        let output = self
            .runner
            .run(origin, &format!("cat {KEY_PATH}.pub 2>/dev/null"))?;
        let key = output.stdout.trim();
        if output.success() && !key.is_empty() {
            Ok(Some(key.to_string()))
        } else {
            Ok(None)
        }
    }
}

impl CredentialStore for SshKeygenStore {
    fn public_key(&self, origin: &Node) -> Result<String> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(key) = cache.get(origin.name()) {
            return Ok(key.clone());
        }

        let key = match self.read_public_key(origin)? {
            Some(key) => key,
            None => {
                log::info!("[{}] generating cluster key pair", origin.name());
                self.runner.run_checked(
                    origin,
                    &format!(
                        "mkdir -p ~/.ssh && chmod 700 ~/.ssh && \
                         ssh-keygen -q -t ed25519 -N '' -C clusterup -f {KEY_PATH}"
                    ),
                )?;
                self.read_public_key(origin)?.ok_or_else(|| {
                    Error::action(origin.name(), None, "ssh-keygen produced no public key")
                })?
            }
        };

        cache.insert(origin.name().to_string(), key.clone());
        Ok(key)
    }

    fn lookup(&self, origin: &Node) -> Result<Option<String>> {
        {
            let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(key) = cache.get(origin.name()) {
                return Ok(Some(key.clone()));
            }
        }
        self.read_public_key(origin)
    }
}
