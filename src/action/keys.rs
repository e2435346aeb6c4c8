//! Key exchange: authorize the origin's public key on every target

use crate::backend::{as_root, shell_quote};
use provision::{ApplyContext, CredentialStore, Node, RemoteRunner, Result, StepAction};
use std::fmt;
use std::sync::Arc;

pub struct AuthorizedKeyAction {
    runner: Arc<dyn RemoteRunner>,
    keys: Arc<dyn CredentialStore>,
    /// Node holding the key pair
    origin: Node,
    /// Account whose `authorized_keys` receives the key
    user: String,
}

impl AuthorizedKeyAction {
    pub fn new(
        runner: Arc<dyn RemoteRunner>,
        keys: Arc<dyn CredentialStore>,
        origin: Node,
        user: String,
    ) -> Self {
        Self {
            runner,
            keys,
            origin,
            user,
        }
    }

    fn authorized_keys(&self) -> String {
        format!("~{}/.ssh/authorized_keys", self.user)
    }
}

impl fmt::Debug for AuthorizedKeyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizedKeyAction")
            .field("origin", &self.origin.name())
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

impl StepAction for AuthorizedKeyAction {
    fn describe(&self) -> String {
        format!(
            "authorize {}'s key for {}",
            self.origin.name(),
            self.user
        )
    }

    fn check(&self, node: &Node) -> Result<bool> {
        let Some(key) = self.keys.lookup(&self.origin)? else {
            return Ok(false);
        };
        let script = format!(
            "grep -qxF {} {} 2>/dev/null",
            shell_quote(&key),
            self.authorized_keys()
        );
        self.runner.run_status(node, &as_root(node, &script))
    }

    fn apply(&self, node: &Node, _ctx: &ApplyContext) -> Result<()> {
        let key = shell_quote(&self.keys.public_key(&self.origin)?);
        let user = shell_quote(&self.user);
        let file = self.authorized_keys();
        let dir = format!("~{}/.ssh", self.user);

        let script = format!(
            "mkdir -p {dir} && touch {file} && \
             (grep -qxF {key} {file} || echo {key} >> {file}) && \
             chown -R {user}: {dir} && chmod 700 {dir} && chmod 600 {file}"
        );
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
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeKeys {
        key: Mutex<Option<String>>,
    }

    impl CredentialStore for FakeKeys {
        fn public_key(&self, _origin: &Node) -> Result<String> {
            Ok(self
                .key
                .lock()
                .unwrap()
                .get_or_insert_with(|| "ssh-ed25519 AAAAC3 clusterup".to_string())
                .clone())
        }

        fn lookup(&self, _origin: &Node) -> Result<Option<String>> {
            Ok(self.key.lock().unwrap().clone())
        }
    }

    fn head() -> Node {
        Node::head("head", Endpoint::new("10.0.0.1", 22, "root"))
    }

    #[test]
    fn test_check_fails_without_key_and_never_generates() {
        let runner = Arc::new(MockRunner::new());
        let keys = Arc::new(FakeKeys::default());
        let action =
            AuthorizedKeyAction::new(runner.clone(), keys.clone(), head(), "mpiuser".into());
        let compute = Node::compute("compute2", Endpoint::new("10.0.0.3", 22, "root"));

        assert!(!action.check(&compute).unwrap());
        assert!(keys.key.lock().unwrap().is_none());
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_apply_appends_key_once() {
        let runner = Arc::new(MockRunner::new());
        let keys = Arc::new(FakeKeys::default());
        let action = AuthorizedKeyAction::new(runner.clone(), keys, head(), "mpiuser".into());
        let compute = Node::compute("compute2", Endpoint::new("10.0.0.3", 22, "root"));

        action
            .apply(
                &compute,
                &ApplyContext {
                    attempt: 1,
                    verbose: false,
                },
            )
            .unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].contains("~mpiuser/.ssh/authorized_keys"));
        assert!(calls[0].contains("ssh-ed25519 AAAAC3 clusterup"));
        assert!(calls[0].contains("grep -qxF"));

        // Key now exists, so the check consults the target
        assert!(action.check(&compute).unwrap());
        assert_eq!(runner.calls().len(), 2);
    }
}
