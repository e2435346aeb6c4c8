//! Topology file: nodes, steps, executor settings and the container project
//!
//! ```toml
//! name = "demo"
//!
//! [defaults]
//! user = "mpiuser"
//! identity = "~/.ssh/clusterup"
//!
//! [compose]
//! file = "compose.yaml"
//!
//! [[nodes]]
//! name = "head"
//! role = "head"
//! port = 2222
//!
//! [[steps]]
//! name = "install-packages"
//! [steps.action]
//! kind = "packages"
//! packages = ["openmpi-bin"]
//! ```

use crate::action::{self, Backends};
use provision::{
    Capability, Endpoint, ExecuteOptions, HealthProber, Node, NodeRegistry, RetryPolicy, Role,
    Selector, Step, StepGraph, TcpProbe, TopologyDescriptor,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Problems with the topology file itself
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read topology {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid topology {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("{0}")]
    Invalid(String),
}

// ============================================================================
// Schema
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topology {
    /// Names the record file and the default compose project
    pub name: String,

    #[serde(default)]
    pub defaults: NodeDefaults,

    #[serde(default)]
    pub compose: Option<ComposeConfig>,

    #[serde(default)]
    pub executor: ExecutorConfig,

    #[serde(default)]
    pub nodes: Vec<NodeSpec>,

    #[serde(default)]
    pub steps: Vec<StepSpec>,

    /// Directory relative paths are resolved against
    #[serde(skip)]
    base_dir: PathBuf,
}

/// Connection settings shared by every node unless overridden
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDefaults {
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub identity: Option<String>,
}

impl Default for NodeDefaults {
    fn default() -> Self {
        Self {
            user: default_user(),
            port: default_port(),
            identity: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    pub name: String,
    pub role: Role,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub identity: Option<String>,
    /// Compose service backing this node (defaults to the node name)
    #[serde(default)]
    pub service: Option<String>,
}

impl NodeSpec {
    pub fn service(&self) -> &str {
        self.service.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepSpec {
    pub name: String,
    /// Limit to these roles
    #[serde(default)]
    pub roles: Vec<Role>,
    /// Limit to these nodes
    #[serde(default)]
    pub nodes: Vec<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    pub action: ActionSpec,
}

impl StepSpec {
    pub fn selector(&self) -> Selector {
        if !self.roles.is_empty() {
            Selector::Roles(self.roles.clone())
        } else if !self.nodes.is_empty() {
            Selector::Nodes(self.nodes.clone())
        } else {
            Selector::All
        }
    }
}

/// What a step does, tagged by `kind`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ActionSpec {
    /// Shell command; `check` (or `test -e creates`) guards it
    Command {
        run: String,
        #[serde(default)]
        check: Option<String>,
        #[serde(default)]
        creates: Option<String>,
    },
    Packages {
        packages: Vec<String>,
    },
    ServiceAccount {
        user: String,
        #[serde(default = "default_shell")]
        shell: String,
        #[serde(default)]
        sudo: bool,
    },
    /// Authorize `origin`'s public key for `user`
    AuthorizedKey {
        user: String,
        origin: String,
    },
    File {
        path: String,
        content: String,
        #[serde(default)]
        mode: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default)]
    pub concurrency: Option<usize>,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_probe_interval_ms")]
    pub probe_interval_ms: u64,
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    /// Probe this port instead of each node's endpoint port
    #[serde(default)]
    pub readiness_port: Option<u16>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            concurrency: None,
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            backoff_factor: default_backoff_factor(),
            max_delay_ms: default_max_delay_ms(),
            probe_interval_ms: default_probe_interval_ms(),
            probe_timeout_secs: default_probe_timeout_secs(),
            readiness_port: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposeConfig {
    /// Compose file, relative to the topology file
    pub file: String,
    /// Project name (defaults to the topology name)
    #[serde(default)]
    pub project: Option<String>,
    /// Container port nodes accept SSH on
    #[serde(default = "default_port")]
    pub service_port: u16,
}

fn default_user() -> String {
    "root".to_string()
}

fn default_port() -> u16 {
    22
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_shell() -> String {
    "/bin/bash".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    2_000
}

fn default_backoff_factor() -> f64 {
    2.0
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_probe_interval_ms() -> u64 {
    1_000
}

fn default_probe_timeout_secs() -> u64 {
    60
}

// ============================================================================
// Loading
// ============================================================================

impl Topology {
    /// Read, parse and validate a topology file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();

        let topology = Self::parse(&content, base_dir).map_err(|e| match e {
            ParseError::Toml(source) => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            ParseError::Invalid(e) => e,
        })?;

        log::debug!(
            "Loaded topology '{}' from {} ({} nodes, {} steps)",
            topology.name,
            path.display(),
            topology.nodes.len(),
            topology.steps.len()
        );
        Ok(topology)
    }

    fn parse(content: &str, base_dir: PathBuf) -> Result<Self, ParseError> {
        let mut topology: Self = toml::from_str(content).map_err(ParseError::Toml)?;
        topology.base_dir = base_dir;
        topology.validate().map_err(ParseError::Invalid)?;
        Ok(topology)
    }

    /// Checks that need no registry or graph
    fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() || !self.name.chars().all(is_name_char) {
            return Err(ConfigError::Invalid(format!(
                "topology name '{}' must be non-empty and use only letters, digits, '-' or '_'",
                self.name
            )));
        }

        let executor = &self.executor;
        if executor.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "executor.max_attempts must be at least 1".into(),
            ));
        }
        if executor.backoff_factor < 1.0 {
            return Err(ConfigError::Invalid(
                "executor.backoff_factor must be at least 1.0".into(),
            ));
        }
        if executor.concurrency == Some(0) {
            return Err(ConfigError::Invalid(
                "executor.concurrency must be at least 1".into(),
            ));
        }
        if executor.probe_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "executor.probe_interval_ms must be positive".into(),
            ));
        }

        for step in &self.steps {
            if !step.roles.is_empty() && !step.nodes.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "step '{}' sets both 'roles' and 'nodes'",
                    step.name
                )));
            }
            if let ActionSpec::ServiceAccount { user, .. } | ActionSpec::AuthorizedKey { user, .. } =
                &step.action
                && (user.is_empty() || !user.chars().all(is_name_char))
            {
                return Err(ConfigError::Invalid(format!(
                    "step '{}' names invalid account '{user}'",
                    step.name
                )));
            }
        }
        Ok(())
    }

    // ========================================================================
    // Building the run
    // ========================================================================

    /// Register every node; `endpoints` (by compose service) override the
    /// declared host and port
    pub fn registry(
        &self,
        endpoints: &BTreeMap<String, Endpoint>,
    ) -> provision::Result<NodeRegistry> {
        let mut registry = NodeRegistry::new();

        for spec in &self.nodes {
            let (host, port) = match endpoints.get(spec.service()) {
                Some(published) => (published.host.clone(), published.port),
                None => (
                    spec.host.clone(),
                    spec.port.unwrap_or(self.defaults.port),
                ),
            };
            let user = spec.user.as_ref().unwrap_or(&self.defaults.user);
            let mut endpoint = Endpoint::new(host, port, user.as_str());
            if let Some(identity) = spec.identity.as_ref().or(self.defaults.identity.as_ref()) {
                endpoint = endpoint.with_credential(shellexpand::tilde(identity).into_owned());
            }

            registry.register(Node::new(&spec.name, spec.role, endpoint))?;
        }

        Ok(registry)
    }

    /// Build the step graph with actions wired to `backends`
    pub fn graph(
        &self,
        registry: &NodeRegistry,
        backends: &Backends,
    ) -> provision::Result<StepGraph> {
        let mut graph = StepGraph::new();

        for spec in &self.steps {
            let action = action::build(&spec.action, backends, registry)?;
            let mut step = Step::new(&spec.name, action).targeting(spec.selector());
            for dep in &spec.depends_on {
                step = step.after(dep);
            }
            graph.add_step(step)?;
        }

        graph.validate()?;
        Ok(graph)
    }

    /// Executor options from `[executor]`, with command-line overrides
    pub fn execute_options(
        &self,
        concurrency: Option<usize>,
        max_attempts: Option<u32>,
        dry_run: bool,
        verbose: bool,
    ) -> ExecuteOptions {
        let executor = &self.executor;
        ExecuteOptions {
            retry: RetryPolicy {
                max_attempts: max_attempts.unwrap_or(executor.max_attempts).max(1),
                base_delay: Duration::from_millis(executor.base_delay_ms),
                backoff_factor: executor.backoff_factor,
                max_delay: Duration::from_millis(executor.max_delay_ms),
            },
            concurrency: concurrency.or(executor.concurrency),
            dry_run,
            verbose,
            readiness: match executor.readiness_port {
                Some(port) => Capability::Listener { port },
                None => Capability::Endpoint,
            },
        }
    }

    pub fn prober(&self) -> HealthProber {
        HealthProber::new(TcpProbe::default())
            .with_interval(Duration::from_millis(self.executor.probe_interval_ms))
            .with_timeout(Duration::from_secs(self.executor.probe_timeout_secs))
    }

    /// Container project, if the topology declares one
    pub fn descriptor(&self) -> Option<TopologyDescriptor> {
        let compose = self.compose.as_ref()?;
        let file = PathBuf::from(shellexpand::tilde(&compose.file).as_ref());

        Some(TopologyDescriptor {
            project: compose.project.clone().unwrap_or_else(|| self.name.clone()),
            file: if file.is_absolute() {
                file
            } else {
                self.base_dir.join(file)
            },
            services: self.nodes.iter().map(|n| n.service().to_string()).collect(),
            service_port: compose.service_port,
        })
    }
}

#[derive(Debug)]
enum ParseError {
    Toml(toml::de::Error),
    Invalid(ConfigError),
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockRunner;
    use crate::backend::{AptPackages, SshKeygenStore};
    use provision::{Error, RemoteRunner};
    use std::sync::Arc;

    const DEMO: &str = r#"
name = "demo"

[defaults]
user = "mpiuser"
identity = "/keys/clusterup"

[compose]
file = "compose.yaml"
service_port = 22

[executor]
max_attempts = 4
base_delay_ms = 500

[[nodes]]
name = "head"
role = "head"
port = 2222

[[nodes]]
name = "compute1"
role = "compute"
port = 2223

[[nodes]]
name = "compute2"
role = "compute"
port = 2224
user = "root"

[[steps]]
name = "install-packages"
[steps.action]
kind = "packages"
packages = ["openssh-server", "openmpi-bin"]

[[steps]]
name = "create-service-account"
depends_on = ["install-packages"]
[steps.action]
kind = "service-account"
user = "mpiuser"
sudo = true

[[steps]]
name = "exchange-keys"
depends_on = ["create-service-account"]
[steps.action]
kind = "authorized-key"
user = "mpiuser"
origin = "head"

[[steps]]
name = "run-job"
roles = ["head"]
depends_on = ["exchange-keys"]
[steps.action]
kind = "command"
run = "mpirun -np 3 --host head,compute1,compute2 hostname > ~/hello.out"
creates = "hello.out"
"#;

    fn demo() -> Topology {
        Topology::parse(DEMO, PathBuf::from("/etc/clusterup")).unwrap()
    }

    fn backends() -> Backends {
        let runner: Arc<dyn RemoteRunner> = Arc::new(MockRunner::new());
        Backends {
            packages: Arc::new(AptPackages::new(Arc::clone(&runner))),
            keys: Arc::new(SshKeygenStore::new(Arc::clone(&runner))),
            runner,
        }
    }

    fn invalid(content: &str) -> String {
        match Topology::parse(content, PathBuf::new()) {
            Err(ParseError::Invalid(e)) => e.to_string(),
            Err(ParseError::Toml(e)) => panic!("expected validation error, got parse error: {e}"),
            Ok(_) => panic!("expected validation error"),
        }
    }

    #[test]
    fn test_parse_demo_topology() {
        let topology = demo();
        assert_eq!(topology.name, "demo");
        assert_eq!(topology.nodes.len(), 3);
        assert_eq!(topology.steps.len(), 4);
        assert_eq!(topology.executor.max_attempts, 4);
        assert_eq!(topology.executor.max_delay_ms, 30_000);
        assert_eq!(
            topology.steps[3].selector(),
            Selector::Roles(vec![Role::Head])
        );
        assert_eq!(topology.steps[0].selector(), Selector::All);
    }

    #[test]
    fn test_registry_applies_defaults() {
        let registry = demo().registry(&BTreeMap::new()).unwrap();

        let head = registry.get("head").unwrap();
        assert_eq!(head.endpoint().to_string(), "mpiuser@127.0.0.1:2222");
        assert_eq!(head.endpoint().credential.as_deref(), Some("/keys/clusterup"));
        assert_eq!(registry.get("compute2").unwrap().endpoint().user, "root");
        assert_eq!(registry.list_by_role(Role::Compute).len(), 2);
    }

    #[test]
    fn test_published_endpoints_override_declared() {
        let mut endpoints = BTreeMap::new();
        endpoints.insert("compute1".to_string(), Endpoint::new("127.0.0.1", 32768, ""));

        let registry = demo().registry(&endpoints).unwrap();
        let compute1 = registry.get("compute1").unwrap().endpoint();
        assert_eq!(compute1.port, 32768);
        assert_eq!(compute1.user, "mpiuser");
        assert_eq!(registry.get("head").unwrap().endpoint().port, 2222);
    }

    #[test]
    fn test_graph_follows_dependencies() {
        let topology = demo();
        let registry = topology.registry(&BTreeMap::new()).unwrap();
        let graph = topology.graph(&registry, &backends()).unwrap();

        let order: Vec<_> = graph.topological_order().map(|s| s.name()).collect();
        assert_eq!(
            order,
            [
                "install-packages",
                "create-service-account",
                "exchange-keys",
                "run-job"
            ]
        );
    }

    #[test]
    fn test_duplicate_node_is_structural() {
        let content = DEMO.replace("name = \"compute2\"", "name = \"compute1\"");
        let topology = Topology::parse(&content, PathBuf::new()).unwrap();
        let err = topology.registry(&BTreeMap::new()).unwrap_err();
        assert!(matches!(err, Error::DuplicateNode { ref name } if name == "compute1"));
    }

    #[test]
    fn test_cycle_is_structural() {
        let content = DEMO.replace(
            "name = \"install-packages\"\n",
            "name = \"install-packages\"\ndepends_on = [\"run-job\"]\n",
        );
        let topology = Topology::parse(&content, PathBuf::new()).unwrap();
        let registry = topology.registry(&BTreeMap::new()).unwrap();
        let err = topology.graph(&registry, &backends()).unwrap_err();
        assert!(matches!(err, Error::CyclicDependency { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_unknown_dependency_is_structural() {
        let content = DEMO.replace("[\"exchange-keys\"]", "[\"exchange-key\"]");
        let topology = Topology::parse(&content, PathBuf::new()).unwrap();
        let registry = topology.registry(&BTreeMap::new()).unwrap();
        let err = topology.graph(&registry, &backends()).unwrap_err();
        assert!(matches!(err, Error::UnknownStep { ref name, .. } if name == "exchange-key"));
    }

    #[test]
    fn test_validation_errors() {
        assert!(invalid("name = \"my demo\"").contains("topology name"));
        assert!(invalid("name = \"d\"\n[executor]\nmax_attempts = 0").contains("max_attempts"));
        assert!(invalid("name = \"d\"\n[executor]\nbackoff_factor = 0.5").contains("backoff_factor"));

        let both = r#"
name = "d"
[[steps]]
name = "s"
roles = ["head"]
nodes = ["head"]
[steps.action]
kind = "packages"
packages = ["x"]
"#;
        assert!(invalid(both).contains("both 'roles' and 'nodes'"));

        let bad_user = r#"
name = "d"
[[steps]]
name = "s"
[steps.action]
kind = "service-account"
user = "mpi user; rm -rf /"
"#;
        assert!(invalid(bad_user).contains("invalid account"));
    }

    #[test]
    fn test_unknown_role_is_parse_error() {
        let content = "name = \"d\"\n[[nodes]]\nname = \"n\"\nrole = \"worker\"\n";
        assert!(matches!(
            Topology::parse(content, PathBuf::new()),
            Err(ParseError::Toml(_))
        ));
    }

    #[test]
    fn test_execute_options_overrides() {
        let topology = demo();
        let options = topology.execute_options(Some(1), None, true, false);
        assert_eq!(options.concurrency, Some(1));
        assert_eq!(options.retry.max_attempts, 4);
        assert_eq!(options.retry.base_delay, Duration::from_millis(500));
        assert!(options.dry_run);
        assert_eq!(options.readiness, Capability::Endpoint);

        let options = topology.execute_options(None, Some(2), false, false);
        assert_eq!(options.concurrency, None);
        assert_eq!(options.retry.max_attempts, 2);
    }

    #[test]
    fn test_descriptor_resolves_relative_file() {
        let descriptor = demo().descriptor().unwrap();
        assert_eq!(descriptor.project, "demo");
        assert_eq!(descriptor.file, PathBuf::from("/etc/clusterup/compose.yaml"));
        assert_eq!(descriptor.services, ["head", "compute1", "compute2"]);
        assert_eq!(descriptor.service_port, 22);
    }

    #[test]
    fn test_bundled_demo_topology_builds() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("demos/cluster.toml");
        let topology = Topology::load(&path).unwrap();
        let registry = topology.registry(&BTreeMap::new()).unwrap();
        let graph = topology.graph(&registry, &backends()).unwrap();

        assert_eq!(registry.len(), 3);
        let order: Vec<_> = graph.topological_order().map(|s| s.name()).collect();
        assert_eq!(order.last(), Some(&"run-job"));
        assert!(topology.descriptor().unwrap().file.ends_with("demos/compose.yaml"));
    }

    #[test]
    fn test_load_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "name = ").unwrap();

        let err = Topology::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("broken.toml"));

        let missing = Topology::load(&dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(missing, ConfigError::Read { .. }));
    }
}
