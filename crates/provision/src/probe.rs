//! Health prober - polls node readiness before connectivity-bound steps

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::node::Node;
use std::fmt;
use std::sync::Arc;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

/// Something a node must expose before work can run on it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// The node's own connection endpoint accepts TCP connections
    Endpoint,
    /// A listener accepts TCP connections on this port of the node's host
    Listener { port: u16 },
}

impl Capability {
    /// Resolve to the concrete port probed on `node`
    pub fn port(&self, node: &Node) -> u16 {
        match self {
            Capability::Endpoint => node.endpoint().port,
            Capability::Listener { port } => *port,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Endpoint => write!(f, "endpoint listener"),
            Capability::Listener { port } => write!(f, "listener on port {port}"),
        }
    }
}

/// A single readiness check
pub trait Probe: Send + Sync {
    /// Check once whether `node` exposes `capability` right now
    fn probe(&self, node: &Node, capability: &Capability) -> bool;
}

impl<T: Probe + ?Sized> Probe for Arc<T> {
    fn probe(&self, node: &Node, capability: &Capability) -> bool {
        (**self).probe(node, capability)
    }
}

/// Probe that opens a TCP connection to the node's host
#[derive(Debug, Clone)]
pub struct TcpProbe {
    pub connect_timeout: Duration,
}

impl Default for TcpProbe {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(500),
        }
    }
}

impl Probe for TcpProbe {
    fn probe(&self, node: &Node, capability: &Capability) -> bool {
        let target = (node.endpoint().host.as_str(), capability.port(node));
        let addrs = match target.to_socket_addrs() {
            Ok(addrs) => addrs,
            Err(e) => {
                log::debug!("Could not resolve {}: {}", node.endpoint().host, e);
                return false;
            }
        };

        addrs
            .into_iter()
            .any(|addr| TcpStream::connect_timeout(&addr, self.connect_timeout).is_ok())
    }
}

/// Polls a [`Probe`] at a fixed interval until success, timeout or cancel
pub struct HealthProber {
    probe: Box<dyn Probe>,
    interval: Duration,
    timeout: Duration,
}

impl HealthProber {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

    pub fn new(probe: impl Probe + 'static) -> Self {
        Self {
            probe: Box::new(probe),
            interval: Self::DEFAULT_INTERVAL,
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Timeout the executor uses for its implicit readiness waits
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Wait until `node` exposes `capability`
    ///
    /// Fails with [`Error::Timeout`] once `timeout` elapses and with
    /// [`Error::Cancelled`] within one poll interval of cancellation.
    pub fn wait_ready(
        &self,
        node: &Node,
        capability: &Capability,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<()> {
        let started = Instant::now();
        let deadline = started + timeout;
        let mut polls = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            polls += 1;
            if self.probe.probe(node, capability) {
                log::debug!(
                    "{} ready ({}) after {} poll(s)",
                    node.name(),
                    capability,
                    polls
                );
                return Ok(());
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(Error::Timeout {
                    node: node.name().to_string(),
                    capability: capability.to_string(),
                    waited: started.elapsed(),
                });
            }

            let pause = self.interval.min(deadline - now);
            if !cancel.sleep(pause) {
                return Err(Error::Cancelled);
            }
        }
    }
}

impl fmt::Debug for HealthProber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HealthProber")
            .field("interval", &self.interval)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Probe that always reports ready, for runs without remote listeners
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysReady;

impl Probe for AlwaysReady {
    fn probe(&self, _node: &Node, _capability: &Capability) -> bool {
        true
    }
}
