//! Container runtime backed by `docker compose`

use provision::{ContainerRuntime, Endpoint, Error, Result, TopologyDescriptor};
use std::collections::BTreeMap;
use std::process::{Command, Output};

/// Pseudo node name used in errors raised by the runtime itself
const RUNTIME: &str = "compose";

/// Brings compose projects up and down through the `docker` CLI
#[derive(Debug, Clone)]
pub struct ComposeRuntime {
    docker: String,
}

impl Default for ComposeRuntime {
    fn default() -> Self {
        Self {
            docker: "docker".to_string(),
        }
    }
}

impl ComposeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    fn compose(&self, descriptor: &TopologyDescriptor, args: &[&str]) -> Result<Output> {
        let file = descriptor.file.to_string_lossy();
        let mut full = vec!["compose", "-p", descriptor.project.as_str(), "-f", &*file];
        full.extend_from_slice(args);

        log::debug!("{} {}", self.docker, full.join(" "));
        Command::new(&self.docker)
            .args(&full)
            .output()
            .map_err(|e| Error::action(RUNTIME, None, format!("failed to execute {}: {e}", self.docker)))
    }

    fn compose_checked(&self, descriptor: &TopologyDescriptor, args: &[&str]) -> Result<String> {
        let output = self.compose(descriptor, args)?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            Err(Error::action(
                RUNTIME,
                output.status.code(),
                format!(
                    "docker compose {}: {}",
                    args.join(" "),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ))
        }
    }

    /// `up -d`, retried once after pulling whatever images can be pulled
    fn up(&self, descriptor: &TopologyDescriptor) -> Result<()> {
        match self.compose_checked(descriptor, &["up", "-d"]) {
            Ok(_) => Ok(()),
            Err(first) => {
                log::warn!("compose up failed, pulling images and retrying: {first}");
                if let Err(e) = self.compose_checked(descriptor, &["pull", "--ignore-pull-failures"]) {
                    log::warn!("compose pull failed: {e}");
                }
                self.compose_checked(descriptor, &["up", "-d"]).map(|_| ())
            }
        }
    }
}

impl ContainerRuntime for ComposeRuntime {
    fn bring_up(&self, descriptor: &TopologyDescriptor) -> Result<BTreeMap<String, Endpoint>> {
        self.up(descriptor)?;

        let port = descriptor.service_port.to_string();
        let mut endpoints = BTreeMap::new();
        for service in &descriptor.services {
            let published = self.compose_checked(descriptor, &["port", service, &port])?;
            let (host, host_port) = parse_published(&published).ok_or_else(|| {
                Error::Configuration(format!(
                    "service '{service}' does not publish port {port} (got '{published}')"
                ))
            })?;
            log::debug!("service {service} reachable at {host}:{host_port}");
            // Login user comes from the topology, not the runtime
            endpoints.insert(service.clone(), Endpoint::new(host, host_port, ""));
        }
        Ok(endpoints)
    }

    fn tear_down(&self, descriptor: &TopologyDescriptor) -> Result<()> {
        self.compose_checked(descriptor, &["down", "--remove-orphans"])
            .map(|_| ())
    }
}

/// Parse `docker compose port` output such as `0.0.0.0:32768` or `[::]:32768`
///
/// Wildcard addresses map to the loopback address.
fn parse_published(output: &str) -> Option<(String, u16)> {
    let line = output.lines().next()?.trim();
    let (host, port) = line.rsplit_once(':')?;
    let port = port.parse().ok()?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    let host = match host {
        "" | "0.0.0.0" | "::" => "127.0.0.1",
        other => other,
    };
    Some((host.to_string(), port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_published_ipv4_wildcard() {
        assert_eq!(
            parse_published("0.0.0.0:32768\n"),
            Some(("127.0.0.1".to_string(), 32768))
        );
    }

    #[test]
    fn test_parse_published_ipv6_and_explicit() {
        assert_eq!(
            parse_published("[::]:2222"),
            Some(("127.0.0.1".to_string(), 2222))
        );
        assert_eq!(
            parse_published("192.168.1.5:2200\n[::]:2200"),
            Some(("192.168.1.5".to_string(), 2200))
        );
    }

    #[test]
    fn test_parse_published_rejects_garbage() {
        assert_eq!(parse_published(""), None);
        assert_eq!(parse_published("no port here"), None);
        assert_eq!(parse_published("0.0.0.0:http"), None);
    }

    #[test]
    fn test_missing_docker_is_action_error() {
        let runtime = ComposeRuntime {
            docker: "/nonexistent/docker".to_string(),
        };
        let descriptor = TopologyDescriptor {
            project: "test".into(),
            file: "compose.yaml".into(),
            services: vec!["head".into()],
            service_port: 22,
        };
        let err = runtime.tear_down(&descriptor).unwrap_err();
        assert!(matches!(err, Error::Action { exit_code: None, .. }));
    }
}
