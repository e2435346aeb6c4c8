//! Adapters from the provisioning collaborator traits to external tools
//!
//! - [`SshRunner`]: remote commands over `ssh`
//! - [`AptPackages`]: Debian packages through a remote runner
//! - [`ComposeRuntime`]: `docker compose` projects
//! - [`SshKeygenStore`]: key pairs created with `ssh-keygen` on the origin node

pub mod apt;
pub mod compose;
pub mod keys;
pub mod ssh;

pub use apt::AptPackages;
pub use compose::ComposeRuntime;
pub use keys::SshKeygenStore;
pub use ssh::SshRunner;

use provision::Node;

/// Quote a string for a POSIX shell
pub fn shell_quote(s: &str) -> String {
    if !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:@,+".contains(c))
    {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// `sudo -n ` unless the node logs in as root
pub fn sudo_prefix(node: &Node) -> &'static str {
    if node.endpoint().user == "root" {
        ""
    } else {
        "sudo -n "
    }
}

/// Run `script` through `sh -c` with root privileges
pub fn as_root(node: &Node, script: &str) -> String {
    format!("{}sh -c {}", sudo_prefix(node), shell_quote(script))
}


#[cfg(test)]
mod tests {
    use super::*;
    use provision::Endpoint;

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("openmpi-bin"), "openmpi-bin");
        assert_eq!(shell_quote("/home/mpiuser/.ssh"), "/home/mpiuser/.ssh");
        assert_eq!(shell_quote("hello world"), "'hello world'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote(""), "''");
        assert_eq!(shell_quote("$HOME"), "'$HOME'");
    }

    #[test]
    fn test_sudo_prefix() {
        let root = Node::head("head", Endpoint::new("h", 22, "root"));
        let user = Node::compute("c", Endpoint::new("h", 22, "mpiuser"));
        assert_eq!(sudo_prefix(&root), "");
        assert_eq!(sudo_prefix(&user), "sudo -n ");
        assert_eq!(as_root(&root, "id -u"), "sh -c 'id -u'");
    }
}
