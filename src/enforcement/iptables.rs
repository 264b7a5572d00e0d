//! `iptables` / `ip6tables` enforcer.
//!
//! All rules live in one dedicated chain (default `ipac`) that is jumped to
//! from `INPUT`, so a reset or purge never touches rules owned by anything
//! else on the host.
//!
//! # Rules
//!
//! - Address block: `-I <chain> -s <addr> -j DROP`
//! - Subnet block: `-I <chain> -s <net> -j DROP` (IPv6 only)
//! - Purge: `-F <chain>`
//! - Reset: flush, delete and recreate the chain, then re-link it from `INPUT`

use async_trait::async_trait;
use ipnet::Ipv6Net;
use std::net::IpAddr;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

use super::Enforcer;

const IPTABLES: &str = "iptables";
const IP6TABLES: &str = "ip6tables";

/// Failure running a packet filter command.
#[derive(Debug, Error)]
pub enum EnforcementError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` failed ({status}): {stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },
}

fn to_args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

/// Enforcer backed by the Linux `iptables` and `ip6tables` binaries.
#[derive(Debug, Clone)]
pub struct IptablesEnforcer {
    chain: String,
}

impl IptablesEnforcer {
    /// Create an enforcer that owns `chain` in both address families.
    pub fn new(chain: impl Into<String>) -> Self {
        Self {
            chain: chain.into(),
        }
    }

    pub fn chain(&self) -> &str {
        &self.chain
    }

    fn program_for(addr: &IpAddr) -> &'static str {
        match addr {
            IpAddr::V4(_) => IPTABLES,
            IpAddr::V6(_) => IP6TABLES,
        }
    }

    /// Arguments for inserting (`block`) or deleting a DROP rule for `source`.
    fn drop_rule_args(&self, block: bool, source: &str) -> Vec<String> {
        let op = if block { "-I" } else { "-D" };
        to_args(&[op, self.chain.as_str(), "-s", source, "-j", "DROP"])
    }

    /// Argument lists that rebuild the chain from scratch, in order.
    ///
    /// The first, second and fourth steps fail harmlessly when the chain or
    /// jump does not exist yet.
    fn reset_steps(&self) -> [(bool, Vec<String>); 5] {
        let chain = self.chain.as_str();
        [
            (false, to_args(&["-F", chain])),
            (false, to_args(&["-X", chain])),
            (true, to_args(&["-N", chain])),
            (false, to_args(&["-D", "INPUT", "-j", chain])),
            (true, to_args(&["-A", "INPUT", "-j", chain])),
        ]
    }

    async fn run(&self, program: &'static str, args: &[String]) -> Result<(), EnforcementError> {
        let output = Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|source| EnforcementError::Spawn { program, source })?;

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if !output.status.success() || !stderr.is_empty() {
            return Err(EnforcementError::Failed {
                command: format!("{program} {}", args.join(" ")),
                status: output.status.to_string(),
                stderr,
            });
        }
        Ok(())
    }

    /// Run a command whose failure is worth an operator's attention.
    async fn run_logged(&self, program: &'static str, args: &[String]) {
        if let Err(e) = self.run(program, args).await {
            warn!(error = %e, "packet filter command failed");
        }
    }
}

impl Default for IptablesEnforcer {
    fn default() -> Self {
        Self::new("ipac")
    }
}

#[async_trait]
impl Enforcer for IptablesEnforcer {
    async fn reset_all(&self) {
        for program in [IPTABLES, IP6TABLES] {
            for (must_succeed, args) in self.reset_steps() {
                match self.run(program, &args).await {
                    Ok(()) => {}
                    Err(e) if must_succeed => {
                        warn!(error = %e, chain = %self.chain, "failed to reset chain");
                    }
                    Err(e) => debug!(error = %e, "ignoring reset step failure"),
                }
            }
        }
        debug!(chain = %self.chain, "packet filter chain reset");
    }

    async fn unblock_all(&self) {
        let args = to_args(&["-F", self.chain.as_str()]);
        self.run_logged(IPTABLES, &args).await;
        self.run_logged(IP6TABLES, &args).await;
    }

    async fn block_address(&self, addr: IpAddr) {
        let args = self.drop_rule_args(true, &addr.to_string());
        self.run_logged(Self::program_for(&addr), &args).await;
    }

    async fn unblock_address(&self, addr: IpAddr) {
        let args = self.drop_rule_args(false, &addr.to_string());
        self.run_logged(Self::program_for(&addr), &args).await;
    }

    async fn block_subnet(&self, subnet: Ipv6Net) {
        let args = self.drop_rule_args(true, &subnet.to_string());
        self.run_logged(IP6TABLES, &args).await;
    }

    async fn unblock_subnet(&self, subnet: Ipv6Net) {
        let args = self.drop_rule_args(false, &subnet.to_string());
        self.run_logged(IP6TABLES, &args).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drop_rule_targets_own_chain() {
        let enforcer = IptablesEnforcer::new("myapp");
        assert_eq!(
            enforcer.drop_rule_args(true, "203.0.113.9"),
            vec!["-I", "myapp", "-s", "203.0.113.9", "-j", "DROP"]
        );
        assert_eq!(enforcer.drop_rule_args(false, "203.0.113.9")[0], "-D");
    }

    #[test]
    fn address_family_selects_binary() {
        let v4: IpAddr = "10.0.0.1".parse().unwrap();
        let v6: IpAddr = "2001:db8::1".parse().unwrap();
        assert_eq!(IptablesEnforcer::program_for(&v4), "iptables");
        assert_eq!(IptablesEnforcer::program_for(&v6), "ip6tables");
    }

    #[test]
    fn reset_recreates_and_relinks_chain() {
        let enforcer = IptablesEnforcer::default();
        let steps = enforcer.reset_steps();
        let flat: Vec<String> = steps.iter().map(|(_, a)| a.join(" ")).collect();
        assert_eq!(
            flat,
            vec![
                "-F ipac",
                "-X ipac",
                "-N ipac",
                "-D INPUT -j ipac",
                "-A INPUT -j ipac",
            ]
        );
        // only creating and linking the chain are required to succeed
        let required: Vec<bool> = steps.iter().map(|(r, _)| *r).collect();
        assert_eq!(required, vec![false, false, true, false, true]);
    }

    #[test]
    fn subnet_rule_uses_cidr_notation() {
        let enforcer = IptablesEnforcer::default();
        let net: Ipv6Net = "2001:db8:0:0::/64".parse().unwrap();
        let args = enforcer.drop_rule_args(true, &net.to_string());
        assert_eq!(args[3], "2001:db8::/64");
    }

    #[tokio::test]
    async fn missing_binary_is_spawn_error() {
        let enforcer = IptablesEnforcer::default();
        let result = enforcer
            .run("ipac-ng-no-such-binary", &["-L".to_string()])
            .await;
        assert!(matches!(result, Err(EnforcementError::Spawn { .. })));
    }
}
