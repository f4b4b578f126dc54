use async_trait::async_trait;
use log::{debug, warn};
use std::process::Stdio;
use tokio::process::Command;
use tokio::time::{timeout, Duration};

/// Answers whether a host replies to a single reachability check
#[async_trait]
pub trait Pinger: Send + Sync {
    async fn is_reachable(&self, ip_address: &str, timeout_secs: u64) -> bool;
}

/// Pinger that shells out to the system `ping` utility, one echo request per call
#[derive(Debug, Clone, Default)]
pub struct SystemPinger;

impl SystemPinger {
    pub fn new() -> Self {
        Self
    }

    fn command(ip_address: &str, timeout_secs: u64) -> Command {
        let mut cmd = Command::new("ping");
        if cfg!(target_os = "windows") {
            cmd.args(["-n", "1", "-w", &(timeout_secs * 1000).to_string(), ip_address]);
        } else {
            cmd.args(["-c", "1", "-W", &timeout_secs.to_string(), ip_address]);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl Pinger for SystemPinger {
    async fn is_reachable(&self, ip_address: &str, timeout_secs: u64) -> bool {
        let mut cmd = Self::command(ip_address, timeout_secs);
        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!("Failed to run ping for {}: {}", ip_address, e);
                return false;
            }
        };

        // The child is killed if the outer timeout drops it
        let outer = Duration::from_secs(timeout_secs + 1);
        match timeout(outer, child.wait_with_output()).await {
            Ok(Ok(output)) => output.status.success(),
            Ok(Err(e)) => {
                warn!("Error waiting for ping to {}: {}", ip_address, e);
                false
            }
            Err(_) => {
                debug!("Ping to {} timed out after {:?}", ip_address, outer);
                false
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ping_command_sends_one_echo() {
        let cmd = SystemPinger::command("192.0.2.1", 2);
        let args: Vec<String> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert_eq!(cmd.as_std().get_program(), "ping");
        assert_eq!(args.last().map(String::as_str), Some("192.0.2.1"));
        assert!(args.iter().any(|a| a == "1"));
    }

    #[tokio::test]
    async fn test_unresolvable_host_is_unreachable() {
        let pinger = SystemPinger::new();
        assert!(!pinger.is_reachable("definitely-not-a-host.invalid", 1).await);
    }
}
