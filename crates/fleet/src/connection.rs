//! Remote command channel to a worker.
//!
//! Every call spawns its own `ssh`/`scp` process, performs exactly one
//! operation and waits for it to exit. Nothing is pooled. The child is
//! spawned with `kill_on_drop(true)`, so a timeout or a cancelled caller
//! tears the session down.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use streamfleet_db::models::vps::VpsServer;

/// Maximum stdout or stderr size captured per stream (1 MiB).
const MAX_OUTPUT_BYTES: u64 = 1024 * 1024;

/// Environment variable `sshpass -e` reads the password from.
const SSHPASS_ENV: &str = "SSHPASS";

/// Result of [`RemoteShell::execute`]. Transport failures are reported in
/// `error`, never raised.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CommandOutcome {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub error: Option<String>,
}

impl CommandOutcome {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// Best description of why the command failed.
    pub fn failure_reason(&self) -> String {
        if let Some(error) = &self.error {
            return error.clone();
        }
        let stderr = self.stderr.trim();
        match (self.exit_code, stderr.is_empty()) {
            (Some(code), true) => format!("Command exited with code {code}"),
            (Some(code), false) => format!("Command exited with code {code}: {stderr}"),
            (None, _) => "Command failed".to_string(),
        }
    }
}

/// Result of [`RemoteShell::test_connection`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionCheck {
    pub ok: bool,
    pub latency_ms: Option<u64>,
    pub error: Option<String>,
}

#[async_trait]
pub trait RemoteShell: Send + Sync {
    async fn test_connection(&self, vps: &VpsServer) -> ConnectionCheck;
    async fn execute(&self, vps: &VpsServer, command: &str) -> CommandOutcome;
    async fn upload_file(&self, vps: &VpsServer, local: &Path, remote: &str) -> bool;
    async fn download_file(&self, vps: &VpsServer, remote: &str, local: &Path) -> bool;
    /// Contents of a remote file, or `None` when it cannot be read.
    async fn read_file(&self, vps: &VpsServer, path: &str) -> Option<String>;
}

// ---------------------------------------------------------------------------
// ssh/scp implementation
// ---------------------------------------------------------------------------

/// [`RemoteShell`] using the system `ssh` and `scp` binaries.
///
/// Key authentication is used when the worker has a key path. A stored
/// password is passed through `sshpass -e`, which must be installed.
#[derive(Debug, Clone)]
pub struct VpsConnection {
    connect_timeout: Duration,
    command_timeout: Duration,
}

impl VpsConnection {
    pub fn new(connect_timeout: Duration, command_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            command_timeout,
        }
    }

    fn user_at_host(vps: &VpsServer) -> String {
        format!("{}@{}", vps.ssh_user, vps.ip_address)
    }

    /// Options shared by `ssh` and `scp`. The port flag differs between the
    /// two, so it is passed in.
    fn common_args(&self, vps: &VpsServer, port_flag: &str) -> Vec<String> {
        let mut args = vec![
            port_flag.to_string(),
            vps.ssh_port.to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout.as_secs().max(1)),
        ];
        match &vps.ssh_key_path {
            Some(key) if !key.is_empty() => {
                args.push("-i".to_string());
                args.push(key.clone());
                args.push("-o".to_string());
                args.push("BatchMode=yes".to_string());
            }
            _ => {}
        }
        args
    }

    pub fn ssh_args(&self, vps: &VpsServer, command: &str) -> Vec<String> {
        let mut args = self.common_args(vps, "-p");
        args.push(Self::user_at_host(vps));
        args.push(command.to_string());
        args
    }

    pub fn scp_args(&self, vps: &VpsServer, from: String, to: String) -> Vec<String> {
        let mut args = self.common_args(vps, "-P");
        args.push("-q".to_string());
        args.push(from);
        args.push(to);
        args
    }

    /// Build the process for `program`, wrapping it in `sshpass` when the
    /// worker authenticates by password only.
    fn command(vps: &VpsServer, program: &str, args: Vec<String>) -> Command {
        let password = vps
            .ssh_password
            .as_deref()
            .filter(|p| !p.is_empty() && vps.ssh_key_path.as_deref().unwrap_or("").is_empty());
        match password {
            Some(password) => {
                let mut cmd = Command::new("sshpass");
                cmd.arg("-e").arg(program).args(args).env(SSHPASS_ENV, password);
                cmd
            }
            None => {
                let mut cmd = Command::new(program);
                cmd.args(args);
                cmd
            }
        }
    }

    async fn run(&self, mut cmd: Command) -> CommandOutcome {
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => return CommandOutcome::failed(format!("Failed to spawn transport: {e}")),
        };

        let stdout_task = tokio::spawn(read_stream(child.stdout.take()));
        let stderr_task = tokio::spawn(read_stream(child.stderr.take()));

        match tokio::time::timeout(self.command_timeout, child.wait()).await {
            Ok(Ok(status)) => {
                let stdout = stdout_task.await.unwrap_or_default();
                let stderr = stderr_task.await.unwrap_or_default();
                let exit_code = status.code();
                CommandOutcome {
                    success: status.success(),
                    stdout: String::from_utf8_lossy(&stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&stderr).into_owned(),
                    exit_code,
                    error: None,
                }
            }
            Ok(Err(e)) => CommandOutcome::failed(format!("Transport error: {e}")),
            // `child` is dropped here and killed.
            Err(_) => CommandOutcome::failed(format!(
                "Timed out after {}s",
                self.command_timeout.as_secs()
            )),
        }
    }
}

async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut h) = handle {
        let _ = (&mut h).take(MAX_OUTPUT_BYTES).read_to_end(&mut buf).await;
    }
    buf
}

#[async_trait]
impl RemoteShell for VpsConnection {
    async fn test_connection(&self, vps: &VpsServer) -> ConnectionCheck {
        let start = Instant::now();
        let outcome = self.execute(vps, "echo ok").await;
        if outcome.success && outcome.stdout.trim() == "ok" {
            ConnectionCheck {
                ok: true,
                latency_ms: Some(start.elapsed().as_millis() as u64),
                error: None,
            }
        } else {
            ConnectionCheck {
                ok: false,
                latency_ms: None,
                error: Some(outcome.failure_reason()),
            }
        }
    }

    async fn execute(&self, vps: &VpsServer, command: &str) -> CommandOutcome {
        let cmd = Self::command(vps, "ssh", self.ssh_args(vps, command));
        let outcome = self.run(cmd).await;
        if !outcome.success {
            tracing::debug!(
                worker_id = vps.id,
                exit_code = ?outcome.exit_code,
                error = %outcome.failure_reason(),
                "Remote command failed",
            );
        }
        outcome
    }

    async fn upload_file(&self, vps: &VpsServer, local: &Path, remote: &str) -> bool {
        let target = format!("{}:{remote}", Self::user_at_host(vps));
        let args = self.scp_args(vps, local.display().to_string(), target);
        let outcome = self.run(Self::command(vps, "scp", args)).await;
        if !outcome.success {
            tracing::warn!(
                worker_id = vps.id,
                remote,
                error = %outcome.failure_reason(),
                "Upload to worker failed",
            );
        }
        outcome.success
    }

    async fn download_file(&self, vps: &VpsServer, remote: &str, local: &Path) -> bool {
        let source = format!("{}:{remote}", Self::user_at_host(vps));
        let args = self.scp_args(vps, source, local.display().to_string());
        let outcome = self.run(Self::command(vps, "scp", args)).await;
        if !outcome.success {
            tracing::warn!(
                worker_id = vps.id,
                remote,
                error = %outcome.failure_reason(),
                "Download from worker failed",
            );
        }
        outcome.success
    }

    async fn read_file(&self, vps: &VpsServer, path: &str) -> Option<String> {
        let command = format!("cat {}", streamfleet_core::agent::shell_quote(path));
        let outcome = self.execute(vps, &command).await;
        outcome.success.then_some(outcome.stdout)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::vps;

    fn connection() -> VpsConnection {
        VpsConnection::new(Duration::from_secs(10), Duration::from_secs(60))
    }

    #[test]
    fn ssh_args_use_key_when_present() {
        let mut server = vps(1, "edge-1");
        server.ssh_key_path = Some("/keys/edge".into());
        let args = connection().ssh_args(&server, "uptime");

        assert_eq!(args[0], "-p");
        assert_eq!(args[1], "22");
        assert!(args.contains(&"StrictHostKeyChecking=no".to_string()));
        assert!(args.contains(&"ConnectTimeout=10".to_string()));
        assert!(args.contains(&"/keys/edge".to_string()));
        assert_eq!(args[args.len() - 2], "root@10.0.0.1");
        assert_eq!(args[args.len() - 1], "uptime");
    }

    #[test]
    fn scp_uses_uppercase_port_flag() {
        let server = vps(1, "edge-1");
        let args = connection().scp_args(&server, "/tmp/a".into(), "root@10.0.0.1:/tmp/b".into());
        assert_eq!(args[0], "-P");
        assert!(!args.contains(&"-i".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("root@10.0.0.1:/tmp/b"));
    }

    #[test]
    fn password_only_workers_go_through_sshpass() {
        let mut server = vps(1, "edge-1");
        server.ssh_password = Some("hunter2".into());
        let cmd = VpsConnection::command(&server, "ssh", vec!["x".into()]);
        assert_eq!(cmd.as_std().get_program(), "sshpass");

        server.ssh_key_path = Some("/keys/edge".into());
        let cmd = VpsConnection::command(&server, "ssh", vec!["x".into()]);
        assert_eq!(cmd.as_std().get_program(), "ssh");
    }

    #[test]
    fn failure_reason_prefers_transport_error() {
        assert_eq!(CommandOutcome::failed("refused").failure_reason(), "refused");
        let outcome = CommandOutcome {
            exit_code: Some(7),
            stderr: "Connection refused\n".into(),
            ..Default::default()
        };
        assert_eq!(
            outcome.failure_reason(),
            "Command exited with code 7: Connection refused"
        );
    }

    #[tokio::test]
    async fn missing_binary_is_a_structured_failure() {
        let conn = VpsConnection::new(Duration::from_secs(1), Duration::from_secs(1));
        let outcome = conn.run(Command::new("/nonexistent/streamfleet-ssh")).await;
        assert!(!outcome.success);
        assert!(outcome.error.is_some());
    }
}
