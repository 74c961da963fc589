//! ShellExecutor - サブプロセスでコマンドを実行する
//!
//! タイムアウト時は子プロセスを kill する（`kill_on_drop`）。
//! 実行失敗はすべて `ExecutionOutcome::Failure` として返し、`Err` にはしない。

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::domain::ExecutionOutcome;
use crate::ports::CommandExecutor;

/// Default wall-clock limit for one command.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct ShellExecutor {
    timeout: Duration,
}

impl ShellExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn command(command: &str) -> Command {
        #[cfg(windows)]
        let mut cmd = {
            let mut cmd = Command::new("cmd");
            cmd.arg("/C").arg(command);
            cmd
        };
        #[cfg(not(windows))]
        let mut cmd = {
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(command);
            cmd
        };
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

#[async_trait]
impl CommandExecutor for ShellExecutor {
    async fn execute(&self, command: &str) -> ExecutionOutcome {
        let child = match Self::command(command).spawn() {
            Ok(child) => child,
            Err(e) => return ExecutionOutcome::failure(format!("failed to launch command: {e}")),
        };

        // wait_with_output の future を drop すると child も drop され、kill される
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return ExecutionOutcome::failure(format!("failed to launch command: {e}"));
            }
            Err(_) => {
                return ExecutionOutcome::failure(format!(
                    "timed out after {}s",
                    self.timeout.as_secs()
                ));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);

        if output.status.success() {
            return ExecutionOutcome::success(stdout);
        }
        match output.status.code() {
            Some(code) => ExecutionOutcome::failure(format!("exited with code {code}: {stderr}")),
            None => ExecutionOutcome::failure(format!("terminated by signal: {stderr}")),
        }
    }
}
