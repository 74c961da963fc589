//! CommandExecutor port - コマンド実行の抽象化

use async_trait::async_trait;

use crate::domain::ExecutionOutcome;

/// Runs one job command to completion.
///
/// Failures (non-zero exit, timeout, launch error) are reported as
/// `ExecutionOutcome::Failure`, never as `Err`.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, command: &str) -> ExecutionOutcome;
}
