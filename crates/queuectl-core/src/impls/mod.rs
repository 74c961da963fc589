//! Impls - ports の実装
//!
//! - **ShellExecutor**: `sh -c` でジョブのコマンドを実行する
//!
//! ストア実装は `queue` 側にある（`SqliteJobStore`, `InMemoryJobStore`）。

pub mod shell;

pub use self::shell::ShellExecutor;
