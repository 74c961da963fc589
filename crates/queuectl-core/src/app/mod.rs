//! App - アプリケーション層
//!
//! ports を組み合わせてワーカーを動かす。
//!
//! # 主要コンポーネント
//! - **WorkerLoop**: ジョブ実行ループ（claim→execute→decide→update）
//! - **WorkerPool**: N 本の WorkerLoop の起動と graceful shutdown
//! - **JobStats**: 状態ごとの件数

pub mod status;
pub mod supervisor;
pub mod worker_loop;

pub use self::status::JobStats;
pub use self::supervisor::{ShutdownReport, WorkerPool};
pub use self::worker_loop::{WorkerDeps, WorkerLoop, WorkerOptions, WorkerPhase};
