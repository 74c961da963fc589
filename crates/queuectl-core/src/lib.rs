//! queuectl-core
//!
//! Core building blocks for a local, persistent background job queue.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, job, state, outcome, decision, timestamp）
//! - **ports**: 抽象化レイヤー（JobStore, CommandExecutor, Clock）
//! - **queue**: JobStore の実装（SQLite, in-memory）と RetryPolicy
//! - **impls**: ports の実装（ShellExecutor）
//! - **app**: アプリケーションロジック（WorkerLoop, WorkerPool, JobStats）
//! - **config**: 永続設定（config.json）
//! - **observability**: tracing の初期化
//! - **error**: エラー型

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod queue;

pub use app::{JobStats, ShutdownReport, WorkerDeps, WorkerLoop, WorkerOptions, WorkerPool};
pub use config::{Config, ConfigError};
pub use domain::{
    Decider, DefaultDecider, ExecutionOutcome, JobId, JobRecord, JobState, NewJob, Transition,
};
pub use error::QueueError;
pub use impls::ShellExecutor;
pub use ports::{Clock, CommandExecutor, JobStore, SystemClock};
pub use queue::{InMemoryJobStore, RetryPolicy, SqliteJobStore};
