//! Ports - 抽象化レイヤー
//!
//! 各 trait は外部システム（SQLite, サブプロセス, 時刻）への
//! インターフェースを提供し、実装の詳細を隠蔽します。

pub mod clock;
pub mod executor;
pub mod job_store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::executor::CommandExecutor;
pub use self::job_store::{JobStore, submit};
