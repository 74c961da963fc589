//! Domain model (IDs, job records, states, outcomes, decisions).
//!
//! I/O を持たない純粋な型とロジックだけを置く。永続化は `queue`、
//! 実行は `impls`、ループは `app` が担当する。

pub mod decision;
pub mod ids;
pub mod job;
pub mod outcome;
pub mod state;
pub mod timestamp;

pub use decision::{Decider, DefaultDecider, Transition};
pub use ids::JobId;
pub use job::{JobRecord, NewJob};
pub use outcome::ExecutionOutcome;
pub use state::JobState;
