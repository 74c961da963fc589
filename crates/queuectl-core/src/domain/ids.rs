//! Domain identifiers (strongly-typed IDs).
//!
//! Job ID は呼び出し側が決める文字列で、そのまま主キーになる。
//! `String` を直接使わずに newtype で包むことで、worker id やコマンド文字列と
//! 取り違えないようにしている。

use std::fmt;

use serde::{Deserialize, Serialize};

/// Caller-supplied job identifier; primary key of the jobs table.
#[repr(transparent)]
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for JobId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for JobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_id_serializes_as_plain_string() {
        let id = JobId::new("job-1");
        let s = serde_json::to_string(&id).unwrap();
        assert_eq!(s, "\"job-1\"");

        let back: JobId = serde_json::from_str(&s).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn blank_id_is_empty() {
        assert!(JobId::new("  ").is_empty());
        assert!(!JobId::new("a").is_empty());
    }
}
