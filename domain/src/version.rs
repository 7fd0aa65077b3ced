//! Monotonic version derived from a Redis Stream entry id.
//!
//! Stream ids are `"{millis}-{seq}"` pairs that Redis itself guarantees are
//! monotonically non-decreasing within a stream. We reuse that ordering as
//! the aggregate's optimistic-concurrency token: an incoming update is only
//! applied if its version is strictly greater than what's stored.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VersionParseError {
    #[error("stream id {0:?} is not in \"ts-seq\" form")]
    Malformed(String),
    #[error("stream id {0:?} has a non-numeric component")]
    NotNumeric(String),
}

/// `(ts, seq)` pair. Field declaration order matters: deriving `Ord` on a
/// tuple-like struct compares fields in order, which gives us exactly the
/// lexicographic `(ts, seq)` ordering Redis Stream ids use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct Version {
    pub ts: u64,
    pub seq: u32,
}

impl Version {
    pub fn new(ts: u64, seq: u32) -> Self {
        Self { ts, seq }
    }

    /// Parses a Redis Stream entry id of the form `"{ts}-{seq}"`.
    pub fn from_stream_id(id: &str) -> Result<Self, VersionParseError> {
        let (ts, seq) = id
            .split_once('-')
            .ok_or_else(|| VersionParseError::Malformed(id.to_string()))?;
        let ts = ts
            .parse()
            .map_err(|_| VersionParseError::NotNumeric(id.to_string()))?;
        let seq = seq
            .parse()
            .map_err(|_| VersionParseError::NotNumeric(id.to_string()))?;
        Ok(Self { ts, seq })
    }

    pub fn to_stream_id(self) -> String {
        format!("{}-{}", self.ts, self.seq)
    }

    /// True if `self` may supersede `stored`: strictly greater, never equal
    /// or less. A duplicate delivery of the same version is rejected, not
    /// treated as a no-op success.
    pub fn supersedes(self, stored: Version) -> bool {
        self > stored
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_stream_id())
    }
}

impl FromStr for Version {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_stream_id(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_canonical_stream_id() {
        let v = Version::from_stream_id("1627991290000-5").unwrap();
        assert_eq!(v, Version::new(1627991290000, 5));
        assert_eq!(v.to_stream_id(), "1627991290000-5");
    }

    #[test]
    fn rejects_malformed_id() {
        assert!(Version::from_stream_id("not-a-timestamp").is_err());
        assert!(Version::from_stream_id("12345").is_err());
    }

    #[test]
    fn ordering_is_ts_then_seq() {
        assert!(Version::new(100, 9) < Version::new(101, 0));
        assert!(Version::new(100, 0) < Version::new(100, 1));
        assert_eq!(Version::new(100, 1), Version::new(100, 1));
    }

    #[test]
    fn supersedes_is_strict() {
        let v = Version::new(100, 1);
        assert!(!v.supersedes(v));
        assert!(!v.supersedes(Version::new(100, 2)));
        assert!(Version::new(100, 2).supersedes(v));
    }
}
