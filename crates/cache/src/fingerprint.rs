use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use time::OffsetDateTime;

/// How a file's change fingerprint is computed.
///
/// - [`Modified`](Self::Modified) is cheap but can miss edits made within the
///   file system's timestamp resolution, and flags files that were only
///   touched.
/// - [`Hash`](Self::Hash) reads every byte of every file, but is exact.
#[derive(Debug, Display, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FingerprintStrategy {
    #[default]
    #[display("modified")]
    Modified,
    #[display("hash")]
    Hash,
}
impl FromStr for FingerprintStrategy {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "modified" | "mtime" => Ok(Self::Modified),
            "hash" | "content" => Ok(Self::Hash),
            other => Err(format!("unknown fingerprint strategy `{other}` (expected `modified` or `hash`)")),
        }
    }
}

/// A cheap-to-compare summary of a file's state at some point in time.
///
/// Fingerprints from different strategies never compare equal, so switching
/// strategy between runs invalidates every cached entry exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Fingerprint {
    /// Last modification time, to the precision the file system reports.
    Modified(#[serde(with = "time::serde::rfc3339")] OffsetDateTime),
    /// Hex-encoded BLAKE3 digest of the file contents.
    Hash(String),
}
impl Fingerprint {
    pub fn strategy(&self) -> FingerprintStrategy {
        match self {
            Self::Modified(_) => FingerprintStrategy::Modified,
            Self::Hash(_) => FingerprintStrategy::Hash,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use time::macros::datetime;

    #[rstest]
    #[case("modified", FingerprintStrategy::Modified)]
    #[case("MTIME", FingerprintStrategy::Modified)]
    #[case(" hash ", FingerprintStrategy::Hash)]
    fn test_parse_strategy(#[case] input: &str, #[case] expected: FingerprintStrategy) {
        assert_eq!(input.parse::<FingerprintStrategy>().unwrap(), expected);
    }

    #[test]
    fn test_unknown_strategy_is_rejected() {
        assert!("ctime".parse::<FingerprintStrategy>().is_err());
    }

    #[test]
    fn test_modified_keeps_nanosecond_precision() {
        let fingerprint = Fingerprint::Modified(datetime!(2024-03-01 12:30:45.123456789 UTC));
        let json = serde_json::to_string(&fingerprint).unwrap();
        assert_eq!(json, r#"{"kind":"modified","value":"2024-03-01T12:30:45.123456789Z"}"#);
        assert_eq!(serde_json::from_str::<Fingerprint>(&json).unwrap(), fingerprint);
    }

    #[test]
    fn test_strategies_never_compare_equal() {
        let modified = Fingerprint::Modified(datetime!(2024-03-01 0:00 UTC));
        let hash = Fingerprint::Hash("2024-03-01T00:00:00Z".to_string());
        assert_ne!(modified, hash);
        assert_eq!(modified.strategy(), FingerprintStrategy::Modified);
        assert_eq!(hash.strategy(), FingerprintStrategy::Hash);
    }
}
