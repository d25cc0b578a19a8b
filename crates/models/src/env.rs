use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Environment keys read by the normalize engine. Values are plain strings;
/// the typed accessors on [`Env`] parse them with defaults.
pub mod keys {
    pub const PARALLEL_NORMALIZE: &str = "PEERDB_CLICKHOUSE_PARALLEL_NORMALIZE";
    pub const NORMALIZATION_PARTS: &str = "PEERDB_CLICKHOUSE_NORMALIZATION_PARTS";
    pub const ENABLE_PRIMARY_UPDATE: &str = "PEERDB_CLICKHOUSE_ENABLE_PRIMARY_UPDATE";
    pub const NULLABLE: &str = "PEERDB_NULLABLE";
    pub const BINARY_FORMAT: &str = "PEERDB_BINARY_FORMAT";
}
use keys::*;

/// How bytes columns are materialized in the destination.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum BinaryFormat {
    /// Decoded binary, stored as-is.
    #[default]
    Raw,
    /// Hex-encoded text of the decoded binary.
    Hex,
}

/// The per-invocation configuration map, read once at invocation start and
/// passed down the call tree. There is no process-wide mutable state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Env(BTreeMap<String, String>);

impl Env {
    pub fn new(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.0.insert(key.to_string(), value.to_string());
    }

    /// A boolean knob. Accepts `true`/`false`/`1`/`0`; a malformed value
    /// logs a warning and falls back to the default rather than failing
    /// the invocation.
    pub fn bool_or(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            None => default,
            Some("1") => true,
            Some("0") => false,
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                tracing::warn!(key, raw, "malformed boolean in environment, using default");
                default
            }),
        }
    }

    pub fn u32_or(&self, key: &str, default: u32) -> u32 {
        match self.get(key) {
            None => default,
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                tracing::warn!(key, raw, "malformed integer in environment, using default");
                default
            }),
        }
    }

    pub fn parallel_normalize(&self) -> u32 {
        self.u32_or(PARALLEL_NORMALIZE, 1)
    }

    pub fn normalization_parts(&self) -> u32 {
        self.u32_or(NORMALIZATION_PARTS, 1).max(1)
    }

    pub fn enable_primary_update(&self) -> bool {
        self.bool_or(ENABLE_PRIMARY_UPDATE, false)
    }

    pub fn nullable(&self) -> bool {
        self.bool_or(NULLABLE, false)
    }

    pub fn binary_format(&self) -> BinaryFormat {
        match self.get(BINARY_FORMAT) {
            None | Some("raw") => BinaryFormat::Raw,
            Some("hex") => BinaryFormat::Hex,
            Some(raw) => {
                tracing::warn!(raw, "unknown binary format in environment, using raw");
                BinaryFormat::Raw
            }
        }
    }
}

impl FromIterator<(String, String)> for Env {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> Env {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let env = Env::default();
        assert_eq!(env.parallel_normalize(), 1);
        assert_eq!(env.normalization_parts(), 1);
        assert!(!env.enable_primary_update());
        assert!(!env.nullable());
        assert_eq!(env.binary_format(), BinaryFormat::Raw);
    }

    #[test]
    fn test_parses_knobs() {
        let env = env(&[
            (PARALLEL_NORMALIZE, "8"),
            (NORMALIZATION_PARTS, "4"),
            (ENABLE_PRIMARY_UPDATE, "true"),
            (NULLABLE, "1"),
            (BINARY_FORMAT, "hex"),
        ]);
        assert_eq!(env.parallel_normalize(), 8);
        assert_eq!(env.normalization_parts(), 4);
        assert!(env.enable_primary_update());
        assert!(env.nullable());
        assert_eq!(env.binary_format(), BinaryFormat::Hex);
    }

    #[test]
    fn test_malformed_values_fall_back() {
        let env = env(&[
            (PARALLEL_NORMALIZE, "lots"),
            (NORMALIZATION_PARTS, "0"),
            (ENABLE_PRIMARY_UPDATE, "yep"),
            (BINARY_FORMAT, "base91"),
        ]);
        assert_eq!(env.parallel_normalize(), 1);
        // Zero parts would divide by zero in the planner; clamped to one.
        assert_eq!(env.normalization_parts(), 1);
        assert!(!env.enable_primary_update());
        assert_eq!(env.binary_format(), BinaryFormat::Raw);
    }
}
