//! Reconstruction options
//!
//! Options are built in code or loaded from environment variables:
//!
//! | Variable | Field |
//! |---|---|
//! | `NEBULA_VERIFY_FINAL_HASH` | `verify_final_hash` (`true`/`false`/`1`/`0`) |
//! | `NEBULA_INTEGRITY_POLICY` | `integrity_policy` (`lenient`/`strict`) |
//! | `NEBULA_MAX_PARALLEL_FETCHES` | `max_parallel_fetches` |
//! | `NEBULA_PARALLEL_DECODE_THRESHOLD` | `parallel_decode_threshold` (bytes) |
//! | `NEBULA_EARLY_ABORT` | `early_abort` (`true`/`false`/`1`/`0`) |

use crate::erasure::DEFAULT_PARALLEL_DECODE_THRESHOLD;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// What to do when a reconstruction succeeds with weaker guarantees
///
/// Integrity is reduced when the manifest has no Merkle block, declares no
/// original hash, or final hash verification is turned off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrityPolicy {
    /// Succeed and report the reduced guarantee as warnings
    #[default]
    Lenient,
    /// Fail the attempt at the integrity stage
    Strict,
}

impl FromStr for IntegrityPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lenient" => Ok(IntegrityPolicy::Lenient),
            "strict" => Ok(IntegrityPolicy::Strict),
            _ => Err(ConfigError::InvalidValue(
                "integrity_policy".to_string(),
                s.to_string(),
            )),
        }
    }
}

/// Options for a reconstruction attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconstructOptions {
    /// Compare the final plaintext against the manifest's original hash
    pub verify_final_hash: bool,

    /// Handling of reduced-integrity outcomes
    pub integrity_policy: IntegrityPolicy,

    /// Worker threads for shard fetches (0 = rayon default)
    pub max_parallel_fetches: usize,

    /// Chunk length from which decoding runs in parallel
    pub parallel_decode_threshold: usize,

    /// Stop verification once too many shards have failed, without waiting
    /// for fetches still in flight. Shards without a result are reported as
    /// unfetched, so the missing set may overstate what is actually lost.
    pub early_abort: bool,
}

impl Default for ReconstructOptions {
    fn default() -> Self {
        Self {
            verify_final_hash: true,
            integrity_policy: IntegrityPolicy::Lenient,
            max_parallel_fetches: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            parallel_decode_threshold: DEFAULT_PARALLEL_DECODE_THRESHOLD,
            early_abort: false,
        }
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidValue(name.to_string(), value.to_string())),
    }
}

fn parse_usize(name: &str, value: &str) -> Result<usize, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::InvalidValue(name.to_string(), value.to_string()))
}

impl ReconstructOptions {
    /// Create options from environment variables, defaulting unset ones
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Create options from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut options = Self::default();

        if let Some(v) = lookup("NEBULA_VERIFY_FINAL_HASH") {
            options.verify_final_hash = parse_bool("NEBULA_VERIFY_FINAL_HASH", &v)?;
        }
        if let Some(v) = lookup("NEBULA_INTEGRITY_POLICY") {
            options.integrity_policy = v
                .parse()
                .map_err(|_| ConfigError::InvalidValue("NEBULA_INTEGRITY_POLICY".to_string(), v))?;
        }
        if let Some(v) = lookup("NEBULA_MAX_PARALLEL_FETCHES") {
            options.max_parallel_fetches = parse_usize("NEBULA_MAX_PARALLEL_FETCHES", &v)?;
        }
        if let Some(v) = lookup("NEBULA_PARALLEL_DECODE_THRESHOLD") {
            options.parallel_decode_threshold = parse_usize("NEBULA_PARALLEL_DECODE_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("NEBULA_EARLY_ABORT") {
            options.early_abort = parse_bool("NEBULA_EARLY_ABORT", &v)?;
        }

        Ok(options)
    }

    pub fn with_verify_final_hash(mut self, verify: bool) -> Self {
        self.verify_final_hash = verify;
        self
    }

    pub fn with_integrity_policy(mut self, policy: IntegrityPolicy) -> Self {
        self.integrity_policy = policy;
        self
    }

    pub fn with_max_parallel_fetches(mut self, threads: usize) -> Self {
        self.max_parallel_fetches = threads;
        self
    }

    pub fn with_parallel_decode_threshold(mut self, bytes: usize) -> Self {
        self.parallel_decode_threshold = bytes;
        self
    }

    pub fn with_early_abort(mut self, enabled: bool) -> Self {
        self.early_abort = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_default_options() {
        let options = ReconstructOptions::default();
        assert!(options.verify_final_hash);
        assert!(!options.early_abort);
        assert_eq!(options.integrity_policy, IntegrityPolicy::Lenient);
        assert!(options.max_parallel_fetches >= 1);
        assert_eq!(
            options.parallel_decode_threshold,
            DEFAULT_PARALLEL_DECODE_THRESHOLD
        );
    }

    #[test]
    fn test_from_lookup() {
        let options = ReconstructOptions::from_lookup(lookup(&[
            ("NEBULA_VERIFY_FINAL_HASH", "0"),
            ("NEBULA_INTEGRITY_POLICY", "Strict"),
            ("NEBULA_MAX_PARALLEL_FETCHES", "3"),
            ("NEBULA_PARALLEL_DECODE_THRESHOLD", "4096"),
            ("NEBULA_EARLY_ABORT", "yes"),
        ]))
        .unwrap();
        assert!(!options.verify_final_hash);
        assert_eq!(options.integrity_policy, IntegrityPolicy::Strict);
        assert_eq!(options.max_parallel_fetches, 3);
        assert_eq!(options.parallel_decode_threshold, 4096);
        assert!(options.early_abort);
    }

    #[test]
    fn test_from_lookup_empty_uses_defaults() {
        let options = ReconstructOptions::from_lookup(lookup(&[])).unwrap();
        assert_eq!(options, ReconstructOptions::default());
    }

    #[test]
    fn test_invalid_values() {
        let err = ReconstructOptions::from_lookup(lookup(&[("NEBULA_MAX_PARALLEL_FETCHES", "many")]))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidValue("NEBULA_MAX_PARALLEL_FETCHES".into(), "many".into())
        );

        let err = ReconstructOptions::from_lookup(lookup(&[("NEBULA_INTEGRITY_POLICY", "paranoid")]))
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid value for NEBULA_INTEGRITY_POLICY: paranoid");

        assert!(ReconstructOptions::from_lookup(lookup(&[("NEBULA_VERIFY_FINAL_HASH", "maybe")])).is_err());
    }

    #[test]
    fn test_builder_setters() {
        let options = ReconstructOptions::default()
            .with_verify_final_hash(false)
            .with_integrity_policy(IntegrityPolicy::Strict)
            .with_max_parallel_fetches(2)
            .with_parallel_decode_threshold(1)
            .with_early_abort(true);
        assert!(!options.verify_final_hash);
        assert_eq!(options.integrity_policy, IntegrityPolicy::Strict);
        assert_eq!(options.max_parallel_fetches, 2);
        assert_eq!(options.parallel_decode_threshold, 1);
        assert!(options.early_abort);
    }
}
