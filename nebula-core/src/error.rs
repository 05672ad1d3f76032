//! Error types for shard reconstruction
//!
//! Each stage of a reconstruction attempt has its own error type. Per-shard
//! failures ([`ShardError`]) are recorded on the shard record and never raised;
//! everything else is attempt-fatal and surfaces through [`ReconstructError`].

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias for attempt-fatal operations
pub type Result<T> = std::result::Result<T, ReconstructError>;

/// Stage of the reconstruction pipeline, used to attribute failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Manifest,
    ShardVerification,
    Merkle,
    Recoverability,
    Decode,
    Decryption,
    Integrity,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Manifest => "manifest",
            Stage::ShardVerification => "shard_verification",
            Stage::Merkle => "merkle",
            Stage::Recoverability => "recoverability",
            Stage::Decode => "decode",
            Stage::Decryption => "decryption",
            Stage::Integrity => "integrity",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// GF(256) arithmetic errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticError {
    #[error("Division by zero in GF(256)")]
    DivisionByZero,

    #[error("Zero has no multiplicative inverse in GF(256)")]
    ZeroHasNoInverse,
}

/// Malformed or unsupported manifest
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ManifestError {
    #[error("Malformed manifest: {0}")]
    Malformed(String),

    #[error("Unsupported manifest version: {0}")]
    UnsupportedVersion(String),

    #[error("Unsupported hash algorithm: {0}")]
    UnsupportedHashAlgorithm(String),

    #[error("Unsupported encryption algorithm: {0}")]
    UnsupportedEncryption(String),

    #[error("Invalid erasure parameters: {0}")]
    InvalidErasureParams(String),

    #[error("Duplicate shard index: {0}")]
    DuplicateShardIndex(usize),

    #[error("Invalid shard index: {index} (total shards: {total})")]
    ShardIndexOutOfRange { index: usize, total: usize },

    #[error("Not enough shards to reconstruct: {declared} declared, {required} required")]
    InsufficientShards { declared: usize, required: usize },

    #[error("Merkle leaf count {leaves} does not match shard count {shards}")]
    LeafCountMismatch { leaves: usize, shards: usize },

    #[error("Invalid {field}: {reason}")]
    InvalidField { field: String, reason: String },
}

impl ManifestError {
    pub(crate) fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ManifestError::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for ManifestError {
    fn from(err: serde_json::Error) -> Self {
        ManifestError::Malformed(err.to_string())
    }
}

/// Failure reported by a shard source
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Shard not found: {0}")]
    NotFound(String),

    #[error("Locator escapes the shard root: {0}")]
    InvalidLocator(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Source error: {0}")]
    Other(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl FetchError {
    /// Wrap an arbitrary source failure, keeping it as the error source
    pub fn other(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        FetchError::Other(err.into())
    }
}

/// Per-shard failure, recorded on the shard record
#[derive(Error, Debug)]
pub enum ShardError {
    #[error("Fetch failed for shard {index}: {source}")]
    Fetch {
        index: usize,
        #[source]
        source: FetchError,
    },

    #[error("Hash mismatch for shard {index}: expected {expected}, got {actual}")]
    HashMismatch {
        index: usize,
        expected: String,
        actual: String,
    },
}

impl ShardError {
    /// Fetch failures may succeed on a later attempt; hash mismatches will not
    pub fn is_retryable(&self) -> bool {
        matches!(self, ShardError::Fetch { .. })
    }
}

/// Merkle integrity violation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MerkleError {
    #[error("Invalid Merkle leaf at position {position}: {reason}")]
    InvalidLeaf { position: usize, reason: String },

    #[error("Merkle leaf {position} does not match the declared shard hash")]
    LeafMismatch { position: usize },

    #[error("Merkle root mismatch: expected {expected}, computed {computed}")]
    RootMismatch { expected: String, computed: String },
}

/// Erasure decoding failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Insufficient shards: have {available}, need {required}")]
    InsufficientShards { available: usize, required: usize },

    #[error("Decoding matrix is singular")]
    SingularMatrix,

    #[error("Shard size mismatch: shard {index} has {actual} bytes, expected {expected}")]
    SizeMismatch {
        index: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Decoded payload too short: {available} bytes available, {declared} declared")]
    PayloadTooShort { available: usize, declared: usize },

    #[error("Invalid erasure parameters: {0}")]
    InvalidParameters(String),

    #[error("Field arithmetic error: {0}")]
    Arithmetic(#[from] ArithmeticError),
}

/// Authenticated decryption failure; no plaintext is ever returned with one
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecryptionError {
    #[error("Decryption key required but not provided")]
    KeyRequired,

    #[error("Authentication failed: tag verification rejected the payload")]
    AuthFailed,

    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("Invalid IV length: expected {expected}, got {actual}")]
    InvalidIv { expected: usize, actual: usize },

    #[error("Payload too short for embedded tag: {0} bytes")]
    PayloadTooShort(usize),

    #[error("Encryption error: {0}")]
    Encryption(String),
}

/// Final integrity check failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IntegrityError {
    #[error("Hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("Reduced integrity guarantee rejected by policy: {}", .0.join("; "))]
    ReducedIntegrity(Vec<String>),
}

/// Attempt-fatal reconstruction error
#[derive(Error, Debug)]
pub enum ReconstructError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Merkle(#[from] MerkleError),

    #[error("Reconstruction infeasible: need {required} valid shards, only {valid} available")]
    Infeasible { valid: usize, required: usize },

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Decryption(#[from] DecryptionError),

    #[error(transparent)]
    Integrity(#[from] IntegrityError),
}

impl ReconstructError {
    /// Pipeline stage the error belongs to
    pub fn stage(&self) -> Stage {
        match self {
            ReconstructError::Manifest(_) => Stage::Manifest,
            ReconstructError::Merkle(_) => Stage::Merkle,
            ReconstructError::Infeasible { .. } => Stage::Recoverability,
            ReconstructError::Decode(_) => Stage::Decode,
            ReconstructError::Decryption(_) => Stage::Decryption,
            ReconstructError::Integrity(_) => Stage::Integrity,
        }
    }
}
