//! Nebula Reconstruction Core
//!
//! Rebuilds an object from distributed, possibly incomplete, possibly
//! corrupted shards, using a self-describing manifest as the only source of
//! truth. This crate provides:
//! - GF(256) arithmetic and systematic Reed-Solomon coding
//! - Manifest parsing, validation and packaging
//! - Per-shard hash verification and Merkle root validation
//! - AES-256-GCM authenticated decryption
//! - Recoverability analysis without decoding
//! - A reconstruction orchestrator producing a serializable report
//!
//! Shard bytes reach the core through a [`ShardSource`]; the crate itself does
//! no network or placement work.
//!
//! ```ignore
//! let manifest = Manifest::parse(&std::fs::read("manifest.json")?)?;
//! let source = Arc::new(DirectorySource::new("shards/"));
//! let result = Reconstructor::new(ReconstructOptions::from_env()?)
//!     .reconstruct(&manifest, &source, None);
//! println!("{}", result.report.to_json()?);
//! ```

pub mod audit;
pub mod config;
pub mod crypto;
pub mod erasure;
pub mod error;
pub mod gf256;
pub mod manifest;
pub mod matrix;
pub mod merkle;
pub mod reconstruct;
pub mod recoverability;
pub mod source;
pub mod verifier;

pub use config::{ConfigError, IntegrityPolicy, ReconstructOptions};
pub use crypto::{decrypt_payload, seal_payload, Digest, EncryptionKey, HashAlgorithm};
pub use erasure::{DecodedPayload, ErasureCodec, ErasureConfig, ShardData};
pub use error::{ReconstructError, Result, Stage};
pub use manifest::{Manifest, ManifestBuilder, ShardRef, MANIFEST_VERSION};
pub use merkle::{compute_root, MerkleCheck};
pub use reconstruct::{
    IntegrityLevel, MerkleOutcome, Reconstruction, ReconstructionReport, Reconstructor,
};
pub use recoverability::{analyze, RecoverabilityReport};
pub use source::{DirectorySource, MemorySource, ShardSource};
pub use verifier::{verify_shards, ShardRecord, ShardStatus};
