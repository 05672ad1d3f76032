//! Reconstruction manifest
//!
//! The manifest is the single source of truth for a reconstruction attempt:
//! erasure parameters, per-shard hashes, the optional Merkle commitment and
//! the optional encryption parameters. Parsing validates everything up front
//! and yields a closed [`Manifest`] value; nothing downstream re-checks shape.
//!
//! JSON layout:
//!
//! ```json
//! {
//!   "version": "nebula_reconstruct_v1",
//!   "hash_algorithm": "sha256",
//!   "original_size_bytes": 39,
//!   "original_hash": "…",
//!   "rs": { "data_shards": 3, "parity_shards": 2, "total_shards": 5 },
//!   "shards": [ { "index": 0, "hash": "…", "size_bytes": 13, "path": "shard-0.bin" } ],
//!   "merkle": { "algorithm": "sha256", "root": "…", "leaf_hashes": ["…"] },
//!   "encryption": { "algorithm": "aes-256-gcm", "iv": "…", "tag": "…" }
//! }
//! ```

use crate::crypto::{
    self, Digest, EncryptionAlgorithm, EncryptionKey, EncryptionParams, HashAlgorithm,
    NONCE_SIZE, TAG_SIZE,
};
use crate::erasure::{ErasureCodec, ErasureConfig, ShardData, MAX_TOTAL_SHARDS};
use crate::error::{ManifestError, Result};
use crate::merkle;
use crate::source::shard_file_name;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;

/// The only manifest version this crate understands
pub const MANIFEST_VERSION: &str = "nebula_reconstruct_v1";

/// Reed-Solomon parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RsParams {
    pub data_shards: usize,
    pub parity_shards: usize,
    pub total_shards: usize,
}

impl RsParams {
    pub fn erasure_config(&self) -> ErasureConfig {
        ErasureConfig {
            data_shards: self.data_shards,
            parity_shards: self.parity_shards,
        }
    }
}

/// One declared shard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardRef {
    pub index: usize,
    pub hash: Digest,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    /// Opaque hint for the shard source (a relative path for directory sources)
    #[serde(default, alias = "path", skip_serializing_if = "Option::is_none")]
    pub locator: Option<String>,
}

/// Merkle commitment over the shard hashes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleBlock {
    pub algorithm: HashAlgorithm,
    pub root: String,
    /// Hex leaves in shard index order; validated by the Merkle validator
    pub leaf_hashes: Vec<String>,
}

/// Validated reconstruction manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    version: String,
    hash_algorithm: HashAlgorithm,
    original_size: usize,
    original_hash: Option<Digest>,
    rs: RsParams,
    shards: Vec<ShardRef>,
    merkle: Option<MerkleBlock>,
    encryption: Option<EncryptionParams>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RawManifest {
    version: String,
    hash_algorithm: String,
    original_size_bytes: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    original_hash: Option<String>,
    rs: RsParams,
    shards: Vec<RawShard>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    merkle: Option<RawMerkle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    encryption: Option<RawEncryption>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RawShard {
    index: usize,
    hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    size_bytes: Option<u64>,
    #[serde(default, alias = "path", skip_serializing_if = "Option::is_none")]
    locator: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RawMerkle {
    #[serde(default = "default_hash_algorithm")]
    algorithm: String,
    root: String,
    #[serde(default)]
    leaf_hashes: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RawEncryption {
    algorithm: String,
    iv: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tag: Option<String>,
}

fn default_hash_algorithm() -> String {
    HashAlgorithm::Sha256.as_str().to_string()
}

fn decode_fixed<const N: usize>(field: &str, value: &str) -> std::result::Result<[u8; N], ManifestError> {
    let bytes = hex::decode(value)
        .map_err(|e| ManifestError::invalid_field(field, format!("not valid hex: {e}")))?;
    bytes.as_slice().try_into().map_err(|_| {
        ManifestError::invalid_field(field, format!("expected {N} bytes, got {}", bytes.len()))
    })
}

fn parse_digest(field: &str, value: &str) -> std::result::Result<Digest, ManifestError> {
    decode_fixed(field, value).map(Digest::from_bytes)
}

impl Manifest {
    /// Parse and validate a JSON manifest
    pub fn parse(raw: &[u8]) -> std::result::Result<Self, ManifestError> {
        let raw: RawManifest = serde_json::from_slice(raw)?;
        Self::validate(raw)
    }

    fn validate(raw: RawManifest) -> std::result::Result<Self, ManifestError> {
        if raw.version != MANIFEST_VERSION {
            return Err(ManifestError::UnsupportedVersion(raw.version));
        }
        let hash_algorithm = HashAlgorithm::from_str(&raw.hash_algorithm)?;

        let rs = raw.rs;
        if rs.data_shards == 0 {
            return Err(ManifestError::InvalidErasureParams(
                "data_shards must be > 0".to_string(),
            ));
        }
        let sum = rs.data_shards.checked_add(rs.parity_shards).ok_or_else(|| {
            ManifestError::InvalidErasureParams(
                "data_shards + parity_shards overflows".to_string(),
            )
        })?;
        if sum != rs.total_shards {
            return Err(ManifestError::InvalidErasureParams(format!(
                "total_shards {} != data_shards {} + parity_shards {}",
                rs.total_shards, rs.data_shards, rs.parity_shards
            )));
        }
        if rs.total_shards > MAX_TOTAL_SHARDS {
            return Err(ManifestError::InvalidErasureParams(format!(
                "total_shards {} exceeds {}",
                rs.total_shards, MAX_TOTAL_SHARDS
            )));
        }

        let mut seen = BTreeSet::new();
        let mut shards = Vec::with_capacity(raw.shards.len());
        for (pos, shard) in raw.shards.into_iter().enumerate() {
            if shard.index >= rs.total_shards {
                return Err(ManifestError::ShardIndexOutOfRange {
                    index: shard.index,
                    total: rs.total_shards,
                });
            }
            if !seen.insert(shard.index) {
                return Err(ManifestError::DuplicateShardIndex(shard.index));
            }
            shards.push(ShardRef {
                index: shard.index,
                hash: parse_digest(&format!("shards[{pos}].hash"), &shard.hash)?,
                size_bytes: shard.size_bytes,
                locator: shard.locator,
            });
        }
        if shards.len() < rs.data_shards {
            return Err(ManifestError::InsufficientShards {
                declared: shards.len(),
                required: rs.data_shards,
            });
        }
        shards.sort_by_key(|s| s.index);

        let merkle = match raw.merkle {
            Some(m) => {
                if m.leaf_hashes.len() != shards.len() {
                    return Err(ManifestError::LeafCountMismatch {
                        leaves: m.leaf_hashes.len(),
                        shards: shards.len(),
                    });
                }
                Some(MerkleBlock {
                    algorithm: HashAlgorithm::from_str(&m.algorithm)?,
                    root: m.root,
                    leaf_hashes: m.leaf_hashes,
                })
            }
            None => None,
        };

        let encryption = match raw.encryption {
            Some(e) => Some(EncryptionParams {
                algorithm: EncryptionAlgorithm::from_str(&e.algorithm)?,
                iv: decode_fixed::<NONCE_SIZE>("encryption.iv", &e.iv)?,
                tag: e
                    .tag
                    .as_deref()
                    .map(|t| decode_fixed::<TAG_SIZE>("encryption.tag", t))
                    .transpose()?,
            }),
            None => None,
        };

        let original_hash = raw
            .original_hash
            .as_deref()
            .map(|h| parse_digest("original_hash", h))
            .transpose()?;

        Ok(Self {
            version: raw.version,
            hash_algorithm,
            original_size: raw.original_size_bytes,
            original_hash,
            rs,
            shards,
            merkle,
            encryption,
        })
    }

    /// Serialize back to the JSON layout accepted by [`Manifest::parse`]
    pub fn to_json(&self) -> std::result::Result<String, ManifestError> {
        let raw = RawManifest {
            version: self.version.clone(),
            hash_algorithm: self.hash_algorithm.as_str().to_string(),
            original_size_bytes: self.original_size,
            original_hash: self.original_hash.map(|h| h.to_hex()),
            rs: self.rs,
            shards: self
                .shards
                .iter()
                .map(|s| RawShard {
                    index: s.index,
                    hash: s.hash.to_hex(),
                    size_bytes: s.size_bytes,
                    locator: s.locator.clone(),
                })
                .collect(),
            merkle: self.merkle.as_ref().map(|m| RawMerkle {
                algorithm: m.algorithm.as_str().to_string(),
                root: m.root.clone(),
                leaf_hashes: m.leaf_hashes.clone(),
            }),
            encryption: self.encryption.as_ref().map(|e| RawEncryption {
                algorithm: e.algorithm.as_str().to_string(),
                iv: hex::encode(e.iv),
                tag: e.tag.map(hex::encode),
            }),
        };
        Ok(serde_json::to_string_pretty(&raw)?)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn hash_algorithm(&self) -> HashAlgorithm {
        self.hash_algorithm
    }

    /// Size of the erasure-coded payload (ciphertext when encrypted)
    pub fn original_size(&self) -> usize {
        self.original_size
    }

    /// Digest of the final plaintext, if declared
    pub fn original_hash(&self) -> Option<&Digest> {
        self.original_hash.as_ref()
    }

    pub fn rs(&self) -> &RsParams {
        &self.rs
    }

    pub fn data_shards(&self) -> usize {
        self.rs.data_shards
    }

    pub fn total_shards(&self) -> usize {
        self.rs.total_shards
    }

    /// Declared shards, ascending by index
    pub fn shards(&self) -> &[ShardRef] {
        &self.shards
    }

    pub fn shard(&self, index: usize) -> Option<&ShardRef> {
        self.shards
            .binary_search_by_key(&index, |s| s.index)
            .ok()
            .map(|pos| &self.shards[pos])
    }

    pub fn merkle(&self) -> Option<&MerkleBlock> {
        self.merkle.as_ref()
    }

    pub fn encryption(&self) -> Option<&EncryptionParams> {
        self.encryption.as_ref()
    }
}

impl FromStr for Manifest {
    type Err = ManifestError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s.as_bytes())
    }
}

/// Packages an object into shards plus the manifest describing them
///
/// ```ignore
/// let (manifest, shards) = ManifestBuilder::new(3, 2)
///     .encrypt(&key, false)
///     .with_locators()
///     .build(b"payload")?;
/// ```
pub struct ManifestBuilder {
    data_shards: usize,
    parity_shards: usize,
    hash_algorithm: HashAlgorithm,
    encryption: Option<(EncryptionKey, bool)>,
    iv: Option<[u8; NONCE_SIZE]>,
    merkle: bool,
    original_hash: bool,
    locators: bool,
}

impl ManifestBuilder {
    pub fn new(data_shards: usize, parity_shards: usize) -> Self {
        Self {
            data_shards,
            parity_shards,
            hash_algorithm: HashAlgorithm::Sha256,
            encryption: None,
            iv: None,
            merkle: true,
            original_hash: true,
            locators: false,
        }
    }

    pub fn hash_algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        self.hash_algorithm = algorithm;
        self
    }

    /// Encrypt with AES-256-GCM; `detach_tag` moves the tag into the manifest
    pub fn encrypt(mut self, key: &EncryptionKey, detach_tag: bool) -> Self {
        self.encryption = Some((key.clone(), detach_tag));
        self
    }

    /// Fixed IV instead of a random one
    pub fn iv(mut self, iv: [u8; NONCE_SIZE]) -> Self {
        self.iv = Some(iv);
        self
    }

    pub fn without_merkle(mut self) -> Self {
        self.merkle = false;
        self
    }

    pub fn without_original_hash(mut self) -> Self {
        self.original_hash = false;
        self
    }

    /// Record `shard-{index}.bin` as each shard's locator
    pub fn with_locators(mut self) -> Self {
        self.locators = true;
        self
    }

    /// Seal `data` into a manifest and its shards
    pub fn build(self, data: &[u8]) -> Result<(Manifest, Vec<ShardData>)> {
        let codec = ErasureCodec::with_shards(self.data_shards, self.parity_shards)?;

        let original_hash = self
            .original_hash
            .then(|| self.hash_algorithm.digest_parallel(data));

        let (payload, encryption) = match &self.encryption {
            Some((key, detach_tag)) => {
                let iv = self.iv.unwrap_or_else(crypto::generate_iv);
                let (ciphertext, tag) = crypto::seal_payload(data, key, &iv, *detach_tag)?;
                let params = EncryptionParams {
                    algorithm: EncryptionAlgorithm::Aes256Gcm,
                    iv,
                    tag,
                };
                (ciphertext, Some(params))
            }
            None => (data.to_vec(), None),
        };

        let shards = codec.encode_parallel(&payload);
        let shard_refs: Vec<ShardRef> = shards
            .iter()
            .map(|s| ShardRef {
                index: s.index,
                hash: self.hash_algorithm.digest(&s.data),
                size_bytes: Some(s.size() as u64),
                locator: self.locators.then(|| shard_file_name(s.index)),
            })
            .collect();

        let merkle = if self.merkle {
            let leaf_hashes: Vec<String> = shard_refs.iter().map(|s| s.hash.to_hex()).collect();
            let root = merkle::compute_root_with(self.hash_algorithm, &leaf_hashes)?;
            Some(MerkleBlock {
                algorithm: self.hash_algorithm,
                root,
                leaf_hashes,
            })
        } else {
            None
        };

        let config = codec.config();
        let manifest = Manifest {
            version: MANIFEST_VERSION.to_string(),
            hash_algorithm: self.hash_algorithm,
            original_size: payload.len(),
            original_hash,
            rs: RsParams {
                data_shards: config.data_shards,
                parity_shards: config.parity_shards,
                total_shards: config.total_shards(),
            },
            shards: shard_refs,
            merkle,
            encryption,
        };
        Ok((manifest, shards))
    }
}
