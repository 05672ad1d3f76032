//! Merkle root validation
//!
//! Binary tree over the hex shard hashes: leaves are paired left to right, an
//! odd layer duplicates its last node, and each parent is `H(left || right)`
//! over the raw digest bytes.

use crate::crypto::HashAlgorithm;
use crate::error::MerkleError;
use crate::manifest::Manifest;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Outcome of Merkle validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MerkleCheck {
    /// Recomputed root equals the committed one
    Verified,
    /// Manifest carries no Merkle block
    NotDeclared,
}

/// Merkle root with SHA-256, as hex. Empty input yields `""`.
pub fn compute_root(leaf_hashes: &[String]) -> Result<String, MerkleError> {
    compute_root_with(HashAlgorithm::Sha256, leaf_hashes)
}

/// Merkle root with the given algorithm, as lowercase hex
///
/// A single leaf is returned unchanged once it has been checked to be hex.
pub fn compute_root_with(
    algorithm: HashAlgorithm,
    leaf_hashes: &[String],
) -> Result<String, MerkleError> {
    let mut layer = leaf_hashes
        .iter()
        .enumerate()
        .map(|(position, leaf)| {
            hex::decode(leaf).map_err(|e| MerkleError::InvalidLeaf {
                position,
                reason: e.to_string(),
            })
        })
        .collect::<Result<Vec<Vec<u8>>, _>>()?;

    match leaf_hashes {
        [] => return Ok(String::new()),
        [only] => return Ok(only.clone()),
        _ => {}
    }

    while layer.len() > 1 {
        if layer.len() % 2 == 1 {
            if let Some(last) = layer.last().cloned() {
                layer.push(last);
            }
        }
        layer = layer
            .chunks_exact(2)
            .map(|pair| algorithm.digest_pair(&pair[0], &pair[1]).as_bytes().to_vec())
            .collect();
    }

    Ok(hex::encode(&layer[0]))
}

/// Validate the manifest's Merkle block against its shard set
///
/// Each leaf must equal the declared hash of the shard at the same position,
/// and the recomputed root must equal the committed root.
pub fn verify(manifest: &Manifest) -> Result<MerkleCheck, MerkleError> {
    let Some(block) = manifest.merkle() else {
        debug!("no merkle block declared");
        return Ok(MerkleCheck::NotDeclared);
    };

    for (position, (leaf, shard)) in block.leaf_hashes.iter().zip(manifest.shards()).enumerate() {
        if !leaf.eq_ignore_ascii_case(&shard.hash.to_hex()) {
            return Err(MerkleError::LeafMismatch { position });
        }
    }

    let computed = compute_root_with(block.algorithm, &block.leaf_hashes)?;
    if !computed.eq_ignore_ascii_case(&block.root) {
        return Err(MerkleError::RootMismatch {
            expected: block.root.clone(),
            computed,
        });
    }

    debug!(root = %computed, leaves = block.leaf_hashes.len(), "merkle root verified");
    Ok(MerkleCheck::Verified)
}
