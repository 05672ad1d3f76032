//! Reed-Solomon Erasure Coding over GF(256)
//!
//! Systematic (k, m) code where:
//! - shards `0..k` are the zero-padded object split into k equal chunks
//! - shards `k..k+m` are parity rows of the encoding matrix
//! - any k of the k+m shards recover the object
//!
//! The encoding matrix is `V * inv(V[0..k])` with `V[r][c] = r^c`, so its top
//! k rows are the identity. Decoding picks k valid shards, inverts the matching
//! k x k sub-matrix and multiplies it with the chosen chunks.

use crate::error::DecodeError;
use crate::gf256;
use crate::matrix::Matrix;
use crate::verifier::{ShardRecord, ShardStatus};
use bytes::Bytes;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Largest shard count a GF(256) Vandermonde matrix supports
pub const MAX_TOTAL_SHARDS: usize = 256;

/// Chunk length from which recovery rows are computed in parallel
pub const DEFAULT_PARALLEL_DECODE_THRESHOLD: usize = 64 * 1024;

/// Erasure coding configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErasureConfig {
    /// Number of data shards (k)
    pub data_shards: usize,
    /// Number of parity shards (m)
    pub parity_shards: usize,
}

impl ErasureConfig {
    /// Create a new erasure config
    pub fn new(data_shards: usize, parity_shards: usize) -> Result<Self, DecodeError> {
        if data_shards == 0 {
            return Err(DecodeError::InvalidParameters(
                "data_shards must be > 0".to_string(),
            ));
        }
        let total = data_shards.checked_add(parity_shards).ok_or_else(|| {
            DecodeError::InvalidParameters("shard count overflows usize".to_string())
        })?;
        if total > MAX_TOTAL_SHARDS {
            return Err(DecodeError::InvalidParameters(format!(
                "total shards {} exceeds {}",
                total, MAX_TOTAL_SHARDS
            )));
        }
        Ok(Self {
            data_shards,
            parity_shards,
        })
    }

    /// Total number of shards
    pub fn total_shards(&self) -> usize {
        self.data_shards + self.parity_shards
    }

    /// Chunk length for an object of `data_size` bytes
    pub fn shard_size(&self, data_size: usize) -> usize {
        data_size.div_ceil(self.data_shards)
    }
}

/// A single shard of erasure-coded data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardData {
    /// Shard index (0 to total_shards-1)
    pub index: usize,
    /// Shard data
    pub data: Bytes,
    /// Whether this is a parity shard
    pub is_parity: bool,
}

impl ShardData {
    pub fn new(index: usize, data: Bytes, is_parity: bool) -> Self {
        Self {
            index,
            data,
            is_parity,
        }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// Progress of a single decode pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeState {
    Idle,
    MatrixBuilt,
    Inverted,
    Recovered,
    Failed,
}

impl fmt::Display for DecodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DecodeState::Idle => "idle",
            DecodeState::MatrixBuilt => "matrix_built",
            DecodeState::Inverted => "inverted",
            DecodeState::Recovered => "recovered",
            DecodeState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Output of a successful decode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPayload {
    /// Recovered object, truncated to the declared size
    pub data: Bytes,
    /// Shard indices the decoder consumed, ascending
    pub shards_used: Vec<usize>,
    /// True when the data shards were concatenated without matrix work
    pub fast_path: bool,
}

/// Reed-Solomon encoder/decoder
#[derive(Debug, Clone)]
pub struct ErasureCodec {
    config: ErasureConfig,
    matrix: Matrix,
    parallel_threshold: usize,
}

impl ErasureCodec {
    /// Build the systematic encoding matrix for `config`
    pub fn new(config: ErasureConfig) -> Result<Self, DecodeError> {
        let config = ErasureConfig::new(config.data_shards, config.parity_shards)?;
        let k = config.data_shards;
        let vandermonde = Matrix::vandermonde(config.total_shards(), k);
        let top: Vec<usize> = (0..k).collect();
        let top_inverse = vandermonde.select_rows(&top).invert()?;
        Ok(Self {
            config,
            matrix: vandermonde.multiply(&top_inverse),
            parallel_threshold: DEFAULT_PARALLEL_DECODE_THRESHOLD,
        })
    }

    /// Shorthand for `new(ErasureConfig::new(k, m)?)`
    pub fn with_shards(data_shards: usize, parity_shards: usize) -> Result<Self, DecodeError> {
        Self::new(ErasureConfig::new(data_shards, parity_shards)?)
    }

    /// Chunk length from which decode rows run on the rayon pool
    pub fn with_parallel_threshold(mut self, threshold: usize) -> Self {
        self.parallel_threshold = threshold;
        self
    }

    pub fn config(&self) -> &ErasureConfig {
        &self.config
    }

    /// The n x k encoding matrix
    pub fn encoding_matrix(&self) -> &Matrix {
        &self.matrix
    }

    fn split(&self, data: &[u8]) -> (usize, Vec<u8>) {
        let shard_size = self.config.shard_size(data.len());
        let mut padded = data.to_vec();
        padded.resize(shard_size * self.config.data_shards, 0);
        (shard_size, padded)
    }

    fn parity_row(&self, row: usize, chunks: &[&[u8]], shard_size: usize) -> Vec<u8> {
        let mut out = vec![0u8; shard_size];
        combine(self.matrix.row(row), chunks, &mut out);
        out
    }

    fn assemble(&self, padded: Vec<u8>, shard_size: usize, parity: Vec<Vec<u8>>) -> Vec<ShardData> {
        let padded = Bytes::from(padded);
        let mut shards = Vec::with_capacity(self.config.total_shards());
        for i in 0..self.config.data_shards {
            let chunk = padded.slice(i * shard_size..(i + 1) * shard_size);
            shards.push(ShardData::new(i, chunk, false));
        }
        for (j, p) in parity.into_iter().enumerate() {
            shards.push(ShardData::new(self.config.data_shards + j, Bytes::from(p), true));
        }
        shards
    }

    /// Encode data into shards
    ///
    /// Returns a vector of shards (data + parity)
    pub fn encode(&self, data: &[u8]) -> Vec<ShardData> {
        let (shard_size, padded) = self.split(data);
        let chunks = chunk_refs(&padded, shard_size, self.config.data_shards);
        let parity: Vec<Vec<u8>> = (self.config.data_shards..self.config.total_shards())
            .map(|row| self.parity_row(row, &chunks, shard_size))
            .collect();
        self.assemble(padded, shard_size, parity)
    }

    /// Encode data into shards, computing parity rows in parallel
    ///
    /// More efficient for large objects (> 1MB)
    pub fn encode_parallel(&self, data: &[u8]) -> Vec<ShardData> {
        let (shard_size, padded) = self.split(data);
        let chunks = chunk_refs(&padded, shard_size, self.config.data_shards);
        let parity: Vec<Vec<u8>> = (self.config.data_shards..self.config.total_shards())
            .into_par_iter()
            .map(|row| self.parity_row(row, &chunks, shard_size))
            .collect();
        self.assemble(padded, shard_size, parity)
    }

    /// Check that the parity shards match the data shards
    pub fn verify_parity(&self, shards: &[ShardData]) -> bool {
        if shards.len() != self.config.total_shards() {
            return false;
        }
        let shard_size = shards.first().map(|s| s.size()).unwrap_or(0);
        if !shards.iter().all(|s| s.size() == shard_size) {
            return false;
        }
        let chunks: Vec<&[u8]> = shards[..self.config.data_shards]
            .iter()
            .map(|s| s.data.as_ref())
            .collect();
        shards[self.config.data_shards..]
            .iter()
            .enumerate()
            .all(|(j, parity)| {
                self.parity_row(self.config.data_shards + j, &chunks, shard_size) == parity.data
            })
    }

    /// Recover the object from any k shards
    ///
    /// `shards` maps shard index to chunk bytes. When every data shard is
    /// present the chunks are concatenated directly; otherwise the first k
    /// indices (ascending) are decoded through the inverted sub-matrix.
    pub fn decode(
        &self,
        shards: &BTreeMap<usize, &[u8]>,
        original_size: usize,
    ) -> Result<DecodedPayload, DecodeError> {
        self.run(shards, original_size, true)
    }

    /// Like [`decode`](Self::decode) but always takes the matrix path
    pub fn decode_with_matrix(
        &self,
        shards: &BTreeMap<usize, &[u8]>,
        original_size: usize,
    ) -> Result<DecodedPayload, DecodeError> {
        self.run(shards, original_size, false)
    }

    /// Decode from verifier output, using only `Valid` records
    pub fn decode_records(
        &self,
        records: &[ShardRecord],
        original_size: usize,
    ) -> Result<DecodedPayload, DecodeError> {
        let shards: BTreeMap<usize, &[u8]> = records
            .iter()
            .filter(|r| r.status == ShardStatus::Valid)
            .filter_map(|r| r.bytes.as_ref().map(|b| (r.index, b.as_ref())))
            .collect();
        self.decode(&shards, original_size)
    }

    fn run(
        &self,
        shards: &BTreeMap<usize, &[u8]>,
        original_size: usize,
        allow_fast_path: bool,
    ) -> Result<DecodedPayload, DecodeError> {
        let mut state = DecodeState::Idle;
        let result = self.decode_inner(shards, original_size, allow_fast_path, &mut state);
        if let Err(ref e) = result {
            transition(&mut state, DecodeState::Failed);
            debug!(error = %e, "decode failed");
        }
        result
    }

    fn decode_inner(
        &self,
        shards: &BTreeMap<usize, &[u8]>,
        original_size: usize,
        allow_fast_path: bool,
        state: &mut DecodeState,
    ) -> Result<DecodedPayload, DecodeError> {
        let k = self.config.data_shards;
        let n = self.config.total_shards();

        if let Some(&index) = shards.keys().find(|&&i| i >= n) {
            return Err(DecodeError::InvalidParameters(format!(
                "shard index {index} out of range for {n} shards"
            )));
        }
        if shards.len() < k {
            return Err(DecodeError::InsufficientShards {
                available: shards.len(),
                required: k,
            });
        }

        let fast_path = allow_fast_path && (0..k).all(|i| shards.contains_key(&i));
        let chosen: Vec<(usize, &[u8])> = if fast_path {
            (0..k).filter_map(|i| shards.get(&i).map(|s| (i, *s))).collect()
        } else {
            shards.iter().take(k).map(|(&i, &s)| (i, s)).collect()
        };

        let chunk_len = chosen[0].1.len();
        for &(index, chunk) in &chosen {
            if chunk.len() != chunk_len {
                return Err(DecodeError::SizeMismatch {
                    index,
                    expected: chunk_len,
                    actual: chunk.len(),
                });
            }
        }
        if chunk_len * k < original_size {
            return Err(DecodeError::PayloadTooShort {
                available: chunk_len * k,
                declared: original_size,
            });
        }

        let shards_used: Vec<usize> = chosen.iter().map(|(i, _)| *i).collect();
        let mut output = Vec::with_capacity(chunk_len * k);

        if fast_path {
            for (_, chunk) in &chosen {
                output.extend_from_slice(chunk);
            }
        } else {
            let sub = self.matrix.select_rows(&shards_used);
            transition(state, DecodeState::MatrixBuilt);
            let inverse = sub.invert()?;
            transition(state, DecodeState::Inverted);

            let inputs: Vec<&[u8]> = chosen.iter().map(|(_, c)| *c).collect();
            let recover = |row: usize| {
                let mut out = vec![0u8; chunk_len];
                combine(inverse.row(row), &inputs, &mut out);
                out
            };
            let rows: Vec<Vec<u8>> = if chunk_len >= self.parallel_threshold {
                (0..k).into_par_iter().map(recover).collect()
            } else {
                (0..k).map(recover).collect()
            };
            for row in rows {
                output.extend_from_slice(&row);
            }
        }

        output.truncate(original_size);
        transition(state, DecodeState::Recovered);
        debug!(
            fast_path,
            shards_used = ?shards_used,
            size = output.len(),
            "decode complete"
        );

        Ok(DecodedPayload {
            data: Bytes::from(output),
            shards_used,
            fast_path,
        })
    }
}

fn transition(state: &mut DecodeState, next: DecodeState) {
    debug!(from = %state, to = %next, "decoder state");
    *state = next;
}

fn chunk_refs(padded: &[u8], shard_size: usize, count: usize) -> Vec<&[u8]> {
    (0..count)
        .map(|i| &padded[i * shard_size..(i + 1) * shard_size])
        .collect()
}

/// `out = sum(coeffs[j] * inputs[j])`
fn combine(coeffs: &[u8], inputs: &[&[u8]], out: &mut [u8]) {
    for (&c, input) in coeffs.iter().zip(inputs) {
        gf256::mul_slice_xor(c, input, out);
    }
}
