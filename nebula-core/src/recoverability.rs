//! Recoverability analysis
//!
//! Answers "can this object be rebuilt?" from shard indices alone, without
//! touching shard bytes or running the decoder.

use crate::manifest::Manifest;
use crate::verifier::{ShardRecord, ShardStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Feasibility of reconstructing from a set of valid shards
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoverabilityReport {
    pub feasible: bool,
    pub k: usize,
    pub n: usize,
    pub valid_count: usize,
    /// Indices in `[0, n)` without a valid shard, ascending
    pub missing_indices: Vec<usize>,
    /// `valid_count - k`; negative means infeasible
    pub redundancy_margin: isize,
    /// Every data shard `0..k` is valid
    pub fast_path: bool,
}

impl RecoverabilityReport {
    pub fn missing_count(&self) -> usize {
        self.missing_indices.len()
    }

    /// Additional valid shards required, zero when feasible
    pub fn shards_needed(&self) -> usize {
        self.k.saturating_sub(self.valid_count)
    }

    pub fn message(&self) -> String {
        if self.feasible {
            "Reconstruction possible".to_string()
        } else {
            format!("Need {} more shard(s)", self.shards_needed())
        }
    }
}

/// Analyze a set of valid shard indices for a (k, n) code
///
/// Indices outside `[0, n)` are ignored.
pub fn analyze(valid_indices: &BTreeSet<usize>, k: usize, n: usize) -> RecoverabilityReport {
    let valid_count = valid_indices.range(..n).count();
    let missing_indices: Vec<usize> = (0..n).filter(|i| !valid_indices.contains(i)).collect();
    let fast_path = (0..k).all(|i| valid_indices.contains(&i));

    RecoverabilityReport {
        feasible: valid_count >= k,
        k,
        n,
        valid_count,
        missing_indices,
        redundancy_margin: valid_count as isize - k as isize,
        fast_path,
    }
}

/// Theoretical report over the manifest's declared shards
pub fn analyze_declared(manifest: &Manifest) -> RecoverabilityReport {
    let declared: BTreeSet<usize> = manifest.shards().iter().map(|s| s.index).collect();
    analyze(&declared, manifest.data_shards(), manifest.total_shards())
}

/// Report over verifier output, counting only `Valid` records
pub fn analyze_records(records: &[ShardRecord], k: usize, n: usize) -> RecoverabilityReport {
    let valid: BTreeSet<usize> = records
        .iter()
        .filter(|r| r.status == ShardStatus::Valid)
        .map(|r| r.index)
        .collect();
    analyze(&valid, k, n)
}
