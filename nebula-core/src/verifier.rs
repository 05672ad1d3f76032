//! Shard verification
//!
//! Fetches every declared shard through the [`ShardSource`], hashes it with
//! the manifest's algorithm and records the outcome. Shard problems are
//! recorded, never raised: a mismatching or missing shard is tolerated as long
//! as enough others remain.
//!
//! Fetches fan out over a bounded rayon pool and fan back in to one record per
//! declared shard, in index order. With early abort enabled, fetches run as
//! detached pool tasks: once more shards have failed than the code can
//! tolerate, verification returns without waiting for fetches still in flight,
//! tasks that have not started are skipped, and every record without a result
//! stays [`ShardStatus::Unfetched`].

use crate::config::ReconstructOptions;
use crate::crypto::{Digest, HashAlgorithm};
use crate::error::ShardError;
use crate::manifest::{Manifest, ShardRef};
use crate::source::ShardSource;
use bytes::Bytes;
use crossbeam::channel;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Per-shard verification status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShardStatus {
    /// Skipped or abandoned after the failure budget was exhausted
    Unfetched,
    Valid,
    HashMismatch,
    FetchError,
}

/// Outcome of verifying one declared shard
#[derive(Debug)]
pub struct ShardRecord {
    pub index: usize,
    pub declared_hash: Digest,
    /// Fetched bytes; kept for mismatching shards too, never used for decoding
    pub bytes: Option<Bytes>,
    pub computed_hash: Option<Digest>,
    pub status: ShardStatus,
    pub error: Option<ShardError>,
}

impl ShardRecord {
    fn unfetched(shard: &ShardRef) -> Self {
        Self {
            index: shard.index,
            declared_hash: shard.hash,
            bytes: None,
            computed_hash: None,
            status: ShardStatus::Unfetched,
            error: None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.status == ShardStatus::Valid
    }

    pub fn size(&self) -> Option<usize> {
        self.bytes.as_ref().map(|b| b.len())
    }
}

/// Fetch and hash a single shard
pub fn verify_shard<S>(algorithm: HashAlgorithm, source: &S, shard: &ShardRef) -> ShardRecord
where
    S: ShardSource + ?Sized,
{
    let mut record = ShardRecord::unfetched(shard);
    match source.fetch(shard) {
        Ok(bytes) => {
            let computed = algorithm.digest(&bytes);
            if computed == shard.hash {
                record.status = ShardStatus::Valid;
                debug!(index = shard.index, size = bytes.len(), "shard valid");
            } else {
                record.status = ShardStatus::HashMismatch;
                record.error = Some(ShardError::HashMismatch {
                    index: shard.index,
                    expected: shard.hash.to_hex(),
                    actual: computed.to_hex(),
                });
                debug!(index = shard.index, "shard hash mismatch");
            }
            record.computed_hash = Some(computed);
            record.bytes = Some(bytes);
        }
        Err(e) => {
            debug!(index = shard.index, error = %e, "shard fetch failed");
            record.status = ShardStatus::FetchError;
            record.error = Some(ShardError::Fetch {
                index: shard.index,
                source: e,
            });
        }
    }
    record
}

/// Verify every declared shard of `manifest`
///
/// Returns one record per declared shard, ascending by index. The source is
/// shared with the fetch tasks, which may outlive this call when early abort
/// cuts verification short.
#[instrument(skip(manifest, source, options), fields(shards = manifest.shards().len()))]
pub fn verify_shards<S>(
    manifest: &Manifest,
    source: &Arc<S>,
    options: &ReconstructOptions,
) -> Vec<ShardRecord>
where
    S: ShardSource + ?Sized + 'static,
{
    let algorithm = manifest.hash_algorithm();
    let shards = manifest.shards();
    let tolerable = shards.len().saturating_sub(manifest.data_shards());

    let pool = ThreadPoolBuilder::new()
        .num_threads(options.max_parallel_fetches)
        .thread_name(|i| format!("shard-fetch-{i}"))
        .build();
    let records = match pool {
        Ok(pool) if options.early_abort => {
            verify_detached(algorithm, shards, source, &pool, tolerable)
        }
        Ok(pool) => pool.install(|| {
            shards
                .par_iter()
                .map(|shard| verify_shard(algorithm, &**source, shard))
                .collect()
        }),
        Err(e) => {
            warn!(error = %e, "fetch pool unavailable, verifying sequentially");
            let budget = options.early_abort.then_some(tolerable);
            verify_sequential(algorithm, shards, &**source, budget)
        }
    };

    let valid = records.iter().filter(|r| r.is_valid()).count();
    info!(
        valid,
        declared = records.len(),
        required = manifest.data_shards(),
        "shard verification complete"
    );
    records
}

/// Fan out detached fetch tasks and stop listening once the failure budget
/// is exceeded
fn verify_detached<S>(
    algorithm: HashAlgorithm,
    shards: &[ShardRef],
    source: &Arc<S>,
    pool: &ThreadPool,
    tolerable: usize,
) -> Vec<ShardRecord>
where
    S: ShardSource + ?Sized + 'static,
{
    let abort = Arc::new(AtomicBool::new(false));
    let (tx, rx) = channel::unbounded();

    for (position, shard) in shards.iter().enumerate() {
        let shard = shard.clone();
        let source = Arc::clone(source);
        let abort = Arc::clone(&abort);
        let tx = tx.clone();
        pool.spawn(move || {
            if abort.load(Ordering::Acquire) {
                return;
            }
            let record = verify_shard(algorithm, &*source, &shard);
            // the receiver is gone once verification has returned
            let _ = tx.send((position, record));
        });
    }
    drop(tx);

    let mut records: Vec<ShardRecord> = shards.iter().map(ShardRecord::unfetched).collect();
    let mut failed = 0;
    for (position, record) in rx.iter() {
        if !record.is_valid() {
            failed += 1;
        }
        records[position] = record;
        if failed > tolerable {
            abort.store(true, Ordering::Release);
            warn!(
                failed,
                tolerable, "too many shard failures, abandoning outstanding fetches"
            );
            break;
        }
    }
    records
}

/// In-order verification on the calling thread
fn verify_sequential<S>(
    algorithm: HashAlgorithm,
    shards: &[ShardRef],
    source: &S,
    budget: Option<usize>,
) -> Vec<ShardRecord>
where
    S: ShardSource + ?Sized,
{
    let mut failed = 0;
    shards
        .iter()
        .map(|shard| {
            if budget.is_some_and(|tolerable| failed > tolerable) {
                return ShardRecord::unfetched(shard);
            }
            let record = verify_shard(algorithm, source, shard);
            if !record.is_valid() {
                failed += 1;
            }
            record
        })
        .collect()
}
