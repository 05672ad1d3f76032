//! Reconstruction orchestrator
//!
//! Runs one reconstruction attempt end to end:
//!
//! 1. verify every declared shard through the source
//! 2. validate the Merkle commitment, when declared
//! 3. reject early if fewer than k shards are valid
//! 4. erasure-decode from k valid shards
//! 5. decrypt, when the manifest declares encryption
//! 6. hash the plaintext and compare it with the declared original hash
//!
//! The first failing stage ends the attempt. Whatever happens, the caller gets
//! a [`ReconstructionReport`]; recovered bytes are only handed out on success.

use crate::audit;
use crate::config::{IntegrityPolicy, ReconstructOptions};
use crate::crypto::{decrypt_payload, EncryptionKey, HashAlgorithm};
use crate::erasure::ErasureCodec;
use crate::error::{IntegrityError, ReconstructError, Result, Stage};
use crate::manifest::Manifest;
use crate::merkle::{self, MerkleCheck};
use crate::recoverability::{analyze_records, RecoverabilityReport};
use crate::source::ShardSource;
use crate::verifier::{verify_shards, ShardRecord, ShardStatus};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, info_span, warn};
use uuid::Uuid;

/// Merkle validation outcome as reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MerkleOutcome {
    /// The attempt ended before Merkle validation
    NotChecked,
    NotDeclared,
    Verified,
    Failed,
}

/// Strength of the guarantee behind a successful reconstruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrityLevel {
    /// Merkle root and final hash both verified
    Full,
    /// At least one check was unavailable or disabled
    Reduced,
}

/// Terminal failure of an attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureDetail {
    pub stage: Stage,
    pub reason: String,
}

/// Per-shard line of the report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShardSummary {
    pub index: usize,
    pub status: ShardStatus,
    pub declared_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub computed_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&ShardRecord> for ShardSummary {
    fn from(record: &ShardRecord) -> Self {
        Self {
            index: record.index,
            status: record.status,
            declared_hash: record.declared_hash.to_hex(),
            computed_hash: record.computed_hash.map(|h| h.to_hex()),
            size_bytes: record.size(),
            error: record.error.as_ref().map(|e| e.to_string()),
        }
    }
}

/// Terminal artifact of a reconstruction attempt
#[derive(Debug, Clone, Serialize)]
pub struct ReconstructionReport {
    pub attempt_id: Uuid,
    pub completed_at: DateTime<Utc>,
    pub success: bool,

    pub manifest_version: Option<String>,
    pub hash_algorithm: Option<HashAlgorithm>,
    /// Declared size of the erasure-coded payload
    pub original_size: Option<usize>,
    /// Size of the decoded payload
    pub reconstructed_size: Option<usize>,
    /// Size after decryption
    pub plaintext_size: Option<usize>,
    pub original_hash: Option<String>,
    pub reconstructed_hash: Option<String>,
    pub hash_verified: bool,
    pub decrypted: bool,

    pub merkle: MerkleOutcome,
    pub integrity: Option<IntegrityLevel>,
    pub warnings: Vec<String>,

    pub shards_required: usize,
    pub shards_declared: usize,
    /// Shards whose bytes were fetched, valid or not
    pub shards_available: usize,
    pub shards_valid: usize,
    pub shard_details: Vec<ShardSummary>,
    pub recoverability: Option<RecoverabilityReport>,
    pub shards_used: Vec<usize>,
    pub fast_path: bool,

    pub failure: Option<FailureDetail>,
}

impl ReconstructionReport {
    fn new() -> Self {
        Self {
            attempt_id: Uuid::new_v4(),
            completed_at: Utc::now(),
            success: false,
            manifest_version: None,
            hash_algorithm: None,
            original_size: None,
            reconstructed_size: None,
            plaintext_size: None,
            original_hash: None,
            reconstructed_hash: None,
            hash_verified: false,
            decrypted: false,
            merkle: MerkleOutcome::NotChecked,
            integrity: None,
            warnings: Vec::new(),
            shards_required: 0,
            shards_declared: 0,
            shards_available: 0,
            shards_valid: 0,
            shard_details: Vec::new(),
            recoverability: None,
            shards_used: Vec::new(),
            fast_path: false,
            failure: None,
        }
    }

    fn describe(&mut self, manifest: &Manifest) {
        self.manifest_version = Some(manifest.version().to_string());
        self.hash_algorithm = Some(manifest.hash_algorithm());
        self.original_size = Some(manifest.original_size());
        self.original_hash = manifest.original_hash().map(|h| h.to_hex());
        self.shards_required = manifest.data_shards();
        self.shards_declared = manifest.shards().len();
    }

    fn record_shards(&mut self, records: &[ShardRecord]) {
        self.shard_details = records.iter().map(ShardSummary::from).collect();
        self.shards_available = records.iter().filter(|r| r.bytes.is_some()).count();
        self.shards_valid = records.iter().filter(|r| r.is_valid()).count();
    }

    /// Stage the attempt failed at, if it failed
    pub fn failed_stage(&self) -> Option<Stage> {
        self.failure.as_ref().map(|f| f.stage)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Report plus, on success, the recovered plaintext
#[derive(Debug)]
pub struct Reconstruction {
    pub report: ReconstructionReport,
    outcome: Result<Bytes>,
}

impl Reconstruction {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Recovered plaintext; `None` unless every stage succeeded
    pub fn data(&self) -> Option<&Bytes> {
        self.outcome.as_ref().ok()
    }

    pub fn error(&self) -> Option<&ReconstructError> {
        self.outcome.as_ref().err()
    }

    pub fn into_result(self) -> Result<Bytes> {
        self.outcome
    }
}

/// Sequences the reconstruction stages
#[derive(Debug, Clone, Default)]
pub struct Reconstructor {
    options: ReconstructOptions,
}

impl Reconstructor {
    pub fn new(options: ReconstructOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ReconstructOptions {
        &self.options
    }

    /// Parse `raw` as a manifest, then reconstruct
    ///
    /// A manifest that fails to parse yields a failed report at stage
    /// `manifest`, like any other stage failure.
    pub fn reconstruct_bytes<S>(
        &self,
        raw: &[u8],
        source: &Arc<S>,
        key: Option<&EncryptionKey>,
    ) -> Reconstruction
    where
        S: ShardSource + ?Sized + 'static,
    {
        match Manifest::parse(raw) {
            Ok(manifest) => self.reconstruct(&manifest, source, key),
            Err(e) => {
                let report = ReconstructionReport::new();
                let span = info_span!("reconstruct", attempt_id = %report.attempt_id);
                let _enter = span.enter();
                self.finish(report, Err(e.into()))
            }
        }
    }

    /// Reconstruct the object described by `manifest`
    ///
    /// The source is shared with the fetch workers; with early abort enabled
    /// some of them may still be running when this returns.
    pub fn reconstruct<S>(
        &self,
        manifest: &Manifest,
        source: &Arc<S>,
        key: Option<&EncryptionKey>,
    ) -> Reconstruction
    where
        S: ShardSource + ?Sized + 'static,
    {
        let mut report = ReconstructionReport::new();
        let span = info_span!("reconstruct", attempt_id = %report.attempt_id);
        let _enter = span.enter();

        report.describe(manifest);
        let outcome = self.run(manifest, source, key, &mut report);
        self.finish(report, outcome)
    }

    fn run<S>(
        &self,
        manifest: &Manifest,
        source: &Arc<S>,
        key: Option<&EncryptionKey>,
        report: &mut ReconstructionReport,
    ) -> Result<Bytes>
    where
        S: ShardSource + ?Sized + 'static,
    {
        let k = manifest.data_shards();
        let n = manifest.total_shards();

        let records = verify_shards(manifest, source, &self.options);
        report.record_shards(&records);

        report.merkle = match merkle::verify(manifest) {
            Ok(MerkleCheck::Verified) => MerkleOutcome::Verified,
            Ok(MerkleCheck::NotDeclared) => MerkleOutcome::NotDeclared,
            Err(e) => {
                report.merkle = MerkleOutcome::Failed;
                return Err(e.into());
            }
        };

        let recoverability = analyze_records(&records, k, n);
        report.recoverability = Some(recoverability.clone());
        if !recoverability.feasible {
            return Err(ReconstructError::Infeasible {
                valid: recoverability.valid_count,
                required: k,
            });
        }
        if recoverability.redundancy_margin == 0 && n > k {
            warn!(
                missing = ?recoverability.missing_indices,
                "no redundancy left: every remaining valid shard is required"
            );
        }

        let codec = ErasureCodec::new(manifest.rs().erasure_config())?
            .with_parallel_threshold(self.options.parallel_decode_threshold);
        let decoded = codec.decode_records(&records, manifest.original_size())?;
        report.reconstructed_size = Some(decoded.data.len());
        report.shards_used = decoded.shards_used;
        report.fast_path = decoded.fast_path;
        info!(
            size = decoded.data.len(),
            fast_path = decoded.fast_path,
            "payload decoded"
        );

        let plaintext = match manifest.encryption() {
            Some(params) => {
                let plaintext = decrypt_payload(&decoded.data, key, params)?;
                report.decrypted = true;
                info!(size = plaintext.len(), "payload decrypted");
                Bytes::from(plaintext)
            }
            None => decoded.data,
        };
        report.plaintext_size = Some(plaintext.len());

        let digest = manifest.hash_algorithm().digest_parallel(&plaintext);
        report.reconstructed_hash = Some(digest.to_hex());

        let mut warnings = Vec::new();
        match manifest.original_hash() {
            Some(expected) if self.options.verify_final_hash => {
                if digest != *expected {
                    return Err(IntegrityError::HashMismatch {
                        expected: expected.to_hex(),
                        actual: digest.to_hex(),
                    }
                    .into());
                }
                report.hash_verified = true;
            }
            Some(_) => warnings.push("final hash verification disabled".to_string()),
            None => warnings.push("manifest declares no original hash".to_string()),
        }
        if manifest.merkle().is_none() {
            warnings.push("manifest declares no merkle root".to_string());
        }

        report.warnings = warnings.clone();
        if warnings.is_empty() {
            report.integrity = Some(IntegrityLevel::Full);
        } else {
            if self.options.integrity_policy == IntegrityPolicy::Strict {
                return Err(IntegrityError::ReducedIntegrity(warnings).into());
            }
            warn!(warnings = ?warnings, "reconstruction has reduced integrity");
            report.integrity = Some(IntegrityLevel::Reduced);
        }

        Ok(plaintext)
    }

    fn finish(&self, mut report: ReconstructionReport, outcome: Result<Bytes>) -> Reconstruction {
        report.completed_at = Utc::now();
        match &outcome {
            Ok(data) => {
                report.success = true;
                info!(size = data.len(), "reconstruction succeeded");
            }
            Err(e) => {
                report.failure = Some(FailureDetail {
                    stage: e.stage(),
                    reason: e.to_string(),
                });
                warn!(stage = %e.stage(), error = %e, "reconstruction failed");
            }
        }
        audit::audit_report(&report);
        Reconstruction { report, outcome }
    }
}
