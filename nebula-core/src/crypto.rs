//! Cryptographic primitives
//!
//! Provides:
//! - Content digests for shards and reconstructed objects (SHA-256, BLAKE3)
//! - AES-256-GCM authenticated decryption of reconstructed payloads
//! - The matching sealing operation used when packaging objects

use crate::error::{DecryptionError, ManifestError};
use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Digest length shared by every supported hash algorithm (32 bytes)
pub const DIGEST_LEN: usize = 32;

/// AES-256-GCM key size (32 bytes)
pub const KEY_SIZE: usize = 32;

/// AES-GCM nonce size (12 bytes / 96 bits)
pub const NONCE_SIZE: usize = 12;

/// AES-GCM authentication tag size (16 bytes)
pub const TAG_SIZE: usize = 16;

/// Hash algorithm declared by a manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Blake3,
}

impl HashAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Blake3 => "blake3",
        }
    }

    /// Hash `data` with this algorithm
    pub fn digest(&self, data: &[u8]) -> Digest {
        match self {
            HashAlgorithm::Sha256 => {
                let d = ring::digest::digest(&ring::digest::SHA256, data);
                let mut out = [0u8; DIGEST_LEN];
                out.copy_from_slice(d.as_ref());
                Digest(out)
            }
            HashAlgorithm::Blake3 => Digest(*blake3::hash(data).as_bytes()),
        }
    }

    /// Hash `data`, using multiple threads where the algorithm allows it
    pub fn digest_parallel(&self, data: &[u8]) -> Digest {
        match self {
            HashAlgorithm::Blake3 => {
                let mut hasher = blake3::Hasher::new();
                hasher.update_rayon(data);
                Digest(*hasher.finalize().as_bytes())
            }
            HashAlgorithm::Sha256 => self.digest(data),
        }
    }

    /// Hash the concatenation `left || right`
    pub fn digest_pair(&self, left: &[u8], right: &[u8]) -> Digest {
        match self {
            HashAlgorithm::Sha256 => {
                let mut ctx = ring::digest::Context::new(&ring::digest::SHA256);
                ctx.update(left);
                ctx.update(right);
                let mut out = [0u8; DIGEST_LEN];
                out.copy_from_slice(ctx.finish().as_ref());
                Digest(out)
            }
            HashAlgorithm::Blake3 => {
                let mut hasher = blake3::Hasher::new();
                hasher.update(left);
                hasher.update(right);
                Digest(*hasher.finalize().as_bytes())
            }
        }
    }
}

impl FromStr for HashAlgorithm {
    type Err = ManifestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(HashAlgorithm::Sha256),
            "blake3" => Ok(HashAlgorithm::Blake3),
            _ => Err(ManifestError::UnsupportedHashAlgorithm(s.to_string())),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed-size digest of a shard or object
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest([u8; DIGEST_LEN]);

impl Digest {
    pub fn from_bytes(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// Lowercase hex encoding
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a hex digest (either case)
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let mut out = [0u8; DIGEST_LEN];
        hex::decode_to_slice(s, &mut out)?;
        Ok(Self(out))
    }

    /// Check that `data` hashes to this digest
    pub fn verify(&self, algorithm: HashAlgorithm, data: &[u8]) -> bool {
        algorithm.digest(data) == *self
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Digest {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Digest::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// AEAD algorithm declared by a manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EncryptionAlgorithm {
    #[serde(rename = "aes-256-gcm")]
    Aes256Gcm,
}

impl EncryptionAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            EncryptionAlgorithm::Aes256Gcm => "aes-256-gcm",
        }
    }
}

impl FromStr for EncryptionAlgorithm {
    type Err = ManifestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "aes-256-gcm" => Ok(EncryptionAlgorithm::Aes256Gcm),
            _ => Err(ManifestError::UnsupportedEncryption(s.to_string())),
        }
    }
}

/// Validated encryption block of a manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionParams {
    pub algorithm: EncryptionAlgorithm,
    pub iv: [u8; NONCE_SIZE],
    /// Detached tag; when absent the tag is the last 16 bytes of the payload
    pub tag: Option<[u8; TAG_SIZE]>,
}

/// AES-256-GCM key supplied by the caller
#[derive(Clone)]
pub struct EncryptionKey([u8; KEY_SIZE]);

impl EncryptionKey {
    /// Generate a new random encryption key
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut key = [0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut key);
        Self(key)
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create from a slice (validates length)
    pub fn from_slice(slice: &[u8]) -> Result<Self, DecryptionError> {
        if slice.len() != KEY_SIZE {
            return Err(DecryptionError::InvalidKeyLength {
                expected: KEY_SIZE,
                actual: slice.len(),
            });
        }
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(slice);
        Ok(Self(key))
    }

    /// Create from a hex string
    pub fn from_hex(s: &str) -> Result<Self, DecryptionError> {
        let bytes = hex::decode(s).map_err(|_| DecryptionError::InvalidKeyLength {
            expected: KEY_SIZE,
            actual: s.len() / 2,
        })?;
        Self::from_slice(&bytes)
    }

    /// Get the raw key bytes
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptionKey([REDACTED])")
    }
}

impl Drop for EncryptionKey {
    fn drop(&mut self) {
        self.0.iter_mut().for_each(|b| *b = 0);
    }
}

/// Random 96-bit nonce
pub fn generate_iv() -> [u8; NONCE_SIZE] {
    use rand::RngCore;
    let mut iv = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut iv);
    iv
}

fn cipher(key: &EncryptionKey) -> Result<Aes256Gcm, DecryptionError> {
    Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|_| DecryptionError::InvalidKeyLength {
        expected: KEY_SIZE,
        actual: key.as_bytes().len(),
    })
}

/// Encrypt `plaintext` with AES-256-GCM
///
/// With `detach_tag` the ciphertext is returned without its tag and the tag is
/// returned separately; otherwise the tag stays appended to the ciphertext.
pub fn seal_payload(
    plaintext: &[u8],
    key: &EncryptionKey,
    iv: &[u8; NONCE_SIZE],
    detach_tag: bool,
) -> Result<(Vec<u8>, Option<[u8; TAG_SIZE]>), DecryptionError> {
    let mut ciphertext = cipher(key)?
        .encrypt(Nonce::from_slice(iv), plaintext)
        .map_err(|e| DecryptionError::Encryption(e.to_string()))?;

    if !detach_tag {
        return Ok((ciphertext, None));
    }
    let split = ciphertext.len() - TAG_SIZE;
    let mut tag = [0u8; TAG_SIZE];
    tag.copy_from_slice(&ciphertext[split..]);
    ciphertext.truncate(split);
    Ok((ciphertext, Some(tag)))
}

/// Authenticated decryption of a reconstructed payload
///
/// Returns the plaintext only when the tag verifies; a wrong key, a tampered
/// payload or a tampered tag all yield [`DecryptionError::AuthFailed`].
pub fn decrypt_payload(
    payload: &[u8],
    key: Option<&EncryptionKey>,
    params: &EncryptionParams,
) -> Result<Vec<u8>, DecryptionError> {
    let key = key.ok_or(DecryptionError::KeyRequired)?;
    let cipher = cipher(key)?;
    let nonce = Nonce::from_slice(&params.iv);

    let plaintext = match &params.tag {
        Some(tag) => {
            let mut sealed = Vec::with_capacity(payload.len() + TAG_SIZE);
            sealed.extend_from_slice(payload);
            sealed.extend_from_slice(tag);
            cipher.decrypt(nonce, sealed.as_slice())
        }
        None => {
            if payload.len() < TAG_SIZE {
                return Err(DecryptionError::PayloadTooShort(payload.len()));
            }
            cipher.decrypt(nonce, payload)
        }
    }
    .map_err(|_| DecryptionError::AuthFailed)?;

    Ok(plaintext)
}
