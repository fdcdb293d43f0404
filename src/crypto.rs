//! Content Digests and At-Rest Encryption
//!
//! Content addressing hashes serialized bytes with SHA-256 and renders the
//! digest as lowercase hex (default) or unpadded lowercase base32 (the
//! object-store default). One scheme per backend, never mixed.
//!
//! The file backend optionally encrypts every byte-level write with
//! AES-256-GCM. The content hash and recorded size always refer to the
//! plaintext.

use crate::error::{Error, Result};
use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Digest rendering scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashEncoding {
    /// Lowercase hex, 64 characters
    Hex,
    /// RFC 4648 base32, lowercase, unpadded
    Base32,
}

impl Default for HashEncoding {
    fn default() -> Self {
        HashEncoding::Hex
    }
}

/// SHA-256 over the input bytes.
pub fn sha256(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// SHA-256 digest rendered in the requested encoding.
pub fn content_hash(bytes: &[u8], encoding: HashEncoding) -> String {
    let digest = sha256(bytes);
    match encoding {
        HashEncoding::Hex => hex::encode(digest),
        HashEncoding::Base32 => base32_encode(&digest),
    }
}

const BASE32_ALPHABET: &[u8; 32] = b"abcdefghijklmnopqrstuvwxyz234567";

// RFC 4648 without padding. No example dependency covers base32, so the
// encoder lives here.
fn base32_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len().div_ceil(5) * 8);
    let mut buffer: u64 = 0;
    let mut bits: u32 = 0;
    for &b in bytes {
        buffer = (buffer << 8) | u64::from(b);
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            let idx = ((buffer >> bits) & 0x1f) as usize;
            out.push(BASE32_ALPHABET[idx] as char);
        }
    }
    if bits > 0 {
        let idx = ((buffer << (5 - bits)) & 0x1f) as usize;
        out.push(BASE32_ALPHABET[idx] as char);
    }
    out
}

const NONCE_LEN: usize = 12;

/// AES-256-GCM seal/open applied uniformly to byte-level writes when the file
/// backend is configured with an encryption key.
pub struct Encryptor {
    cipher: Aes256Gcm,
}

impl Encryptor {
    /// Derive a cipher from an arbitrary-length secret. The secret is folded
    /// through SHA-256 to produce the 256-bit key.
    pub fn from_secret(secret: &[u8]) -> Self {
        let key_bytes = sha256(secret);
        let key = Key::<Aes256Gcm>::from_slice(&key_bytes);
        Encryptor { cipher: Aes256Gcm::new(key) }
    }

    /// Encrypt, producing `nonce || ciphertext`.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| Error::io("AES-GCM encryption failed"))?;
        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Reverse of [`Encryptor::seal`]. Tamper or key mismatch surfaces as an
    /// integrity error.
    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>> {
        if sealed.len() < NONCE_LEN {
            return Err(Error::integrity("encrypted payload shorter than nonce"));
        }
        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        self.cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| Error::integrity("AES-GCM authentication failed"))
    }
}
