//! Whole-file encryption: `ZENC1 ‖ salt[16] ‖ nonce[12] ‖ AES-256-GCM ciphertext`.
//!
//! The key is derived per file with scrypt (N = 2^14, r = 8, p = 1) from the
//! secret token and the file's random salt. Files without the magic prefix are
//! returned unchanged on read, so plaintext files from before encryption was
//! enabled keep working.

use anyhow::{Context, Result};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use std::path::Path;

use super::Secret;
use crate::error::MemoryError;

pub const MAGIC: &[u8; 5] = b"ZENC1";
pub const SALT_LEN: usize = 16;
const KEY_LEN: usize = 32;
const SCRYPT_LOG_N: u8 = 14;
const SCRYPT_R: u32 = 8;
const SCRYPT_P: u32 = 1;

fn derive_key(secret: &Secret, salt: &[u8]) -> Result<LessSafeKey> {
    let params = scrypt::Params::new(SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P, KEY_LEN)
        .map_err(|e| MemoryError::Crypto(format!("scrypt params: {e}")))?;
    let mut key = [0u8; KEY_LEN];
    scrypt::scrypt(secret.expose().as_bytes(), salt, &params, &mut key)
        .map_err(|e| MemoryError::Crypto(format!("scrypt: {e}")))?;
    let unbound = UnboundKey::new(&AES_256_GCM, &key)
        .map_err(|_| MemoryError::Crypto("invalid file key".into()))?;
    Ok(LessSafeKey::new(unbound))
}

pub fn is_framed(data: &[u8]) -> bool {
    data.starts_with(MAGIC)
}

pub fn encrypt_bytes(secret: &Secret, plain: &[u8]) -> Result<Vec<u8>> {
    let rng = SystemRandom::new();
    let mut salt = [0u8; SALT_LEN];
    let mut nonce = [0u8; NONCE_LEN];
    rng.fill(&mut salt)
        .and_then(|_| rng.fill(&mut nonce))
        .map_err(|_| MemoryError::Crypto("random generation failed".into()))?;

    let key = derive_key(secret, &salt)?;
    let mut in_out = plain.to_vec();
    key.seal_in_place_append_tag(Nonce::assume_unique_for_key(nonce), Aad::empty(), &mut in_out)
        .map_err(|_| MemoryError::Crypto("seal failed".into()))?;

    let mut out = Vec::with_capacity(MAGIC.len() + SALT_LEN + NONCE_LEN + in_out.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&salt);
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&in_out);
    Ok(out)
}

/// Unframed input is returned as-is. Framed input needs the secret.
pub fn decrypt_bytes(secret: Option<&Secret>, data: &[u8]) -> Result<Vec<u8>> {
    if !is_framed(data) {
        return Ok(data.to_vec());
    }
    let secret = secret.ok_or(MemoryError::Locked)?;

    let body = &data[MAGIC.len()..];
    if body.len() < SALT_LEN + NONCE_LEN {
        return Err(MemoryError::MalformedField("truncated ZENC1 header".into()).into());
    }
    let (salt, rest) = body.split_at(SALT_LEN);
    let (nonce, ciphertext) = rest.split_at(NONCE_LEN);

    let key = derive_key(secret, salt)?;
    let nonce = Nonce::try_assume_unique_for_key(nonce)
        .map_err(|_| MemoryError::MalformedField("bad nonce".into()))?;
    let mut buf = ciphertext.to_vec();
    let plain = key
        .open_in_place(nonce, Aad::empty(), &mut buf)
        .map_err(|_| MemoryError::Crypto("file authentication failed".into()))?;
    Ok(plain.to_vec())
}

/// Write `bytes` through a temp file and rename, so readers never see a torn file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, bytes)
        .with_context(|| format!("failed to write temp file: {}", tmp_path.display()))?;
    std::fs::rename(&tmp_path, path)
        .with_context(|| format!("failed to rename into place: {}", path.display()))?;
    Ok(())
}

/// Encrypts when a secret is given, otherwise writes plaintext.
pub fn write_text(path: &Path, text: &str, secret: Option<&Secret>) -> Result<()> {
    let bytes = match secret {
        Some(secret) => encrypt_bytes(secret, text.as_bytes())?,
        None => text.as_bytes().to_vec(),
    };
    write_atomic(path, &bytes)
}

pub fn read_text(path: &Path, secret: Option<&Secret>) -> Result<String> {
    let data = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let plain = decrypt_bytes(secret, &data)?;
    Ok(String::from_utf8_lossy(&plain).into_owned())
}
