//! Read-only support for fields sealed by older builds as Fernet tokens.
//!
//! Token layout: `0x80 ‖ timestamp[8] ‖ iv[16] ‖ AES-128-CBC ciphertext ‖ HMAC-SHA256[32]`,
//! base64url encoded. The 32-byte key splits into a signing half and an
//! encryption half.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, KeyIvInit};
use anyhow::Result;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use ring::hmac;

use crate::error::MemoryError;

type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

const VERSION: u8 = 0x80;
const HEADER_LEN: usize = 1 + 8 + 16;
const HMAC_LEN: usize = 32;

const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

pub(crate) fn open_fernet(key: &[u8; 32], token: &str) -> Result<Vec<u8>> {
    let data = URL_SAFE_LENIENT
        .decode(token.trim().as_bytes())
        .map_err(|e| MemoryError::MalformedField(format!("legacy token: {e}")))?;

    if data.len() < HEADER_LEN + HMAC_LEN || data[0] != VERSION {
        return Err(MemoryError::MalformedField("legacy token header".into()).into());
    }

    let (signed, tag) = data.split_at(data.len() - HMAC_LEN);
    let signing_key = hmac::Key::new(hmac::HMAC_SHA256, &key[..16]);
    hmac::verify(&signing_key, signed, tag)
        .map_err(|_| MemoryError::Crypto("legacy token signature mismatch".into()))?;

    let iv = &signed[9..HEADER_LEN];
    let ciphertext = &signed[HEADER_LEN..];
    let decryptor = Aes128CbcDec::new_from_slices(&key[16..], iv)
        .map_err(|e| MemoryError::Crypto(format!("legacy key: {e}")))?;

    decryptor
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| MemoryError::Crypto("legacy token padding".into()).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use aes::cipher::BlockEncryptMut;

    type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;

    fn make_token(key: &[u8; 32], plain: &[u8]) -> String {
        let iv = [7u8; 16];
        let ciphertext = Aes128CbcEnc::new_from_slices(&key[16..], &iv)
            .unwrap()
            .encrypt_padded_vec_mut::<Pkcs7>(plain);

        let mut token = vec![VERSION];
        token.extend_from_slice(&1_700_000_000u64.to_be_bytes());
        token.extend_from_slice(&iv);
        token.extend_from_slice(&ciphertext);
        let signing_key = hmac::Key::new(hmac::HMAC_SHA256, &key[..16]);
        let tag = hmac::sign(&signing_key, &token);
        token.extend_from_slice(tag.as_ref());

        base64::engine::general_purpose::URL_SAFE.encode(token)
    }

    #[test]
    fn opens_well_formed_token() {
        let key = [3u8; 32];
        let token = make_token(&key, b"[\"family\", \"kitchen\"]");
        assert_eq!(open_fernet(&key, &token).unwrap(), b"[\"family\", \"kitchen\"]");
    }

    #[test]
    fn rejects_tampered_token() {
        let key = [3u8; 32];
        let token = make_token(&key, b"secret");
        let other = [4u8; 32];
        let err = open_fernet(&other, &token).unwrap_err();
        assert!(matches!(err.downcast_ref::<MemoryError>(), Some(MemoryError::Crypto(_))));
    }

    #[test]
    fn rejects_garbage() {
        let err = open_fernet(&[0u8; 32], "not a token").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MemoryError>(),
            Some(MemoryError::MalformedField(_))
        ));
    }
}
