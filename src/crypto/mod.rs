//! Token-keyed encryption for stored fields and whole files.
//!
//! Two independent schemes share one [`Secret`]:
//!
//! - **Field sealing** ([`FieldCodec`]): each of `content`, `tags`, `salience`
//!   and `provenance` is sealed on its own with AES-256-GCM under
//!   `SHA-256(token)`. Sealed values are stored as a tagged BLOB so plaintext
//!   rows written before encryption was switched on stay readable.
//! - **File framing** ([`file`]): `ZENC1 ‖ salt ‖ nonce ‖ ciphertext` with an
//!   scrypt-derived key, used for snapshots, the diary and the working log.
//!
//! Losing the token makes sealed data unrecoverable. There is no recovery path.

pub mod file;
mod legacy;

use anyhow::Result;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::digest::{digest, SHA256};
use ring::rand::{SecureRandom, SystemRandom};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Value, ValueRef};

use crate::error::MemoryError;

/// Leading byte of a BLOB field holding UTF-8 plaintext.
pub const FIELD_TAG_PLAIN: u8 = 0x00;
/// Leading byte of a BLOB field holding `nonce ‖ ciphertext`.
pub const FIELD_TAG_SEALED: u8 = 0x01;
/// Prefix of legacy text fields sealed as Fernet tokens.
pub const LEGACY_FIELD_PREFIX: &str = "enc$";

/// Environment variables consulted (in order) by [`Secret::from_env`].
pub const TOKEN_ENV_VARS: [&str; 2] = ["ZANDALEE_LAWS_TOKEN", "ZANDALEE_CORE_LAWS_TOKEN"];

/// An externally supplied token. Absence means the store runs in plaintext mode.
#[derive(Clone)]
pub struct Secret(String);

impl Secret {
    /// Wrap a token. Empty tokens are treated as absent.
    pub fn new(token: impl Into<String>) -> Option<Self> {
        let token = token.into();
        if token.is_empty() {
            None
        } else {
            Some(Self(token))
        }
    }

    /// First non-empty token among [`TOKEN_ENV_VARS`].
    pub fn from_env() -> Option<Self> {
        TOKEN_ENV_VARS
            .iter()
            .filter_map(|var| std::env::var(var).ok())
            .find_map(Self::new)
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// A column value as it sits in SQLite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredField {
    /// Stored as TEXT (or as a BLOB tagged [`FIELD_TAG_PLAIN`]).
    Plain(String),
    /// `nonce ‖ ciphertext+tag`, stored as a BLOB tagged [`FIELD_TAG_SEALED`].
    Sealed(Vec<u8>),
    /// Fernet token from a legacy `enc$`-prefixed TEXT value. Read-only.
    Legacy(String),
}

impl StoredField {
    pub fn is_encrypted(&self) -> bool {
        !matches!(self, Self::Plain(_))
    }
}

impl ToSql for StoredField {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Self::Plain(text) => ToSqlOutput::Borrowed(ValueRef::Text(text.as_bytes())),
            Self::Sealed(bytes) => {
                let mut blob = Vec::with_capacity(bytes.len() + 1);
                blob.push(FIELD_TAG_SEALED);
                blob.extend_from_slice(bytes);
                ToSqlOutput::Owned(Value::Blob(blob))
            }
            Self::Legacy(token) => {
                ToSqlOutput::Owned(Value::Text(format!("{LEGACY_FIELD_PREFIX}{token}")))
            }
        })
    }
}

impl FromSql for StoredField {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Null => Ok(Self::Plain(String::new())),
            ValueRef::Text(raw) => {
                let text = std::str::from_utf8(raw).map_err(|e| FromSqlError::Other(Box::new(e)))?;
                Ok(match text.strip_prefix(LEGACY_FIELD_PREFIX) {
                    Some(token) => Self::Legacy(token.to_string()),
                    None => Self::Plain(text.to_string()),
                })
            }
            ValueRef::Blob(raw) => match raw.split_first() {
                Some((&FIELD_TAG_SEALED, rest)) => Ok(Self::Sealed(rest.to_vec())),
                Some((&FIELD_TAG_PLAIN, rest)) => String::from_utf8(rest.to_vec())
                    .map(Self::Plain)
                    .map_err(|e| FromSqlError::Other(Box::new(e))),
                _ => Err(FromSqlError::InvalidType),
            },
            _ => Err(FromSqlError::InvalidType),
        }
    }
}

/// AES-256-GCM keyed by `SHA-256(token)`.
pub struct FieldCipher {
    key: LessSafeKey,
    raw_key: [u8; 32],
    rng: SystemRandom,
}

impl FieldCipher {
    pub fn new(secret: &Secret) -> Result<Self> {
        let hash = digest(&SHA256, secret.expose().as_bytes());
        let mut raw_key = [0u8; 32];
        raw_key.copy_from_slice(hash.as_ref());
        let unbound = UnboundKey::new(&AES_256_GCM, &raw_key)
            .map_err(|_| MemoryError::Crypto("invalid field key".into()))?;
        Ok(Self {
            key: LessSafeKey::new(unbound),
            raw_key,
            rng: SystemRandom::new(),
        })
    }

    /// Returns `nonce ‖ ciphertext+tag`.
    pub fn seal(&self, plain: &[u8]) -> Result<Vec<u8>> {
        let mut nonce = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce)
            .map_err(|_| MemoryError::Crypto("nonce generation failed".into()))?;

        let mut in_out = plain.to_vec();
        self.key
            .seal_in_place_append_tag(Nonce::assume_unique_for_key(nonce), Aad::empty(), &mut in_out)
            .map_err(|_| MemoryError::Crypto("seal failed".into()))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + in_out.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&in_out);
        Ok(sealed)
    }

    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>> {
        if sealed.len() < NONCE_LEN {
            return Err(MemoryError::MalformedField("sealed value shorter than nonce".into()).into());
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce)
            .map_err(|_| MemoryError::MalformedField("bad nonce".into()))?;

        let mut buf = ciphertext.to_vec();
        let plain = self
            .key
            .open_in_place(nonce, Aad::empty(), &mut buf)
            .map_err(|_| MemoryError::Crypto("field authentication failed".into()))?;
        Ok(plain.to_vec())
    }

    /// Decrypt a legacy Fernet token keyed by the same token hash.
    pub fn open_legacy(&self, token: &str) -> Result<Vec<u8>> {
        legacy::open_fernet(&self.raw_key, token)
    }
}

/// Seals and opens column values according to the store's mode.
pub struct FieldCodec {
    cipher: Option<FieldCipher>,
}

impl FieldCodec {
    pub fn new(secret: Option<&Secret>) -> Result<Self> {
        let cipher = secret.map(FieldCipher::new).transpose()?;
        Ok(Self { cipher })
    }

    pub fn plaintext() -> Self {
        Self { cipher: None }
    }

    pub fn is_encrypted(&self) -> bool {
        self.cipher.is_some()
    }

    pub fn cipher(&self) -> Option<&FieldCipher> {
        self.cipher.as_ref()
    }

    /// Plaintext mode stores the value verbatim so full-text search can see it.
    pub fn seal(&self, value: &str) -> Result<StoredField> {
        match &self.cipher {
            None => Ok(StoredField::Plain(value.to_owned())),
            Some(cipher) => Ok(StoredField::Sealed(cipher.seal(value.as_bytes())?)),
        }
    }

    /// Plaintext fields pass through regardless of mode.
    pub fn open(&self, field: StoredField) -> Result<String> {
        let bytes = match field {
            StoredField::Plain(text) => return Ok(text),
            StoredField::Sealed(sealed) => self.require_cipher()?.open(&sealed)?,
            StoredField::Legacy(token) => self.require_cipher()?.open_legacy(&token)?,
        };
        String::from_utf8(bytes).map_err(|e| MemoryError::MalformedField(e.to_string()).into())
    }

    fn require_cipher(&self) -> Result<&FieldCipher> {
        self.cipher.as_ref().ok_or_else(|| MemoryError::Locked.into())
    }
}
