use hmac::{Hmac, Mac};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::ConfigError;

type HmacSha256 = Hmac<Sha256>;

/// Random bytes in a token id (128 bits).
const TOKEN_ID_BYTES: usize = 16;
pub const TOKEN_ID_HEX_LEN: usize = TOKEN_ID_BYTES * 2;
pub const TOKEN_SIG_HEX_LEN: usize = 64;
pub const MIN_SECRET_BYTES: usize = 16;

/// HMAC key material. `Debug` never prints the bytes.
#[derive(Clone)]
pub struct SecretKey(Vec<u8>);

impl SecretKey {
    pub fn new(bytes: Vec<u8>) -> Result<Self, ConfigError> {
        if bytes.len() < MIN_SECRET_BYTES {
            return Err(ConfigError::SecretTooShort {
                min: MIN_SECRET_BYTES,
                len: bytes.len(),
            });
        }
        Ok(Self(bytes))
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretKey(<redacted>)")
    }
}

/// A confirm or ack credential as carried in links: `id` plus `HMAC(secret, id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub id: String,
    pub sig: String,
}

impl Token {
    /// True when `id` and `sig` are exactly this token. Constant time in
    /// the contents; only the lengths short-circuit.
    pub fn matches(&self, id: &str, sig: &str) -> bool {
        let id_eq = self.id.as_bytes().ct_eq(id.as_bytes());
        let sig_eq = self.sig.as_bytes().ct_eq(sig.as_bytes());
        (id_eq & sig_eq).into()
    }

    /// First characters of the id, safe to put in logs.
    pub fn log_prefix(&self) -> &str {
        log_prefix(&self.id)
    }
}

pub fn log_prefix(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

/// Issues and verifies stateless signed tokens.
///
/// Verification only proves a token was minted with this secret. Whether it
/// authorizes anything is decided by comparing against the live token held in
/// the switch state.
#[derive(Debug, Clone)]
pub struct TokenAuthority {
    secret: SecretKey,
}

impl TokenAuthority {
    pub fn new(secret: SecretKey) -> Self {
        Self { secret }
    }

    pub fn issue(&self) -> Token {
        let mut bytes = [0u8; TOKEN_ID_BYTES];
        OsRng.fill_bytes(&mut bytes);
        let id = hex::encode(bytes);
        let sig = hex::encode(self.mac(&id).finalize().into_bytes());
        Token { id, sig }
    }

    pub fn verify(&self, id: &str, sig: &str) -> bool {
        if !is_lower_hex(id, TOKEN_ID_HEX_LEN) || !is_lower_hex(sig, TOKEN_SIG_HEX_LEN) {
            return false;
        }
        let Ok(expected) = hex::decode(sig) else {
            return false;
        };
        self.mac(id).verify_slice(&expected).is_ok()
    }

    pub fn verify_token(&self, token: &Token) -> bool {
        self.verify(&token.id, &token.sig)
    }

    fn mac(&self, id: &str) -> HmacSha256 {
        let mut mac = HmacSha256::new_from_slice(&self.secret.0)
            .expect("HMAC-SHA256 accepts keys of any length");
        mac.update(id.as_bytes());
        mac
    }
}

fn is_lower_hex(value: &str, len: usize) -> bool {
    value.len() == len && value.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
