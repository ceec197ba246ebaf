use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use rand::RngCore;
use rand_core::OsRng;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// AES-256 key size in bytes.
pub const KEY_SIZE: usize = 32;
/// GCM nonce size in bytes, prepended to the ciphertext.
pub const NONCE_SIZE: usize = 12;
/// GCM authentication tag size in bytes.
pub const TAG_SIZE: usize = 16;

#[derive(Debug)]
pub enum CodecError {
    /// Key material is unusable (wrong length). Fatal at startup, never per-request.
    CryptoInit,
    /// The claim payload could not be (de)serialized.
    Encoding(serde_json::Error),
    /// The textual encoding is malformed (bad base64, or shorter than nonce + tag).
    Decode,
    /// The authentication tag did not verify. Tampering, a wrong key and
    /// corruption are deliberately indistinguishable here.
    Authentication,
}

impl std::fmt::Display for CodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodecError::CryptoInit => write!(f, "invalid key material"),
            CodecError::Encoding(err) => write!(f, "claim encoding failed: {}", err),
            CodecError::Decode => write!(f, "malformed token encoding"),
            CodecError::Authentication => write!(f, "token authentication failed"),
        }
    }
}

impl std::error::Error for CodecError {}

/// Parses a hex-encoded 32-byte AEAD key.
pub fn key_from_hex(encoded: &str) -> Result<[u8; KEY_SIZE], CodecError> {
    let bytes = hex::decode(encoded).map_err(|_| CodecError::CryptoInit)?;
    bytes.try_into().map_err(|_| CodecError::CryptoInit)
}

/// Encrypts a claim set under `key`, returning a URL-safe base64 encoding of
/// `nonce || ciphertext || tag`. A fresh nonce is drawn from the OS random
/// source on every call; nonce reuse under one key would void the GCM
/// guarantees.
pub fn seal<C: Serialize>(claims: &C, key: &[u8; KEY_SIZE]) -> Result<String, CodecError> {
    let plaintext = serde_json::to_vec(claims).map_err(CodecError::Encoding)?;

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_slice())
        .map_err(|_| CodecError::CryptoInit)?;

    let mut combined = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    combined.extend_from_slice(&nonce_bytes);
    combined.extend_from_slice(&ciphertext);
    Ok(URL_SAFE.encode(combined))
}

/// Decrypts and authenticates a sealed token, then deserializes the claims.
pub fn open<C: DeserializeOwned>(token: &str, key: &[u8; KEY_SIZE]) -> Result<C, CodecError> {
    let combined = URL_SAFE.decode(token).map_err(|_| CodecError::Decode)?;
    if combined.len() < NONCE_SIZE + TAG_SIZE {
        return Err(CodecError::Decode);
    }
    let (nonce, ciphertext) = combined.split_at(NONCE_SIZE);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CodecError::Authentication)?;

    serde_json::from_slice(&plaintext).map_err(CodecError::Encoding)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::collections::HashSet;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Claims {
        id: i64,
        name: String,
        active: bool,
        created: i64,
    }

    fn sample() -> Claims {
        Claims {
            id: 42,
            name: "Algorithms".to_string(),
            active: true,
            created: 1714521600,
        }
    }

    const KEY: [u8; KEY_SIZE] = [7u8; KEY_SIZE];

    #[test]
    fn round_trip() {
        let token = seal(&sample(), &KEY).unwrap();
        let opened: Claims = open(&token, &KEY).unwrap();
        assert_eq!(opened, sample());
    }

    #[test]
    fn fresh_nonce_per_seal() {
        let mut seen = HashSet::new();
        for _ in 0..64 {
            assert!(seen.insert(seal(&sample(), &KEY).unwrap()));
        }
    }

    #[test]
    fn wrong_key_is_authentication_failure() {
        let other = [8u8; KEY_SIZE];
        let token = seal(&sample(), &KEY).unwrap();
        match open::<Claims>(&token, &other) {
            Err(CodecError::Authentication) => {}
            other => panic!("expected authentication failure, got {:?}", other),
        }
    }

    #[test]
    fn tampering_any_ciphertext_byte_fails() {
        let token = seal(&sample(), &KEY).unwrap();
        let combined = URL_SAFE.decode(&token).unwrap();
        for i in NONCE_SIZE..combined.len() {
            let mut corrupted = combined.clone();
            corrupted[i] ^= 0x01;
            let reencoded = URL_SAFE.encode(&corrupted);
            match open::<Claims>(&reencoded, &KEY) {
                Err(CodecError::Authentication) => {}
                other => panic!("byte {} survived tampering: {:?}", i, other),
            }
        }
    }

    #[test]
    fn malformed_encoding_is_decode_failure() {
        match open::<Claims>("%%% not base64 %%%", &KEY) {
            Err(CodecError::Decode) => {}
            other => panic!("expected decode failure, got {:?}", other),
        }
    }

    #[test]
    fn truncated_token_is_decode_failure() {
        let token = seal(&sample(), &KEY).unwrap();
        let combined = URL_SAFE.decode(&token).unwrap();
        let truncated = URL_SAFE.encode(&combined[..NONCE_SIZE + TAG_SIZE - 1]);
        match open::<Claims>(&truncated, &KEY) {
            Err(CodecError::Decode) => {}
            other => panic!("expected decode failure, got {:?}", other),
        }
    }

    #[test]
    fn key_from_hex_rejects_bad_lengths() {
        assert!(key_from_hex(&"ab".repeat(KEY_SIZE)).is_ok());
        assert!(matches!(
            key_from_hex("abcd"),
            Err(CodecError::CryptoInit)
        ));
        assert!(matches!(
            key_from_hex("not hex at all"),
            Err(CodecError::CryptoInit)
        ));
    }
}
