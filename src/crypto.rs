//! Authenticated payload encryption.
//!
//! Every payload crossing the bridge is sealed with AES-256-CBC and
//! authenticated with HMAC-SHA256 (encrypt-then-MAC), keyed by the single
//! symmetric key from the connection URI.
//!
//! # Wire Format
//!
//! ```json
//! { "data": "<hex ciphertext>", "hmac": "<hex tag>", "iv": "<hex 16-byte iv>" }
//! ```
//!
//! The tag covers `ciphertext || iv`. [`decrypt`] verifies it in constant time
//! before the cipher ever sees the ciphertext; a mismatch is reported as
//! [`TunnelError::Authentication`] and nothing is decrypted.
//!
//! # Padding
//!
//! [`encrypt`] appends PKCS#7 padding (always at least one byte). [`decrypt`]
//! strips padding by reading the final byte as the pad length and does not
//! check the remaining pad bytes. Peers in the wild rely on that leniency, so
//! tightening it would reject traffic that authenticates correctly.
//!
//! Rust guideline compliant 2026-02

use aes::cipher::block_padding::{NoPadding, Pkcs7};
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Result, TunnelError};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type HmacSha256 = Hmac<Sha256>;

/// Session key size for AES-256 (bytes).
pub const KEY_SIZE: usize = 32;

/// CBC initialization vector size (bytes).
pub const IV_SIZE: usize = 16;

/// AES block size (bytes).
const BLOCK_SIZE: usize = 16;

/// Symmetric session key.
///
/// Zeroed on drop. `Debug` never prints the key material.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; KEY_SIZE]);

impl SessionKey {
    /// Builds a key from raw bytes, which must be exactly [`KEY_SIZE`] long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let key: [u8; KEY_SIZE] = bytes.try_into().map_err(|_| {
            TunnelError::InvalidParams(format!(
                "key must be {KEY_SIZE} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(key))
    }

    /// Generates a random key.
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_SIZE];
        rand::rng().fill_bytes(&mut key);
        Self(key)
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    fn mac(&self) -> Result<HmacSha256> {
        HmacSha256::new_from_slice(&self.0)
            .map_err(|e| TunnelError::InvalidParams(format!("hmac key rejected: {e}")))
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKey(<redacted>)")
    }
}

impl Serialize for SessionKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(self.0))
    }
}

impl<'de> Deserialize<'de> for SessionKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        let mut bytes = BASE64
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)?;
        let key = Self::from_slice(&bytes).map_err(serde::de::Error::custom);
        bytes.zeroize();
        key
    }
}

/// One encrypted message as carried on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionPayload {
    /// Hex-encoded ciphertext.
    pub data: String,
    /// Hex-encoded HMAC-SHA256 over `ciphertext || iv`.
    pub hmac: String,
    /// Hex-encoded initialization vector.
    pub iv: String,
}

/// Encrypts `plaintext` under `key` with a fresh random IV.
pub fn encrypt(plaintext: &[u8], key: &SessionKey) -> Result<EncryptionPayload> {
    let mut iv = [0u8; IV_SIZE];
    rand::rng().fill_bytes(&mut iv);

    let cipher = Aes256CbcEnc::new_from_slices(key.as_bytes(), &iv)
        .map_err(|e| TunnelError::InvalidParams(format!("cipher init failed: {e}")))?;
    let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let mut mac = key.mac()?;
    mac.update(&ciphertext);
    mac.update(&iv);
    let tag = mac.finalize().into_bytes();

    Ok(EncryptionPayload {
        data: hex::encode(&ciphertext),
        hmac: hex::encode(tag),
        iv: hex::encode(iv),
    })
}

/// Verifies and decrypts `payload` under `key`.
///
/// The HMAC is checked first; on mismatch the ciphertext is never decrypted.
pub fn decrypt(payload: &EncryptionPayload, key: &SessionKey) -> Result<Vec<u8>> {
    let data = decode_field("data", &payload.data)?;
    let tag = decode_field("hmac", &payload.hmac)?;
    let iv = decode_field("iv", &payload.iv)?;

    let mut mac = key.mac()?;
    mac.update(&data);
    mac.update(&iv);
    if mac.verify_slice(&tag).is_err() {
        return Err(TunnelError::Authentication {
            actual: payload.hmac.clone(),
        });
    }

    if iv.len() != IV_SIZE {
        return Err(TunnelError::Format(format!(
            "iv must be {IV_SIZE} bytes, got {}",
            iv.len()
        )));
    }
    if data.is_empty() || data.len() % BLOCK_SIZE != 0 {
        return Err(TunnelError::Format(format!(
            "ciphertext length {} is not a positive multiple of {BLOCK_SIZE}",
            data.len()
        )));
    }

    let cipher = Aes256CbcDec::new_from_slices(key.as_bytes(), &iv)
        .map_err(|e| TunnelError::Format(format!("cipher init failed: {e}")))?;
    let mut plaintext = cipher
        .decrypt_padded_vec_mut::<NoPadding>(&data)
        .map_err(|e| TunnelError::Format(format!("decrypt failed: {e}")))?;

    trim_padding(&mut plaintext)?;
    Ok(plaintext)
}

/// Drops `n` trailing bytes where `n` is the value of the last byte.
fn trim_padding(buf: &mut Vec<u8>) -> Result<()> {
    let Some(&last) = buf.last() else {
        return Err(TunnelError::Format("empty plaintext block".into()));
    };
    let pad = usize::from(last);
    if pad > buf.len() {
        return Err(TunnelError::Format(format!(
            "padding length {pad} exceeds plaintext length {}",
            buf.len()
        )));
    }
    buf.truncate(buf.len() - pad);
    Ok(())
}

fn decode_field(name: &str, value: &str) -> Result<Vec<u8>> {
    hex::decode(value).map_err(|e| TunnelError::Format(format!("decode {name} {value:?} error: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn key() -> SessionKey {
        SessionKey::from_slice(&[42u8; KEY_SIZE]).unwrap()
    }

    /// Seals raw, already block-aligned bytes without adding padding.
    fn seal_unpadded(blocks: &[u8], key: &SessionKey) -> EncryptionPayload {
        let iv = [7u8; IV_SIZE];
        let cipher = Aes256CbcEnc::new_from_slices(key.as_bytes(), &iv).unwrap();
        let ciphertext = cipher.encrypt_padded_vec_mut::<NoPadding>(blocks);
        let mut mac = key.mac().unwrap();
        mac.update(&ciphertext);
        mac.update(&iv);
        EncryptionPayload {
            data: hex::encode(&ciphertext),
            hmac: hex::encode(mac.finalize().into_bytes()),
            iv: hex::encode(iv),
        }
    }

    fn flip_hex_char(s: &str, index: usize) -> String {
        let mut chars: Vec<char> = s.chars().collect();
        chars[index] = if chars[index] == '0' { '1' } else { '0' };
        chars.into_iter().collect()
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = key();
        for len in [0usize, 1, 15, 16, 17, 31, 32, 100] {
            let plaintext: Vec<u8> = (0..len).map(|i| i as u8).collect();
            let payload = encrypt(&plaintext, &key).unwrap();
            assert_eq!(decrypt(&payload, &key).unwrap(), plaintext, "len {len}");
        }
    }

    #[test]
    fn test_aligned_input_gets_full_pad_block() {
        let payload = encrypt(&[1u8; 16], &key()).unwrap();
        assert_eq!(payload.data.len(), 32 * 2);
        assert_eq!(payload.iv.len(), IV_SIZE * 2);
        assert_eq!(payload.hmac.len(), 32 * 2);
    }

    #[test]
    fn test_fresh_iv_per_call() {
        let key = key();
        let a = encrypt(b"same", &key).unwrap();
        let b = encrypt(b"same", &key).unwrap();
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.data, b.data);
    }

    #[test]
    fn test_any_flipped_hex_char_fails_authentication() {
        let key = key();
        let payload = encrypt(b"{\"method\":\"eth_sign\"}", &key).unwrap();

        for field in ["data", "hmac", "iv"] {
            let len = match field {
                "data" => payload.data.len(),
                "hmac" => payload.hmac.len(),
                _ => payload.iv.len(),
            };
            for i in 0..len {
                let mut tampered = payload.clone();
                match field {
                    "data" => tampered.data = flip_hex_char(&payload.data, i),
                    "hmac" => tampered.hmac = flip_hex_char(&payload.hmac, i),
                    _ => tampered.iv = flip_hex_char(&payload.iv, i),
                }
                let err = decrypt(&tampered, &key).unwrap_err();
                assert_eq!(err.kind(), ErrorKind::Authentication, "{field}[{i}]");
            }
        }
    }

    #[test]
    fn test_wrong_key_fails_authentication() {
        let payload = encrypt(b"secret", &key()).unwrap();
        let other = SessionKey::from_slice(&[1u8; KEY_SIZE]).unwrap();
        let err = decrypt(&payload, &other).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authentication);
    }

    #[test]
    fn test_truncated_hmac_fails_authentication() {
        let key = key();
        let mut payload = encrypt(b"secret", &key).unwrap();
        payload.hmac.truncate(16);
        let err = decrypt(&payload, &key).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authentication);
    }

    #[test]
    fn test_bad_hex_is_format_error() {
        let key = key();
        let mut payload = encrypt(b"secret", &key).unwrap();
        payload.iv = "not hex".into();
        let err = decrypt(&payload, &key).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
    }

    #[test]
    fn test_padding_bytes_are_not_validated() {
        let key = key();
        let mut block = b"hello world!".to_vec();
        block.extend_from_slice(&[1, 2, 3, 4]);
        let payload = seal_unpadded(&block, &key);
        assert_eq!(decrypt(&payload, &key).unwrap(), b"hello world!");
    }

    #[test]
    fn test_oversized_pad_is_format_error() {
        let key = key();
        let mut block = vec![0u8; 15];
        block.push(0xFF);
        let payload = seal_unpadded(&block, &key);
        let err = decrypt(&payload, &key).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
    }

    #[test]
    fn test_authenticated_short_iv_is_format_error() {
        let key = key();
        let ciphertext = [0u8; 16];
        let iv = [0u8; 8];
        let mut mac = key.mac().unwrap();
        mac.update(&ciphertext);
        mac.update(&iv);
        let payload = EncryptionPayload {
            data: hex::encode(ciphertext),
            hmac: hex::encode(mac.finalize().into_bytes()),
            iv: hex::encode(iv),
        };
        let err = decrypt(&payload, &key).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
    }

    #[test]
    fn test_key_length_enforced() {
        let err = SessionKey::from_slice(&[0u8; 16]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParams);
    }

    #[test]
    fn test_key_serde_roundtrip_and_debug() {
        let key = SessionKey::generate();
        let json = serde_json::to_string(&key).unwrap();
        let back: SessionKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
        assert_eq!(format!("{key:?}"), "SessionKey(<redacted>)");
    }

    #[test]
    fn test_payload_json_field_names() {
        let payload = encrypt(b"x", &key()).unwrap();
        let value = serde_json::to_value(&payload).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.len(), 3);
        assert!(object.contains_key("data"));
        assert!(object.contains_key("hmac"));
        assert!(object.contains_key("iv"));
    }
}
