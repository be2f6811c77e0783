//! AES-256-CBC encryption for archive payloads.
//!
//! Key:      raw 32-byte per-archive material (no derivation).
//! IV:       fixed, parsed from [`ARCHIVE_IV`] — identical for every entry.
//! Padding:  PKCS-7, so ciphertext length is the next 16-byte multiple and
//!           is recorded per entry as `cryptedsize`.
//!
//! The fixed IV is a format constant, not a security parameter; archives are
//! tamper-evident (per-entry plaintext hash), not confidential against an
//! adversary holding many of them.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use thiserror::Error;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Archive keys are always exactly this many raw bytes.
pub const KEY_LENGTH: usize = 32;

/// Hex string the fixed 16-byte CBC IV is parsed from.
pub const ARCHIVE_IV: &str = "000102030405060708090A0B0C0D0E0F";

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("archive key must be {KEY_LENGTH} bytes")]
    KeyLength,
    #[error("IV string did not parse to 16 bytes")]
    BadIv,
    #[error("decryption failed — wrong key or corrupted payload")]
    Decrypt,
    #[error("invalid hex key string: {0}")]
    BadHex(#[from] hex::FromHexError),
}

fn iv_bytes() -> Result<[u8; 16], CryptoError> {
    let decoded = hex::decode(ARCHIVE_IV).map_err(|_| CryptoError::BadIv)?;
    decoded.try_into().map_err(|_| CryptoError::BadIv)
}

/// Encrypt `data` with AES-256-CBC/PKCS-7 under the fixed IV.
///
/// Output length is `align_up(data.len() + 1, 16)`; an exact block multiple
/// gains a full padding block.
pub fn encrypt(data: &[u8], key: &[u8; KEY_LENGTH]) -> Result<Vec<u8>, CryptoError> {
    let iv = iv_bytes()?;
    let cipher = Aes256CbcEnc::new_from_slices(key, &iv).map_err(|_| CryptoError::KeyLength)?;
    Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(data))
}

/// Decrypt a payload produced by [`encrypt`].  Bad padding after decryption
/// means a wrong key or corrupted ciphertext.
pub fn decrypt(data: &[u8], key: &[u8; KEY_LENGTH]) -> Result<Vec<u8>, CryptoError> {
    let iv = iv_bytes()?;
    let cipher = Aes256CbcDec::new_from_slices(key, &iv).map_err(|_| CryptoError::KeyLength)?;
    cipher
        .decrypt_padded_vec_mut::<Pkcs7>(data)
        .map_err(|_| CryptoError::Decrypt)
}

/// Convert an ASCII hex-pair string (e.g. a 64-character key literal) into
/// raw bytes.
pub fn key_from_ascii(src: &str) -> Result<Vec<u8>, CryptoError> {
    Ok(hex::decode(src)?)
}
