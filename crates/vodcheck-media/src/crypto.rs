//! AES-128-CBC segment decryption.

use aes::cipher::{block_padding::NoPadding, BlockDecryptMut, KeyIvInit};
use bytes::Bytes;

use crate::error::DecryptError;

type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

pub const BLOCK_SIZE: usize = 16;

/// IV used when the playlist gives none: twelve zero bytes followed by the
/// big-endian 1-based segment index.
pub fn segment_iv(segment_index: u32) -> [u8; 16] {
    let mut iv = [0u8; 16];
    iv[12..].copy_from_slice(&segment_index.to_be_bytes());
    iv
}

/// Decrypt a whole segment and strip its PKCS#7 padding.
///
/// The final plaintext byte must be in `1..=16` and the trailing bytes must
/// all repeat it; anything else is an error rather than a silent truncation.
pub fn decrypt_segment(data: &[u8], key: &[u8], iv: &[u8]) -> Result<Bytes, DecryptError> {
    if data.is_empty() || data.len() % BLOCK_SIZE != 0 {
        return Err(DecryptError::NotBlockAligned(data.len()));
    }
    let cipher =
        Aes128CbcDec::new_from_slices(key, iv).map_err(|_| DecryptError::InvalidKeyLength)?;
    let mut plain = cipher
        .decrypt_padded_vec_mut::<NoPadding>(data)
        .map_err(|_| DecryptError::NotBlockAligned(data.len()))?;

    let pad = plain[plain.len() - 1];
    if pad == 0 || pad as usize > BLOCK_SIZE {
        return Err(DecryptError::InvalidPadLength(pad));
    }
    let body_len = plain.len() - pad as usize;
    if plain[body_len..].iter().any(|b| *b != pad) {
        return Err(DecryptError::InvalidPadding);
    }
    plain.truncate(body_len);
    Ok(Bytes::from(plain))
}

/// Parse an `IV=0x...` playlist attribute into 16 bytes.
///
/// Shorter values are left-padded with zeros.
pub fn parse_iv(value: &str) -> Option<[u8; 16]> {
    let hex = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    if hex.is_empty() || hex.len() > 32 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let padded = format!("{:0>32}", hex);
    let mut iv = [0u8; 16];
    for (i, byte) in iv.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&padded[i * 2..i * 2 + 2], 16).ok()?;
    }
    Some(iv)
}
