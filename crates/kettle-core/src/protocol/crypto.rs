//! Encrypted-frame variant of the codec.
//!
//! Some kettle firmware transports the frame hex string AES-128-CBC encrypted
//! (PKCS#7 padding) under a fixed key and IV instead of in plain JSON.  The
//! normal session path never uses this; it is an alternate entry point for
//! callers that capture such traffic.

use aes::Aes128;
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};

use crate::protocol::codec::{decode_frame_hex, ProtocolError};
use crate::protocol::messages::{ChecksumPolicy, DecodedMessage};

type Aes128CbcDec = cbc::Decryptor<Aes128>;
type Aes128CbcEnc = cbc::Encryptor<Aes128>;

const SECRET_KEY: &[u8; 16] = b"ay3$&dw*ndAD!9)<";
const SECRET_IV: &[u8; 16] = b"7e3*WwI(@Dczxcue";

/// Decrypts `ciphertext` into the frame hex string it carries.
///
/// # Errors
///
/// [`ProtocolError::Decrypt`] if the ciphertext is not a whole number of
/// blocks, the padding is invalid, or the plaintext is not UTF-8.
pub fn decrypt_frame_hex(ciphertext: &[u8]) -> Result<String, ProtocolError> {
    let cipher = Aes128CbcDec::new(SECRET_KEY.into(), SECRET_IV.into());
    let plain = cipher
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|e| ProtocolError::Decrypt(e.to_string()))?;
    let text = String::from_utf8(plain).map_err(|e| ProtocolError::Decrypt(e.to_string()))?;
    Ok(text.trim_end_matches(['\0', '\r', '\n', ' ']).to_string())
}

/// Decrypts and decodes one encrypted frame.
pub fn decode_encrypted_frame(
    ciphertext: &[u8],
    policy: ChecksumPolicy,
) -> Result<DecodedMessage, ProtocolError> {
    let hex_frame = decrypt_frame_hex(ciphertext)?;
    decode_frame_hex(&hex_frame, policy)
}

/// Encrypts a frame hex string the way the encrypted transport expects.
pub fn encrypt_frame_hex(hex_frame: &str) -> Vec<u8> {
    Aes128CbcEnc::new(SECRET_KEY.into(), SECRET_IV.into())
        .encrypt_padded_vec_mut::<Pkcs7>(hex_frame.as_bytes())
}
