//! Random secrets for the `.env` file.

use failure::Fail;
use lazy_static::lazy_static;
use ring::error::Unspecified;
use ring::rand::{SecureRandom, SystemRandom};

/// Bytes of entropy in a generated key unless asked otherwise.
pub const DEFAULT_KEY_BYTES: usize = 32;

#[derive(Debug, Fail, PartialEq, Eq)]
pub enum SecretError {
    #[fail(display = "A secret needs at least one byte of entropy")]
    Empty,
    #[fail(display = "Could not gather randomness")]
    Random,
}

lazy_static! {
    static ref RNG: SystemRandom = SystemRandom::new();
}

/// Fill a buffer of `len` bytes from the system RNG.
pub fn random_bytes(len: usize) -> Result<Vec<u8>, Unspecified> {
    let mut data = vec![0; len];
    RNG.fill(&mut data)?;
    Ok(data)
}

/// Generate a url-safe, unpadded base64 secret carrying `byte_num` random
/// bytes, suitable for `SECRET_KEY` and `SUPER_USER_TOKEN`.
pub fn generate_secret_key(byte_num: usize) -> Result<String, SecretError> {
    if byte_num == 0 {
        return Err(SecretError::Empty);
    }
    let bytes = random_bytes(byte_num).map_err(|_| SecretError::Random)?;
    Ok(base64::encode_config(&bytes, base64::URL_SAFE_NO_PAD))
}

#[cfg(test)]
pub mod test {
    use super::*;

    #[test]
    fn test_key_is_url_safe() {
        let key = generate_secret_key(DEFAULT_KEY_BYTES).unwrap();
        // 32 bytes -> ceil(32 * 4 / 3) characters without padding
        assert_eq!(key.len(), 43);
        assert!(key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_keys_differ() {
        let a = generate_secret_key(16).unwrap();
        let b = generate_secret_key(16).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_decodes_back_to_requested_length() {
        let key = generate_secret_key(48).unwrap();
        let raw = base64::decode_config(&key, base64::URL_SAFE_NO_PAD).unwrap();
        assert_eq!(raw.len(), 48);
    }

    #[test]
    fn test_zero_bytes_is_rejected() {
        assert_eq!(generate_secret_key(0), Err(SecretError::Empty));
    }
}
