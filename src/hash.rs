use argon2rs::{verifier::Encoded, Argon2, Variant};
use ring::error::Unspecified;

use crate::secret::random_bytes;

const SALT_LEN: usize = 32;

/// Salt and hash a password, returning the self-describing argon2 encoding
/// stored in `users.password_hash`.
pub fn hash_password(password: &str) -> Result<String, Unspecified> {
    let salt = random_bytes(SALT_LEN)?;
    let session = Encoded::new(
        Argon2::default(Variant::Argon2i),
        password.as_bytes(),
        &salt,
        b"",
        b"",
    );
    Ok(String::from_utf8_lossy(&session.to_u8()).into_owned())
}

/// Check a password against a stored encoding. Unparseable encodings never
/// verify.
pub fn verify_password(encoded: &str, password: &str) -> bool {
    match Encoded::from_u8(encoded.as_bytes()) {
        Ok(session) => session.verify(password.as_bytes()),
        Err(_) => false,
    }
}
