//! Random identifiers, digests and clock helpers shared by the stores.

use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{RngCore, rngs::OsRng};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Size in bytes of every opaque code, token and session key.
pub const OPAQUE_TOKEN_BYTES: usize = 32;

/// Create a new opaque value (authorization code, token id, session key).
///
/// # Errors
/// Returns an error if the OS random source fails.
pub fn generate_opaque_token() -> Result<String, rand::Error> {
    let mut bytes = [0u8; OPAQUE_TOKEN_BYTES];
    OsRng.try_fill_bytes(&mut bytes)?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

/// Fixed-length digest so secret comparison does not depend on input length.
#[must_use]
pub fn sha256_digest(input: &[u8]) -> [u8; 32] {
    Sha256::digest(input).into()
}

/// Constant-time comparison of the SHA-256 digests of two values.
#[must_use]
pub fn digests_match(expected: &[u8], presented: &[u8]) -> bool {
    let expected = sha256_digest(expected);
    let presented = sha256_digest(presented);
    expected.as_slice().ct_eq(presented.as_slice()).into()
}

/// Wall-clock seconds since the epoch.
#[must_use]
pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}
