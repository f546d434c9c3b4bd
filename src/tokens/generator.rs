use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;

/// Random bytes behind every session token
pub const TOKEN_BYTES: usize = 40;

/// Generate a session token: 40 bytes from the OS CSPRNG, base64url without padding
/// (54 characters).
///
/// Uniqueness rests on the entropy of the source; no existence check is made.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
