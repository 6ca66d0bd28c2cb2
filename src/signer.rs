use base64::{Engine as _, engine::general_purpose};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{AppError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Keyed MAC over session identifiers.
///
/// Signatures are deterministic for a given secret, fixed-size, and
/// URL-safe, so `"<id>.<signature>"` can travel in a cookie value as-is.
pub struct Signer {
    mac: HmacSha256,
}

impl Signer {
    /// Creates a signer from the server secret.
    ///
    /// # Arguments
    ///
    /// * `secret` - The signing secret (32 bytes, validated by `Config`).
    ///
    /// # Returns
    ///
    /// A `Result` containing the `Signer`.
    pub fn new(secret: &[u8]) -> Result<Self> {
        let mac = HmacSha256::new_from_slice(secret)
            .map_err(|e| AppError::Internal(format!("Invalid signing secret: {}", e)))?;
        Ok(Self { mac })
    }

    /// Computes the HMAC-SHA256 signature of a session id, URL-safe
    /// base64-encoded without padding.
    pub fn sign(&self, id: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(id.as_bytes());
        general_purpose::URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
    }

    /// Recomputes the signature for `id` and compares it to `signature`.
    ///
    /// Never errors on malformed input; anything that does not match is
    /// simply `false`. Comparison is plain string equality.
    pub fn verify(&self, id: &str, signature: &str) -> bool {
        self.sign(id) == signature
    }
}
