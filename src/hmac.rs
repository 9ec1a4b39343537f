//! Keyed HMAC signing for auth hooks.

use ::hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Signs and verifies request content with HMAC-SHA-256.
///
/// The public key identifies the client; the secret is the shared signing
/// key looked up from it. Clients send a hex signature of an agreed content
/// string (the demo HMAC scheme signs the absolute request URI concatenated
/// with the public key).
pub struct HmacSigner {
    public_key: String,
    secret: String,
}

impl HmacSigner {
    pub fn new(public_key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self { public_key: public_key.into(), secret: secret.into() }
    }

    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    /// Hex HMAC-SHA-256 signature of `content` under the secret.
    pub fn signature(&self, content: &str) -> String {
        hex::encode(self.mac(content).finalize().into_bytes())
    }

    /// Constant-time comparison of a presented hex signature.
    pub fn verify(&self, content: &str, presented: &str) -> bool {
        let Ok(raw) = hex::decode(presented) else {
            return false;
        };
        self.mac(content).verify_slice(&raw).is_ok()
    }

    fn mac(&self, content: &str) -> HmacSha256 {
        // HMAC accepts keys of any length.
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC key of any length");
        mac.update(content.as_bytes());
        mac
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_round_trips() {
        let signer = HmacSigner::new("pk_123", "super-secret");
        let sig = signer.signature("https://api.example.com/v1/thing pk_123");
        assert!(signer.verify("https://api.example.com/v1/thing pk_123", &sig));
    }

    #[test]
    fn wrong_content_or_signature_fails() {
        let signer = HmacSigner::new("pk_123", "super-secret");
        let sig = signer.signature("content-a");
        assert!(!signer.verify("content-b", &sig));
        assert!(!signer.verify("content-a", "deadbeef"));
        assert!(!signer.verify("content-a", "not-hex!"));
    }

    #[test]
    fn different_secrets_differ() {
        let a = HmacSigner::new("pk", "secret-a");
        let b = HmacSigner::new("pk", "secret-b");
        assert_ne!(a.signature("x"), b.signature("x"));
    }
}
