//! Request signing, shaped after AWS SigV4-style string-to-sign/HMAC
//! signing without being bit-exact to any one vendor (spec §1 Non-goals,
//! §6 Wire).

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Holds one bucket's (or the default) access key pair and signs requests.
pub struct Signer {
    access_key_id: String,
    secret_access_key: String,
}

impl Signer {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Signer {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
        }
    }

    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    /// `HMAC-SHA256(secret, string_to_sign)`, hex-encoded, matching the
    /// canonical `method\nresource\ndate` string-to-sign shape of QingStor's
    /// signer, generalized away from any single vendor's exact canonicalization.
    pub fn sign(&self, method: &str, resource: &str, date_header: &str) -> String {
        let string_to_sign = format!("{method}\n\n\n{date_header}\n{resource}");
        let mut mac = HmacSha256::new_from_slice(self.secret_access_key.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(string_to_sign.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    pub fn authorization_header(&self, method: &str, resource: &str, date_header: &str) -> String {
        let signature = self.sign(method, resource, date_header);
        format!("QS {}:{}", self.access_key_id, signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_deterministic_for_same_inputs() {
        let signer = Signer::new("AKID", "secret");
        let a = signer.sign("GET", "/bucket/key", "Wed, 01 Jan 2025 00:00:00 GMT");
        let b = signer.sign("GET", "/bucket/key", "Wed, 01 Jan 2025 00:00:00 GMT");
        assert_eq!(a, b);
    }

    #[test]
    fn signature_changes_with_resource() {
        let signer = Signer::new("AKID", "secret");
        let a = signer.sign("GET", "/bucket/key1", "date");
        let b = signer.sign("GET", "/bucket/key2", "date");
        assert_ne!(a, b);
    }
}
