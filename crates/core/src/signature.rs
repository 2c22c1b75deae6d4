use std::sync::Arc;

use hmac::{Hmac, Mac};
use sha1::Sha1;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::types::InboundRequest;

pub const SIGNATURE_HEADER: &str = "X-Hub-Signature";
const SIGNATURE_PREFIX: &str = "sha1=";

type HmacSha1 = Hmac<Sha1>;

/// Reasons a delivery fails authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("missing X-Hub-Signature header")]
    Missing,
    #[error("signature mismatch")]
    Mismatch,
}

/// Checks `X-Hub-Signature` values against an HMAC-SHA1 of the raw body.
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: Arc<[u8]>,
}

impl SignatureVerifier {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: Arc::from(secret.as_ref()),
        }
    }

    /// Computes the `sha1=<lowercase hex>` tag GitHub sends for `body`.
    pub fn sign(&self, body: &[u8]) -> Result<String, SignatureError> {
        // HMAC accepts keys of any length, so this never fails in practice.
        let mut mac =
            HmacSha1::new_from_slice(&self.secret).map_err(|_| SignatureError::Mismatch)?;
        mac.update(body);
        let digest = mac.finalize().into_bytes();
        Ok(format!("{SIGNATURE_PREFIX}{}", hex::encode(digest)))
    }

    /// Verifies `provided` against the tag computed over `body`.
    ///
    /// The comparison runs in constant time with respect to the position of
    /// the first differing byte.
    pub fn verify(&self, provided: Option<&str>, body: &[u8]) -> Result<(), SignatureError> {
        let provided = provided.ok_or(SignatureError::Missing)?;
        let expected = self.sign(body)?;

        if expected.as_bytes().ct_eq(provided.as_bytes()).into() {
            Ok(())
        } else {
            Err(SignatureError::Mismatch)
        }
    }

    pub fn verify_request(&self, request: &InboundRequest) -> Result<(), SignatureError> {
        self.verify(request.headers().get(SIGNATURE_HEADER), request.body())
    }
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("secret", &"<redacted>")
            .finish()
    }
}
