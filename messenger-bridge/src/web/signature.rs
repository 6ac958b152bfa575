//! Webhook signature verification.
//!
//! The platform signs every callback body with the app secret and sends the
//! result as `x-hub-signature: sha1=<hex>`. Newer deliveries also carry
//! `x-hub-signature-256: sha256=<hex>`, which is preferred when present.
//! Reference: https://developers.facebook.com/docs/graph-api/webhooks/getting-started#validate-payloads

use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::Sha256;
use thiserror::Error;
use tracing::warn;

type HmacSha1 = Hmac<Sha1>;
type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-hub-signature";
pub const SIGNATURE_256_HEADER: &str = "x-hub-signature-256";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signature header missing")]
    Missing,

    #[error("signature header malformed")]
    Malformed,

    #[error("unsupported signature method {0:?}")]
    UnsupportedMethod(String),

    #[error("signature mismatch")]
    Mismatch,
}

/// Verify the signature headers of a webhook request against its raw body.
pub fn verify_request_signature(
    app_secret: &str,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<(), SignatureError> {
    let header = headers
        .get(SIGNATURE_256_HEADER)
        .or_else(|| headers.get(SIGNATURE_HEADER))
        .ok_or(SignatureError::Missing)?
        .to_str()
        .map_err(|_| SignatureError::Malformed)?;

    verify_signature(app_secret, body, header)
}

/// Verify a single `method=hexdigest` signature value.
///
/// The comparison runs in constant time.
pub fn verify_signature(app_secret: &str, body: &[u8], header: &str) -> Result<(), SignatureError> {
    let (method, digest) = header
        .trim()
        .split_once('=')
        .ok_or(SignatureError::Malformed)?;

    let expected = hex::decode(digest).map_err(|_| SignatureError::Malformed)?;

    let verified = match method.to_ascii_lowercase().as_str() {
        "sha1" => {
            let mut mac = HmacSha1::new_from_slice(app_secret.as_bytes())
                .map_err(|_| SignatureError::Mismatch)?;
            mac.update(body);
            mac.verify_slice(&expected).is_ok()
        }
        "sha256" => {
            let mut mac = HmacSha256::new_from_slice(app_secret.as_bytes())
                .map_err(|_| SignatureError::Mismatch)?;
            mac.update(body);
            mac.verify_slice(&expected).is_ok()
        }
        other => {
            warn!(method = %other, "webhook_signature_unsupported_method");
            return Err(SignatureError::UnsupportedMethod(other.to_string()));
        }
    };

    if !verified {
        warn!(
            method = %method,
            body_length = body.len(),
            "webhook_signature_mismatch"
        );
        return Err(SignatureError::Mismatch);
    }

    Ok(())
}

/// Header value the platform would send for `body`: `sha1=` + hex digest.
#[cfg(test)]
pub(crate) fn sign_sha1(app_secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha1::new_from_slice(app_secret.as_bytes()).unwrap();
    mac.update(body);
    format!("sha1={}", hex::encode(mac.finalize().into_bytes()))
}
