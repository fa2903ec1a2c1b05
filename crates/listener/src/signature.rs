//! Webhook signature verification.
//!
//! GitHub signs each delivery with an HMAC of the raw body keyed by the
//! webhook secret. Two headers carry it:
//!
//! - `X-Hub-Signature`: `sha1=<hex>`
//! - `X-Hub-Signature-256`: `sha256=<hex>`
//!
//! When both are present the SHA-256 one is checked. Comparison uses
//! [`Mac::verify_slice`], which is constant-time.

use axum::body::Bytes;
use hmac::{Hmac, Mac};
use reconcile::DeliveryId;
use sha1::Sha1;
use sha2::Sha256;

type HmacSha1 = Hmac<Sha1>;
type HmacSha256 = Hmac<Sha256>;

/// Digest named by a signature header prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    Sha1,
    Sha256,
}

impl SignatureAlgorithm {
    pub fn prefix(self) -> &'static str {
        match self {
            SignatureAlgorithm::Sha1 => "sha1=",
            SignatureAlgorithm::Sha256 => "sha256=",
        }
    }
}

/// An inbound request as the verifier sees it.
#[derive(Debug, Clone, Default)]
pub struct InboundDelivery {
    pub payload: Bytes,
    /// The preferred signature header value; empty when none was sent.
    pub signature_header: String,
    /// `X-GitHub-Delivery`; empty when absent.
    pub delivery_id: String,
}

/// Result of [`verify_delivery`].
#[derive(Debug, Clone)]
pub struct Verification {
    pub valid: bool,
    pub delivery_id: DeliveryId,
    pub payload: Bytes,
}

/// Checks `delivery` against `secret`.
///
/// The payload is handed back untouched; it is only meaningful when `valid`.
pub fn verify_delivery(delivery: InboundDelivery, secret: &[u8]) -> Verification {
    let valid = verify_signature(&delivery.payload, &delivery.signature_header, secret);
    Verification {
        valid,
        delivery_id: DeliveryId::new(delivery.delivery_id),
        payload: delivery.payload,
    }
}

/// Splits `sha1=<hex>` or `sha256=<hex>` into the algorithm and raw bytes.
///
/// Returns `None` for an unknown prefix or malformed hex.
pub fn parse_signature_header(header: &str) -> Option<(SignatureAlgorithm, Vec<u8>)> {
    let (algorithm, hex_part) = if let Some(rest) = header.strip_prefix("sha256=") {
        (SignatureAlgorithm::Sha256, rest)
    } else if let Some(rest) = header.strip_prefix("sha1=") {
        (SignatureAlgorithm::Sha1, rest)
    } else {
        return None;
    };
    hex::decode(hex_part).ok().map(|bytes| (algorithm, bytes))
}

/// Verifies `header` against the HMAC of `payload`.
///
/// Malformed headers are a mismatch, never a panic.
pub fn verify_signature(payload: &[u8], header: &str, secret: &[u8]) -> bool {
    let Some((algorithm, expected)) = parse_signature_header(header) else {
        return false;
    };

    match algorithm {
        SignatureAlgorithm::Sha1 => match HmacSha1::new_from_slice(secret) {
            Ok(mut mac) => {
                mac.update(payload);
                mac.verify_slice(&expected).is_ok()
            }
            Err(_) => false,
        },
        SignatureAlgorithm::Sha256 => match HmacSha256::new_from_slice(secret) {
            Ok(mut mac) => {
                mac.update(payload);
                mac.verify_slice(&expected).is_ok()
            }
            Err(_) => false,
        },
    }
}

/// Computes the HMAC GitHub would send for `payload`.
///
/// HMAC accepts keys of any length, so this only returns `None` if the
/// underlying crate ever starts rejecting one.
pub fn compute_signature(
    algorithm: SignatureAlgorithm,
    payload: &[u8],
    secret: &[u8],
) -> Option<Vec<u8>> {
    match algorithm {
        SignatureAlgorithm::Sha1 => {
            let mut mac = HmacSha1::new_from_slice(secret).ok()?;
            mac.update(payload);
            Some(mac.finalize().into_bytes().to_vec())
        }
        SignatureAlgorithm::Sha256 => {
            let mut mac = HmacSha256::new_from_slice(secret).ok()?;
            mac.update(payload);
            Some(mac.finalize().into_bytes().to_vec())
        }
    }
}

/// Formats raw signature bytes as a header value.
pub fn format_signature_header(algorithm: SignatureAlgorithm, signature: &[u8]) -> String {
    format!("{}{}", algorithm.prefix(), hex::encode(signature))
}
