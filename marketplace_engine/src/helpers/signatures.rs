//! HMAC-SHA256 signature checks for inbound webhooks.
//!
//! Gateways disagree on the envelope:
//! * Stripe sends `Stripe-Signature: t=<unix time>,v1=<hex hmac of "t.body">` (several `v1` entries are allowed).
//! * PayPal (via the gateway sidecar) and PayTabs send a hex HMAC of the raw body.
//! * AfterShip sends a base64 HMAC of the raw body in `aftership-hmac-sha256`.
//!
//! All comparisons go through [`Mac::verify_slice`], which is constant time.
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const STRIPE_TIMESTAMP_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("No signature was provided")]
    Missing,
    #[error("The signature header is malformed. {0}")]
    Malformed(String),
    #[error("The signature does not match the payload")]
    Mismatch,
    #[error("The signature timestamp is outside the allowed tolerance")]
    Expired,
}

fn mac_for(secret: &str, data: &[u8]) -> Result<HmacSha256, SignatureError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|e| SignatureError::Malformed(e.to_string()))?;
    mac.update(data);
    Ok(mac)
}

fn verify_raw(secret: &str, data: &[u8], signature: &[u8]) -> Result<(), SignatureError> {
    mac_for(secret, data)?.verify_slice(signature).map_err(|_| SignatureError::Mismatch)
}

pub fn sign_hex(secret: &str, data: &[u8]) -> Result<String, SignatureError> {
    Ok(hex::encode(mac_for(secret, data)?.finalize().into_bytes()))
}

pub fn sign_base64(secret: &str, data: &[u8]) -> Result<String, SignatureError> {
    Ok(base64::encode(mac_for(secret, data)?.finalize().into_bytes()))
}

/// Produces a complete `Stripe-Signature` header value.
pub fn sign_stripe_payload(secret: &str, timestamp: i64, body: &[u8]) -> Result<String, SignatureError> {
    let mut signed = format!("{timestamp}.").into_bytes();
    signed.extend_from_slice(body);
    Ok(format!("t={timestamp},v1={}", sign_hex(secret, &signed)?))
}

pub fn verify_hex_signature(secret: &str, data: &[u8], signature: Option<&str>) -> Result<(), SignatureError> {
    let signature = signature.map(str::trim).filter(|s| !s.is_empty()).ok_or(SignatureError::Missing)?;
    let bytes = hex::decode(signature).map_err(|e| SignatureError::Malformed(e.to_string()))?;
    verify_raw(secret, data, &bytes)
}

pub fn verify_base64_signature(secret: &str, data: &[u8], signature: Option<&str>) -> Result<(), SignatureError> {
    let signature = signature.map(str::trim).filter(|s| !s.is_empty()).ok_or(SignatureError::Missing)?;
    let bytes = base64::decode(signature).map_err(|e| SignatureError::Malformed(e.to_string()))?;
    verify_raw(secret, data, &bytes)
}

pub fn verify_stripe_signature(
    secret: &str,
    header: Option<&str>,
    body: &[u8],
    now: i64,
) -> Result<(), SignatureError> {
    let header = header.map(str::trim).filter(|s| !s.is_empty()).ok_or(SignatureError::Missing)?;
    let mut timestamp = None;
    let mut candidates = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", t)) => {
                let t = t.parse::<i64>().map_err(|e| SignatureError::Malformed(format!("bad timestamp: {e}")))?;
                timestamp = Some(t);
            },
            Some(("v1", sig)) => candidates.push(sig),
            // v0 and unknown schemes are ignored
            Some(_) => {},
            None => return Err(SignatureError::Malformed(format!("unexpected element '{part}'"))),
        }
    }
    let timestamp = timestamp.ok_or_else(|| SignatureError::Malformed("no timestamp".into()))?;
    if candidates.is_empty() {
        return Err(SignatureError::Malformed("no v1 signature".into()));
    }
    if (now - timestamp).abs() > STRIPE_TIMESTAMP_TOLERANCE_SECS {
        return Err(SignatureError::Expired);
    }
    let mut signed = format!("{timestamp}.").into_bytes();
    signed.extend_from_slice(body);
    let matched = candidates.into_iter().any(|sig| verify_hex_signature(secret, &signed, Some(sig)).is_ok());
    if matched {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}
