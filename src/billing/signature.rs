use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::BillingError;

type HmacSha256 = Hmac<Sha256>;

/// Hex HMAC-SHA256 of `"{timestamp}.{payload}"`, as Stripe signs webhooks.
pub fn compute_signature(secret: &str, timestamp: i64, payload: &[u8]) -> Result<String, BillingError> {
    let mac = signed_payload_mac(secret, timestamp, payload)?;
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn signed_payload_mac(secret: &str, timestamp: i64, payload: &[u8]) -> Result<HmacSha256, BillingError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| BillingError::InvalidSignature)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

/// Checks a `Stripe-Signature` header (`t=<unix>,v1=<hex>[,v1=<hex>..]`)
/// against the raw request body. Any `v1` entry may match; the timestamp
/// must lie within `tolerance_secs` of `now`.
pub fn verify_signature(
    secret: &str,
    header: &str,
    payload: &[u8],
    tolerance_secs: i64,
    now: i64,
) -> Result<(), BillingError> {
    let mut timestamp = None;
    let mut candidates = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => candidates.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(BillingError::InvalidSignature)?;
    let tolerance = u64::try_from(tolerance_secs).unwrap_or(0);
    let within_tolerance = now
        .checked_sub(timestamp)
        .map(i64::unsigned_abs)
        .is_some_and(|skew| skew <= tolerance);
    if candidates.is_empty() || !within_tolerance {
        return Err(BillingError::InvalidSignature);
    }

    let mac = signed_payload_mac(secret, timestamp, payload)?;
    let matched = candidates
        .into_iter()
        .filter_map(|candidate| hex::decode(candidate).ok())
        .any(|expected| mac.clone().verify_slice(&expected).is_ok());

    if matched {
        Ok(())
    } else {
        Err(BillingError::InvalidSignature)
    }
}
