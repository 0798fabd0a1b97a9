//! Stripe webhook signature verification.
//!
//! Implements Stripe's scheme:
//! <https://docs.stripe.com/webhooks#verify-manually>
//!
//! The `Stripe-Signature` header looks like `t=1492774577,v1=5257a8...,v1=...`.
//! Each `v1` value is a hex HMAC-SHA256 of `"{t}.{raw body}"` keyed with the
//! endpoint secret (including its `whsec_` prefix). Several `v1` entries
//! appear while a secret is being rolled; any match is accepted.

use std::time::Duration;

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use thiserror::Error;

/// Header carrying the signature.
pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Maximum accepted age of a signed payload.
pub const DEFAULT_TOLERANCE: Duration = Duration::from_secs(300);

/// Why a webhook payload was rejected.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SignatureError {
    /// The request carried no signature header.
    #[error("missing Stripe-Signature header")]
    MissingHeader,

    /// The header has no parseable timestamp.
    #[error("malformed Stripe-Signature header")]
    MalformedHeader,

    /// The header has no `v1` signature.
    #[error("no v1 signature found in header")]
    NoSignatures,

    /// The signed timestamp is too far from now.
    #[error("timestamp outside the tolerance zone")]
    TimestampOutsideTolerance,

    /// No signature matched the payload.
    #[error("no signatures found matching the expected signature for payload")]
    Mismatch,

    /// The payload is not a valid event envelope.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

struct SignedHeader<'a> {
    timestamp: i64,
    signatures: Vec<&'a str>,
}

/// Verify `payload` against the `Stripe-Signature` header value at the current time.
///
/// # Errors
///
/// Returns `SignatureError` if the header is malformed, the timestamp is
/// outside `tolerance`, or no signature matches.
pub fn verify(
    payload: &[u8],
    header: &str,
    secret: &SecretString,
    tolerance: Duration,
) -> Result<(), SignatureError> {
    verify_at(
        payload,
        header,
        secret,
        tolerance,
        chrono::Utc::now().timestamp(),
    )
}

/// Verify `payload` as of the unix time `now`.
///
/// # Errors
///
/// See [`verify`].
pub fn verify_at(
    payload: &[u8],
    header: &str,
    secret: &SecretString,
    tolerance: Duration,
    now: i64,
) -> Result<(), SignatureError> {
    let signed = parse_header(header)?;

    let tolerance = i64::try_from(tolerance.as_secs()).unwrap_or(i64::MAX);
    if now.saturating_sub(signed.timestamp).abs() > tolerance {
        return Err(SignatureError::TimestampOutsideTolerance);
    }

    let expected = compute_signature(signed.timestamp, payload, secret.expose_secret());
    if signed
        .signatures
        .iter()
        .any(|candidate| constant_time_compare(&expected, candidate))
    {
        tracing::debug!("Stripe signature verified");
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// Build a header value signing `payload` at `timestamp`.
///
/// Produces what Stripe would send; used to drive the webhook in tests and
/// local tooling.
#[must_use]
pub fn signature_header(payload: &[u8], secret: &str, timestamp: i64) -> String {
    format!(
        "t={timestamp},v1={}",
        compute_signature(timestamp, payload, secret)
    )
}

fn parse_header(header: &str) -> Result<SignedHeader<'_>, SignatureError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => {
                timestamp = Some(
                    value
                        .parse::<i64>()
                        .map_err(|_| SignatureError::MalformedHeader)?,
                );
            }
            "v1" => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::MalformedHeader)?;
    if signatures.is_empty() {
        return Err(SignatureError::NoSignatures);
    }
    Ok(SignedHeader {
        timestamp,
        signatures,
    })
}

fn compute_signature(timestamp: i64, payload: &[u8], secret: &str) -> String {
    // HMAC accepts keys of any length
    let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("HMAC key of any length is valid"));
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time string comparison to prevent timing attacks.
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }

    result == 0
}
