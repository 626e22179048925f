//! Webhook Signature Verification
//!
//! Authenticates identity-provider (Clerk, delivered through Svix) webhooks.
//!
//! # Protocol
//!
//! - Signed message: `{event_id}.{timestamp}.{raw payload}`
//! - Key: the configured secret with an optional `whsec_` prefix removed,
//!   base64-decoded
//! - Signature: base64(HMAC-SHA256(key, message))
//! - Header: space-separated `v1,<base64>` tokens; any matching `v1` token
//!   authenticates the event
//!
//! # Security
//!
//! - Events whose timestamp is more than the tolerance (300s by default) away
//!   from the local clock are rejected, in both directions
//! - Signatures are compared in constant time
//! - Verification never errors: every failure is reduced to `false` and
//!   logged as a security event

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use shared::WebhookConfig;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::{debug, warn};

type HmacSha256 = Hmac<Sha256>;

/// Prefix carried by Svix signing secrets
const SECRET_PREFIX: &str = "whsec_";

/// The only signature scheme accepted in the signature header
const SIGNATURE_SCHEME: &str = "v1";

/// Reason a webhook failed verification
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationFailure {
    #[error("webhook signing secret is not configured")]
    SecretNotConfigured,

    #[error("timestamp is not an integer number of seconds")]
    InvalidTimestamp,

    #[error("timestamp is {skew_secs}s away from the local clock")]
    TimestampOutOfTolerance { skew_secs: u64 },

    #[error("signing secret is not valid base64")]
    InvalidSecret,

    #[error("signature header contains no scheme,signature token")]
    MalformedHeader,

    #[error("no v1 signature matched")]
    NoMatchingSignature,
}

impl VerificationFailure {
    /// Stable label for metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SecretNotConfigured => "secret_not_configured",
            Self::InvalidTimestamp => "invalid_timestamp",
            Self::TimestampOutOfTolerance { .. } => "stale_timestamp",
            Self::InvalidSecret => "invalid_secret",
            Self::MalformedHeader => "malformed_header",
            Self::NoMatchingSignature => "signature_mismatch",
        }
    }
}

/// Verifier for signed identity-provider webhooks
///
/// Holds only read-only configuration, so one instance is shared by all
/// request workers.
#[derive(Debug, Clone)]
pub struct WebhookVerifier {
    secret: Option<String>,
    tolerance_secs: u64,
}

impl WebhookVerifier {
    /// Create a verifier from a raw secret and a replay window in seconds
    pub fn new(secret: Option<String>, tolerance_secs: i64) -> Self {
        Self {
            secret: secret.filter(|s| !s.trim().is_empty()),
            tolerance_secs: tolerance_secs.max(0).unsigned_abs(),
        }
    }

    /// Create a verifier from the application configuration
    pub fn from_config(config: &WebhookConfig) -> Self {
        Self::new(config.signing_secret.clone(), config.tolerance_secs)
    }

    /// Whether a signing secret is available
    pub fn is_configured(&self) -> bool {
        self.secret.is_some()
    }

    /// Verify an event against the current wall clock
    pub fn verify(
        &self,
        event_id: &str,
        timestamp: &str,
        signature_header: &str,
        payload: &[u8],
    ) -> bool {
        self.verify_at(
            Utc::now().timestamp(),
            event_id,
            timestamp,
            signature_header,
            payload,
        )
    }

    /// Verify an event against an explicit "now" (seconds since epoch)
    pub fn verify_at(
        &self,
        now: i64,
        event_id: &str,
        timestamp: &str,
        signature_header: &str,
        payload: &[u8],
    ) -> bool {
        match self.check_at(now, event_id, timestamp, signature_header, payload) {
            Ok(()) => {
                debug!(event_id = %event_id, "Webhook signature verified");
                metrics::counter!("webhook_verifications_total", "result" => "verified")
                    .increment(1);
                true
            }
            Err(failure) => {
                warn!(
                    event_id = %event_id,
                    reason = %failure,
                    "Webhook signature verification failed"
                );
                metrics::counter!("webhook_verifications_total", "result" => failure.as_str())
                    .increment(1);
                false
            }
        }
    }

    /// Run every verification step and report the first failure
    pub fn check_at(
        &self,
        now: i64,
        event_id: &str,
        timestamp: &str,
        signature_header: &str,
        payload: &[u8],
    ) -> Result<(), VerificationFailure> {
        let secret = self
            .secret
            .as_deref()
            .ok_or(VerificationFailure::SecretNotConfigured)?;

        let sent_at: i64 = timestamp
            .parse()
            .map_err(|_| VerificationFailure::InvalidTimestamp)?;

        let skew_secs = now.abs_diff(sent_at);
        if skew_secs > self.tolerance_secs {
            return Err(VerificationFailure::TimestampOutOfTolerance { skew_secs });
        }

        let expected = compute_signature(secret, event_id, timestamp, payload)?;

        let mut saw_token = false;
        for token in signature_header.split(' ').filter(|t| !t.is_empty()) {
            let Some((scheme, provided)) = token.split_once(',') else {
                continue;
            };
            saw_token = true;

            if scheme != SIGNATURE_SCHEME {
                continue;
            }

            // Slice ct_eq returns false on length mismatch without inspecting contents
            if bool::from(expected.as_bytes().ct_eq(provided.as_bytes())) {
                return Ok(());
            }
        }

        if saw_token {
            Err(VerificationFailure::NoMatchingSignature)
        } else {
            Err(VerificationFailure::MalformedHeader)
        }
    }

    /// Produce a `v1,<base64>` header token for an event
    ///
    /// Used by tooling and tests that need to emit correctly signed events.
    pub fn sign(&self, event_id: &str, timestamp: &str, payload: &[u8]) -> Option<String> {
        let secret = self.secret.as_deref()?;
        compute_signature(secret, event_id, timestamp, payload)
            .ok()
            .map(|sig| format!("{},{}", SIGNATURE_SCHEME, sig))
    }
}

/// Derive the key from the configured secret and compute the base64 HMAC
fn compute_signature(
    secret: &str,
    event_id: &str,
    timestamp: &str,
    payload: &[u8],
) -> Result<String, VerificationFailure> {
    let encoded_key = secret.strip_prefix(SECRET_PREFIX).unwrap_or(secret);
    let key = STANDARD
        .decode(encoded_key)
        .map_err(|_| VerificationFailure::InvalidSecret)?;

    let mut mac =
        HmacSha256::new_from_slice(&key).map_err(|_| VerificationFailure::InvalidSecret)?;
    mac.update(event_id.as_bytes());
    mac.update(b".");
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);

    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}
