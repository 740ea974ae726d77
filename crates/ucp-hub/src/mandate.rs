//! Payment mandates: signed, time- and amount-scoped authorization tokens.
//!
//! # Token Format
//!
//! ```text
//! token   = b64url(header) "." b64url(payload) "." b64url(signature)
//! header  = {"alg":"EdDSA","kid":<key_id>,"typ":"JWT"}            (JCS)
//! payload = {"amount","currency","expires_at","handler","issued_at"} (JCS)
//! signature = ed25519(b64url(header) "." b64url(payload))
//! ```
//!
//! The payload carries exactly the scope tuple and its validity window, so
//! a holder can verify it with the issuer's public key alone.

use std::fmt;
use std::time::Duration;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD as B64URL, Engine};
use chrono::{DateTime, TimeZone, Utc};
use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};

use crate::canonicalize::to_canonical_jcs_bytes;
use crate::currency::Currency;
use crate::error::{HubError, HubResult};
use crate::signer::{compute_key_id_from_key, verify_signature, Signer};

const MANDATE_ALG: &str = "EdDSA";
const MANDATE_TYP: &str = "JWT";

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct MandateHeader {
    alg: String,
    kid: String,
    typ: String,
}

/// Signed mandate payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MandatePayload {
    pub handler: String,

    /// Fixed-point decimal in the currency's minor-unit precision.
    pub amount: String,

    /// ISO 4217 code.
    pub currency: String,

    /// Unix seconds.
    pub issued_at: i64,

    /// Unix seconds; the mandate is valid strictly before this instant.
    pub expires_at: i64,
}

/// An issued mandate.
#[derive(Clone, Serialize)]
pub struct PaymentMandate {
    pub handler: String,
    pub amount_minor: i64,
    pub currency: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub key_id: String,
    token: String,
}

impl fmt::Debug for PaymentMandate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaymentMandate")
            .field("handler", &self.handler)
            .field("amount_minor", &self.amount_minor)
            .field("currency", &self.currency)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .field("key_id", &self.key_id)
            .field("token", &"<redacted>")
            .finish()
    }
}

impl PaymentMandate {
    /// Self-contained bearer token.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Amount as a decimal string ("10.00").
    pub fn amount(&self) -> String {
        Currency::from_code(&self.currency)
            .map(|c| c.format_amount(self.amount_minor))
            .unwrap_or_else(|_| self.amount_minor.to_string())
    }
}

impl Signer {
    /// Issue a mandate for one (handler, amount, currency) tuple.
    pub fn issue_mandate(
        &self,
        handler: &str,
        amount_minor: i64,
        currency: &str,
        ttl: Duration,
    ) -> HubResult<PaymentMandate> {
        self.issue_mandate_at(handler, amount_minor, currency, ttl, Utc::now())
    }

    pub(crate) fn issue_mandate_at(
        &self,
        handler: &str,
        amount_minor: i64,
        currency: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> HubResult<PaymentMandate> {
        let handler = handler.trim();
        if handler.is_empty() {
            return Err(HubError::InvalidArguments {
                name: "issue_mandate".to_string(),
                message: "payment handler must not be empty".to_string(),
            });
        }
        if amount_minor <= 0 {
            return Err(HubError::InvalidAmount {
                message: format!("amount must be positive, got {amount_minor} minor units"),
            });
        }
        let currency = Currency::from_code(currency)?;
        let ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        if ttl_secs == 0 {
            return Err(HubError::InvalidArguments {
                name: "issue_mandate".to_string(),
                message: "mandate ttl must be at least one second".to_string(),
            });
        }

        let issued_at = now.timestamp();
        let expires_at = issued_at.saturating_add(ttl_secs);
        let payload = MandatePayload {
            handler: handler.to_string(),
            amount: currency.format_amount(amount_minor),
            currency: currency.code().to_string(),
            issued_at,
            expires_at,
        };
        let header = MandateHeader {
            alg: MANDATE_ALG.to_string(),
            kid: self.key_id().to_string(),
            typ: MANDATE_TYP.to_string(),
        };

        let signing_input = format!("{}.{}", encode_segment(&header)?, encode_segment(&payload)?);
        let signature = self.sign(signing_input.as_bytes());

        tracing::info!(
            handler = %payload.handler,
            amount = %payload.amount,
            currency = %payload.currency,
            expires_at,
            "issued payment mandate"
        );

        Ok(PaymentMandate {
            handler: payload.handler,
            amount_minor,
            currency: payload.currency,
            issued_at: timestamp(issued_at)?,
            expires_at: timestamp(expires_at)?,
            key_id: header.kid,
            token: format!("{signing_input}.{signature}"),
        })
    }
}

fn encode_segment<T: Serialize>(value: &T) -> HubResult<String> {
    let bytes = to_canonical_jcs_bytes(value).map_err(|e| HubError::KeyMaterial {
        message: format!("failed to canonicalize mandate: {}", e),
    })?;
    Ok(B64URL.encode(bytes))
}

fn timestamp(secs: i64) -> HubResult<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| HubError::InvalidArguments {
            name: "issue_mandate".to_string(),
            message: format!("timestamp {secs} out of range"),
        })
}

/// Verifies mandates against one issuer key.
#[derive(Debug, Clone)]
pub struct MandateVerifier {
    key: VerifyingKey,
    key_id: String,
}

impl MandateVerifier {
    pub fn new(key: VerifyingKey) -> HubResult<Self> {
        let key_id = compute_key_id_from_key(&key)?;
        Ok(Self { key, key_id })
    }

    /// Verify signature and expiry at the current time.
    pub fn verify(&self, token: &str) -> HubResult<MandatePayload> {
        self.verify_at(token, Utc::now())
    }

    /// Verify signature, then expiry at `now`.
    ///
    /// Any payload byte change breaks the signature; a valid signature does
    /// not rescue an expired mandate.
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> HubResult<MandatePayload> {
        let malformed = |reason: &str| HubError::SignatureInvalid {
            reason: format!("malformed mandate: {reason}"),
        };

        let mut parts = token.split('.');
        let (header_b64, payload_b64, signature_b64) =
            match (parts.next(), parts.next(), parts.next(), parts.next()) {
                (Some(h), Some(p), Some(s), None) => (h, p, s),
                _ => return Err(malformed("expected three segments")),
            };

        let header: MandateHeader = decode_segment(header_b64).map_err(|e| malformed(&e))?;
        if header.alg != MANDATE_ALG {
            return Err(malformed(&format!("unsupported alg {}", header.alg)));
        }
        if header.kid != self.key_id {
            return Err(HubError::SignatureInvalid {
                reason: format!(
                    "key_id mismatch: token {}, verifier {}",
                    header.kid, self.key_id
                ),
            });
        }

        let signing_input = format!("{header_b64}.{payload_b64}");
        verify_signature(&self.key, signing_input.as_bytes(), signature_b64)?;

        let payload: MandatePayload = decode_segment(payload_b64).map_err(|e| malformed(&e))?;
        if payload.expires_at <= payload.issued_at {
            return Err(malformed("expires_at is not after issued_at"));
        }
        if now.timestamp() >= payload.expires_at {
            return Err(HubError::MandateExpired {
                expires_at: payload.expires_at,
            });
        }

        Ok(payload)
    }

    /// Verify, then require the mandate to cover exactly this tuple.
    pub fn verify_for(
        &self,
        token: &str,
        handler: &str,
        amount_minor: i64,
        currency: &str,
    ) -> HubResult<MandatePayload> {
        self.verify_for_at(token, handler, amount_minor, currency, Utc::now())
    }

    pub fn verify_for_at(
        &self,
        token: &str,
        handler: &str,
        amount_minor: i64,
        currency: &str,
        now: DateTime<Utc>,
    ) -> HubResult<MandatePayload> {
        let payload = self.verify_at(token, now)?;
        let expected_currency = Currency::from_code(currency)?;

        if payload.handler != handler.trim() {
            return Err(HubError::MandateScopeMismatch {
                message: format!("handler {} != {}", payload.handler, handler),
            });
        }
        if payload.currency != expected_currency.code() {
            return Err(HubError::MandateScopeMismatch {
                message: format!("currency {} != {}", payload.currency, expected_currency.code()),
            });
        }
        let signed_minor = expected_currency.parse_amount(&payload.amount)?;
        if signed_minor != amount_minor {
            return Err(HubError::MandateScopeMismatch {
                message: format!(
                    "amount {} != {}",
                    payload.amount,
                    expected_currency.format_amount(amount_minor)
                ),
            });
        }

        Ok(payload)
    }
}

fn decode_segment<T: for<'de> Deserialize<'de>>(segment: &str) -> Result<T, String> {
    let bytes = B64URL
        .decode(segment)
        .map_err(|e| format!("invalid base64url: {e}"))?;
    serde_json::from_slice(&bytes).map_err(|e| format!("invalid json: {e}"))
}
