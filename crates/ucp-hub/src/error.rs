//! Error types for the hub.

use serde::Serialize;

/// Hub errors.
///
/// Every failure that reaches the orchestration layer is one of these. Signature
/// and idempotency failures always keep their own variant.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// Manifest unreachable, malformed or oversized.
    #[error("discovery failed for {endpoint}: {message}")]
    Discovery { endpoint: String, message: String },

    /// Capability name was never discovered.
    #[error("unknown capability: {name}")]
    UnknownCapability { name: String },

    /// Endpoint violates the transport security policy.
    #[error("insecure endpoint {endpoint}: {reason}")]
    InsecureEndpoint { endpoint: String, reason: String },

    /// Merchant answered with a 4xx.
    #[error("merchant rejected request (HTTP {status})")]
    MerchantRejected {
        status: u16,
        payload: Option<serde_json::Value>,
    },

    /// Merchant refused the idempotency key (409 Conflict).
    #[error("idempotency conflict: merchant refused the idempotency key")]
    IdempotencyConflict {
        idempotency_key: String,
        payload: Option<serde_json::Value>,
    },

    /// 5xx or transport failure after all retries.
    #[error("upstream unavailable after {attempts} attempt(s): {message}")]
    UpstreamUnavailable { attempts: u32, message: String },

    /// Mandate amount is zero, negative or unparsable.
    #[error("invalid amount: {message}")]
    InvalidAmount { message: String },

    /// Currency is not an active ISO 4217 code.
    #[error("invalid currency: {currency}")]
    InvalidCurrency { currency: String },

    /// Call arguments cannot be shaped into a request.
    #[error("invalid arguments for {name}: {message}")]
    InvalidArguments { name: String, message: String },

    /// Payment handler not advertised by the merchant.
    #[error("unknown payment handler: {handler}")]
    UnknownPaymentHandler { handler: String },

    /// Signature did not verify.
    #[error("signature verification failed: {reason}")]
    SignatureInvalid { reason: String },

    /// Mandate is past its expiry.
    #[error("mandate expired at {expires_at}")]
    MandateExpired { expires_at: i64 },

    /// Mandate presented for a different handler, amount or currency.
    #[error("mandate scope mismatch: {message}")]
    MandateScopeMismatch { message: String },

    /// Signing key could not be loaded or encoded.
    #[error("key material error: {message}")]
    KeyMaterial { message: String },

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },
}

/// Stable, machine-readable error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    DiscoveryError,
    UnknownCapability,
    InsecureEndpoint,
    MerchantRejected,
    IdempotencyConflict,
    UpstreamUnavailable,
    InvalidAmount,
    InvalidCurrency,
    InvalidArguments,
    UnknownPaymentHandler,
    SignatureInvalid,
    MandateExpired,
    MandateScopeMismatch,
    KeyMaterial,
    Config,
}

/// Structured error handed to the orchestration layer.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merchant_payload: Option<serde_json::Value>,
}

impl HubError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Discovery { .. } => ErrorKind::DiscoveryError,
            Self::UnknownCapability { .. } => ErrorKind::UnknownCapability,
            Self::InsecureEndpoint { .. } => ErrorKind::InsecureEndpoint,
            Self::MerchantRejected { .. } => ErrorKind::MerchantRejected,
            Self::IdempotencyConflict { .. } => ErrorKind::IdempotencyConflict,
            Self::UpstreamUnavailable { .. } => ErrorKind::UpstreamUnavailable,
            Self::InvalidAmount { .. } => ErrorKind::InvalidAmount,
            Self::InvalidCurrency { .. } => ErrorKind::InvalidCurrency,
            Self::InvalidArguments { .. } => ErrorKind::InvalidArguments,
            Self::UnknownPaymentHandler { .. } => ErrorKind::UnknownPaymentHandler,
            Self::SignatureInvalid { .. } => ErrorKind::SignatureInvalid,
            Self::MandateExpired { .. } => ErrorKind::MandateExpired,
            Self::MandateScopeMismatch { .. } => ErrorKind::MandateScopeMismatch,
            Self::KeyMaterial { .. } => ErrorKind::KeyMaterial,
            Self::Config { .. } => ErrorKind::Config,
        }
    }

    /// Exit code for CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            // Caller input / config issues
            Self::UnknownCapability { .. } => 1,
            Self::InvalidArguments { .. } => 1,
            Self::InvalidAmount { .. } => 1,
            Self::InvalidCurrency { .. } => 1,
            Self::UnknownPaymentHandler { .. } => 1,
            Self::Config { .. } => 1,

            // Merchant said no
            Self::MerchantRejected { .. } => 2,

            // Security issues (higher priority)
            Self::InsecureEndpoint { .. } => 3,
            Self::SignatureInvalid { .. } => 4,
            Self::MandateExpired { .. } => 4,
            Self::MandateScopeMismatch { .. } => 4,
            Self::IdempotencyConflict { .. } => 4,
            Self::KeyMaterial { .. } => 4,

            // Network/transient
            Self::UpstreamUnavailable { .. } => 5,

            // Discovery
            Self::Discovery { .. } => 6,
        }
    }

    /// Whether the error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::UpstreamUnavailable { .. })
    }

    /// Merchant error body, when the merchant sent one.
    pub fn merchant_payload(&self) -> Option<&serde_json::Value> {
        match self {
            Self::MerchantRejected { payload, .. } | Self::IdempotencyConflict { payload, .. } => {
                payload.as_ref()
            }
            _ => None,
        }
    }

    pub fn to_report(&self) -> ErrorReport {
        ErrorReport {
            kind: self.kind(),
            message: self.to_string(),
            merchant_payload: self.merchant_payload().cloned(),
        }
    }
}

impl From<reqwest::Error> for HubError {
    fn from(err: reqwest::Error) -> Self {
        Self::UpstreamUnavailable {
            attempts: 1,
            message: err.to_string(),
        }
    }
}

/// Result type for hub operations.
pub type HubResult<T> = Result<T, HubError>;
