//! Signed request values and call results.

use std::fmt;

use serde::Serialize;
use url::Url;

use crate::canonicalize::canonical_request_bytes;
use crate::error::{HubError, HubResult};
use crate::signer::Signer;

use super::shape::CallShape;

/// One logical merchant request, signed once.
///
/// Every transport attempt sends these exact bytes and headers, so the
/// idempotency key and signature are stable across retries.
#[derive(Clone)]
pub struct SignedRequest {
    method: reqwest::Method,
    url: Url,
    request_id: String,
    idempotency_key: String,
    timestamp: i64,
    key_id: String,
    signature: String,
    mandate: Option<String>,
    body: Vec<u8>,
}

impl fmt::Debug for SignedRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignedRequest")
            .field("method", &self.method)
            .field("url", &self.url.as_str())
            .field("request_id", &self.request_id)
            .field("idempotency_key", &"<redacted>")
            .field("timestamp", &self.timestamp)
            .field("key_id", &self.key_id)
            .field("mandate", &self.mandate.as_ref().map(|_| "<redacted>"))
            .field("body_len", &self.body.len())
            .finish()
    }
}

impl SignedRequest {
    /// Mint a request id and idempotency key and sign the canonical request.
    pub(crate) fn sign(
        signer: &Signer,
        method: reqwest::Method,
        url: Url,
        body: Vec<u8>,
        mandate: Option<String>,
        timestamp: i64,
    ) -> HubResult<Self> {
        let idempotency_key = Signer::new_idempotency_key();
        let key_id = signer.key_id().to_string();
        let material = canonical_request_bytes(
            method.as_str(),
            url.path(),
            &body,
            &idempotency_key,
            &key_id,
            mandate.as_deref(),
            timestamp,
        )
        .map_err(|e| HubError::KeyMaterial {
            message: format!("failed to canonicalize request: {}", e),
        })?;

        Ok(Self {
            signature: signer.sign(&material),
            key_id,
            request_id: uuid::Uuid::new_v4().to_string(),
            method,
            url,
            idempotency_key,
            timestamp,
            mandate,
            body,
        })
    }

    pub fn method(&self) -> &reqwest::Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Path as signed (percent-encoded).
    pub fn path(&self) -> &str {
        self.url.path()
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn idempotency_key(&self) -> &str {
        &self.idempotency_key
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn mandate(&self) -> Option<&str> {
        self.mandate.as_deref()
    }

    /// JCS bytes of the arguments.
    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

/// A call that has been shaped and signed but not (or not yet successfully)
/// sent. Executing it again resends the identical request.
#[derive(Debug, Clone)]
pub struct PreparedCall {
    pub(crate) capability: String,
    pub(crate) shape: CallShape,
    pub(crate) request: SignedRequest,
}

impl PreparedCall {
    pub fn capability(&self) -> &str {
        &self.capability
    }

    pub fn shape(&self) -> &CallShape {
        &self.shape
    }

    pub fn request(&self) -> &SignedRequest {
        &self.request
    }
}

/// Successful merchant response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallOutcome {
    pub capability: String,
    pub shape: CallShape,
    pub status: u16,
    /// Parsed response body; `null` when the merchant returned no content.
    pub body: serde_json::Value,
    pub request_id: String,
    pub idempotency_key: String,
}
