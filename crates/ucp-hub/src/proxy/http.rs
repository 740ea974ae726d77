//! HTTP layer: status mapping, retry, manifest fetch.
//!
//! This is the ONLY place for status code handling. proxy/mod.rs never
//! interprets status codes.

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE, USER_AGENT};
use tracing::{debug, warn};
use url::Url;

use crate::config::HubConfig;
use crate::error::{HubError, HubResult};
use crate::types::Manifest;

use super::helpers::{backoff_ceiling, parse_error_body, parse_success_body};
use super::request::SignedRequest;

const USER_AGENT_VALUE: &str = concat!("ucp-hub/", env!("CARGO_PKG_VERSION"));

pub(crate) const UCP_AGENT: &str = "ucp-agent";
pub(crate) const REQUEST_ID: &str = "request-id";
pub(crate) const IDEMPOTENCY_KEY: &str = "idempotency-key";
pub(crate) const REQUEST_SIGNATURE: &str = "request-signature";
pub(crate) const UCP_KEY_ID: &str = "ucp-key-id";
pub(crate) const UCP_TIMESTAMP: &str = "ucp-timestamp";
pub(crate) const PAYMENT_MANDATE: &str = "payment-mandate";

/// 2xx response to a signed request.
#[derive(Debug)]
pub(crate) struct Delivered {
    pub status: u16,
    pub body: serde_json::Value,
}

/// HTTP backend (holds reqwest client and retry policy).
#[derive(Debug, Clone)]
pub(crate) struct HttpBackend {
    pub(crate) client: reqwest::Client,
    pub(crate) max_retries: u32,
    pub(crate) retry_backoff_ms: u64,
    pub(crate) max_manifest_bytes: usize,
}

impl HttpBackend {
    pub(crate) fn new(config: &HubConfig) -> HubResult<Self> {
        let agent = HeaderValue::from_str(&format!("profile={}", config.agent_profile))
            .map_err(|e| HubError::Config {
                message: format!("agent_profile is not a valid header value: {}", e),
            })?;

        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
        default_headers.insert(UCP_AGENT, agent);

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .default_headers(default_headers)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| HubError::Config {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
            max_manifest_bytes: config.max_manifest_bytes,
        })
    }

    /// GET the discovery manifest. Not retried; every failure is a
    /// discovery error.
    pub(crate) async fn fetch_manifest(&self, url: &Url, endpoint: &str) -> HubResult<Manifest> {
        let discovery = |message: String| HubError::Discovery {
            endpoint: endpoint.to_string(),
            message,
        };

        let mut response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| discovery(format!("unreachable: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(discovery(format!("HTTP {} from {}", status.as_u16(), url)));
        }

        let declared_len = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());
        if let Some(len) = declared_len.filter(|len| *len > self.max_manifest_bytes) {
            return Err(discovery(format!(
                "manifest is {} bytes, limit is {}",
                len, self.max_manifest_bytes
            )));
        }

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| discovery(format!("failed to read manifest: {}", e)))?
        {
            if body.len() + chunk.len() > self.max_manifest_bytes {
                return Err(discovery(format!(
                    "manifest exceeds {} bytes",
                    self.max_manifest_bytes
                )));
            }
            body.extend_from_slice(&chunk);
        }

        debug!(endpoint = %endpoint, bytes = body.len(), "fetched manifest");

        serde_json::from_slice(&body).map_err(|e| discovery(format!("malformed manifest: {}", e)))
    }

    /// Send a signed request, retrying 5xx and transport failures with the
    /// same bytes and headers.
    pub(crate) async fn send(&self, request: &SignedRequest) -> HubResult<Delivered> {
        use rand::Rng;

        let attempts = self.max_retries.saturating_add(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.send_once(request).await {
                Ok(delivered) => return Ok(delivered),
                Err(HubError::UpstreamUnavailable { message, .. }) if attempt < attempts => {
                    let ceiling = backoff_ceiling(self.retry_backoff_ms, attempt);
                    let backoff = std::time::Duration::from_millis(
                        rand::thread_rng().gen_range(0..=ceiling.as_millis() as u64),
                    );

                    warn!(
                        error = %message,
                        request_id = %request.request_id(),
                        attempt,
                        max_attempts = attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        "retrying merchant request"
                    );

                    tokio::time::sleep(backoff).await;
                }
                Err(HubError::UpstreamUnavailable { message, .. }) => {
                    return Err(HubError::UpstreamUnavailable {
                        attempts: attempt,
                        message,
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send_once(&self, request: &SignedRequest) -> HubResult<Delivered> {
        let mut builder = self
            .client
            .request(request.method().clone(), request.url().clone())
            .header(CONTENT_TYPE, "application/json")
            .header(REQUEST_ID, request.request_id())
            .header(IDEMPOTENCY_KEY, request.idempotency_key())
            .header(UCP_TIMESTAMP, request.timestamp().to_string())
            .header(UCP_KEY_ID, request.key_id())
            .header(REQUEST_SIGNATURE, request.signature())
            .body(request.body().to_vec());

        if let Some(token) = request.mandate() {
            builder = builder.header(PAYMENT_MANDATE, token);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        debug!(
            request_id = %request.request_id(),
            status = status.as_u16(),
            bytes = body.len(),
            "merchant responded"
        );

        match status.as_u16() {
            200..=299 => Ok(Delivered {
                status: status.as_u16(),
                body: parse_success_body(&body),
            }),

            409 => Err(HubError::IdempotencyConflict {
                idempotency_key: request.idempotency_key().to_string(),
                payload: parse_error_body(&body),
            }),

            500..=599 => Err(HubError::UpstreamUnavailable {
                attempts: 1,
                message: format!("HTTP {}", status.as_u16()),
            }),

            // Redirects are not followed: the signature binds the path.
            _ => Err(HubError::MerchantRejected {
                status: status.as_u16(),
                payload: parse_error_body(&body),
            }),
        }
    }
}
