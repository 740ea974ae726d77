//! Protocol proxy: discovery, shaped and signed merchant calls, mandates.
//!
//! Public API: no status code knowledge. All HTTP/status mapping in http.rs.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::canonicalize::to_canonical_jcs_bytes;
use crate::config::HubConfig;
use crate::currency::Currency;
use crate::error::{HubError, HubResult};
use crate::mandate::PaymentMandate;
use crate::registry::CapabilityRegistry;
use crate::signer::Signer;
use crate::types::{Capability, CapabilitySummary};

mod helpers;
mod http;
mod request;
mod shape;

use helpers::{
    build_segments, discovery_url, endpoint_key, join_segments, method_for, normalize_endpoint,
    resource_template,
};
use http::HttpBackend;

pub use request::{CallOutcome, PreparedCall, SignedRequest};
pub use shape::{CallShape, ShapeRule, ACTION_ARG, ID_ARG};

/// Orchestration-facing proxy for one agent session.
///
/// Owns its registry and pending mandate; shares only the signer.
#[derive(Debug)]
pub struct UcpProxy {
    config: HubConfig,
    signer: Arc<Signer>,
    registry: CapabilityRegistry,
    http: HttpBackend,
    pending_mandate: Mutex<Option<PendingMandate>>,
}

/// Armed mandate and the merchant whose handlers it was checked against.
/// `endpoint` is `None` when nothing had been discovered at issue time.
#[derive(Debug)]
struct PendingMandate {
    endpoint: Option<String>,
    mandate: PaymentMandate,
}

impl UcpProxy {
    pub fn new(config: HubConfig, signer: Arc<Signer>) -> HubResult<Self> {
        let http = HttpBackend::new(&config)?;
        Ok(Self {
            registry: CapabilityRegistry::new(config.max_capabilities),
            config,
            signer,
            http,
            pending_mandate: Mutex::new(None),
        })
    }

    /// Load the signing key named by the config (or generate one).
    pub fn from_config(config: HubConfig) -> HubResult<Self> {
        let signer = Arc::new(Signer::from_config(&config)?);
        Self::new(config, signer)
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn signer(&self) -> &Arc<Signer> {
        &self.signer
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// Fetch a merchant manifest and register its capabilities.
    ///
    /// Returns summaries only; schemas stay behind [`UcpProxy::resolve`].
    pub async fn discover(&self, endpoint: &str) -> HubResult<Vec<CapabilitySummary>> {
        let base = normalize_endpoint(endpoint, &self.config)?;
        let key = endpoint_key(&base);
        let url = discovery_url(&base, &self.config.discovery_path)?;
        debug!(url = %url, "discovering merchant");

        let manifest = self.http.fetch_manifest(&url, &key).await?;
        self.registry.register(&key, manifest).await
    }

    pub async fn search(&self, query: &str) -> Vec<CapabilitySummary> {
        self.registry.search(query).await
    }

    /// Full schema for `name`; marks it disclosed.
    pub async fn resolve(&self, name: &str) -> HubResult<Capability> {
        self.registry.resolve(name).await
    }

    /// Shape and sign a call without sending it.
    ///
    /// A pending payment mandate is attached (and consumed) when the
    /// capability is checkout-class and served by the merchant the mandate
    /// was issued for.
    pub async fn prepare(&self, name: &str, args: Value) -> HubResult<PreparedCall> {
        let capability = self.registry.lookup(name).await?;

        let mut args = match args {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(HubError::InvalidArguments {
                    name: name.to_string(),
                    message: format!("arguments must be a JSON object, got {}", json_type(&other)),
                })
            }
        };

        let shape = shape::infer_shape(&capability, &mut args)?;
        let template = resource_template(&capability, &self.config);
        let segments = build_segments(&capability.name, template, &shape, &mut args)?;

        let base = Url::parse(&capability.endpoint).map_err(|e| HubError::InsecureEndpoint {
            endpoint: capability.endpoint.clone(),
            reason: format!("invalid URL: {}", e),
        })?;
        let url = join_segments(&base, &segments)?;
        let body = to_canonical_jcs_bytes(&Value::Object(args)).map_err(|e| {
            HubError::InvalidArguments {
                name: name.to_string(),
                message: format!("arguments cannot be canonicalized: {}", e),
            }
        })?;

        let mandate = if capability.is_checkout_class() {
            self.take_pending_mandate(&capability.endpoint).await
        } else {
            None
        };

        let request = SignedRequest::sign(
            &self.signer,
            method_for(shape.operation),
            url,
            body,
            mandate.as_ref().map(|m| m.token().to_string()),
            Utc::now().timestamp(),
        )?;

        info!(
            capability = %capability.name,
            operation = ?shape.operation,
            rule = ?shape.rule,
            method = %request.method(),
            path = %request.path(),
            request_id = %request.request_id(),
            mandate = mandate.is_some(),
            "prepared merchant call"
        );

        Ok(PreparedCall {
            capability: capability.name,
            shape,
            request,
        })
    }

    /// Send a prepared call. Safe to repeat: the same idempotency key and
    /// signature go out every time.
    pub async fn execute(&self, prepared: &PreparedCall) -> HubResult<CallOutcome> {
        let delivered = self.http.send(&prepared.request).await?;

        info!(
            capability = %prepared.capability,
            request_id = %prepared.request.request_id(),
            status = delivered.status,
            "merchant call succeeded"
        );

        Ok(CallOutcome {
            capability: prepared.capability.clone(),
            shape: prepared.shape.clone(),
            status: delivered.status,
            body: delivered.body,
            request_id: prepared.request.request_id().to_string(),
            idempotency_key: prepared.request.idempotency_key().to_string(),
        })
    }

    /// Prepare and execute in one step.
    pub async fn call(&self, name: &str, args: Value) -> HubResult<CallOutcome> {
        let prepared = self.prepare(name, args).await?;
        let result = self.execute(&prepared).await;
        if result.is_err() && prepared.request.mandate().is_some() {
            debug!(
                capability = %prepared.capability,
                request_id = %prepared.request.request_id(),
                "payment mandate spent on a failed call; select a payment method again"
            );
        }
        result
    }

    /// Issue a mandate for `amount` (decimal string) and arm it for the next
    /// checkout-class call.
    pub async fn select_payment_method(
        &self,
        handler: &str,
        amount: &str,
        currency: &str,
    ) -> HubResult<PaymentMandate> {
        let handler = handler.trim();
        let latest = self.registry.latest_payment_handlers().await;
        if let Some((_, advertised)) = &latest {
            let known = advertised.is_empty()
                || advertised
                    .iter()
                    .any(|h| h.id == handler || h.name.as_deref() == Some(handler));
            if !known {
                return Err(HubError::UnknownPaymentHandler {
                    handler: handler.to_string(),
                });
            }
        }

        let currency = Currency::from_code(currency)?;
        let amount_minor = currency.parse_amount(amount)?;
        let mandate = self.signer.issue_mandate(
            handler,
            amount_minor,
            currency.code(),
            self.config.mandate_ttl(),
        )?;

        let pending = PendingMandate {
            endpoint: latest.map(|(endpoint, _)| endpoint),
            mandate: mandate.clone(),
        };
        let replaced = self.pending_mandate.lock().await.replace(pending);
        if replaced.is_some() {
            debug!("replaced unused payment mandate");
        }
        Ok(mandate)
    }

    /// Whether a mandate is armed for the next checkout-class call.
    pub async fn has_pending_mandate(&self) -> bool {
        self.pending_mandate.lock().await.is_some()
    }

    /// Take the armed mandate if it was issued for `endpoint`; a mandate for
    /// another merchant stays armed.
    async fn take_pending_mandate(&self, endpoint: &str) -> Option<PaymentMandate> {
        let mut slot = self.pending_mandate.lock().await;
        let issued_for = slot.as_ref()?.endpoint.as_deref();
        if issued_for.is_some_and(|e| e != endpoint) {
            debug!(
                endpoint = %endpoint,
                "payment mandate was issued for another merchant; not attached"
            );
            return None;
        }
        let PendingMandate { mandate, .. } = slot.take()?;
        drop(slot);

        if mandate.expires_at <= Utc::now() {
            warn!(
                handler = %mandate.handler,
                expires_at = %mandate.expires_at,
                "dropping expired payment mandate"
            );
            return None;
        }
        Some(mandate)
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
